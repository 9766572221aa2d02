use clap::{Parser, Subcommand};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use sieve::{Result, SieveConfig, SieveError};
use sieve::{collect, pool, primes, storage, storage_uring, verify};

#[derive(Parser)]
#[command(name = "sieve")]
#[command(about = "Serial and multi-threaded Sieve of Eratosthenes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Find all prime numbers up to a given limit, serially and concurrently")]
    Primes {
        #[arg(allow_negative_numbers = true, help = "The upper limit to search for primes")]
        limit: i64,
        #[arg(
            short,
            long,
            allow_negative_numbers = true,
            help = "Number of worker threads (defaults to the CPU count)"
        )]
        workers: Option<i64>,
        #[arg(long, help = "Skip the single-threaded reference run")]
        skip_reference: bool,
        #[arg(long, help = "Write the concurrent result through io_uring")]
        io_uring: bool,
        #[arg(short, long, help = "Directory for output files (defaults to $XDG_DATA_HOME/sieve)")]
        output_dir: Option<PathBuf>,
    },
    #[command(about = "Check that a primes file lists exactly the consecutive primes from 2")]
    Verify {
        #[arg(help = "File to check (defaults to primesc.txt in the data directory)")]
        file: Option<PathBuf>,
        #[arg(short, long, help = "Also require the list to end at the last prime <= LIMIT")]
        limit: Option<usize>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Primes {
            limit,
            workers,
            skip_reference,
            io_uring,
            output_dir,
        } => run_primes(limit, workers, skip_reference, io_uring, output_dir),
        Commands::Verify { file, limit } => run_verify(file, limit),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = std::error::Error::source(cause);
            }
            ExitCode::FAILURE
        }
    }
}

fn print_duration(label: &str, duration: Duration) {
    let duration_us = duration.as_micros();
    println!(
        "{}: {}us ({:.2}ms)",
        label,
        duration_us,
        duration_us as f64 / 1000.0
    );
}

fn resolve_dir(output_dir: Option<PathBuf>) -> Result<PathBuf> {
    match output_dir {
        Some(dir) => Ok(dir),
        None => storage::data_dir(),
    }
}

fn run_primes(
    limit: i64,
    workers: Option<i64>,
    skip_reference: bool,
    io_uring: bool,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    // Determine number of workers (default to CPU count)
    let workers = workers.unwrap_or_else(|| {
        thread::available_parallelism()
            .map(|n| n.get() as i64)
            .unwrap_or(4)
    });
    let config = SieveConfig::parse(limit, workers)?;

    let data_dir = resolve_dir(output_dir)?;
    storage::ensure_dir(&data_dir)?;

    println!(
        "Finding primes up to {} with {} worker threads...",
        config.limit, config.workers
    );

    let start = Instant::now();

    let reference_count = if skip_reference {
        None
    } else {
        Some(run_reference(&config, &data_dir)?)
    };

    let concurrent_count = run_concurrent(&config, &data_dir, io_uring)?;

    if let Some(reference) = reference_count {
        if reference != concurrent_count {
            error!(
                "Cross-check failed: reference {} vs concurrent {}",
                reference, concurrent_count
            );
            return Err(SieveError::CrossCheckMismatch {
                reference,
                concurrent: concurrent_count,
            });
        }
        info!("Cross-check passed: {} primes", reference);
    }

    println!("\nTotal: {} primes found", concurrent_count);

    let duration = start.elapsed();
    print_duration("Total execution time", duration);

    if let Err(e) = storage::log_execution(
        &data_dir,
        "primes",
        &config.limit.to_string(),
        config.workers,
        duration.as_micros(),
    ) {
        warn!("Failed to log execution: {}", e);
    }

    Ok(())
}

fn run_reference(config: &SieveConfig, data_dir: &Path) -> Result<usize> {
    let start = Instant::now();

    let primes = primes::find_primes_reference(config.limit)?;
    let path = data_dir.join(storage::REFERENCE_FILE);
    let count = storage::save_all_primes(&path, &primes)?;

    print_duration("Time for non-concurrent prime finder", start.elapsed());
    println!("Saved {} primes to {}", count, path.display());
    Ok(count)
}

fn run_concurrent(config: &SieveConfig, data_dir: &Path, io_uring: bool) -> Result<usize> {
    let start = Instant::now();

    // Nothing is written unless every worker finished cleanly.
    let sieved = primes::sieve_concurrent(config)?;
    let sieve_done = start.elapsed();

    if let Some((rss_mb, vm_mb)) = storage::get_process_memory_mb() {
        debug!("After sieving: RSS={:.2} MB, VM={:.2} MB", rss_mb, vm_mb);
    }

    let path = data_dir.join(storage::CONCURRENT_FILE);
    let (tx, rx) = mpsc::channel::<collect::SegmentPrimes>();

    // Spawn consumer thread (reorders segments by numeric range)
    let consumer = {
        let path = path.clone();
        thread::spawn(move || {
            if io_uring {
                storage_uring::save_primes_streaming_segments_uring(rx, &path)
            } else {
                storage::save_primes_streaming_segments(rx, &path)
            }
        })
    };

    let scanned = collect::scan_segments(&sieved, config.workers, tx);

    // Wait for consumer to finish and get prime count
    let written = consumer.join().map_err(|payload| {
        SieveError::write_failure(
            &path,
            std::io::Error::other(pool::panic_message(payload.as_ref())),
        )
    })?;
    // Scanners that failed to spawn may leave no gap for the writer to notice.
    if let Err(e) = scanned {
        if written.is_ok() {
            storage::discard_partial_artifact(&path);
        }
        return Err(e);
    }
    let count = written?;

    let total = start.elapsed();
    print_duration("Concurrent sieve finished", sieve_done);
    print_duration("Time for concurrent prime finder", total);
    println!("Saved {} primes to {}", count, path.display());

    Ok(count)
}

fn run_verify(file: Option<PathBuf>, limit: Option<usize>) -> Result<()> {
    let path = match file {
        Some(path) => path,
        None => storage::data_dir()?.join(storage::CONCURRENT_FILE),
    };

    let start = Instant::now();
    let primes = storage::load_all_primes(&path)?;
    let report = verify::verify_primes(&primes, limit)?;

    match report.largest {
        Some(largest) => println!(
            "{}: {} consecutive primes, largest {}",
            path.display(),
            report.count,
            largest
        ),
        None => println!("{}: empty", path.display()),
    }
    print_duration("Verification time", start.elapsed());

    Ok(())
}
