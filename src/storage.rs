use chrono::Local;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use log::{debug, warn};

use crate::collect::{SegmentPrimes, SegmentReorder};
use crate::error::{Result, SieveError};

pub const REFERENCE_FILE: &str = "primes.txt";
pub const CONCURRENT_FILE: &str = "primesc.txt";
pub const EXECUTION_LOG_FILE: &str = "execution_log.txt";

/// Read current process memory usage from /proc/self/status
/// Returns (VmRSS in MB, VmSize in MB) or None if unable to read
pub fn get_process_memory_mb() -> Option<(f64, f64)> {
    let file = File::open("/proc/self/status").ok()?;
    let reader = BufReader::new(file);

    let mut vm_rss_kb = None;
    let mut vm_size_kb = None;

    for line in reader.lines().map_while(|line| line.ok()) {
        // Format: "VmRSS:     12345 kB"
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            vm_rss_kb = rest.split_whitespace().next().and_then(|v| v.parse::<f64>().ok());
        } else if let Some(rest) = line.strip_prefix("VmSize:") {
            vm_size_kb = rest.split_whitespace().next().and_then(|v| v.parse::<f64>().ok());
        }

        if vm_rss_kb.is_some() && vm_size_kb.is_some() {
            break;
        }
    }

    Some((vm_rss_kb? / 1024.0, vm_size_kb? / 1024.0))
}

/// `$XDG_DATA_HOME/sieve`, falling back to `~/.local/share/sieve`.
pub fn data_dir() -> Result<PathBuf> {
    let xdg_data_home = env::var("XDG_DATA_HOME")
        .ok()
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".local/share"))
        })
        .ok_or_else(|| {
            SieveError::write_failure(
                "$XDG_DATA_HOME",
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "neither XDG_DATA_HOME nor HOME is set",
                ),
            )
        })?;

    Ok(xdg_data_home.join("sieve"))
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| SieveError::write_failure(dir, e))
}

/// Opens `path` for writing, truncating any previous artifact.
pub(crate) fn create_artifact(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| SieveError::write_failure(path, e))
}

/// Appends one decimal line per prime to `out`.
pub(crate) fn format_primes(primes: &[usize], out: &mut Vec<u8>) {
    let mut itoa_buf = itoa::Buffer::new();
    for &prime in primes {
        out.extend_from_slice(itoa_buf.format(prime).as_bytes());
        out.push(b'\n');
    }
}

/// Writes an in-memory prime list, one decimal per line.
pub fn save_all_primes(path: &Path, primes: &[usize]) -> Result<usize> {
    let file = create_artifact(path)?;
    let mut writer = BufWriter::with_capacity(256 * 1024, file);

    let mut itoa_buf = itoa::Buffer::new();
    for &prime in primes {
        writer
            .write_all(itoa_buf.format(prime).as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|e| SieveError::write_failure(path, e))?;
    }
    writer.flush().map_err(|e| SieveError::write_failure(path, e))?;

    Ok(primes.len())
}

/// Removes an artifact a failed run left half written.
pub fn discard_partial_artifact(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed partial artifact {}", path.display()),
        Err(e) => warn!("Could not remove partial artifact {}: {}", path.display(), e),
    }
}

/// Consumer side of the collector: receives segments in whatever order the
/// scanners finish, writes them in numeric order, returns the prime count.
///
/// A segment that never arrives (a scanner that failed) or a failed write
/// removes the artifact before the error is returned.
pub fn save_primes_streaming_segments(rx: Receiver<SegmentPrimes>, path: &Path) -> Result<usize> {
    let file = create_artifact(path)?;
    let result = write_ordered_segments(rx, file, path);
    if result.is_err() {
        discard_partial_artifact(path);
    }
    result
}

fn write_ordered_segments(rx: Receiver<SegmentPrimes>, file: File, path: &Path) -> Result<usize> {
    let mut writer = BufWriter::with_capacity(128 * 1024, file);

    let mut reorder = SegmentReorder::new();
    let mut count = 0;

    // Reused across segments
    let mut batch = Vec::with_capacity(2 * 1024 * 1024);

    for segment in rx {
        for ready in reorder.push(segment) {
            batch.clear();
            format_primes(&ready.primes, &mut batch);
            writer
                .write_all(&batch)
                .map_err(|e| SieveError::write_failure(path, e))?;
            count += ready.primes.len();
        }
    }

    debug!(
        "Wrote {} primes in {} segments to {}",
        count,
        reorder.released(),
        path.display()
    );
    writer.flush().map_err(|e| SieveError::write_failure(path, e))?;
    reorder.finish()?;

    Ok(count)
}

pub fn load_all_primes(path: &Path) -> Result<Vec<usize>> {
    let read_failure = |source| SieveError::ReadFailure {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(read_failure)?;
    let reader = BufReader::new(file);

    let mut primes = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(read_failure)?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let prime = trimmed
            .parse::<usize>()
            .map_err(|_| SieveError::InvalidArtifact {
                path: path.to_path_buf(),
                line: idx + 1,
                content: trimmed.to_string(),
            })?;
        primes.push(prime);
    }

    Ok(primes)
}

pub fn log_execution(
    dir: &Path,
    subcommand: &str,
    args: &str,
    workers: usize,
    duration_us: u128,
) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;

    let log_path = dir.join(EXECUTION_LOG_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");

    writeln!(
        file,
        "{} | {} | {} | w{} | {}us",
        timestamp, subcommand, args, workers, duration_us
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn segment(segment_id: usize, primes: &[usize]) -> SegmentPrimes {
        SegmentPrimes {
            primes: primes.to_vec(),
            segment_id,
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(REFERENCE_FILE);

        let count = save_all_primes(&path, &[2, 3, 5, 7]).unwrap();
        assert_eq!(count, 4);
        assert_eq!(fs::read_to_string(&path).unwrap(), "2\n3\n5\n7\n");
        assert_eq!(load_all_primes(&path).unwrap(), vec![2, 3, 5, 7]);
    }

    #[test]
    fn test_save_overwrites_previous_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(REFERENCE_FILE);

        save_all_primes(&path, &[2, 3, 5, 7, 11, 13]).unwrap();
        save_all_primes(&path, &[2]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "2\n");
    }

    #[test]
    fn test_streaming_writer_restores_numeric_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONCURRENT_FILE);
        let (tx, rx) = mpsc::channel();

        tx.send(segment(2, &[17, 19, 23, 29])).unwrap();
        tx.send(segment(0, &[2, 3, 5])).unwrap();
        tx.send(segment(3, &[])).unwrap();
        tx.send(segment(1, &[7, 11, 13])).unwrap();
        drop(tx);

        let count = save_primes_streaming_segments(rx, &path).unwrap();
        assert_eq!(count, 10);
        assert_eq!(
            load_all_primes(&path).unwrap(),
            vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]
        );
    }

    #[test]
    fn test_streaming_writer_fails_on_missing_segment() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONCURRENT_FILE);
        let (tx, rx) = mpsc::channel();

        tx.send(segment(1, &[7])).unwrap();
        drop(tx);

        assert!(matches!(
            save_primes_streaming_segments(rx, &path),
            Err(SieveError::WorkerFailed { worker: 0, .. })
        ));
    }

    #[test]
    fn test_streaming_writer_removes_artifact_after_gap() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONCURRENT_FILE);
        fs::write(&path, "2\n3\n").unwrap();
        let (tx, rx) = mpsc::channel();

        // Segment 0 is written before the writer learns segment 1 is gone.
        tx.send(segment(0, &[2, 3, 5])).unwrap();
        tx.send(segment(2, &[11, 13])).unwrap();
        drop(tx);

        assert!(matches!(
            save_primes_streaming_segments(rx, &path),
            Err(SieveError::WorkerFailed { worker: 1, .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_discard_partial_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONCURRENT_FILE);
        fs::write(&path, "2\n3\n").unwrap();

        discard_partial_artifact(&path);
        assert!(!path.exists());
        // Already gone: only logged.
        discard_partial_artifact(&path);
    }

    #[test]
    fn test_unwritable_path_is_output_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join(REFERENCE_FILE);

        assert!(matches!(
            save_all_primes(&path, &[2]),
            Err(SieveError::OutputWriteFailure { .. })
        ));
    }

    #[test]
    fn test_load_reports_malformed_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONCURRENT_FILE);
        fs::write(&path, "2\n3\nfive\n7\n").unwrap();

        match load_all_primes(&path) {
            Err(SieveError::InvalidArtifact { line, content, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(content, "five");
            }
            other => panic!("expected InvalidArtifact, got {:?}", other),
        }
    }

    #[test]
    fn test_log_execution_appends() {
        let dir = TempDir::new().unwrap();

        log_execution(dir.path(), "primes", "30", 4, 120).unwrap();
        log_execution(dir.path(), "primes", "31", 2, 90).unwrap();

        let log = fs::read_to_string(dir.path().join(EXECUTION_LOG_FILE)).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("| primes | 30 | w4 | 120us"));
        assert!(lines[1].ends_with("| primes | 31 | w2 | 90us"));
    }

    #[test]
    fn test_format_primes() {
        let mut out = Vec::new();
        format_primes(&[2, 3, 1_000_003], &mut out);
        assert_eq!(out, b"2\n3\n1000003\n");
    }
}
