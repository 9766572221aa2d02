use std::time::Instant;

use log::info;

use crate::buffer::{CompositeBuffer, SievedBuffer};
use crate::collect;
use crate::config::SieveConfig;
use crate::error::{Result, SieveError};
use crate::pool::WorkerPool;

/// Basic single-threaded Sieve of Eratosthenes.
///
/// - Time complexity: O(n log log n)
/// - Space complexity: O(n), one byte per number
///
/// Serves as the baseline the concurrent sieve is timed and checked against.
pub fn find_primes_reference(limit: usize) -> Result<Vec<usize>> {
    if limit < 2 {
        return Ok(vec![]);
    }

    let len = limit
        .checked_add(1)
        .ok_or(SieveError::AllocationFailure { requested: limit })?;
    let mut is_prime = Vec::new();
    is_prime
        .try_reserve_exact(len)
        .map_err(|_| SieveError::AllocationFailure { requested: len })?;
    is_prime.resize(len, true);
    is_prime[0] = false;
    is_prime[1] = false;

    for i in 2..=limit.isqrt() {
        if is_prime[i] {
            let mut j = i * i;
            while j <= limit {
                is_prime[j] = false;
                j += i;
            }
        }
    }

    Ok(is_prime
        .iter()
        .enumerate()
        .filter_map(|(num, &prime)| if prime { Some(num) } else { None })
        .collect())
}

/// Multi-threaded sieve: partitions seeds across `config.workers` threads
/// that all eliminate into one shared buffer.
///
/// Partitioning happens before allocation, so a bad worker count never
/// costs a buffer.
pub fn sieve_concurrent(config: &SieveConfig) -> Result<SievedBuffer> {
    let pool = WorkerPool::for_limit(config.limit, config.workers)?;
    let buffer = CompositeBuffer::allocate(config.limit)?;

    let start = Instant::now();
    let sieved = pool.run(buffer)?;
    info!(
        "Sieved up to {} with {} workers in {}us",
        config.limit,
        pool.workers(),
        start.elapsed().as_micros()
    );

    Ok(sieved)
}

/// Concurrent sieve followed by an in-memory collection pass.
pub fn find_primes_concurrent(config: &SieveConfig) -> Result<Vec<usize>> {
    let sieved = sieve_concurrent(config)?;
    collect::collect_primes(&sieved, config.workers)
}
