use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, SieveError};

/// Shared "known composite" flags for 0..=limit.
///
/// Flags only ever go false -> true, so every writer stores the same value
/// and relaxed atomics are enough while workers run. Visibility to the
/// collector comes from the pool join, which is why reading is only offered
/// on [`SievedBuffer`].
pub struct CompositeBuffer {
    flags: Vec<AtomicBool>,
}

impl CompositeBuffer {
    pub fn allocate(limit: usize) -> Result<Self> {
        let len = limit
            .checked_add(1)
            .ok_or(SieveError::AllocationFailure { requested: limit })?;

        let mut flags = Vec::new();
        flags
            .try_reserve_exact(len)
            .map_err(|_| SieveError::AllocationFailure { requested: len })?;
        flags.resize_with(len, || AtomicBool::new(false));

        Ok(Self { flags })
    }

    pub fn limit(&self) -> usize {
        self.flags.len() - 1
    }

    /// Panics if `n` is past the limit.
    #[inline]
    pub fn is_composite(&self, n: usize) -> bool {
        self.flags[n].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn mark_composite(&self, n: usize) {
        self.flags[n].store(true, Ordering::Relaxed);
    }

    /// Only the worker pool calls this, after its join barrier.
    pub(crate) fn into_sieved(self) -> SievedBuffer {
        SievedBuffer { flags: self.flags }
    }
}

/// A composite buffer no worker can write to any more.
pub struct SievedBuffer {
    flags: Vec<AtomicBool>,
}

impl SievedBuffer {
    pub fn limit(&self) -> usize {
        self.flags.len() - 1
    }

    /// 0 and 1 are never prime, whatever their flag says.
    #[inline]
    pub fn is_prime(&self, n: usize) -> bool {
        n >= 2 && n < self.flags.len() && !self.flags[n].load(Ordering::Relaxed)
    }

    /// Ascending primes in `range`, clipped to the buffer.
    pub fn primes_in(&self, range: std::ops::Range<usize>) -> Vec<usize> {
        let end = range.end.min(self.flags.len());
        let start = range.start.max(2);

        (start..end).filter(|&n| self.is_prime(n)).collect()
    }
}
