use crate::error::{Result, SieveError};

pub const MIN_LIMIT: usize = 2;
/// One flag byte per number, so this caps the buffer at roughly 4 GB.
pub const MAX_LIMIT: usize = 4_000_000_000;
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 1000;

/// Validated run parameters. Construction is the only place bounds are
/// checked, so anything holding a `SieveConfig` may allocate for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SieveConfig {
    pub limit: usize,
    pub workers: usize,
}

impl SieveConfig {
    pub fn new(limit: usize, workers: usize) -> Result<Self> {
        if limit < MIN_LIMIT {
            return Err(SieveError::invalid(
                "limit",
                limit,
                format!("must be at least {}", MIN_LIMIT),
            ));
        }
        if limit > MAX_LIMIT {
            return Err(SieveError::invalid(
                "limit",
                limit,
                format!("must be at most {}", MAX_LIMIT),
            ));
        }
        if workers < MIN_WORKERS {
            return Err(SieveError::invalid(
                "workers",
                workers,
                format!("must be at least {}", MIN_WORKERS),
            ));
        }
        if workers > MAX_WORKERS {
            return Err(SieveError::invalid(
                "workers",
                workers,
                format!("must be at most {}", MAX_WORKERS),
            ));
        }

        Ok(Self { limit, workers })
    }

    /// Accepts the signed values the CLI hands over so that negative input
    /// is reported against the right parameter.
    pub fn parse(limit: i64, workers: i64) -> Result<Self> {
        let limit = usize::try_from(limit)
            .map_err(|_| SieveError::invalid("limit", limit, "must not be negative"))?;
        let workers = usize::try_from(workers)
            .map_err(|_| SieveError::invalid("workers", workers, "must not be negative"))?;
        Self::new(limit, workers)
    }
}
