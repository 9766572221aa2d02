//! Serial and multi-threaded Sieve of Eratosthenes.
//!
//! The concurrent sieve splits the seed values 2..=sqrt(N) across worker
//! threads that all mark into one shared buffer of monotonic flags. After the
//! pool's join barrier the buffer becomes read-only and is scanned in
//! parallel sub-ranges, whose results are merged back in numeric order.

pub mod buffer;
pub mod collect;
pub mod config;
pub mod error;
pub mod partition;
pub mod pool;
pub mod primes;
pub mod storage;
pub mod storage_uring;
pub mod verify;
pub mod worker;

pub use config::SieveConfig;
pub use error::{Result, SieveError};
