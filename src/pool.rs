use std::any::Any;
use std::thread;
use std::time::Instant;

use log::debug;

use crate::buffer::{CompositeBuffer, SievedBuffer};
use crate::error::{Result, SieveError};
use crate::partition::{SeedRange, partition_seeds};
use crate::worker::SieveWorker;

/// One OS thread per seed range, all sharing one buffer.
pub struct WorkerPool {
    ranges: Vec<SeedRange>,
}

impl WorkerPool {
    pub fn new(ranges: Vec<SeedRange>) -> Self {
        Self { ranges }
    }

    pub fn for_limit(limit: usize, workers: usize) -> Result<Self> {
        Ok(Self::new(partition_seeds(limit, workers)?))
    }

    pub fn workers(&self) -> usize {
        self.ranges.len()
    }

    /// Runs every worker and blocks until all of them have terminated.
    ///
    /// The buffer comes back as a [`SievedBuffer`] only when every worker
    /// finished cleanly. Otherwise the first failure is returned and the
    /// partially sieved buffer is dropped here.
    pub fn run(&self, buffer: CompositeBuffer) -> Result<SievedBuffer> {
        debug!("Spawning {} sieve workers: {:?}", self.workers(), self.ranges);

        let mut failure: Option<SieveError> = None;

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.ranges.len());

            for (id, &range) in self.ranges.iter().enumerate() {
                let worker = SieveWorker::new(id, range, &buffer);
                let spawned = thread::Builder::new()
                    .name(format!("sieve-{}", id))
                    .spawn_scoped(scope, move || {
                        if range.is_empty() {
                            debug!("Worker {} has no seeds", worker.id);
                            return;
                        }
                        let start = Instant::now();
                        worker.run();
                        debug!(
                            "Worker {} finished {} seeds {:?} in {}us",
                            worker.id,
                            range.len(),
                            range.seeds(),
                            start.elapsed().as_micros()
                        );
                    });

                match spawned {
                    Ok(handle) => handles.push((id, handle)),
                    Err(e) => {
                        failure = Some(SieveError::WorkerFailed {
                            worker: id,
                            reason: format!("could not spawn thread: {}", e),
                        });
                        break;
                    }
                }
            }

            // Join barrier: every spawned worker is joined, even after a failure.
            for (id, handle) in handles {
                if let Err(payload) = handle.join() {
                    if failure.is_none() {
                        failure = Some(SieveError::WorkerFailed {
                            worker: id,
                            reason: panic_message(payload.as_ref()),
                        });
                    }
                }
            }
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(buffer.into_sieved()),
        }
    }
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
