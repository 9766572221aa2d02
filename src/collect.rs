use std::collections::BTreeMap;
use std::sync::mpsc::{self, Sender};
use std::thread;

use log::debug;

use crate::buffer::SievedBuffer;
use crate::error::{Result, SieveError};
use crate::partition::split_range;
use crate::pool::panic_message;

/// Primes found in one sub-range of the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPrimes {
    pub primes: Vec<usize>,
    /// Position of the sub-range in ascending numeric order.
    pub segment_id: usize,
}

/// Scans 2..=limit in `segments` parallel sub-ranges and sends each result
/// tagged with its range position. Segments arrive in completion order;
/// callers restore numeric order with [`SegmentReorder`].
pub fn scan_segments(
    buffer: &SievedBuffer,
    segments: usize,
    sender: Sender<SegmentPrimes>,
) -> Result<()> {
    let ranges = split_range(2, buffer.limit() + 1, segments.max(1));
    let mut failure = None;

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(ranges.len());

        for (segment_id, range) in ranges.into_iter().enumerate() {
            let sender = sender.clone();
            let spawned = thread::Builder::new()
                .name(format!("collect-{}", segment_id))
                .spawn_scoped(scope, move || {
                    let primes = buffer.primes_in(range);
                    // A closed channel means the writer gave up; it reports why.
                    let _ = sender.send(SegmentPrimes { primes, segment_id });
                });

            match spawned {
                Ok(handle) => handles.push((segment_id, handle)),
                Err(e) => {
                    failure = Some(SieveError::WorkerFailed {
                        worker: segment_id,
                        reason: format!("could not spawn thread: {}", e),
                    });
                    break;
                }
            }
        }

        for (segment_id, handle) in handles {
            if let Err(payload) = handle.join() {
                if failure.is_none() {
                    failure = Some(SieveError::WorkerFailed {
                        worker: segment_id,
                        reason: panic_message(payload.as_ref()),
                    });
                }
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Holds back out-of-order segments until every lower id has been released.
#[derive(Default)]
pub struct SegmentReorder {
    pending: BTreeMap<usize, SegmentPrimes>,
    next_expected_id: usize,
    peak_pending: usize,
}

impl SegmentReorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts one segment and returns every segment now releasable, in
    /// ascending id order.
    pub fn push(&mut self, segment: SegmentPrimes) -> Vec<SegmentPrimes> {
        self.pending.insert(segment.segment_id, segment);
        self.peak_pending = self.peak_pending.max(self.pending.len());

        let mut ready = Vec::new();
        while let Some(seg) = self.pending.remove(&self.next_expected_id) {
            ready.push(seg);
            self.next_expected_id += 1;
        }
        ready
    }

    pub fn released(&self) -> usize {
        self.next_expected_id
    }

    /// Fails if a segment id never arrived. Flushing the rest would write
    /// primes out of order.
    pub fn finish(self) -> Result<()> {
        debug!(
            "Reorder released {} segments, peak {} pending",
            self.next_expected_id, self.peak_pending
        );
        match self.pending.keys().next() {
            None => Ok(()),
            Some(&held) => Err(SieveError::WorkerFailed {
                worker: self.next_expected_id,
                reason: format!(
                    "segment {} never arrived, {} later segments held back (first {})",
                    self.next_expected_id,
                    self.pending.len(),
                    held
                ),
            }),
        }
    }
}

/// Collects the whole prime list in memory using `segments` sub-scans.
pub fn collect_primes(buffer: &SievedBuffer, segments: usize) -> Result<Vec<usize>> {
    let (tx, rx) = mpsc::channel();
    scan_segments(buffer, segments, tx)?;

    let mut reorder = SegmentReorder::new();
    let mut primes = Vec::new();
    for segment in rx {
        for ready in reorder.push(segment) {
            primes.extend(ready.primes);
        }
    }
    reorder.finish()?;

    Ok(primes)
}
