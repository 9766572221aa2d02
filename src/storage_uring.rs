// io_uring-based async I/O for the concurrent artifact

use io_uring::{IoUring, opcode, types};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::mpsc::Receiver;

use log::{debug, warn};

use crate::collect::{SegmentPrimes, SegmentReorder};
use crate::error::{Result, SieveError};
use crate::storage::{create_artifact, discard_partial_artifact, format_primes};

const QUEUE_DEPTH: u32 = 256;
const MAX_IN_FLIGHT: usize = 200; // Backpressure threshold
const BATCH_SIZE: usize = 64; // Submit every N segments

/// Batch writer using io_uring for async I/O
struct UringBatchWriter {
    ring: IoUring,
    file: File, // Keep file alive to prevent FD from being closed
    // Completions may arrive out of order, so buffers are keyed by user_data
    pending_buffers: HashMap<u64, Vec<u8>>,
    offset: u64,
    submitted: usize,
    completed: usize,
}

impl UringBatchWriter {
    fn new(file: File, queue_depth: u32) -> io::Result<Self> {
        Ok(Self {
            ring: IoUring::new(queue_depth)?,
            file,
            pending_buffers: HashMap::new(),
            offset: 0,
            submitted: 0,
            completed: 0,
        })
    }

    /// Queue a write at the current end of file (non-blocking)
    fn submit_write(&mut self, data: Vec<u8>) -> io::Result<()> {
        let len = u32::try_from(data.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "write batch too large"))?;

        let id = self.submitted as u64;
        let write_op = opcode::Write::new(types::Fd(self.file.as_raw_fd()), data.as_ptr(), len)
            .offset(self.offset)
            .build()
            .user_data(id);

        // The buffer is parked in pending_buffers until its completion arrives.
        unsafe {
            self.ring
                .submission()
                .push(&write_op)
                .map_err(|_| io::Error::other("submission queue full"))?;
        }

        self.pending_buffers.insert(id, data);
        self.offset += u64::from(len);
        self.submitted += 1;

        Ok(())
    }

    fn submit_batch(&mut self) -> io::Result<()> {
        self.ring.submit()?;
        Ok(())
    }

    fn record_completion(&mut self, id: u64, result: i32) -> io::Result<()> {
        // The kernel is done with the buffer whatever the outcome.
        let expected = self
            .pending_buffers
            .remove(&id)
            .map_or(0, |buffer| buffer.len());
        self.completed += 1;

        if result < 0 {
            return Err(io::Error::from_raw_os_error(-result));
        }
        // Regular files only short-write on real trouble (e.g. ENOSPC midway).
        if result as usize != expected {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "short io_uring write"));
        }
        Ok(())
    }

    /// Poll for completions (non-blocking)
    fn poll_completions(&mut self) -> io::Result<usize> {
        let mut completed_count = 0;

        loop {
            let Some(cqe) = self.ring.completion().next() else {
                break;
            };
            self.record_completion(cqe.user_data(), cqe.result())?;
            completed_count += 1;
        }

        Ok(completed_count)
    }

    /// Wait for a specific number of completions
    fn wait_completions(&mut self, count: usize) -> io::Result<()> {
        for _ in 0..count {
            self.ring.submit_and_wait(1)?;
            let cqe = self
                .ring
                .completion()
                .next()
                .ok_or_else(|| io::Error::other("no completion"))?;

            self.record_completion(cqe.user_data(), cqe.result())?;
        }
        Ok(())
    }

    fn in_flight(&self) -> usize {
        self.submitted - self.completed
    }

    fn drain(&mut self) -> io::Result<()> {
        self.submit_batch()?;
        let remaining = self.in_flight();
        if remaining > 0 {
            self.wait_completions(remaining)?;
        }
        Ok(())
    }
}

impl Drop for UringBatchWriter {
    /// Blocks until the kernel has finished with every submitted buffer, so
    /// early returns cannot free memory a write is still reading.
    fn drop(&mut self) {
        while self.in_flight() > 0 {
            match self.ring.submit_and_wait(1) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(
                        "Leaking {} io_uring buffers, cannot wait for completions: {}",
                        self.pending_buffers.len(),
                        e
                    );
                    std::mem::forget(std::mem::take(&mut self.pending_buffers));
                    return;
                }
            }
            loop {
                let Some(cqe) = self.ring.completion().next() else {
                    break;
                };
                // Errors were already reported to the caller or no longer matter.
                let _ = self.record_completion(cqe.user_data(), cqe.result());
            }
        }
    }
}

/// Same contract as [`crate::storage::save_primes_streaming_segments`],
/// with segment writes submitted through io_uring.
pub fn save_primes_streaming_segments_uring(
    rx: Receiver<SegmentPrimes>,
    path: &Path,
) -> Result<usize> {
    let file = create_artifact(path)?;
    let result = write_ordered_segments(rx, file, path);
    if result.is_err() {
        discard_partial_artifact(path);
    }
    result
}

fn write_ordered_segments(rx: Receiver<SegmentPrimes>, file: File, path: &Path) -> Result<usize> {
    let mut writer =
        UringBatchWriter::new(file, QUEUE_DEPTH).map_err(|e| SieveError::write_failure(path, e))?;

    let mut reorder = SegmentReorder::new();
    let mut count = 0;
    let mut batch_count = 0;
    let mut peak_in_flight = 0;

    let mut write_segment =
        |writer: &mut UringBatchWriter, segment: &SegmentPrimes| -> io::Result<()> {
            let mut buffer = Vec::with_capacity(segment.primes.len() * 11);
            format_primes(&segment.primes, &mut buffer);
            if buffer.is_empty() {
                return Ok(());
            }

            writer.submit_write(buffer)?;
            batch_count += 1;

            if batch_count >= BATCH_SIZE {
                writer.submit_batch()?;
                batch_count = 0;
            }

            // Backpressure: if too many in-flight, wait for some to complete
            if writer.in_flight() > MAX_IN_FLIGHT {
                writer.wait_completions(100)?;
            }

            writer.poll_completions()?;
            peak_in_flight = peak_in_flight.max(writer.in_flight());
            Ok(())
        };

    for segment in rx {
        for ready in reorder.push(segment) {
            write_segment(&mut writer, &ready).map_err(|e| SieveError::write_failure(path, e))?;
            count += ready.primes.len();
        }
    }

    writer.drain().map_err(|e| SieveError::write_failure(path, e))?;
    reorder.finish()?;

    debug!(
        "Wrote {} primes to {} via io_uring, peak in-flight {} ops",
        count,
        path.display(),
        peak_in_flight
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::TempDir;

    // Kernels without io_uring (or sandboxes that block it) fail at setup.
    fn uring_available() -> bool {
        match IoUring::new(8) {
            Ok(_) => true,
            Err(e) => {
                eprintln!("skipping: io_uring unavailable: {}", e);
                false
            }
        }
    }

    #[test]
    fn test_uring_writer_matches_buffered_output() {
        if !uring_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("primesc.txt");
        let (tx, rx) = mpsc::channel();

        for (segment_id, primes) in [(1, vec![7, 11, 13]), (0, vec![2, 3, 5]), (2, vec![17])] {
            tx.send(SegmentPrimes { primes, segment_id }).unwrap();
        }
        drop(tx);

        let count = save_primes_streaming_segments_uring(rx, &path).unwrap();
        assert_eq!(count, 7);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "2\n3\n5\n7\n11\n13\n17\n"
        );
    }

    #[test]
    fn test_uring_writer_handles_many_segments() {
        if !uring_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("primesc.txt");
        let (tx, rx) = mpsc::channel();

        let expected: Vec<usize> = crate::primes::find_primes_reference(200_000).unwrap();
        let chunks: Vec<&[usize]> = expected.chunks(37).collect();
        for (segment_id, chunk) in chunks.iter().enumerate().rev() {
            tx.send(SegmentPrimes {
                primes: chunk.to_vec(),
                segment_id,
            })
            .unwrap();
        }
        drop(tx);

        let count = save_primes_streaming_segments_uring(rx, &path).unwrap();
        assert_eq!(count, expected.len());
        assert_eq!(crate::storage::load_all_primes(&path).unwrap(), expected);
    }

    #[test]
    fn test_dropped_writer_completes_in_flight_writes() {
        if !uring_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("primesc.txt");
        let file = create_artifact(&path).unwrap();

        let mut writer = UringBatchWriter::new(file, QUEUE_DEPTH).unwrap();
        let mut expected = Vec::new();
        for chunk in crate::primes::find_primes_reference(50_000).unwrap().chunks(50) {
            let mut buffer = Vec::new();
            format_primes(chunk, &mut buffer);
            expected.extend_from_slice(&buffer);
            writer.submit_write(buffer).unwrap();
        }
        writer.submit_batch().unwrap();
        drop(writer);

        assert_eq!(std::fs::read(&path).unwrap(), expected);
    }

    #[test]
    fn test_uring_writer_removes_artifact_after_gap() {
        if !uring_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("primesc.txt");
        let (tx, rx) = mpsc::channel();

        // Segment 0 is in flight when the writer learns segment 1 is gone.
        tx.send(SegmentPrimes {
            primes: vec![2, 3, 5],
            segment_id: 0,
        })
        .unwrap();
        tx.send(SegmentPrimes {
            primes: vec![11, 13],
            segment_id: 2,
        })
        .unwrap();
        drop(tx);

        assert!(matches!(
            save_primes_streaming_segments_uring(rx, &path),
            Err(SieveError::WorkerFailed { worker: 1, .. })
        ));
        assert!(!path.exists());
    }
}
