use crate::buffer::CompositeBuffer;
use crate::partition::SeedRange;

/// Eliminates multiples of the seeds in one range.
///
/// The worker reads and writes the whole buffer, not just its seed range.
/// Another worker may flag a seed between our check and our marking loop,
/// in which case we re-mark numbers that are already composite. That costs
/// time, never correctness.
pub struct SieveWorker<'a> {
    pub id: usize,
    range: SeedRange,
    buffer: &'a CompositeBuffer,
}

impl<'a> SieveWorker<'a> {
    pub fn new(id: usize, range: SeedRange, buffer: &'a CompositeBuffer) -> Self {
        Self { id, range, buffer }
    }

    pub fn run(&self) {
        let limit = self.buffer.limit();

        for seed in self.range.seeds() {
            if self.buffer.is_composite(seed) {
                continue;
            }

            // Seeds past sqrt(limit) have nothing left to strike.
            let Some(mut multiple) = seed.checked_mul(seed) else {
                break;
            };
            while multiple <= limit {
                self.buffer.mark_composite(multiple);
                multiple += seed;
            }
        }
    }
}
