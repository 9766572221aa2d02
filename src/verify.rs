use rug::Integer;

use crate::error::{Result, SieveError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyReport {
    pub count: usize,
    pub largest: Option<usize>,
}

/// Checks that `primes` is exactly the sequence of consecutive primes
/// starting at 2. With a `limit` it must also stop at the last prime not
/// exceeding it.
///
/// Walking `next_prime` from 2 rejects composites, duplicates, gaps and
/// out-of-order entries in one pass.
pub fn verify_primes(primes: &[usize], limit: Option<usize>) -> Result<VerifyReport> {
    let mut expected = Integer::from(2u32);

    for (index, &found) in primes.iter().enumerate() {
        if let Some(limit) = limit {
            if found > limit {
                return Err(SieveError::VerificationFailed {
                    index,
                    found: found.to_string(),
                    expected: format!("no entry above {}", limit),
                });
            }
        }
        if expected.to_usize() != Some(found) {
            return Err(SieveError::VerificationFailed {
                index,
                found: found.to_string(),
                expected: expected.to_string(),
            });
        }
        expected.next_prime_mut();
    }

    if let Some(limit) = limit {
        if expected <= Integer::from(limit) {
            return Err(SieveError::VerificationFailed {
                index: primes.len(),
                found: "end of list".to_string(),
                expected: expected.to_string(),
            });
        }
    }

    Ok(VerifyReport {
        count: primes.len(),
        largest: primes.last().copied(),
    })
}
