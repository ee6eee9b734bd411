#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // Test support code only.

//! Private helpers for tests and benchmarks of the codec buffer packages.

use std::env;
use std::panic;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Boundary values that cross every 7-bit group of a 32-bit varint, in both directions.
pub const VAR_I32_BOUNDARIES: [i32; 12] = [
    0,
    10,
    127,
    128,
    255,
    16_383,
    16_384,
    2_097_151,
    2_097_152,
    i32::MAX,
    i32::MIN,
    -1,
];

/// Boundary values for 64-bit varints and fixed-width integers.
pub const VAR_I64_BOUNDARIES: [i64; 10] = [
    0,
    127,
    128,
    16_384,
    0x7F_FFFF_FFFF,
    0x80_0000_0000,
    i64::MAX,
    i64::MIN,
    -1,
    -128,
];

/// Runs `test_fn` on a separate thread and fails the test if it does not finish in time.
///
/// Anything that may block forever on a broken implementation (pool acquisition, cleaner
/// shutdown) should run inside this, so a bug fails one test instead of hanging the run.
///
/// The limit is 10 seconds, or 60 seconds under Miri. With `MUTATION_TESTING=1` in the
/// environment the watchdog steps aside so that hanging mutants are detected as timeouts.
///
/// # Panics
///
/// Panics if the time limit elapses. A panic inside `test_fn` is resumed on the caller.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let limit = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    let (result_tx, result_rx) = mpsc::channel();

    let worker = thread::spawn(move || {
        // Fails only if the watchdog already gave up.
        drop(result_tx.send(test_fn()));
    });

    match result_rx.recv_timeout(limit) {
        Ok(result) => {
            worker.join().expect("test thread already delivered its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test did not finish within {limit:?}, probably hung");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match worker.join() {
            Ok(()) => panic!("test thread exited without a result"),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

/// Returns `len` bytes of a deterministic pattern that does not repeat on any power-of-two
/// period, so misplaced page or chunk boundaries show up as content mismatches.
#[must_use]
pub fn patterned_bytes(len: usize, seed: u8) -> Vec<u8> {
    // Xorshift32, seeded so that the state is never zero.
    let mut state = u32::from(seed) | 0x9E37_0000;

    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [high, ..] = state.to_be_bytes();
            high
        })
        .collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn watchdog_passes_result_through() {
        assert_eq!(with_watchdog(|| "done"), "done");
    }

    #[test]
    #[should_panic(expected = "inner failure")]
    fn watchdog_resumes_panic() {
        with_watchdog(|| panic!("inner failure"));
    }

    #[test]
    fn pattern_is_deterministic_per_seed() {
        assert_eq!(patterned_bytes(64, 1), patterned_bytes(64, 1));
        assert_ne!(patterned_bytes(64, 1), patterned_bytes(64, 2));
        assert_eq!(patterned_bytes(0, 1), Vec::<u8>::new());
    }

    #[test]
    fn pattern_does_not_repeat_on_small_periods() {
        let bytes = patterned_bytes(4096, 3);

        for period in [8_usize, 16, 32, 64, 128, 256, 512, 1024] {
            assert_ne!(bytes[..period], bytes[period..period * 2], "period {period}");
        }
    }
}
