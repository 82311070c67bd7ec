//! Median-time source (C4, `spec.md` §4.3).
//!
//! Tracks signed clock offsets reported by peers and exposes an
//! adjusted "now" used in place of the raw system clock for consensus
//! time comparisons. This crate never talks to peers itself; the
//! offsets arrive through [`SystemTimeSource::add_sample`] from
//! whatever network collaborator is wired in above it.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::collaborators::TimeSource;

const MAX_SAMPLES: usize = 200;
const MIN_SAMPLES_FOR_ADJUSTMENT: usize = 5;
const MAX_ALLOWED_OFFSET_MINUTES: i64 = 70;

struct State {
    offsets: Vec<i64>,
    warned: bool,
}

/// A bounded ring of peer-reported clock offsets (in seconds), backing
/// `adjusted_now()` — the default [`TimeSource`] implementation.
pub struct SystemTimeSource {
    state: Mutex<State>,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        SystemTimeSource {
            state: Mutex::new(State {
                offsets: Vec::with_capacity(MAX_SAMPLES),
                warned: false,
            }),
        }
    }

    /// Records a peer-reported offset (seconds, signed) from our own
    /// clock. Oldest sample is evicted once the ring is full.
    pub fn add_sample(&self, offset_seconds: i64) {
        let mut state = self.state.lock();
        if state.offsets.len() == MAX_SAMPLES {
            state.offsets.remove(0);
        }
        state.offsets.push(offset_seconds);
    }

    fn median_offset(&self) -> Option<i64> {
        let state = self.state.lock();
        if state.offsets.len() < MIN_SAMPLES_FOR_ADJUSTMENT {
            return None;
        }
        let mut sorted = state.offsets.clone();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2
        } else {
            sorted[mid]
        };
        Some(median)
    }
}

impl TimeSource for SystemTimeSource {
    /// `system_now + median(offsets)`, falling back to `system_now`
    /// when fewer than 5 samples are present, or when the median offset
    /// exceeds 70 minutes in magnitude (in which case a one-shot warning
    /// is logged and the raw clock is trusted instead).
    fn adjusted_now(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let Some(median) = self.median_offset() else {
            return now;
        };
        if median.abs() > MAX_ALLOWED_OFFSET_MINUTES * 60 {
            let mut state = self.state.lock();
            if !state.warned {
                log::warn!(
                    "peer clock offset median of {median}s exceeds {MAX_ALLOWED_OFFSET_MINUTES}m; \
                     ignoring and trusting the local clock"
                );
                state.warned = true;
            }
            return now;
        }
        now + Duration::seconds(median)
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}
