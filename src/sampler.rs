//! Joint-state sampling and frequency accounting for the worker.
//!
//! The "random process" is a deterministic round-robin over the four
//! combinations of a two-valued pair. Two events touch the state: the
//! per-iteration step advances it, and the alarm tick records the bucket
//! for whatever state was current when the timer fired. Both run on the
//! worker's single event loop, so the pair needs no further protection.

use nix::unistd::Pid;

/// One combination of the two-valued pair.
///
/// Bucket and label order is fixed: `00` is both low, `01` is the first
/// value high, `10` the second, `11` both. The cycle steps through them
/// in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointState {
    BothLow,
    FirstHigh,
    SecondHigh,
    BothHigh,
}

impl JointState {
    pub const COUNT: usize = 4;
    pub const LABELS: [&'static str; Self::COUNT] = ["00", "01", "10", "11"];

    const CYCLE: [JointState; Self::COUNT] = [
        JointState::BothLow,
        JointState::FirstHigh,
        JointState::SecondHigh,
        JointState::BothHigh,
    ];

    /// Index of this state's frequency bucket.
    pub fn bucket(self) -> usize {
        match self {
            JointState::BothLow => 0,
            JointState::FirstHigh => 1,
            JointState::SecondHigh => 2,
            JointState::BothHigh => 3,
        }
    }
}

/// Current joint state plus the four monotone frequency counters.
///
/// Lives for the worker process lifetime; counters are read at report
/// time, never reset.
#[derive(Debug)]
pub struct SampleAccumulator {
    state: JointState,
    cycle_position: usize,
    counts: [u64; JointState::COUNT],
}

impl SampleAccumulator {
    pub fn new() -> Self {
        Self {
            state: JointState::BothLow,
            cycle_position: 0,
            counts: [0; JointState::COUNT],
        }
    }

    /// Per-iteration step: set the state from the cycle and move on. The
    /// first call leaves the state at `00`, matching the cycle start.
    pub fn advance(&mut self) {
        self.state = JointState::CYCLE[self.cycle_position];
        self.cycle_position = (self.cycle_position + 1) % JointState::COUNT;
    }

    /// Alarm step: count the state current at the instant the timer fired.
    pub fn record_tick(&mut self) {
        self.counts[self.state.bucket()] += 1;
    }

    pub fn state(&self) -> JointState {
        self.state
    }

    pub fn counts(&self) -> &[u64; JointState::COUNT] {
        &self.counts
    }

    /// Render one report block: parent identity, own identity, then the
    /// four counters in fixed label order.
    pub fn format_report(&self, parent: Pid, own: Pid) -> String {
        let mut out = String::new();
        out.push_str("-------------------------------------------\n");
        out.push_str(&format!("ppid - {:5}    pid  - {:5}\n", parent, own));
        let pairs: Vec<String> = JointState::LABELS
            .iter()
            .zip(self.counts.iter())
            .map(|(label, count)| format!("{}   - {:5}", label, count))
            .collect();
        out.push_str(&pairs.join("; "));
        out
    }
}

impl Default for SampleAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
