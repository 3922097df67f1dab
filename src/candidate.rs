use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Weight of the counters that represent a fully decoded frame at some
/// pipeline stage; partial progress (syncs, symbols, first-stage frames)
/// counts with weight 1.
pub const FRAME_WEIGHT: u64 = 1000;

/// The six per-stage success counters reported by the decode collaborator
/// for one (candidate, testcase) evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounters {
    /// EFM to F3: valid sync patterns
    pub valid_syncs: u64,
    /// EFM to F3: valid EFM symbols
    pub valid_symbols: u64,
    /// EFM to F3: valid frames
    pub valid_frames: u64,
    /// F3 to F2: frames entering the stage
    pub input_frames: u64,
    /// F3 to F2: frames leaving the stage
    pub output_frames: u64,
    /// F2 to F1: valid output frames
    pub valid_outputs: u64,
}

impl StageCounters {
    /// Weighted sum of all six counters.
    pub fn weighted(&self) -> u64 {
        self.valid_syncs
            + self.valid_symbols
            + self.valid_frames
            + FRAME_WEIGHT * (self.input_frames + self.output_frames + self.valid_outputs)
    }
}

/// One point in parameter space together with its evaluation bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Full parameter mapping (tunable and fixed parameters alike)
    pub values: BTreeMap<String, f64>,
    /// Generation in which this candidate was created
    pub generation: usize,
    /// Population slot this candidate competes for; None for unconditioned
    /// members (initial fill, leaderboard reload)
    pub target: Option<usize>,
    /// Per-testcase stage counters, filled once evaluation completes
    pub results: HashMap<String, StageCounters>,
    /// Total score; None until every testcase result is in
    pub score: Option<u64>,
}

impl Candidate {
    pub fn new(values: BTreeMap<String, f64>, generation: usize, target: Option<usize>) -> Self {
        Candidate {
            values,
            generation,
            target,
            results: HashMap::new(),
            score: None,
        }
    }

    /// Sum of the weighted counters over all collected testcase results.
    pub fn total_score(&self) -> u64 {
        self.results.values().map(|c| c.weighted()).sum()
    }

    /// Fixes the score once the result set is complete.
    pub fn finalize(&mut self) {
        self.score = Some(self.total_score());
    }
}
