use std::collections::VecDeque;

/// Number of outcomes kept
pub const HISTORY_LEN: usize = 100;

/// Rolling record of reconciliation outcomes
#[derive(Debug, Clone, Default)]
pub struct SuccessHistory {
    outcomes: VecDeque<bool>,
}

impl SuccessHistory {
    pub fn new() -> Self {
        SuccessHistory {
            outcomes: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    pub fn record(&mut self, success: bool) {
        if self.outcomes.len() == HISTORY_LEN {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Whole percentage of successful outcomes, 0 when nothing is recorded
    pub fn success_rate(&self) -> u8 {
        if self.outcomes.is_empty() {
            return 0;
        }
        let successes = self.outcomes.iter().filter(|s| **s).count();
        (100 * successes / self.outcomes.len()) as u8
    }
}
