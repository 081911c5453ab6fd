use serde::{Deserialize, Serialize};

/// Running tally of mutant outcomes for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationScore {
    pub killed: usize,
    pub timeout: usize,
    pub incompetent: usize,
    pub survived: usize,
    pub covered_nodes: usize,
    pub all_nodes: usize,
}

impl MutationScore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_killed(&mut self) {
        self.killed += 1;
    }

    pub fn inc_timeout(&mut self) {
        self.timeout += 1;
    }

    pub fn inc_incompetent(&mut self) {
        self.incompetent += 1;
    }

    pub fn inc_survived(&mut self) {
        self.survived += 1;
    }

    pub fn update_coverage(&mut self, covered_nodes: usize, all_nodes: usize) {
        self.covered_nodes += covered_nodes;
        self.all_nodes += all_nodes;
    }

    pub fn all_mutants(&self) -> usize {
        self.killed + self.timeout + self.incompetent + self.survived
    }

    /// Percentage of competent mutants that were killed or timed out.
    pub fn count(&self) -> f64 {
        let bottom = self.all_mutants() - self.incompetent;
        if bottom == 0 {
            return 0.0;
        }
        (self.killed + self.timeout) as f64 / bottom as f64 * 100.0
    }

    pub fn coverage_pct(&self) -> Option<f64> {
        (self.all_nodes > 0).then(|| self.covered_nodes as f64 / self.all_nodes as f64 * 100.0)
    }
}
