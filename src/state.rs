use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use crate::mutants::{MutantResult, Mutation};
use crate::runner::generate_diff;
use crate::score::MutationScore;
use crate::views::{MutantInfo, Observer};

pub const STATE_FILE: &str = ".mutscope-state.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Killed or timed out, as a percentage of competent mutants.
    pub score: f64,
    pub total: usize,
    pub killed: usize,
    pub survived: usize,
    pub timeout: usize,
    pub incompetent: usize,
    pub covered_nodes: usize,
    pub all_nodes: usize,
    pub duration_ms: u64,
    pub survived_mutants: Vec<SurvivedMutant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivedMutant {
    pub ref_id: String,
    pub number: usize,
    pub file: String,
    pub mutations: Vec<Mutation>,
    pub diff: String,
    pub tests_run: usize,
}

impl RunResult {
    pub fn new(score: &MutationScore, duration: Duration, survived_mutants: Vec<SurvivedMutant>) -> Self {
        RunResult {
            score: score.count(),
            total: score.all_mutants(),
            killed: score.killed,
            survived: score.survived,
            timeout: score.timeout,
            incompetent: score.incompetent,
            covered_nodes: score.covered_nodes,
            all_nodes: score.all_nodes,
            duration_ms: duration.as_millis() as u64,
            survived_mutants,
        }
    }
}

pub fn state_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(STATE_FILE)
}

pub fn save_to_path(result: &RunResult, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string(result)?;
    std::fs::write(path, json)
}

pub fn load_from_path(path: &Path) -> Option<RunResult> {
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

pub fn load_last_run() -> Option<RunResult> {
    load_from_path(&state_path())
}

/// Result shared between a [`StateRecorder`] and whoever reports it afterwards.
pub type SharedResult = Rc<RefCell<Option<RunResult>>>;

/// Collects survivors during a run and writes the state file when it ends.
pub struct StateRecorder {
    path: PathBuf,
    current: Option<SurvivedMutant>,
    survivors: Vec<SurvivedMutant>,
    result: SharedResult,
}

impl StateRecorder {
    pub fn new(path: impl Into<PathBuf>) -> (Self, SharedResult) {
        let result = SharedResult::default();
        let recorder = StateRecorder {
            path: path.into(),
            current: None,
            survivors: Vec::new(),
            result: Rc::clone(&result),
        };
        (recorder, result)
    }
}

impl Observer for StateRecorder {
    fn start(&mut self) {
        self.survivors.clear();
    }

    fn mutation(&mut self, info: &MutantInfo<'_>) {
        self.current = Some(SurvivedMutant {
            ref_id: String::new(),
            number: info.number,
            file: info.target.to_string(),
            mutations: info.mutations.to_vec(),
            diff: generate_diff(info.original, info.mutant),
            tests_run: 0,
        });
    }

    fn outcome(&mut self, number: usize, result: &MutantResult) {
        let current = self.current.take().filter(|c| c.number == number);
        if let (MutantResult::Survived { tests_run, .. }, Some(mut survivor)) = (result, current) {
            survivor.ref_id = format!("m{}", self.survivors.len() + 1);
            survivor.tests_run = *tests_run;
            self.survivors.push(survivor);
        }
    }

    fn end(&mut self, score: &MutationScore, duration: Duration) {
        let result = RunResult::new(score, duration, std::mem::take(&mut self.survivors));
        if let Err(e) = save_to_path(&result, &self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "could not save run state");
        }
        *self.result.borrow_mut() = Some(result);
    }
}
