//! Progress notifications. Every callback has a no-op default so a view only
//! implements what it shows.

use std::time::Duration;

use crate::mutants::{MutantResult, Mutation};
use crate::score::MutationScore;

/// A baseline run of one test module.
#[derive(Debug, Clone)]
pub struct ModuleBaseline {
    pub name: String,
    pub tests: usize,
    pub duration: Duration,
}

/// What a mutant changed, for views that show it before it runs.
pub struct MutantInfo<'a> {
    pub number: usize,
    pub target: &'a str,
    pub mutations: &'a [Mutation],
    pub original: &'a str,
    pub mutant: &'a str,
}

pub trait Observer {
    fn initialize(&mut self, _targets: &[String], _tests: &[String]) {}
    fn passed(&mut self, _modules: &[ModuleBaseline]) {}
    fn start(&mut self) {}
    fn mutation(&mut self, _info: &MutantInfo<'_>) {}

    /// Dispatches to the per-status callbacks below.
    fn outcome(&mut self, number: usize, result: &MutantResult) {
        match result {
            MutantResult::Killed {
                duration,
                killer,
                trace,
                tests_run,
            } => self.killed(number, killer.as_deref(), trace, *duration, *tests_run),
            MutantResult::Survived { duration, tests_run } => self.survived(number, *duration, *tests_run),
            MutantResult::Timeout => self.timeout(number),
            MutantResult::Incompetent { detail, tests_run } => self.incompetent(number, detail, *tests_run),
        }
    }

    fn killed(&mut self, _number: usize, _killer: Option<&str>, _trace: &str, _duration: Duration, _tests_run: usize) {}
    fn survived(&mut self, _number: usize, _duration: Duration, _tests_run: usize) {}
    fn timeout(&mut self, _number: usize) {}
    fn incompetent(&mut self, _number: usize, _detail: &str, _tests_run: Option<usize>) {}
    fn original_tests_fail(&mut self, _module: &str, _detail: &str) {}
    fn cant_load(&mut self, _name: &str, _cause: &str) {}
    fn end(&mut self, _score: &MutationScore, _duration: Duration) {}
}

/// Fans every notification out to the registered views, in order.
#[derive(Default)]
pub struct Notifier {
    views: Vec<Box<dyn Observer>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, view: Box<dyn Observer>) {
        self.views.push(view);
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

impl Observer for Notifier {
    fn initialize(&mut self, targets: &[String], tests: &[String]) {
        self.views.iter_mut().for_each(|v| v.initialize(targets, tests));
    }

    fn passed(&mut self, modules: &[ModuleBaseline]) {
        self.views.iter_mut().for_each(|v| v.passed(modules));
    }

    fn start(&mut self) {
        self.views.iter_mut().for_each(|v| v.start());
    }

    fn mutation(&mut self, info: &MutantInfo<'_>) {
        self.views.iter_mut().for_each(|v| v.mutation(info));
    }

    fn outcome(&mut self, number: usize, result: &MutantResult) {
        self.views.iter_mut().for_each(|v| v.outcome(number, result));
    }

    fn original_tests_fail(&mut self, module: &str, detail: &str) {
        self.views.iter_mut().for_each(|v| v.original_tests_fail(module, detail));
    }

    fn cant_load(&mut self, name: &str, cause: &str) {
        self.views.iter_mut().for_each(|v| v.cant_load(name, cause));
    }

    fn end(&mut self, score: &MutationScore, duration: Duration) {
        self.views.iter_mut().for_each(|v| v.end(score, duration));
    }
}

/// Structured log events for every notification.
pub struct LogView;

impl Observer for LogView {
    fn initialize(&mut self, targets: &[String], tests: &[String]) {
        tracing::info!(targets = ?targets, tests = ?tests, "mutation run starting");
    }

    fn passed(&mut self, modules: &[ModuleBaseline]) {
        for m in modules {
            tracing::info!(module = %m.name, tests = m.tests, duration_ms = m.duration.as_millis() as u64, "baseline passed");
        }
    }

    fn mutation(&mut self, info: &MutantInfo<'_>) {
        for m in info.mutations {
            tracing::debug!(number = info.number, target = info.target, mutation = %m.describe(), "mutant");
        }
    }

    fn killed(&mut self, number: usize, killer: Option<&str>, _trace: &str, duration: Duration, tests_run: usize) {
        tracing::debug!(number, killer, tests_run, duration_ms = duration.as_millis() as u64, "killed");
    }

    fn survived(&mut self, number: usize, duration: Duration, tests_run: usize) {
        tracing::info!(number, tests_run, duration_ms = duration.as_millis() as u64, "survived");
    }

    fn timeout(&mut self, number: usize) {
        tracing::debug!(number, "timeout");
    }

    fn incompetent(&mut self, number: usize, detail: &str, _tests_run: Option<usize>) {
        tracing::debug!(number, detail, "incompetent");
    }

    fn original_tests_fail(&mut self, module: &str, detail: &str) {
        tracing::error!(module, detail, "tests fail before mutation");
    }

    fn cant_load(&mut self, name: &str, cause: &str) {
        tracing::error!(name, cause, "cannot load");
    }

    fn end(&mut self, score: &MutationScore, duration: Duration) {
        tracing::info!(
            score = score.count(),
            mutants = score.all_mutants(),
            killed = score.killed,
            survived = score.survived,
            timeout = score.timeout,
            incompetent = score.incompetent,
            duration_ms = duration.as_millis() as u64,
            "mutation run finished"
        );
    }
}
