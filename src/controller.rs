//! Drives a whole mutation run: baseline, then every mutant of every target.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::bindings::{BindingRegistry, SlotId};
use crate::coverage::{CoverageMap, CoverageProvider};
use crate::error::{LoadError, RunError};
use crate::loader::{ModuleLoader, Target, TargetSpec, TestModule};
use crate::mutants::{Mutant, MutantResult, MutantStatus, NodeMarker};
use crate::mutator::Mutator;
use crate::operators::{self, MutationScope};
use crate::runner::{Isolation, SuiteOutcome, SuiteReport, SuiteRun, mutant_deadline};
use crate::score::MutationScore;
use crate::syntax::Program;
use crate::views::{ModuleBaseline, MutantInfo, Notifier, Observer};

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub timeout_factor: f64,
    /// Upper bound for baseline and coverage runs.
    pub baseline_timeout: Duration,
    /// Run only this mutant ordinal; every other one counts as incompetent.
    pub mutation_number: Option<usize>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            timeout_factor: 5.0,
            baseline_timeout: Duration::from_secs(600),
            mutation_number: None,
        }
    }
}

pub struct MutationController {
    config: ControllerConfig,
    loader: ModuleLoader,
    targets: Vec<TargetSpec>,
    tests: Vec<String>,
    mutator: Box<dyn Mutator>,
    isolation: Box<dyn Isolation>,
    coverage: Option<Box<dyn CoverageProvider>>,
    bindings: Arc<BindingRegistry>,
    notifier: Notifier,
    score: MutationScore,
    interrupt: Arc<AtomicBool>,
}

impl MutationController {
    pub fn new(
        loader: ModuleLoader,
        targets: Vec<TargetSpec>,
        tests: Vec<String>,
        mutator: Box<dyn Mutator>,
        isolation: Box<dyn Isolation>,
    ) -> Self {
        MutationController {
            config: ControllerConfig::default(),
            loader,
            targets,
            tests,
            mutator,
            isolation,
            coverage: None,
            bindings: Arc::new(BindingRegistry::new()),
            notifier: Notifier::new(),
            score: MutationScore::new(),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_coverage(mut self, provider: Box<dyn CoverageProvider>) -> Self {
        self.coverage = Some(provider);
        self
    }

    pub fn with_observer(mut self, view: Box<dyn Observer>) -> Self {
        self.notifier.add(view);
        self
    }

    /// Flag checked between targets and between mutants.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn bindings(&self) -> Arc<BindingRegistry> {
        Arc::clone(&self.bindings)
    }

    pub fn score(&self) -> &MutationScore {
        &self.score
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn run(&mut self) -> Result<MutationScore, RunError> {
        let targets: Vec<String> = self
            .targets
            .iter()
            .map(|t| match &t.function {
                Some(f) => format!("{}::{}", t.path, f),
                None => t.path.clone(),
            })
            .collect();
        self.notifier.initialize(&targets, &self.tests);
        self.score = MutationScore::new();
        let started = Instant::now();

        match self.run_mutation_process() {
            Ok(()) => {
                self.notifier.end(&self.score, started.elapsed());
                Ok(self.score.clone())
            }
            Err(e) => {
                match &e {
                    RunError::TestsFailAtOriginal { module, detail } => self.notifier.original_tests_fail(module, detail),
                    RunError::CannotLoad(err) => self.notifier.cant_load(&err.name, &err.cause),
                    RunError::Inconsistent(err) => tracing::error!(error = %err, "aborting run"),
                }
                Err(e)
            }
        }
    }

    fn run_mutation_process(&mut self) -> Result<(), RunError> {
        let (modules, baseline) = self.load_and_check_tests()?;
        self.notifier.start();

        for spec in self.targets.clone() {
            if self.interrupted() {
                tracing::warn!("interrupted, stopping before {}", spec.path);
                break;
            }
            let target = self.loader.load_target(&spec)?;
            self.mutate_target(&target, &modules, baseline)?;
        }
        Ok(())
    }

    /// Load every test module and check it passes against the original program.
    /// Returns the modules and the summed baseline duration.
    fn load_and_check_tests(&mut self) -> Result<(Vec<TestModule>, Duration), RunError> {
        let mut modules = Vec::with_capacity(self.tests.len());
        let mut baselines = Vec::with_capacity(self.tests.len());

        for spec in &self.tests {
            let module = self.loader.load_tests(spec)?;
            let suite = SuiteRun::from_modules(std::slice::from_ref(&module));
            let failure = |detail: String| RunError::TestsFailAtOriginal {
                module: module.name.clone(),
                detail,
            };
            let duration = match run_suite(self.isolation.as_ref(), &suite, self.config.baseline_timeout) {
                Ok(Some(SuiteReport {
                    outcome: SuiteOutcome::Passed { .. },
                    duration,
                })) => duration,
                Ok(Some(SuiteReport {
                    outcome: SuiteOutcome::Failed { trace, .. },
                    ..
                })) => return Err(failure(trace)),
                Ok(Some(SuiteReport {
                    outcome: SuiteOutcome::Errored { exception, .. },
                    ..
                })) => return Err(failure(exception)),
                Ok(None) => {
                    return Err(failure(format!(
                        "did not finish within {}s",
                        self.config.baseline_timeout.as_secs()
                    )));
                }
                Err(e) => return Err(failure(format!("failed to start tests: {e}"))),
            };
            baselines.push(ModuleBaseline {
                name: module.name.clone(),
                tests: module.tests.len(),
                duration,
            });
            modules.push(module);
        }

        self.notifier.passed(&baselines);
        Ok((modules, baselines.iter().map(|b| b.duration).sum()))
    }

    fn mutate_target(&mut self, target: &Target, modules: &[TestModule], baseline: Duration) -> Result<(), RunError> {
        let program = Program::parse(target.language, target.source.as_str()).map_err(|e| LoadError::new(&target.name, e))?;
        let slot = self.bindings.register(&target.path, &target.source);
        let _restore = self.bindings.restore_on_drop(slot);

        let coverage = match &self.coverage {
            Some(provider) => {
                let nodes = operators::mutable_nodes(self.mutator.operators(), &program, target.function.as_deref());
                let run = CoverageRun {
                    isolation: self.isolation.as_ref(),
                    bindings: &self.bindings,
                    slot,
                    timeout: self.config.baseline_timeout,
                };
                let map = run.collect(provider.as_ref(), target, &program, modules, &nodes)?;
                self.score.update_coverage(map.covered_nodes, map.all_nodes);
                Some(map)
            }
            None => None,
        };

        let scope = MutationScope {
            function: target.function.clone(),
            covered: coverage.as_ref().map(CoverageMap::covered),
        };
        let deadline = mutant_deadline(self.config.timeout_factor, baseline);
        let suite = SuiteRun::from_modules(modules);
        tracing::info!(target = %target.name, deadline_ms = deadline.as_millis() as u64, "mutating");

        for item in self.mutator.mutate(&program, &scope) {
            if self.interrupt.load(Ordering::SeqCst) {
                tracing::warn!(target = %target.name, "interrupted");
                break;
            }
            let mutant = item?;
            let number = self.score.all_mutants() + 1;
            if self.config.mutation_number.is_some_and(|k| k != number) {
                self.score.inc_incompetent();
                continue;
            }

            self.notifier.mutation(&MutantInfo {
                number,
                target: &target.name,
                mutations: &mutant.mutations,
                original: program.text(),
                mutant: mutant.program.text(),
            });
            let execution = Execution {
                isolation: self.isolation.as_ref(),
                bindings: &self.bindings,
                slot,
                deadline,
            };
            let result = execution.run(number, &mutant, &suite, coverage.as_ref());
            record(&mut self.score, &result);
            self.notifier.outcome(number, &result);
        }
        Ok(())
    }
}

fn run_suite(isolation: &dyn Isolation, suite: &SuiteRun, deadline: Duration) -> std::io::Result<Option<SuiteReport>> {
    let mut handle = isolation.start(suite)?;
    let report = handle.get_result(deadline);
    handle.terminate();
    Ok(report)
}

fn record(score: &mut MutationScore, result: &MutantResult) {
    match result.status() {
        MutantStatus::Killed => score.inc_killed(),
        MutantStatus::Survived => score.inc_survived(),
        MutantStatus::Timeout => score.inc_timeout(),
        MutantStatus::Incompetent => score.inc_incompetent(),
    }
}

fn classify(report: Option<SuiteReport>) -> MutantResult {
    let Some(SuiteReport { outcome, duration }) = report else {
        return MutantResult::Timeout;
    };
    match outcome {
        SuiteOutcome::Passed { tests_run } => MutantResult::Survived { duration, tests_run },
        SuiteOutcome::Failed {
            killer,
            trace,
            tests_run,
        } => MutantResult::Killed {
            duration,
            killer,
            trace,
            tests_run,
        },
        SuiteOutcome::Errored { exception, tests_run } => MutantResult::Incompetent {
            detail: exception,
            tests_run,
        },
    }
}

/// One mutant's trip through the isolation boundary.
struct Execution<'c> {
    isolation: &'c dyn Isolation,
    bindings: &'c BindingRegistry,
    slot: SlotId,
    deadline: Duration,
}

impl Execution<'_> {
    fn run(&self, number: usize, mutant: &Mutant, suite: &SuiteRun, coverage: Option<&CoverageMap>) -> MutantResult {
        let executable = match mutant.program.construct() {
            Ok(executable) => executable,
            Err(e) => {
                return MutantResult::Incompetent {
                    detail: e.to_string(),
                    tests_run: None,
                };
            }
        };

        let mut suite = suite.clone();
        if let Some(map) = coverage {
            let markers: BTreeSet<NodeMarker> = mutant.markers().collect();
            suite.skip_uncovered(map, &markers);
            if suite.runnable() == 0 {
                tracing::debug!(number, "no test reaches the mutated nodes");
                return MutantResult::Survived {
                    duration: Duration::ZERO,
                    tests_run: 0,
                };
            }
        }

        let _binding = match self.bindings.bind(self.slot, &executable.text, number) {
            Ok(binding) => binding,
            Err(e) => {
                return MutantResult::Incompetent {
                    detail: format!("cannot bind mutant: {e}"),
                    tests_run: None,
                };
            }
        };
        match run_suite(self.isolation, &suite, self.deadline) {
            Ok(report) => classify(report),
            Err(e) => MutantResult::Incompetent {
                detail: format!("cannot start tests: {e}"),
                tests_run: None,
            },
        }
    }
}

/// The single suite run against the instrumented program of one target.
struct CoverageRun<'c> {
    isolation: &'c dyn Isolation,
    bindings: &'c BindingRegistry,
    slot: SlotId,
    timeout: Duration,
}

impl CoverageRun<'_> {
    fn collect(
        &self,
        provider: &dyn CoverageProvider,
        target: &Target,
        program: &Program,
        modules: &[TestModule],
        nodes: &BTreeSet<NodeMarker>,
    ) -> Result<CoverageMap, RunError> {
        provider.reset().map_err(|e| LoadError::new(&target.name, e))?;
        let instrumented = provider.instrument(program);
        let ran = {
            let _binding = self
                .bindings
                .bind(self.slot, instrumented.text(), 0)
                .map_err(|e| LoadError::new(&target.name, e))?;
            let suite = SuiteRun::from_modules(modules);
            run_suite(self.isolation, &suite, self.timeout)
        };
        self.bindings
            .restore(self.slot)
            .map_err(|e| LoadError::new(&target.name, e))?;

        // A report from a failed run would prune tests on partial data.
        let failure = match ran {
            Ok(Some(SuiteReport {
                outcome: SuiteOutcome::Passed { .. },
                ..
            })) => None,
            Ok(Some(SuiteReport {
                outcome: SuiteOutcome::Failed { killer, .. },
                ..
            })) => Some(format!(
                "coverage run failed at {}",
                killer.as_deref().unwrap_or("an unknown test")
            )),
            Ok(Some(SuiteReport {
                outcome: SuiteOutcome::Errored { exception, .. },
                ..
            })) => Some(format!("coverage run errored: {exception}")),
            Ok(None) => Some(format!("coverage run timed out after {:?}", self.timeout)),
            Err(e) => Some(format!("coverage run failed to start: {e}")),
        };
        if let Some(cause) = failure {
            tracing::warn!(target = %target.name, %cause, "coverage unavailable");
            return Err(LoadError::new(&target.name, cause).into());
        }

        let map = provider
            .collect(&target.name, program, nodes)
            .map_err(|e| LoadError::new(&target.name, e))?;
        tracing::info!(
            target = %target.name,
            covered = map.covered_nodes,
            all = map.all_nodes,
            "coverage collected"
        );
        Ok(map)
    }
}
