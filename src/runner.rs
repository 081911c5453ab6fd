//! Running test suites in child processes.
//!
//! The controller never executes tests itself. It hands a [`SuiteRun`] to an
//! [`Isolation`], waits on the returned handle with a deadline and always
//! terminates the handle afterwards.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::Language;
use crate::coverage::CoverageMap;
use crate::loader::TestModule;
use crate::mutants::NodeMarker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRun {
    pub id: String,
    pub name: String,
    pub skipped: bool,
}

#[derive(Debug, Clone)]
pub struct ModuleRun {
    pub name: String,
    pub path: PathBuf,
    pub language: Option<Language>,
    pub tests: Vec<TestRun>,
}

impl ModuleRun {
    pub fn is_pruned(&self) -> bool {
        self.tests.iter().any(|t| t.skipped)
    }

    pub fn runnable(&self) -> impl Iterator<Item = &TestRun> {
        self.tests.iter().filter(|t| !t.skipped)
    }
}

/// The tests one execution should run.
#[derive(Debug, Clone, Default)]
pub struct SuiteRun {
    pub modules: Vec<ModuleRun>,
}

impl SuiteRun {
    pub fn from_modules(modules: &[TestModule]) -> Self {
        let modules = modules
            .iter()
            .map(|m| ModuleRun {
                name: m.name.clone(),
                path: m.path.clone(),
                language: m.language,
                tests: m
                    .tests
                    .iter()
                    .map(|t| TestRun {
                        id: t.id.clone(),
                        name: t.name.clone(),
                        skipped: false,
                    })
                    .collect(),
            })
            .collect();
        SuiteRun { modules }
    }

    /// Skip every test that reached none of `markers`.
    pub fn skip_uncovered(&mut self, coverage: &CoverageMap, markers: &std::collections::BTreeSet<NodeMarker>) {
        for test in self.modules.iter_mut().flat_map(|m| m.tests.iter_mut()) {
            test.skipped = !coverage.test_reaches_any(&test.id, markers);
        }
    }

    pub fn runnable(&self) -> usize {
        self.modules.iter().map(|m| m.runnable().count()).sum()
    }

    pub fn total(&self) -> usize {
        self.modules.iter().map(|m| m.tests.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuiteOutcome {
    Passed {
        tests_run: usize,
    },
    /// A test ran and failed.
    Failed {
        killer: Option<String>,
        trace: String,
        tests_run: usize,
    },
    /// The suite could not run the program at all.
    Errored {
        exception: String,
        tests_run: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteReport {
    pub outcome: SuiteOutcome,
    pub duration: Duration,
}

pub trait Isolation {
    fn start(&self, suite: &SuiteRun) -> std::io::Result<Box<dyn SuiteHandle>>;
}

pub trait SuiteHandle {
    /// `None` when the suite is still running at `deadline`.
    fn get_result(&mut self, deadline: Duration) -> Option<SuiteReport>;

    /// Stop the execution and release its resources. Safe to call more than once.
    fn terminate(&mut self);
}

/// How long a mutant's suite may run before it counts as a timeout.
/// Saturates at `Duration::MAX` for factors too large to represent.
pub fn mutant_deadline(timeout_factor: f64, baseline: Duration) -> Duration {
    let secs = baseline.max(Duration::from_secs(1)).as_secs_f64() * timeout_factor;
    Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 { Duration::MAX } else { Duration::ZERO })
}

pub fn parse_test_cmd(cmd: &str) -> (String, Vec<String>) {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    if parts.len() > 1 {
        (parts[0].to_string(), parts[1..].iter().map(|s| s.to_string()).collect())
    } else {
        (cmd.to_string(), vec![])
    }
}

/// Relative command paths resolve against the invocation directory so they
/// still work from inside the sandbox.
pub fn resolve_cmd(cmd: &str, cwd: &Path) -> String {
    let (program, args) = parse_test_cmd(cmd);
    let p = Path::new(&program);
    if p.is_absolute() || !program.contains('/') {
        return cmd.to_string();
    }
    let from_cwd = cwd.join(p);
    if !from_cwd.exists() {
        return cmd.to_string();
    }
    let mut resolved = from_cwd.to_string_lossy().to_string();
    for arg in args {
        resolved.push(' ');
        resolved.push_str(&arg);
    }
    resolved
}

/// Default arguments appended after the selected tests.
pub fn default_extra_args(language: Option<Language>) -> Vec<String> {
    let args: &[&str] = match language {
        Some(Language::Python) => &["-x", "-q", "--tb=short", "--no-header", "-p", "no:cacheprovider"],
        Some(Language::Rust) => &["--", "--test-threads=1"],
        Some(_) => &["--bail"],
        None => &[],
    };
    args.iter().map(|s| s.to_string()).collect()
}

/// Child stdout and stderr, spooled to anonymous temp files so a chatty suite
/// cannot block on a full pipe.
pub struct CapturedOutput {
    stdout: File,
    stderr: File,
}

impl CapturedOutput {
    pub fn acquire() -> std::io::Result<Self> {
        Ok(CapturedOutput {
            stdout: tempfile::tempfile()?,
            stderr: tempfile::tempfile()?,
        })
    }

    fn stdio(&self) -> std::io::Result<(Stdio, Stdio)> {
        Ok((Stdio::from(self.stdout.try_clone()?), Stdio::from(self.stderr.try_clone()?)))
    }

    /// Everything written so far, stdout first.
    pub fn read(&mut self) -> String {
        let mut out = String::new();
        for file in [&mut self.stdout, &mut self.stderr] {
            let mut buf = Vec::new();
            if file.seek(SeekFrom::Start(0)).is_ok() && file.read_to_end(&mut buf).is_ok() {
                out.push_str(&String::from_utf8_lossy(&buf));
                if !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
            }
        }
        out
    }
}

/// Runs the configured test command as a child process in the sandbox.
pub struct ProcessIsolation {
    test_cmd: String,
    extra_args: Vec<String>,
    working_dir: PathBuf,
}

impl ProcessIsolation {
    pub fn new(test_cmd: impl Into<String>, extra_args: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        ProcessIsolation {
            test_cmd: test_cmd.into(),
            extra_args,
            working_dir: working_dir.into(),
        }
    }

    fn is_cargo(&self) -> bool {
        self.test_cmd.contains("cargo")
    }

    /// Arguments for `suite`: positional ones before the extra args and
    /// filters that go after them.
    pub fn command_args(&self, suite: &SuiteRun) -> Vec<String> {
        let (_, mut args) = parse_test_cmd(&self.test_cmd);
        let mut trailing = Vec::new();

        for module in &suite.modules {
            let pruned = module.is_pruned();
            if self.is_cargo() {
                if pruned {
                    trailing.extend(module.runnable().map(|t| t.name.clone()));
                }
                continue;
            }
            match module.language {
                Some(l) if l.is_js_family() => {
                    args.push(module.path.to_string_lossy().to_string());
                    if pruned {
                        let names: Vec<String> = module.runnable().map(|t| escape_regex(&t.name)).collect();
                        args.push("-t".to_string());
                        args.push(format!("^({})$", names.join("|")));
                    }
                }
                _ if pruned => {
                    let path = module.path.to_string_lossy();
                    args.extend(module.runnable().map(|t| format!("{path}::{}", t.name)));
                }
                _ => args.push(module.path.to_string_lossy().to_string()),
            }
        }

        args.extend(self.extra_args.iter().cloned());
        if !trailing.is_empty() {
            if !self.extra_args.iter().any(|a| a == "--") {
                args.push("--".to_string());
            }
            args.extend(trailing);
        }
        args
    }
}

impl Isolation for ProcessIsolation {
    fn start(&self, suite: &SuiteRun) -> std::io::Result<Box<dyn SuiteHandle>> {
        let (program, _) = parse_test_cmd(&self.test_cmd);
        let output = CapturedOutput::acquire()?;
        let (stdout, stderr) = output.stdio()?;
        let mut command = Command::new(&program);
        command
            .args(self.command_args(suite))
            .current_dir(&self.working_dir)
            .env("OBJC_DISABLE_INITIALIZE_FORK_SAFETY", "YES")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        // Own process group: terminal Ctrl-C skips the suite, and terminate()
        // reaches everything the runner spawned.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let child = command.spawn()?;
        tracing::trace!(pid = child.id(), cmd = %self.test_cmd, "suite started");

        let runnable = suite
            .modules
            .iter()
            .flat_map(|m| m.runnable())
            .map(|t| (t.id.clone(), t.name.clone()))
            .collect();
        Ok(Box::new(ChildHandle {
            child,
            output,
            started: Instant::now(),
            runnable,
            reaped: false,
            terminated: false,
        }))
    }
}

struct ChildHandle {
    child: Child,
    output: CapturedOutput,
    started: Instant,
    /// (id, name) of every test the child was asked to run.
    runnable: Vec<(String, String)>,
    reaped: bool,
    terminated: bool,
}

impl ChildHandle {
    fn report(&mut self, success: bool) -> SuiteReport {
        let duration = self.started.elapsed();
        let tests_run = self.runnable.len();
        let text = self.output.read();
        let outcome = if success {
            SuiteOutcome::Passed { tests_run }
        } else if let Some(line) = incompetence_line(&text) {
            SuiteOutcome::Errored {
                exception: line.to_string(),
                tests_run: None,
            }
        } else {
            SuiteOutcome::Failed {
                killer: find_killer(&text, &self.runnable),
                trace: tail(&text, 20),
                tests_run,
            }
        };
        SuiteReport { outcome, duration }
    }
}

impl SuiteHandle for ChildHandle {
    fn get_result(&mut self, deadline: Duration) -> Option<SuiteReport> {
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.reaped = true;
                    return Some(self.report(status.success()));
                }
                Ok(None) => {
                    if self.started.elapsed() > deadline {
                        return None;
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    return Some(SuiteReport {
                        outcome: SuiteOutcome::Errored {
                            exception: format!("lost track of test process: {e}"),
                            tests_run: None,
                        },
                        duration: self.started.elapsed(),
                    });
                }
            }
        }
    }

    fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        // The group outlives its leader while any worker is still running.
        kill_group(self.child.id());
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
            self.reaped = true;
        }
    }
}

#[cfg(unix)]
fn kill_group(leader: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(leader) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(-pgid), Signal::SIGKILL) {
        if e != nix::errno::Errno::ESRCH {
            tracing::warn!(pgid, error = %e, "cannot kill test process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_leader: u32) {}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

const INCOMPETENCE_MARKERS: &[&str] = &[
    "SyntaxError",
    "IndentationError",
    "ImportError",
    "ModuleNotFoundError",
    "error[E",
    "could not compile",
];

/// First output line saying the program never got as far as running a test.
pub fn incompetence_line(output: &str) -> Option<&str> {
    output
        .lines()
        .find(|line| INCOMPETENCE_MARKERS.iter().any(|m| line.contains(m)))
        .map(str::trim)
}

/// Id of the first runnable test the output reports as failed.
pub fn find_killer(output: &str, runnable: &[(String, String)]) -> Option<String> {
    let failed: Vec<&str> = output
        .lines()
        .filter(|l| l.contains("FAIL") || l.contains('✕') || l.contains('×'))
        .collect();
    runnable
        .iter()
        .find(|(_, name)| failed.iter().any(|l| contains_word(l, name)))
        .map(|(id, _)| id.clone())
}

fn contains_word(line: &str, word: &str) -> bool {
    line.match_indices(word).any(|(i, _)| {
        let before = line[..i].chars().next_back();
        let after = line[i + word.len()..].chars().next();
        let boundary = |c: Option<char>| c.is_none_or(|c| !(c.is_alphanumeric() || c == '_'));
        boundary(before) && boundary(after)
    })
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

fn escape_regex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn generate_diff(original: &str, mutated: &str) -> String {
    use similar::TextDiff;
    let diff = TextDiff::from_lines(original, mutated);
    let mut output = String::new();
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => output.push_str(&format!("- {change}")),
            similar::ChangeTag::Insert => output.push_str(&format!("+ {change}")),
            _ => {}
        }
    }
    output
}
