use mutscope::config::{FileConfig, Settings};
use mutscope::controller::{ControllerConfig, MutationController};
use mutscope::copy_tree::{self, Sandbox};
use mutscope::coverage::ReportCoverage;
use mutscope::hom;
use mutscope::loader::{ModuleLoader, TargetSpec};
use mutscope::mutator::{FirstOrderMutator, HighOrderMutator, Mutator, Sampler};
use mutscope::operators;
use mutscope::output;
use mutscope::runner::{self, ProcessIsolation};
use mutscope::state::{self, StateRecorder};
use mutscope::views::LogView;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mutscope", version, about = "Mutation testing with higher-order mutants")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Debug logging on stderr (MUTSCOPE_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run mutation testing on one or more source files
    Run(RunArgs),
    /// Show details for a survived mutant by ref
    Show {
        /// Mutant ref (e.g. @m1 or m1)
        #[arg(name = "ref")]
        mutant_ref: String,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Summary of last run
    Status {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// List mutation operators
    Operators,
}

#[derive(Args)]
struct RunArgs {
    /// Source files to mutate
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Test modules to run against every mutant (`path` or `path::test_name`)
    #[arg(short, long = "test", required = true)]
    tests: Vec<String>,
    /// Function name to scope mutations to
    #[arg(short, long)]
    function: Option<String>,
    /// Test command (default: pytest)
    #[arg(long, env = "MUTSCOPE_TEST_CMD")]
    test_cmd: Option<String>,
    /// Deadline multiplier over the baseline duration (default: 5)
    #[arg(long)]
    timeout_factor: Option<f64>,
    /// Mutations per mutant
    #[arg(long)]
    order: Option<usize>,
    /// Grouping strategy for order > 1
    #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(hom::STRATEGY_NAMES.iter().copied()))]
    hom_strategy: Option<String>,
    /// Percentage of mutation sites to keep (1-100)
    #[arg(long)]
    percentage: Option<u8>,
    /// Seed for sampling and the random strategy
    #[arg(long)]
    seed: Option<u64>,
    /// Run only this mutant ordinal
    #[arg(long)]
    mutation_number: Option<usize>,
    /// Per-test line coverage JSON written by the test command
    #[arg(long)]
    coverage_report: Option<PathBuf>,
    /// Restrict to these operators (repeatable)
    #[arg(long = "operator")]
    operators: Vec<String>,
    /// Config file (default: ./mutscope.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Session ID for the sandbox directory (default: auto-generated)
    #[arg(long, env = "MUTSCOPE_SESSION")]
    session: Option<String>,
    /// Output JSON instead of human-readable text
    #[arg(long)]
    json: bool,
    /// Exit code only, no output
    #[arg(short, long)]
    quiet: bool,
    /// Print a diff for every mutant
    #[arg(long)]
    show_mutants: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Show { mutant_ref, json } => cmd_show(mutant_ref, json),
        Commands::Status { json } => cmd_status(json),
        Commands::Operators => cmd_operators(),
    };

    process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("MUTSCOPE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn generate_session_id() -> String {
    format!("{:08x}", fastrand::u32(..))
}

fn absolute(cwd: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() { p.to_path_buf() } else { cwd.join(p) }
}

fn relative(root: &Path, p: &Path) -> String {
    p.strip_prefix(root).unwrap_or(p).to_string_lossy().to_string()
}

fn cmd_run(args: RunArgs) -> i32 {
    let cwd = match std::env::current_dir() {
        Ok(d) => d,
        Err(e) => {
            output::print_error(&format!("Cannot determine working directory: {e}"));
            return 2;
        }
    };

    let file_config = match FileConfig::load(args.config.as_deref(), &cwd) {
        Ok(c) => c,
        Err(e) => {
            output::print_error(&e.to_string());
            return 2;
        }
    };

    let files: Vec<PathBuf> = args.files.iter().map(|f| absolute(&cwd, f)).collect();
    let tests: Vec<(PathBuf, Option<&str>)> = args
        .tests
        .iter()
        .map(|t| match t.split_once("::") {
            Some((path, selector)) => (absolute(&cwd, Path::new(path)), Some(selector)),
            None => (absolute(&cwd, Path::new(t)), None),
        })
        .collect();

    for f in &files {
        if !f.exists() {
            output::print_error(&format!("Source file not found: {}. Check the path and try again.", f.display()));
            return 2;
        }
    }
    for (t, _) in &tests {
        if !t.exists() {
            output::print_error(&format!(
                "Test file not found: {}. Pass --test <path> with a valid test file.",
                t.display()
            ));
            return 2;
        }
    }

    let overrides = FileConfig {
        test_cmd: args.test_cmd,
        timeout_factor: args.timeout_factor,
        order: args.order,
        hom_strategy: args.hom_strategy,
        percentage: args.percentage,
        seed: args.seed,
        operators: (!args.operators.is_empty()).then_some(args.operators),
        coverage_report: args.coverage_report,
        ..FileConfig::default()
    };
    let language = files.first().and_then(|f| mutscope::detect_language(f));
    let settings = match Settings::resolve(overrides, file_config, language) {
        Ok(s) => s,
        Err(e) => {
            output::print_error(&e.to_string());
            return 2;
        }
    };

    let ops = if settings.operators.is_empty() {
        operators::all()
    } else {
        match operators::by_names(&settings.operators) {
            Ok(ops) => ops,
            Err(e) => {
                output::print_error(&e);
                return 2;
            }
        }
    };

    let sampler = Sampler::new(settings.percentage, settings.seed);
    let mutator: Box<dyn Mutator> = if settings.order > 1 {
        match hom::strategy_by_name(&settings.hom_strategy, settings.order, settings.seed) {
            Some(strategy) => Box::new(HighOrderMutator::new(ops, sampler, Some(strategy))),
            None => {
                output::print_error(&format!(
                    "Unknown strategy '{}'. Available: {}",
                    settings.hom_strategy,
                    hom::STRATEGY_NAMES.join(", ")
                ));
                return 2;
            }
        }
    } else {
        Box::new(FirstOrderMutator::new(ops, sampler))
    };

    let mut all_paths = files.clone();
    all_paths.extend(tests.iter().map(|(t, _)| t.clone()));
    let Some(project_root) = copy_tree::common_project_root(&all_paths) else {
        output::print_error("No source files given.");
        return 2;
    };

    let session_id = args.session.unwrap_or_else(generate_session_id);
    let sandbox = match Sandbox::prepare(&project_root, &session_id) {
        Ok(s) => s,
        Err(e) => {
            output::print_error(&format!("Failed to set up isolated environment: {e}"));
            return 2;
        }
    };

    let targets: Vec<TargetSpec> = files
        .iter()
        .map(|f| TargetSpec::new(relative(&project_root, f), args.function.clone()))
        .collect();
    let test_specs: Vec<String> = tests
        .iter()
        .map(|(t, selector)| {
            let rel = relative(&project_root, t);
            match selector {
                Some(s) => format!("{rel}::{s}"),
                None => rel,
            }
        })
        .collect();

    let isolation = ProcessIsolation::new(
        runner::resolve_cmd(&settings.test_cmd, &cwd),
        settings.extra_args.clone(),
        sandbox.root(),
    );
    let (recorder, recorded) = StateRecorder::new(state::state_path());

    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupt);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        tracing::warn!(error = %e, "cannot install interrupt handler");
    }

    let mut controller = MutationController::new(
        ModuleLoader::new(sandbox.root()),
        targets,
        test_specs,
        mutator,
        Box::new(isolation),
    )
    .with_config(ControllerConfig {
        timeout_factor: settings.timeout_factor,
        baseline_timeout: settings.baseline_timeout,
        mutation_number: args.mutation_number,
    })
    .with_interrupt(interrupt)
    .with_observer(Box::new(LogView))
    .with_observer(Box::new(recorder));

    if !args.quiet && !args.json {
        controller = controller.with_observer(Box::new(output::ConsoleView::new(args.show_mutants)));
    }
    if let Some(report) = &settings.coverage_report {
        controller = controller.with_coverage(Box::new(ReportCoverage::new(absolute(sandbox.root(), report))));
    }

    match controller.run() {
        Ok(_) => {
            if args.quiet {
                return 0;
            }
            let recorded = recorded.borrow();
            let Some(result) = recorded.as_ref() else {
                return 0;
            };
            if args.json {
                match serde_json::to_string(result) {
                    Ok(json) => println!("{json}"),
                    Err(e) => output::print_error(&format!("Cannot serialize result: {e}")),
                }
            } else {
                output::print_run_result(result);
            }
            0
        }
        Err(e) => {
            if args.json {
                output::print_error(&e.to_string());
            }
            e.exit_code()
        }
    }
}

fn cmd_show(mutant_ref: String, json_mode: bool) -> i32 {
    let ref_id = mutant_ref.trim_start_matches('@');

    let Some(last_run) = state::load_last_run() else {
        output::print_error("No previous run found. Run `mutscope run` first.");
        return 2;
    };

    match last_run.survived_mutants.iter().find(|m| m.ref_id == ref_id) {
        Some(m) => {
            if json_mode {
                match serde_json::to_string(m) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        output::print_error(&format!("Cannot serialize mutant: {e}"));
                        return 2;
                    }
                }
            } else {
                output::print_mutant_detail(m);
            }
            0
        }
        None => {
            let valid: Vec<_> = last_run
                .survived_mutants
                .iter()
                .map(|m| format!("@{}", m.ref_id))
                .collect();
            output::print_error(&format!("Mutant @{} not found. Valid refs: {}", ref_id, valid.join(", ")));
            2
        }
    }
}

fn cmd_status(json_mode: bool) -> i32 {
    let Some(result) = state::load_last_run() else {
        output::print_error("No previous run found. Run `mutscope run` first.");
        return 2;
    };
    if json_mode {
        match serde_json::to_string(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                output::print_error(&format!("Cannot serialize result: {e}"));
                return 2;
            }
        }
    } else {
        output::print_status(&result);
    }
    0
}

fn cmd_operators() -> i32 {
    for op in operators::all() {
        println!("{:<14} {}", op.name(), op.description());
    }
    0
}
