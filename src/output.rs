use console::Style;
use std::time::Duration;

use crate::mutants::MutantResult;
use crate::runner::generate_diff;
use crate::score::MutationScore;
use crate::state::{RunResult, SurvivedMutant};
use crate::views::{ModuleBaseline, MutantInfo, Observer};

pub fn print_error(msg: &str) {
    let style = Style::new().red().bold();
    eprintln!("{} {}", style.apply_to("✗"), msg);
}

fn seconds(d: Duration) -> String {
    format!("{:.2} s", d.as_secs_f64())
}

/// Live progress on the terminal, one line per mutant.
pub struct ConsoleView {
    show_mutants: bool,
}

impl ConsoleView {
    pub fn new(show_mutants: bool) -> Self {
        ConsoleView { show_mutants }
    }
}

impl Observer for ConsoleView {
    fn initialize(&mut self, targets: &[String], tests: &[String]) {
        let dim = Style::new().dim();
        println!("{} targets: {}", dim.apply_to("·"), targets.join(", "));
        println!("{} tests:   {}", dim.apply_to("·"), tests.join(", "));
    }

    fn passed(&mut self, modules: &[ModuleBaseline]) {
        let dim = Style::new().dim();
        for m in modules {
            println!(
                "  {} {} [{} tests, {}]",
                Style::new().green().apply_to("✓"),
                m.name,
                m.tests,
                dim.apply_to(seconds(m.duration)),
            );
        }
    }

    fn start(&mut self) {
        println!();
    }

    fn mutation(&mut self, info: &MutantInfo<'_>) {
        let ref_style = Style::new().cyan().bold();
        let op_style = Style::new().magenta();
        for (i, m) in info.mutations.iter().enumerate() {
            let head = if i == 0 {
                ref_style.apply_to(format!("[#{:>3}]", info.number)).to_string()
            } else {
                " ".repeat(6)
            };
            println!(
                "{} {} {}:{} {} → {}",
                head,
                Style::new().dim().apply_to(format!("[{}]", m.operator)),
                info.target,
                m.line,
                op_style.apply_to(m.original.lines().next().unwrap_or_default()),
                op_style.apply_to(m.replacement.lines().next().unwrap_or_default()),
            );
        }
        if self.show_mutants {
            print_diff(&generate_diff(info.original, info.mutant));
        }
    }

    fn outcome(&mut self, _number: usize, result: &MutantResult) {
        let line = match result {
            MutantResult::Killed { killer, duration, .. } => format!(
                "{} by {} [{}]",
                Style::new().green().apply_to("killed"),
                killer.as_deref().unwrap_or("test suite"),
                seconds(*duration),
            ),
            MutantResult::Survived { duration, tests_run } => format!(
                "{} [{} tests, {}]",
                Style::new().red().bold().apply_to("survived"),
                tests_run,
                seconds(*duration),
            ),
            MutantResult::Timeout => Style::new().yellow().apply_to("timeout").to_string(),
            MutantResult::Incompetent { detail, .. } => format!(
                "{} {}",
                Style::new().dim().apply_to("incompetent"),
                Style::new().dim().apply_to(detail),
            ),
        };
        println!("        {line}");
    }

    fn original_tests_fail(&mut self, module: &str, detail: &str) {
        print_error(&format!("Tests fail before mutation in {module}. Fix failing tests first."));
        eprintln!("{detail}");
    }

    fn cant_load(&mut self, name: &str, cause: &str) {
        print_error(&format!("Cannot load {name}: {cause}"));
    }

    fn end(&mut self, score: &MutationScore, duration: Duration) {
        println!();
        println!(
            "Mutation score [{}]: {:.1}%",
            seconds(duration),
            score.count()
        );
        println!(
            "  all: {}  killed: {}  survived: {}  incompetent: {}  timeout: {}",
            score.all_mutants(),
            score.killed,
            score.survived,
            score.incompetent,
            score.timeout,
        );
        if let Some(pct) = score.coverage_pct() {
            println!("  coverage: {}/{} nodes ({:.1}%)", score.covered_nodes, score.all_nodes, pct);
        }
    }
}

fn print_diff(diff: &str) {
    for line in diff.lines() {
        if line.starts_with('-') {
            println!("        {}", Style::new().red().apply_to(line));
        } else if line.starts_with('+') {
            println!("        {}", Style::new().green().apply_to(line));
        }
    }
}

pub fn print_run_result(result: &RunResult) {
    let competent = result.total - result.incompetent;

    if result.survived == 0 {
        let style = Style::new().green().bold();
        println!(
            "{} {} mutants, none survived ({:.1}%) in {:.1}s",
            style.apply_to("✓"),
            competent,
            result.score,
            result.duration_ms as f64 / 1000.0,
        );
        return;
    }

    let style = Style::new().yellow().bold();
    println!(
        "{} {} survived / {} competent ({:.1}% score) in {:.1}s",
        style.apply_to("!"),
        result.survived,
        competent,
        result.score,
        result.duration_ms as f64 / 1000.0,
    );
    println!();
    print_survivors(&result.survived_mutants);
}

fn print_survivors(survivors: &[SurvivedMutant]) {
    let ref_style = Style::new().cyan().bold();
    let loc_style = Style::new().dim();
    let op_style = Style::new().magenta();
    for m in survivors {
        for (i, mutation) in m.mutations.iter().enumerate() {
            let head = if i == 0 {
                ref_style.apply_to(format!("@{}", m.ref_id)).to_string()
            } else {
                " ".repeat(m.ref_id.len() + 1)
            };
            println!(
                "  {} {}:{} {} {} → {}",
                head,
                m.file,
                mutation.line,
                loc_style.apply_to(format!("[{}]", mutation.operator)),
                op_style.apply_to(mutation.original.lines().next().unwrap_or_default()),
                op_style.apply_to(mutation.replacement.lines().next().unwrap_or_default()),
            );
        }
    }
}

pub fn print_mutant_detail(m: &SurvivedMutant) {
    let ref_style = Style::new().cyan().bold();
    let dim = Style::new().dim();

    println!(
        "{} {} (mutant #{}, {} tests ran)",
        ref_style.apply_to(format!("@{}", m.ref_id)),
        m.file,
        m.number,
        m.tests_run,
    );
    for mutation in &m.mutations {
        println!();
        println!("  {}", dim.apply_to(format!("{}:{} [{}]", m.file, mutation.line, mutation.operator)));
        for line in &mutation.context_before {
            println!("  {}", dim.apply_to(line));
        }
        println!("  {}", Style::new().red().apply_to(format!("- {}", mutation.original)));
        println!("  {}", Style::new().green().apply_to(format!("+ {}", mutation.replacement)));
        for line in &mutation.context_after {
            println!("  {}", dim.apply_to(line));
        }
    }
    println!();
    print_diff(&m.diff);
}

pub fn print_status(result: &RunResult) {
    println!(
        "Last run: {} mutants, {} killed, {} timeout, {} incompetent, {} survived ({:.1}% score)",
        result.total, result.killed, result.timeout, result.incompetent, result.survived, result.score,
    );
    if result.all_nodes > 0 {
        println!("Coverage: {}/{} nodes", result.covered_nodes, result.all_nodes);
    }

    if result.survived > 0 {
        println!();
        print_survivors(&result.survived_mutants);
        println!();
        println!("Use `mutscope show @m1` for details on a specific mutant.");
    }
}
