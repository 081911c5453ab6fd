use std::time::Duration;

use mutscope::Language;
use mutscope::mutants::{MutantResult, Mutation};
use mutscope::operators::{self, MutationScope};
use mutscope::score::MutationScore;
use mutscope::state::{self, RunResult, StateRecorder, SurvivedMutant};
use mutscope::syntax::Program;
use mutscope::views::{MutantInfo, Observer};
use tempfile::TempDir;

const SRC: &str = "def f(a, b):\n    return a > b\n";

fn boundary() -> Mutation {
    let program = Program::parse(Language::Python, SRC).unwrap();
    operators::candidates(&operators::Boundary, &program, &MutationScope::default()).remove(0)
}

fn sample() -> RunResult {
    let mut score = MutationScore::new();
    score.inc_killed();
    score.inc_killed();
    score.inc_survived();
    score.update_coverage(3, 4);
    RunResult::new(
        &score,
        Duration::from_millis(1500),
        vec![SurvivedMutant {
            ref_id: "m1".into(),
            number: 3,
            file: "app.py".into(),
            mutations: vec![boundary()],
            diff: "-     return a > b\n+     return a >= b\n".into(),
            tests_run: 2,
        }],
    )
}

#[test]
fn run_result_copies_the_score() {
    let result = sample();
    assert_eq!(result.total, 3);
    assert_eq!(result.killed, 2);
    assert_eq!(result.survived, 1);
    assert_eq!(result.covered_nodes, 3);
    assert_eq!(result.all_nodes, 4);
    assert_eq!(result.duration_ms, 1500);
    assert!((result.score - 66.666).abs() < 0.01);
}

#[test]
fn run_result_serializes_to_json() {
    let json = serde_json::to_string(&sample()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["killed"], 2);
    assert_eq!(value["survived_mutants"][0]["ref_id"], "m1");
    assert_eq!(value["survived_mutants"][0]["mutations"][0]["operator"], "boundary");
    assert_eq!(value["survived_mutants"][0]["mutations"][0]["replacement"], ">=");
}

#[test]
fn save_and_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(state::STATE_FILE);
    state::save_to_path(&sample(), &path).unwrap();

    let loaded = state::load_from_path(&path).unwrap();
    assert_eq!(loaded.total, 3);
    assert_eq!(loaded.survived_mutants[0].mutations[0], boundary());
}

#[test]
fn load_from_missing_or_corrupt_file_is_none() {
    let dir = TempDir::new().unwrap();
    assert!(state::load_from_path(&dir.path().join("nope.json")).is_none());

    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{not json").unwrap();
    assert!(state::load_from_path(&path).is_none());
}

#[test]
fn recorder_keeps_only_survivors_and_saves_at_end() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(state::STATE_FILE);
    let (mut recorder, shared) = StateRecorder::new(&path);
    let mutation = boundary();
    let mutated = SRC.replace('>', ">=");

    let mut score = MutationScore::new();
    recorder.start();
    for (number, result) in [
        (
            1,
            MutantResult::Killed {
                duration: Duration::from_millis(5),
                killer: Some("test_app.py::test_f".into()),
                trace: String::new(),
                tests_run: 1,
            },
        ),
        (
            2,
            MutantResult::Survived {
                duration: Duration::from_millis(5),
                tests_run: 4,
            },
        ),
    ] {
        recorder.mutation(&MutantInfo {
            number,
            target: "app.py",
            mutations: std::slice::from_ref(&mutation),
            original: SRC,
            mutant: &mutated,
        });
        recorder.outcome(number, &result);
    }
    score.inc_killed();
    score.inc_survived();
    recorder.end(&score, Duration::from_secs(1));

    let result = shared.borrow().clone().unwrap();
    assert_eq!(result.survived_mutants.len(), 1);
    let survivor = &result.survived_mutants[0];
    assert_eq!(survivor.ref_id, "m1");
    assert_eq!(survivor.number, 2);
    assert_eq!(survivor.file, "app.py");
    assert_eq!(survivor.tests_run, 4);
    assert!(survivor.diff.contains("+     return a >= b"));

    let saved = state::load_from_path(&path).unwrap();
    assert_eq!(saved.total, 2);
    assert_eq!(saved.survived_mutants[0].ref_id, "m1");
}
