use mutscope::score::MutationScore;

#[test]
fn fresh_score_counts_zero() {
    let score = MutationScore::new();
    assert_eq!(score.count(), 0.0);
    assert_eq!(score.all_mutants(), 0);
    assert_eq!(score.coverage_pct(), None);
}

#[test]
fn incompetent_mutants_leave_the_denominator() {
    let mut score = MutationScore::new();
    score.inc_killed();
    score.inc_killed();
    score.inc_survived();
    score.inc_incompetent();

    assert_eq!(score.all_mutants(), 4);
    let expected = 2.0 / 3.0 * 100.0;
    assert!((score.count() - expected).abs() < 1e-9, "got {}", score.count());
}

#[test]
fn timeouts_count_as_detected() {
    let mut score = MutationScore::new();
    score.inc_killed();
    score.inc_timeout();
    score.inc_survived();
    score.inc_survived();
    score.inc_incompetent();

    assert_eq!(score.count(), 50.0);
}

#[test]
fn only_incompetent_mutants_count_zero() {
    let mut score = MutationScore::new();
    score.inc_incompetent();
    score.inc_incompetent();
    assert_eq!(score.count(), 0.0);
}

#[test]
fn coverage_accumulates_across_targets() {
    let mut score = MutationScore::new();
    score.update_coverage(3, 4);
    score.update_coverage(1, 4);
    assert_eq!(score.covered_nodes, 4);
    assert_eq!(score.all_nodes, 8);
    assert_eq!(score.coverage_pct(), Some(50.0));
}

#[test]
fn score_serializes_counters() {
    let mut score = MutationScore::new();
    score.inc_killed();
    let json = serde_json::to_value(&score).unwrap();
    assert_eq!(json["killed"], 1);
    assert_eq!(json["survived"], 0);
}
