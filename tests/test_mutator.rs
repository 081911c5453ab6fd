use mutscope::Language;
use mutscope::error::MutateError;
use mutscope::hom::EachChoice;
use mutscope::mutants::{Mutant, Mutation, NodeMarker};
use mutscope::mutator::{EditStack, FirstOrderMutator, HighOrderMutator, Mutator, Sampler};
use mutscope::operators::{self, Arithmetic, Boundary, MutationOperator, MutationScope, ReturnVal};
use mutscope::syntax::Program;

const DIFF: &str = "def diff(a, b):
    if a > b:
        return a - b
    return a + b
";

fn program() -> Program {
    Program::parse(Language::Python, DIFF).unwrap()
}

fn collect(mutator: &mut dyn Mutator, program: &Program, scope: &MutationScope) -> Vec<Mutant> {
    mutator.mutate(program, scope).collect::<Result<_, _>>().unwrap()
}

fn ops(list: Vec<Box<dyn MutationOperator>>) -> Vec<Box<dyn MutationOperator>> {
    list
}

// --- first order ---

#[test]
fn first_order_yields_one_mutant_per_candidate() {
    let program = program();
    let scope = MutationScope::default();
    let expected: usize = operators::all()
        .iter()
        .map(|op| operators::candidates(op.as_ref(), &program, &scope).len())
        .sum();

    let mut mutator = FirstOrderMutator::new(operators::all(), Sampler::all());
    let mutants = collect(&mut mutator, &program, &scope);

    assert_eq!(mutants.len(), expected);
    assert!(mutants.iter().all(|m| m.mutations.len() == 1));
    assert!(mutants.iter().all(|m| m.program.text() != DIFF));
}

#[test]
fn first_order_follows_operator_then_site_order() {
    let program = program();
    let mut mutator = FirstOrderMutator::new(ops(vec![Box::new(ReturnVal), Box::new(Arithmetic)]), Sampler::all());
    let mutants = collect(&mut mutator, &program, &MutationScope::default());

    let order: Vec<(String, usize)> = mutants
        .iter()
        .map(|m| (m.mutations[0].operator.clone(), m.mutations[0].line))
        .collect();
    assert_eq!(
        order,
        vec![
            ("arith".to_string(), 3),
            ("arith".to_string(), 4),
            ("return_val".to_string(), 3),
            ("return_val".to_string(), 4),
        ]
    );
    assert_eq!(mutants[0].program.text(), DIFF.replace("a - b", "a + b"));
}

#[test]
fn sampling_with_a_seed_is_reproducible() {
    let program = program();
    let scope = MutationScope::default();
    let pick = |seed| {
        let mut mutator = FirstOrderMutator::new(operators::all(), Sampler::new(50, Some(seed)));
        collect(&mut mutator, &program, &scope)
            .into_iter()
            .map(|m| m.mutations[0].clone())
            .collect::<Vec<Mutation>>()
    };
    assert_eq!(pick(11), pick(11));
}

#[test]
fn full_percentage_keeps_everything() {
    let mut sampler = Sampler::new(100, Some(3));
    assert!((0..100).all(|_| sampler.is_selected()));
}

#[test]
fn covered_scope_restricts_candidates() {
    let program = program();
    let all = operators::candidates(&Arithmetic, &program, &MutationScope::default());
    let scope = MutationScope {
        function: None,
        covered: Some([all[1].node].into_iter().collect()),
    };
    let covered = operators::candidates(&Arithmetic, &program, &scope);
    assert_eq!(covered.len(), 1);
    assert_eq!(covered[0].node, all[1].node);
}

// --- replay and composition ---

#[test]
fn apply_rejects_a_mutation_that_does_not_match() {
    let program = program();
    let mut bogus = operators::candidates(&Arithmetic, &program, &MutationScope::default()).remove(0);
    bogus.original = "*".to_string();
    let err = program.apply(&bogus).unwrap_err();
    assert!(matches!(err, MutateError::ReplayMismatch { .. }));
}

#[test]
fn edit_stack_shifts_later_edits_and_unwinds() {
    let base = program();
    let boundary = operators::candidates(&Boundary, &base, &MutationScope::default()).remove(0);
    let ret = operators::candidates(&ReturnVal, &base, &MutationScope::default()).remove(0);
    assert_eq!(boundary.replacement, ">=");

    let mut working = base.clone();
    let mut stack = EditStack::new();
    stack.apply(&mut working, &boundary).unwrap();
    stack.apply(&mut working, &ret).unwrap();
    assert_eq!(stack.len(), 2);

    let expected = "def diff(a, b):
    if a >= b:
        return None
    return a + b
";
    assert_eq!(working.text(), expected);

    // Each edit applied alone to the base lands on the same text.
    let sequential = base.apply(&boundary).unwrap();
    let shifted = NodeMarker::new(ret.node.start + 1, ret.node.end + 1);
    assert_eq!(sequential.apply_at(&ret, shifted).unwrap().text(), expected);

    stack.unwind(&mut working, &base).unwrap();
    assert!(stack.is_empty());
    assert_eq!(working.text(), DIFF);
}

#[test]
fn edit_stack_refuses_overlapping_edits() {
    let base = program();
    let block = operators::candidates(&operators::BlockRemove, &base, &MutationScope::default()).remove(0);
    let inner = operators::candidates(&Arithmetic, &base, &MutationScope::default()).remove(0);
    assert!(block.node.is_ancestor_of(&inner.node));

    let mut working = base.clone();
    let mut stack = EditStack::new();
    stack.apply(&mut working, &block).unwrap();
    let err = stack.apply(&mut working, &inner).unwrap_err();
    assert!(matches!(err, MutateError::Overlapping { .. }));
}

#[test]
fn high_order_composes_groups_on_a_clean_base() {
    let program = program();
    let mut mutator = HighOrderMutator::new(
        ops(vec![Box::new(Boundary), Box::new(ReturnVal)]),
        Sampler::all(),
        Some(Box::new(EachChoice::new(2))),
    );
    let mutants = collect(&mut mutator, &program, &MutationScope::default());

    assert_eq!(mutants.len(), 2);
    assert_eq!(mutants[0].mutations.len(), 2);
    assert_eq!(
        mutants[0].program.text(),
        "def diff(a, b):
    if a >= b:
        return None
    return a + b
"
    );
    assert_eq!(mutants[1].mutations.len(), 1);
    assert_eq!(
        mutants[1].program.text(),
        "def diff(a, b):
    if a > b:
        return a - b
    return None
"
    );
}

#[test]
fn high_order_groups_never_overlap_on_real_code() {
    let program = program();
    let mut mutator = HighOrderMutator::new(operators::all(), Sampler::all(), Some(Box::new(EachChoice::new(3))));
    let mutants = collect(&mut mutator, &program, &MutationScope::default());
    assert!(!mutants.is_empty());

    let atomic: usize = operators::all()
        .iter()
        .map(|op| operators::candidates(op.as_ref(), &program, &MutationScope::default()).len())
        .sum();
    assert_eq!(mutants.iter().map(|m| m.mutations.len()).sum::<usize>(), atomic);

    for mutant in &mutants {
        let markers: Vec<NodeMarker> = mutant.markers().collect();
        for (i, a) in markers.iter().enumerate() {
            for b in &markers[i + 1..] {
                assert!(!a.overlaps(b));
            }
        }
        assert!(mutant.program.construct().is_ok(), "{}", mutant.program.text());
    }
}

#[test]
fn high_order_defaults_to_first_to_last() {
    let mutator = HighOrderMutator::new(operators::all(), Sampler::all(), None);
    assert_eq!(mutator.strategy().name(), "first-to-last");
    assert_eq!(mutator.strategy().order(), 2);
}

#[test]
fn function_scope_limits_mutations() {
    let source = "def add(a, b):\n    return a + b\n\ndef sub(a, b):\n    return a - b\n";
    let program = Program::parse(Language::Python, source).unwrap();
    let mut mutator = FirstOrderMutator::new(ops(vec![Box::new(Arithmetic)]), Sampler::all());
    let mutants = collect(&mut mutator, &program, &MutationScope::function("sub"));
    assert_eq!(mutants.len(), 1);
    assert_eq!(mutants[0].mutations[0].line, 5);
}
