use crate::error::MutateError;
use crate::hom::{FirstToLast, Groups, HomStrategy};
use crate::mutants::{Mutant, Mutation, NodeMarker};
use crate::operators::{self, MutationOperator, MutationScope};
use crate::syntax::Program;

pub type MutantStream<'a> = Box<dyn Iterator<Item = Result<Mutant, MutateError>> + 'a>;

/// Produces the mutants of one program, lazily and in a reproducible order.
pub trait Mutator {
    fn operators(&self) -> &[Box<dyn MutationOperator>];

    fn mutate<'a>(&'a mut self, program: &'a Program, scope: &'a MutationScope) -> MutantStream<'a>;
}

/// Independent per-site trial at a fixed percentage.
pub struct Sampler {
    percentage: u8,
    rng: fastrand::Rng,
}

impl Sampler {
    pub fn new(percentage: u8, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Sampler {
            percentage: percentage.min(100),
            rng,
        }
    }

    pub fn all() -> Self {
        Sampler::new(100, None)
    }

    pub fn is_selected(&mut self) -> bool {
        self.percentage >= 100 || self.rng.u8(..100) < self.percentage
    }
}

pub struct FirstOrderMutator {
    operators: Vec<Box<dyn MutationOperator>>,
    sampler: Sampler,
}

impl FirstOrderMutator {
    pub fn new(mut operators: Vec<Box<dyn MutationOperator>>, sampler: Sampler) -> Self {
        operators::sort_operators(&mut operators);
        FirstOrderMutator { operators, sampler }
    }
}

impl Mutator for FirstOrderMutator {
    fn operators(&self) -> &[Box<dyn MutationOperator>] {
        &self.operators
    }

    fn mutate<'a>(&'a mut self, program: &'a Program, scope: &'a MutationScope) -> MutantStream<'a> {
        let sampler = &mut self.sampler;
        Box::new(
            self.operators
                .iter()
                .flat_map(move |op| operators::candidates(op.as_ref(), program, scope))
                .filter(move |_| sampler.is_selected())
                .map(move |mutation| -> Result<Mutant, MutateError> {
                    let mutant = program.apply(&mutation)?;
                    Ok(Mutant {
                        mutations: vec![mutation],
                        program: mutant,
                    })
                }),
        )
    }
}

/// One replayed mutation: where its replacement now sits and what it displaced.
#[derive(Debug, Clone)]
pub struct AppliedEdit {
    pub mutation: Mutation,
    pub at: NodeMarker,
}

/// Mutations applied on top of one another, reverted in reverse order.
#[derive(Debug, Default)]
pub struct EditStack {
    edits: Vec<AppliedEdit>,
}

impl EditStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Position of `node` (base coordinates) in the current working text.
    fn shifted(&self, mutation: &Mutation) -> Result<NodeMarker, MutateError> {
        let node = mutation.node;
        let mut delta: isize = 0;
        for edit in &self.edits {
            let applied = edit.mutation.node;
            if applied.overlaps(&node) {
                return Err(MutateError::Overlapping {
                    operator: mutation.operator.clone(),
                    index: mutation.index,
                });
            }
            if applied.end <= node.start {
                delta += edit.mutation.replacement.len() as isize - edit.mutation.original.len() as isize;
            }
        }
        Ok(NodeMarker::new(
            node.start.saturating_add_signed(delta),
            node.end.saturating_add_signed(delta),
        ))
    }

    /// Replay exactly `mutation` onto `working`.
    pub fn apply(&mut self, working: &mut Program, mutation: &Mutation) -> Result<(), MutateError> {
        let marker = self.shifted(mutation)?;
        *working = working.apply_at(mutation, marker)?;
        self.edits.push(AppliedEdit {
            mutation: mutation.clone(),
            at: NodeMarker::new(marker.start, marker.start + mutation.replacement.len()),
        });
        Ok(())
    }

    /// Revert every edit, newest first, and check `working` is `base` again.
    pub fn unwind(&mut self, working: &mut Program, base: &Program) -> Result<(), MutateError> {
        let depth = self.edits.len();
        while let Some(edit) = self.edits.pop() {
            let inverse = Mutation {
                original: edit.mutation.replacement.clone(),
                replacement: edit.mutation.original.clone(),
                ..edit.mutation
            };
            *working = working.apply_at(&inverse, edit.at)?;
        }
        if working.text() != base.text() {
            return Err(MutateError::UnwindMismatch { depth });
        }
        Ok(())
    }
}

pub struct HighOrderMutator {
    operators: Vec<Box<dyn MutationOperator>>,
    sampler: Sampler,
    strategy: Box<dyn HomStrategy>,
}

impl HighOrderMutator {
    pub fn new(mut operators: Vec<Box<dyn MutationOperator>>, sampler: Sampler, strategy: Option<Box<dyn HomStrategy>>) -> Self {
        operators::sort_operators(&mut operators);
        HighOrderMutator {
            operators,
            sampler,
            strategy: strategy.unwrap_or_else(|| Box::new(FirstToLast::default())),
        }
    }

    pub fn strategy(&self) -> &dyn HomStrategy {
        self.strategy.as_ref()
    }

    /// Every atomic mutation, before grouping. Sampling happens here, once.
    pub fn generate_all_mutations(&mut self, program: &Program, scope: &MutationScope) -> Vec<Mutation> {
        let mut mutations: Vec<Mutation> = self
            .operators
            .iter()
            .flat_map(|op| operators::candidates(op.as_ref(), program, scope))
            .collect();
        mutations.retain(|_| self.sampler.is_selected());
        mutations
    }
}

impl Mutator for HighOrderMutator {
    fn operators(&self) -> &[Box<dyn MutationOperator>] {
        &self.operators
    }

    fn mutate<'a>(&'a mut self, program: &'a Program, scope: &'a MutationScope) -> MutantStream<'a> {
        let mutations = self.generate_all_mutations(program, scope);
        tracing::debug!(
            atomic = mutations.len(),
            strategy = self.strategy.name(),
            order = self.strategy.order(),
            "grouping mutations"
        );
        Box::new(Composer {
            base: program,
            working: program.clone(),
            groups: self.strategy.generate(mutations),
            stack: EditStack::new(),
            poisoned: false,
        })
    }
}

/// Builds each group's mutant on a single working copy, unwinding the previous
/// group before the next one is applied.
struct Composer<'a> {
    base: &'a Program,
    working: Program,
    groups: Groups,
    stack: EditStack,
    poisoned: bool,
}

impl Composer<'_> {
    fn fail(&mut self, error: MutateError) -> Option<Result<Mutant, MutateError>> {
        self.poisoned = true;
        Some(Err(error))
    }
}

impl Iterator for Composer<'_> {
    type Item = Result<Mutant, MutateError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned {
            return None;
        }
        if let Err(e) = self.stack.unwind(&mut self.working, self.base) {
            return self.fail(e);
        }
        let group = self.groups.next()?;
        for mutation in &group {
            if let Err(e) = self.stack.apply(&mut self.working, mutation) {
                return self.fail(e);
            }
        }
        Some(Ok(Mutant {
            mutations: group,
            program: self.working.clone(),
        }))
    }
}
