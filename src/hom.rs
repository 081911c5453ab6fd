//! Higher-order mutant strategies.
//!
//! A strategy partitions a flat list of atomic mutations into groups of at most
//! `order` mutations that can be applied together without touching the same or
//! nested syntax nodes.

use std::borrow::Borrow;
use std::sync::{Arc, Mutex};

use crate::mutants::Mutation;

pub type Groups = Box<dyn Iterator<Item = Vec<Mutation>>>;

pub trait HomStrategy {
    fn name(&self) -> &'static str;

    fn order(&self) -> usize;

    fn generate(&self, mutations: Vec<Mutation>) -> Groups;
}

pub const STRATEGY_NAMES: &[&str] = &["between-operators", "each-choice", "first-to-last", "random"];

pub fn strategy_by_name(name: &str, order: usize, seed: Option<u64>) -> Option<Box<dyn HomStrategy>> {
    let strategy: Box<dyn HomStrategy> = match name {
        "between-operators" => Box::new(BetweenOperators::new(order)),
        "each-choice" => Box::new(EachChoice::new(order)),
        "first-to-last" => Box::new(FirstToLast::new(order)),
        "random" => Box::new(match seed {
            Some(seed) => RandomChoice::with_seed(order, seed),
            None => RandomChoice::new(order),
        }),
        _ => return None,
    };
    Some(strategy)
}

fn conflicts(chosen: &Mutation, candidate: &Mutation, allow_same_operator: bool) -> bool {
    chosen.node.overlaps(&candidate.node) || (!allow_same_operator && chosen.operator == candidate.operator)
}

/// Drop every candidate that would collide with an already chosen mutation.
pub fn remove_bad_mutations<M: Borrow<Mutation>>(chosen: &[M], candidates: &mut Vec<M>, allow_same_operator: bool) {
    candidates.retain(|candidate| {
        !chosen
            .iter()
            .any(|c| conflicts(c.borrow(), candidate.borrow(), allow_same_operator))
    });
}

#[derive(Clone, Copy)]
enum Pick {
    Front,
    Alternate,
}

/// Shared engine for the exactly-once strategies. Each group consumes the
/// mutations it picks from `remaining`.
struct Sequential {
    order: usize,
    pick: Pick,
    remaining: Vec<Mutation>,
}

impl Iterator for Sequential {
    type Item = Vec<Mutation>;

    fn next(&mut self) -> Option<Vec<Mutation>> {
        if self.remaining.is_empty() {
            return None;
        }
        let remaining = &self.remaining;
        let mut pool: Vec<&Mutation> = remaining.iter().collect();
        let mut group: Vec<&Mutation> = Vec::with_capacity(self.order);
        let mut from_back = false;
        while group.len() < self.order {
            let picked = if from_back { pool.pop() } else if pool.is_empty() { None } else { Some(pool.remove(0)) };
            let Some(picked) = picked else { break };
            group.push(picked);
            if let Pick::Alternate = self.pick {
                from_back = !from_back;
            }
            remove_bad_mutations(&group, &mut pool, true);
        }

        let group: Vec<Mutation> = group.into_iter().cloned().collect();
        self.remaining.retain(|m| !group.contains(m));
        Some(group)
    }
}

/// Groups mutations in list order.
pub struct EachChoice {
    order: usize,
}

impl EachChoice {
    pub fn new(order: usize) -> Self {
        EachChoice { order: order.max(1) }
    }
}

impl HomStrategy for EachChoice {
    fn name(&self) -> &'static str {
        "each-choice"
    }

    fn order(&self) -> usize {
        self.order
    }

    fn generate(&self, mutations: Vec<Mutation>) -> Groups {
        Box::new(Sequential {
            order: self.order,
            pick: Pick::Front,
            remaining: mutations,
        })
    }
}

/// Pairs early mutations with late ones by alternating front and back picks.
pub struct FirstToLast {
    order: usize,
}

impl FirstToLast {
    pub fn new(order: usize) -> Self {
        FirstToLast { order: order.max(1) }
    }
}

impl Default for FirstToLast {
    fn default() -> Self {
        FirstToLast::new(2)
    }
}

impl HomStrategy for FirstToLast {
    fn name(&self) -> &'static str {
        "first-to-last"
    }

    fn order(&self) -> usize {
        self.order
    }

    fn generate(&self, mutations: Vec<Mutation>) -> Groups {
        Box::new(Sequential {
            order: self.order,
            pick: Pick::Alternate,
            remaining: mutations,
        })
    }
}

pub type Shuffler = Arc<dyn Fn(&mut [Mutation]) + Send + Sync>;

/// Shuffles once, then groups like [`EachChoice`].
pub struct RandomChoice {
    order: usize,
    shuffler: Shuffler,
}

impl RandomChoice {
    pub fn new(order: usize) -> Self {
        Self::with_rng(order, fastrand::Rng::new())
    }

    pub fn with_seed(order: usize, seed: u64) -> Self {
        Self::with_rng(order, fastrand::Rng::with_seed(seed))
    }

    fn with_rng(order: usize, rng: fastrand::Rng) -> Self {
        let rng = Mutex::new(rng);
        Self::with_shuffler(
            order,
            Arc::new(move |mutations: &mut [Mutation]| {
                if let Ok(mut rng) = rng.lock() {
                    rng.shuffle(mutations);
                }
            }),
        )
    }

    pub fn with_shuffler(order: usize, shuffler: Shuffler) -> Self {
        RandomChoice {
            order: order.max(1),
            shuffler,
        }
    }
}

impl HomStrategy for RandomChoice {
    fn name(&self) -> &'static str {
        "random"
    }

    fn order(&self) -> usize {
        self.order
    }

    fn generate(&self, mut mutations: Vec<Mutation>) -> Groups {
        (self.shuffler)(&mut mutations);
        Box::new(Sequential {
            order: self.order,
            pick: Pick::Front,
            remaining: mutations,
        })
    }
}

/// Combines mutations of different operators, least used first.
///
/// Every mutation is used at least once; a mutation already used may be picked
/// again to fill a group, so the number of groups is not fixed by the input size.
/// Ties in usage are broken by list order.
pub struct BetweenOperators {
    order: usize,
}

impl BetweenOperators {
    pub fn new(order: usize) -> Self {
        BetweenOperators { order: order.max(1) }
    }
}

impl HomStrategy for BetweenOperators {
    fn name(&self) -> &'static str {
        "between-operators"
    }

    fn order(&self) -> usize {
        self.order
    }

    fn generate(&self, mutations: Vec<Mutation>) -> Groups {
        let not_used = mutations.len();
        Box::new(LeastUsed {
            order: self.order,
            usage: vec![0; mutations.len()],
            not_used,
            mutations,
        })
    }
}

struct LeastUsed {
    order: usize,
    mutations: Vec<Mutation>,
    usage: Vec<usize>,
    not_used: usize,
}

impl Iterator for LeastUsed {
    type Item = Vec<Mutation>;

    fn next(&mut self) -> Option<Vec<Mutation>> {
        if self.not_used == 0 {
            return None;
        }
        let mut pool: Vec<usize> = (0..self.mutations.len()).collect();
        // Stable: equal usage keeps list order.
        pool.sort_by_key(|&i| self.usage[i]);

        let mut group: Vec<usize> = Vec::with_capacity(self.order);
        while group.len() < self.order && !pool.is_empty() {
            let picked = pool.remove(0);
            group.push(picked);
            if self.usage[picked] == 0 {
                self.not_used -= 1;
            }
            self.usage[picked] += 1;
            let mutations = &self.mutations;
            pool.retain(|&i| !group.iter().any(|&g| conflicts(&mutations[g], &mutations[i], false)));
        }
        Some(group.into_iter().map(|i| self.mutations[i].clone()).collect())
    }
}
