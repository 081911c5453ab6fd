use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::syntax::Program;

/// Stable identity of a syntax node: its byte range in the unmutated source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeMarker {
    pub start: usize,
    pub end: usize,
}

impl NodeMarker {
    pub fn new(start: usize, end: usize) -> Self {
        NodeMarker { start, end }
    }

    /// True when `self` strictly encloses `other`.
    pub fn is_ancestor_of(&self, other: &NodeMarker) -> bool {
        self != other && self.start <= other.start && other.end <= self.end
    }

    pub fn is_descendant_of(&self, other: &NodeMarker) -> bool {
        other.is_ancestor_of(self)
    }

    /// Same node, or one encloses the other.
    pub fn overlaps(&self, other: &NodeMarker) -> bool {
        self == other || self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }
}

impl fmt::Display for NodeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub operator: String,
    pub node: NodeMarker,
    pub index: usize,
    pub line: usize,
    pub column: usize,
    pub original: String,
    pub replacement: String,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
}

impl Mutation {
    pub fn describe(&self) -> String {
        format!(
            "[#{}] {} {}:{} `{}` → `{}`",
            self.index,
            self.operator,
            self.line,
            self.column,
            self.original.lines().next().unwrap_or_default(),
            self.replacement.lines().next().unwrap_or_default(),
        )
    }
}

/// A program variant and the mutations that produced it. Built, run once, dropped.
#[derive(Debug, Clone)]
pub struct Mutant {
    pub mutations: Vec<Mutation>,
    pub program: Program,
}

impl Mutant {
    pub fn markers(&self) -> impl Iterator<Item = NodeMarker> + '_ {
        self.mutations.iter().map(|m| m.node)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutantResult {
    Killed {
        duration: Duration,
        killer: Option<String>,
        trace: String,
        tests_run: usize,
    },
    Survived {
        duration: Duration,
        tests_run: usize,
    },
    Timeout,
    Incompetent {
        detail: String,
        tests_run: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutantStatus {
    Killed,
    Survived,
    Timeout,
    Incompetent,
}

impl MutantResult {
    pub fn status(&self) -> MutantStatus {
        match self {
            MutantResult::Killed { .. } => MutantStatus::Killed,
            MutantResult::Survived { .. } => MutantStatus::Survived,
            MutantResult::Timeout => MutantStatus::Timeout,
            MutantResult::Incompetent { .. } => MutantStatus::Incompetent,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            MutantResult::Killed { duration, .. } | MutantResult::Survived { duration, .. } => {
                Some(*duration)
            }
            _ => None,
        }
    }
}
