use std::path::PathBuf;

use thiserror::Error;

/// A target, test module or auxiliary input could not be read or resolved.
#[derive(Debug, Error)]
#[error("cannot load {name}: {cause}")]
pub struct LoadError {
    pub name: String,
    pub cause: String,
}

impl LoadError {
    pub fn new(name: impl Into<String>, cause: impl ToString) -> Self {
        LoadError {
            name: name.into(),
            cause: cause.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("grammar rejected: {0}")]
    Grammar(#[from] tree_sitter::LanguageError),
    #[error("parser produced no tree")]
    NoTree,
}

#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("cannot read coverage report {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed coverage report {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The mutant could not be turned into a runnable program.
#[derive(Debug, Clone, Error)]
#[error("syntax error at {line}:{column} near `{snippet}`")]
pub struct ConstructionError {
    pub line: usize,
    pub column: usize,
    pub snippet: String,
}

/// Internal-consistency failures while composing higher-order mutants.
#[derive(Debug, Error)]
pub enum MutateError {
    #[error("replay of {operator}#{index}: expected `{expected}` at bytes {start}..{end}, found `{found}`")]
    ReplayMismatch {
        operator: String,
        index: usize,
        start: usize,
        end: usize,
        expected: String,
        found: String,
    },
    #[error("{operator}#{index} overlaps an edit already applied to this mutant")]
    Overlapping { operator: String, index: usize },
    #[error("unwinding {depth} edits did not restore the base program")]
    UnwindMismatch { depth: usize },
    #[error("mutant no longer parses: {0}")]
    Parse(#[from] ParseError),
}

/// Conditions that abort a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("tests fail before mutation in {module}")]
    TestsFailAtOriginal { module: String, detail: String },
    #[error(transparent)]
    CannotLoad(#[from] LoadError),
    #[error("internal inconsistency: {0}")]
    Inconsistent(#[from] MutateError),
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::CannotLoad(_) => 2,
            RunError::TestsFailAtOriginal { .. } => 3,
            RunError::Inconsistent(_) => 4,
        }
    }
}
