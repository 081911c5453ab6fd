//! Resolves target and test modules inside the working tree a run executes in.

use std::path::{Path, PathBuf};

use crate::error::LoadError;
use crate::syntax::{self, Program};
use crate::{Language, detect_language};

/// A source file to mutate, optionally narrowed to one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub path: String,
    pub function: Option<String>,
}

impl TargetSpec {
    pub fn new(path: impl Into<String>, function: Option<String>) -> Self {
        TargetSpec {
            path: path.into(),
            function,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub path: PathBuf,
    pub language: Language,
    pub source: String,
    pub function: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// `module::name`, the key coverage reports use.
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct TestModule {
    pub name: String,
    pub path: PathBuf,
    pub language: Option<Language>,
    pub tests: Vec<TestCase>,
}

pub struct ModuleLoader {
    root: PathBuf,
}

impl ModuleLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ModuleLoader { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, name: &str) -> Result<(PathBuf, String), LoadError> {
        let path = self.root.join(name);
        let source = std::fs::read_to_string(&path).map_err(|e| LoadError::new(name, e))?;
        Ok((path, source))
    }

    pub fn load_target(&self, spec: &TargetSpec) -> Result<Target, LoadError> {
        let (path, source) = self.read(&spec.path)?;
        let language = detect_language(&path).ok_or_else(|| {
            LoadError::new(
                &spec.path,
                "unsupported file type. Supported: .py, .rs, .js, .ts, .tsx, .jsx",
            )
        })?;

        if let Some(function) = &spec.function {
            let program = Program::parse(language, source.as_str()).map_err(|e| LoadError::new(&spec.path, e))?;
            let available = syntax::list_functions(&program);
            if !available.iter().any(|n| n == function) {
                return Err(LoadError::new(
                    &spec.path,
                    format!("function '{}' not found. Available: {}", function, available.join(", ")),
                ));
            }
        }

        Ok(Target {
            name: spec.path.clone(),
            path,
            language,
            source,
            function: spec.function.clone(),
        })
    }

    /// Load `path` or `path::test_name`.
    pub fn load_tests(&self, spec: &str) -> Result<TestModule, LoadError> {
        let (name, selector) = match spec.split_once("::") {
            Some((name, selector)) => (name, Some(selector)),
            None => (spec, None),
        };
        let (path, source) = self.read(name)?;
        let language = detect_language(&path);

        let mut names = match language {
            Some(language) => {
                let program = Program::parse(language, source).map_err(|e| LoadError::new(name, e))?;
                syntax::list_tests(&program)
            }
            None => vec![],
        };
        if let Some(selector) = selector {
            if !names.iter().any(|n| n == selector) {
                return Err(LoadError::new(spec, format!("no test named '{selector}' in {name}")));
            }
            names.retain(|n| n == selector);
        }

        // A module we cannot look inside runs as a single test.
        let tests = if names.is_empty() {
            vec![TestCase {
                id: name.to_string(),
                name: name.to_string(),
            }]
        } else {
            names
                .into_iter()
                .map(|n| TestCase {
                    id: format!("{name}::{n}"),
                    name: n,
                })
                .collect()
        };

        Ok(TestModule {
            name: name.to_string(),
            path,
            language,
            tests,
        })
    }
}
