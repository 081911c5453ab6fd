pub mod bindings;
pub mod config;
pub mod controller;
pub mod copy_tree;
pub mod coverage;
pub mod error;
pub mod hom;
pub mod loader;
pub mod mutants;
pub mod mutator;
pub mod operators;
pub mod output;
pub mod runner;
pub mod score;
pub mod state;
pub mod syntax;
pub mod views;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Python,
    Rust,
    JavaScript,
    TypeScript,
    Tsx,
}

impl Language {
    pub fn is_js_family(self) -> bool {
        matches!(self, Language::JavaScript | Language::TypeScript | Language::Tsx)
    }
}

pub fn detect_language(path: &std::path::Path) -> Option<Language> {
    match path.extension()?.to_str()? {
        "py" => Some(Language::Python),
        "rs" => Some(Language::Rust),
        "js" | "mjs" | "cjs" => Some(Language::JavaScript),
        "ts" | "mts" | "cts" => Some(Language::TypeScript),
        "tsx" | "jsx" => Some(Language::Tsx),
        _ => None,
    }
}
