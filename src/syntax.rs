//! tree-sitter backed program representation.
//!
//! A [`Program`] is source text plus its syntax tree. Mutations are byte-range
//! splices over the text; every splice produces a freshly parsed `Program`.

use tree_sitter::{Node, Parser, Tree};

use crate::Language;
use crate::error::{ConstructionError, MutateError, ParseError};
use crate::mutants::{Mutation, NodeMarker};

pub fn grammar(language: Language) -> tree_sitter::Language {
    match language {
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::Rust => tree_sitter_rust::LANGUAGE.into(),
        Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
    }
}

fn parse_tree(language: Language, source: &str) -> Result<Tree, ParseError> {
    let mut parser = Parser::new();
    parser.set_language(&grammar(language))?;
    parser.parse(source, None).ok_or(ParseError::NoTree)
}

#[derive(Debug, Clone)]
pub struct Program {
    language: Language,
    text: String,
    tree: Tree,
}

/// A program that parsed without syntax errors and may be handed to a test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable {
    pub language: Language,
    pub text: String,
}

impl Program {
    pub fn parse(language: Language, text: impl Into<String>) -> Result<Self, ParseError> {
        let text = text.into();
        let tree = parse_tree(language, &text)?;
        Ok(Program { language, text, tree })
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn node_text(&self, node: Node<'_>) -> &str {
        &self.text[node.start_byte()..node.end_byte()]
    }

    pub fn marker_text(&self, marker: NodeMarker) -> Option<&str> {
        self.text.get(marker.start..marker.end)
    }

    pub fn lines(&self) -> Vec<&str> {
        self.text.lines().collect()
    }

    /// Replace the bytes of `marker` with `replacement`, returning the new text.
    pub fn splice(&self, marker: NodeMarker, replacement: &str) -> String {
        let mut out = String::with_capacity(self.text.len() + replacement.len());
        out.push_str(&self.text[..marker.start]);
        out.push_str(replacement);
        out.push_str(&self.text[marker.end..]);
        out
    }

    /// Apply one mutation recorded against this exact text.
    pub fn apply(&self, mutation: &Mutation) -> Result<Program, MutateError> {
        self.apply_at(mutation, mutation.node)
    }

    /// Apply `mutation` at `marker`, which may differ from `mutation.node` once
    /// earlier edits have shifted the text.
    pub fn apply_at(&self, mutation: &Mutation, marker: NodeMarker) -> Result<Program, MutateError> {
        let found = self.marker_text(marker);
        if found != Some(mutation.original.as_str()) {
            return Err(MutateError::ReplayMismatch {
                operator: mutation.operator.clone(),
                index: mutation.index,
                start: marker.start,
                end: marker.end,
                expected: mutation.original.clone(),
                found: found.unwrap_or_default().to_string(),
            });
        }
        let text = self.splice(marker, &mutation.replacement);
        Ok(Program::parse(self.language, text)?)
    }

    /// Turn the program into something runnable, rejecting syntax errors.
    pub fn construct(&self) -> Result<Executable, ConstructionError> {
        let root = self.root();
        if root.has_error() {
            let bad = first_error(root).unwrap_or(root);
            let pos = bad.start_position();
            let snippet = self.node_text(bad).lines().next().unwrap_or_default().to_string();
            return Err(ConstructionError {
                line: pos.row + 1,
                column: pos.column + 1,
                snippet,
            });
        }
        Ok(Executable {
            language: self.language,
            text: self.text.clone(),
        })
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.has_error() || child.is_missing() {
                if let Some(found) = first_error(child) {
                    return Some(found);
                }
            }
        }
    }
    None
}

/// Name of the function `node` defines, if it defines one.
pub fn function_name<'t>(node: Node<'t>, source: &'t str, language: Language) -> Option<&'t str> {
    let named = match language {
        Language::Python => node.kind() == "function_definition",
        Language::Rust => node.kind() == "function_item",
        _ => match node.kind() {
            "function_declaration" | "generator_function_declaration" | "method_definition" => true,
            // const foo = () => {} / const foo = function() {}
            "variable_declarator" => node.child_by_field_name("value").is_some_and(|v| {
                matches!(v.kind(), "arrow_function" | "function_expression" | "function")
            }),
            _ => false,
        },
    };
    if !named {
        return None;
    }
    let name = node.child_by_field_name("name")?;
    Some(&source[name.start_byte()..name.end_byte()])
}

/// Roots of the subtrees to mutate: the named function, or every top-most function.
pub fn function_roots<'t>(program: &'t Program, name: Option<&str>) -> Vec<Node<'t>> {
    let mut roots = Vec::new();
    collect_roots(program.root(), program, name, &mut roots);
    if name.is_some() {
        roots.truncate(1);
    }
    roots
}

fn collect_roots<'t>(node: Node<'t>, program: &'t Program, name: Option<&str>, out: &mut Vec<Node<'t>>) {
    if let Some(found) = function_name(node, program.text(), program.language()) {
        match name {
            Some(wanted) if wanted != found => {}
            _ => {
                out.push(node);
                return;
            }
        }
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            collect_roots(child, program, name, out);
        }
    }
}

pub fn list_functions(program: &Program) -> Vec<String> {
    let mut names = Vec::new();
    visit(program.root(), &mut |node| {
        if let Some(name) = function_name(node, program.text(), program.language()) {
            if !name.starts_with("__") && !name.starts_with("test_") {
                names.push(name.to_string());
            }
        }
    });
    names
}

/// Names of the test cases a test module defines.
pub fn list_tests(program: &Program) -> Vec<String> {
    let source = program.text();
    let language = program.language();
    let mut tests = Vec::new();
    visit(program.root(), &mut |node| match language {
        Language::Python => {
            let Some(name) = function_name(node, source, language) else {
                return;
            };
            if !name.starts_with("test") {
                return;
            }
            match enclosing_class(node, source) {
                Some(class) => tests.push(format!("{class}::{name}")),
                None => tests.push(name.to_string()),
            }
        }
        Language::Rust => {
            let Some(name) = function_name(node, source, language) else {
                return;
            };
            let mut prev = node.prev_named_sibling();
            while let Some(attr) = prev.filter(|p| p.kind() == "attribute_item") {
                if program.node_text(attr).contains("test") {
                    tests.push(name.to_string());
                    return;
                }
                prev = attr.prev_named_sibling();
            }
        }
        _ => {
            if node.kind() != "call_expression" {
                return;
            }
            let callee = node.child_by_field_name("function").map(|f| program.node_text(f));
            if !matches!(callee, Some("test" | "it")) {
                return;
            }
            let first_arg = node
                .child_by_field_name("arguments")
                .and_then(|args| args.named_child(0))
                .filter(|arg| matches!(arg.kind(), "string" | "template_string"));
            if let Some(arg) = first_arg {
                let raw = program.node_text(arg);
                tests.push(raw.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string());
            }
        }
    });
    tests
}

fn enclosing_class<'t>(node: Node<'t>, source: &'t str) -> Option<&'t str> {
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.kind() == "class_definition" {
            let name = parent.child_by_field_name("name")?;
            return Some(&source[name.start_byte()..name.end_byte()]);
        }
        current = parent.parent();
    }
    None
}

/// Pre-order walk over every node.
pub fn visit<'t>(node: Node<'t>, f: &mut impl FnMut(Node<'t>)) {
    f(node);
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            visit(child, f);
        }
    }
}

/// Nodes that are not business logic: logging, printing, docstrings.
pub fn is_noise(node: Node<'_>, source: &str, language: Language) -> bool {
    fn text<'s>(n: Node<'_>, source: &'s str) -> &'s str {
        &source[n.start_byte()..n.end_byte()]
    }
    match (language, node.kind()) {
        (Language::Python, "call") => node.child(0).is_some_and(|func| {
            let t = text(func, source);
            t == "print" || t.starts_with("logging.") || t.starts_with("log.")
        }),
        (Language::Rust, "macro_invocation") => node.child(0).is_some_and(|mac| {
            let t = text(mac, source);
            ["print", "eprint", "log", "debug", "info", "warn", "error", "trace", "format"]
                .iter()
                .any(|p| t.starts_with(p))
        }),
        (l, "call_expression") if l.is_js_family() => node
            .child_by_field_name("function")
            .is_some_and(|func| text(func, source).starts_with("console.")),
        (l, "expression_statement") if l != Language::Rust => {
            node.child_count() == 1 && node.child(0).is_some_and(|c| c.kind() == "string")
        }
        _ => false,
    }
}

pub fn marker_of(node: Node<'_>) -> NodeMarker {
    NodeMarker::new(node.start_byte(), node.end_byte())
}
