//! Mutation operator catalog.
//!
//! Each operator inspects one syntax node at a time and proposes rewrites of that
//! node (or of one of its tokens). The driver in [`candidates`] walks the scoped
//! functions and turns rewrites into [`Mutation`] records.

use std::collections::BTreeSet;

use tree_sitter::Node;

use crate::Language;
use crate::mutants::{Mutation, NodeMarker};
use crate::syntax::{self, Program};

/// Where mutations may be placed.
#[derive(Debug, Clone, Default)]
pub struct MutationScope {
    /// Only mutate inside this function.
    pub function: Option<String>,
    /// Only mutate nodes with these markers (coverage-guided mode).
    pub covered: Option<BTreeSet<NodeMarker>>,
}

impl MutationScope {
    pub fn function(name: impl Into<String>) -> Self {
        MutationScope {
            function: Some(name.into()),
            covered: None,
        }
    }
}

pub trait MutationOperator: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Rewrites of `node`: the node actually replaced and its replacement text.
    fn rewrites<'t>(&self, node: Node<'t>, program: &'t Program) -> Vec<(Node<'t>, String)>;
}

/// Every operator, sorted by name. Sorting fixes mutant numbering.
pub fn all() -> Vec<Box<dyn MutationOperator>> {
    let mut ops: Vec<Box<dyn MutationOperator>> = vec![
        Box::new(Arithmetic),
        Box::new(BlockRemove),
        Box::new(BoolFlip),
        Box::new(Boundary),
        Box::new(LogicFlip),
        Box::new(NegateCmp),
        Box::new(NegateEq),
        Box::new(NegateRemove),
        Box::new(ReturnVal),
    ];
    sort_operators(&mut ops);
    ops
}

pub fn sort_operators(ops: &mut [Box<dyn MutationOperator>]) {
    ops.sort_by_key(|op| op.name());
}

/// Select operators by name, keeping catalog order.
pub fn by_names(names: &[String]) -> Result<Vec<Box<dyn MutationOperator>>, String> {
    let catalog = all();
    if let Some(unknown) = names.iter().find(|n| !catalog.iter().any(|op| op.name() == n.as_str())) {
        let known: Vec<_> = catalog.iter().map(|op| op.name()).collect();
        return Err(format!("unknown operator '{}'. Available: {}", unknown, known.join(", ")));
    }
    Ok(catalog
        .into_iter()
        .filter(|op| names.iter().any(|n| n == op.name()))
        .collect())
}

/// Enumerate every mutation `op` proposes for `program` within `scope`.
pub fn candidates(op: &dyn MutationOperator, program: &Program, scope: &MutationScope) -> Vec<Mutation> {
    let lines = program.lines();
    let mut out = Vec::new();
    for root in syntax::function_roots(program, scope.function.as_deref()) {
        walk(root, program, &mut |node| {
            for (target, replacement) in op.rewrites(node, program) {
                let marker = syntax::marker_of(target);
                if scope.covered.as_ref().is_some_and(|c| !c.contains(&marker)) {
                    continue;
                }
                let pos = target.start_position();
                let (context_before, context_after) = get_context(&lines, pos.row, 2);
                out.push(Mutation {
                    operator: op.name().to_string(),
                    node: marker,
                    index: out.len(),
                    line: pos.row + 1,
                    column: pos.column + 1,
                    original: program.node_text(target).to_string(),
                    replacement,
                    context_before,
                    context_after,
                });
            }
        });
    }
    out
}

/// Markers of every node any operator could mutate; the denominator for coverage.
pub fn mutable_nodes(ops: &[Box<dyn MutationOperator>], program: &Program, function: Option<&str>) -> BTreeSet<NodeMarker> {
    let scope = MutationScope {
        function: function.map(str::to_string),
        covered: None,
    };
    ops.iter()
        .flat_map(|op| candidates(op.as_ref(), program, &scope))
        .map(|m| m.node)
        .collect()
}

fn walk<'t>(node: Node<'t>, program: &'t Program, f: &mut impl FnMut(Node<'t>)) {
    if syntax::is_noise(node, program.text(), program.language()) {
        return;
    }
    f(node);
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            walk(child, program, f);
        }
    }
}

fn get_context(lines: &[&str], line_idx: usize, range: usize) -> (Vec<String>, Vec<String>) {
    let start = line_idx.saturating_sub(range).min(lines.len());
    let end = (line_idx + range + 1).min(lines.len());
    let before = lines[start..line_idx.min(lines.len())].iter().map(|s| s.to_string()).collect();
    let after = if line_idx + 1 < end {
        lines[line_idx + 1..end].iter().map(|s| s.to_string()).collect()
    } else {
        vec![]
    };
    (before, after)
}

fn is_binary(kind: &str, language: Language) -> bool {
    match language {
        Language::Python => matches!(kind, "comparison_operator" | "boolean_operator" | "binary_operator"),
        _ => kind == "binary_expression",
    }
}

/// Operator tokens of a binary-like node (`a < b < c` has two).
fn operator_tokens<'t>(node: Node<'t>, language: Language) -> Vec<Node<'t>> {
    if !is_binary(node.kind(), language) {
        return vec![];
    }
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .filter(|child| !child.is_named())
        .collect()
}

fn token_rewrites<'t>(
    node: Node<'t>,
    program: &'t Program,
    table: impl Fn(&str, Language) -> Option<&'static str>,
) -> Vec<(Node<'t>, String)> {
    operator_tokens(node, program.language())
        .into_iter()
        .filter_map(|tok| table(program.node_text(tok), program.language()).map(|r| (tok, r.to_string())))
        .collect()
}

pub struct Arithmetic;

impl MutationOperator for Arithmetic {
    fn name(&self) -> &'static str {
        "arith"
    }

    fn description(&self) -> &'static str {
        "swap arithmetic operators (+ -, * /)"
    }

    fn rewrites<'t>(&self, node: Node<'t>, program: &'t Program) -> Vec<(Node<'t>, String)> {
        // String concatenation is formatting, not arithmetic.
        let left_is_string = node.child(0).is_some_and(|left| {
            matches!(
                left.kind(),
                "string" | "concatenated_string" | "template_string" | "string_literal"
            )
        });
        token_rewrites(node, program, |op, language| match op {
            "+" if left_is_string => None,
            "+" => Some("-"),
            "-" => Some("+"),
            "*" => Some("/"),
            "/" => Some("*"),
            "%" => Some("/"),
            "//" if language == Language::Python => Some("/"),
            "**" if language != Language::Rust => Some("*"),
            _ => None,
        })
    }
}

pub struct Boundary;

impl MutationOperator for Boundary {
    fn name(&self) -> &'static str {
        "boundary"
    }

    fn description(&self) -> &'static str {
        "shift comparison boundaries (< to <=)"
    }

    fn rewrites<'t>(&self, node: Node<'t>, program: &'t Program) -> Vec<(Node<'t>, String)> {
        token_rewrites(node, program, |op, _| match op {
            ">" => Some(">="),
            ">=" => Some(">"),
            "<" => Some("<="),
            "<=" => Some("<"),
            _ => None,
        })
    }
}

pub struct NegateCmp;

impl MutationOperator for NegateCmp {
    fn name(&self) -> &'static str {
        "negate_cmp"
    }

    fn description(&self) -> &'static str {
        "negate ordering comparisons (> to <=)"
    }

    fn rewrites<'t>(&self, node: Node<'t>, program: &'t Program) -> Vec<(Node<'t>, String)> {
        token_rewrites(node, program, |op, _| match op {
            ">" => Some("<="),
            ">=" => Some("<"),
            "<" => Some(">="),
            "<=" => Some(">"),
            _ => None,
        })
    }
}

pub struct NegateEq;

impl MutationOperator for NegateEq {
    fn name(&self) -> &'static str {
        "negate_eq"
    }

    fn description(&self) -> &'static str {
        "negate equality, identity and membership tests"
    }

    fn rewrites<'t>(&self, node: Node<'t>, program: &'t Program) -> Vec<(Node<'t>, String)> {
        token_rewrites(node, program, |op, language| match op {
            "==" => Some("!="),
            "!=" => Some("=="),
            "===" => Some("!=="),
            "!==" => Some("==="),
            "is" if language == Language::Python => Some("is not"),
            "is not" => Some("is"),
            "in" if language == Language::Python => Some("not in"),
            "not in" => Some("in"),
            _ => None,
        })
    }
}

pub struct LogicFlip;

impl MutationOperator for LogicFlip {
    fn name(&self) -> &'static str {
        "logic_flip"
    }

    fn description(&self) -> &'static str {
        "swap logical connectives (and/or, &&/||)"
    }

    fn rewrites<'t>(&self, node: Node<'t>, program: &'t Program) -> Vec<(Node<'t>, String)> {
        token_rewrites(node, program, |op, language| match op {
            "and" => Some("or"),
            "or" => Some("and"),
            "&&" => Some("||"),
            "||" => Some("&&"),
            "??" if language.is_js_family() => Some("||"),
            _ => None,
        })
    }
}

pub struct NegateRemove;

impl MutationOperator for NegateRemove {
    fn name(&self) -> &'static str {
        "negate_remove"
    }

    fn description(&self) -> &'static str {
        "drop a logical negation (not x to x)"
    }

    fn rewrites<'t>(&self, node: Node<'t>, program: &'t Program) -> Vec<(Node<'t>, String)> {
        let operand = match (program.language(), node.kind()) {
            (Language::Python, "not_operator") => node.child_by_field_name("argument"),
            (_, "unary_expression") => {
                let bang = node.child(0).is_some_and(|op| op.kind() == "!");
                if !bang {
                    return vec![];
                }
                node.child_by_field_name("argument").or_else(|| node.child(1))
            }
            _ => None,
        };
        operand
            .map(|operand| vec![(node, program.node_text(operand).to_string())])
            .unwrap_or_default()
    }
}

pub struct BoolFlip;

impl MutationOperator for BoolFlip {
    fn name(&self) -> &'static str {
        "bool_flip"
    }

    fn description(&self) -> &'static str {
        "flip boolean literals"
    }

    fn rewrites<'t>(&self, node: Node<'t>, program: &'t Program) -> Vec<(Node<'t>, String)> {
        if !node.is_named() || !matches!(node.kind(), "true" | "false" | "boolean_literal") {
            return vec![];
        }
        // Literal returns belong to return_val.
        if node.parent().is_some_and(|p| matches!(p.kind(), "return_statement" | "return_expression")) {
            return vec![];
        }
        let flipped = match program.node_text(node) {
            "True" => "False",
            "False" => "True",
            "true" => "false",
            "false" => "true",
            _ => return vec![],
        };
        vec![(node, flipped.to_string())]
    }
}

pub struct ReturnVal;

impl ReturnVal {
    fn python(expr: Option<&str>) -> &'static str {
        let Some(value) = expr.map(str::trim) else {
            return "return None";
        };
        if value == "None" {
            "return \"\""
        } else if value == "True" {
            "return False"
        } else if value == "False" {
            "return True"
        } else if value.starts_with(['"', '\'']) || value.starts_with("f\"") || value.starts_with("f'") {
            "return \"\""
        } else if value.starts_with('[') {
            "return []"
        } else if value.starts_with('{') {
            "return {}"
        } else if value == "0" {
            "return 1"
        } else if value.parse::<f64>().is_ok() {
            "return 0"
        } else {
            "return None"
        }
    }

    fn rust(expr: Option<&str>) -> Option<&'static str> {
        let value = expr?.trim();
        match value {
            "true" => Some("return false"),
            "false" => Some("return true"),
            "()" | "Ok(())" => None,
            "0" => Some("return 1"),
            _ if value.starts_with('"') => Some("return \"\".to_string()"),
            _ if value.starts_with("vec!") || value.starts_with("Vec::") => Some("return vec![]"),
            _ => Some("return Default::default()"),
        }
    }

    fn js(expr: Option<&str>) -> &'static str {
        let Some(value) = expr.map(str::trim) else {
            return "return undefined;";
        };
        if value == "true" {
            "return false;"
        } else if value == "false" {
            "return true;"
        } else if value == "null" || value == "undefined" {
            "return \"\";"
        } else if value == "0" {
            "return 1;"
        } else if value.starts_with(['"', '\'', '`']) {
            "return \"\";"
        } else if value.starts_with('[') {
            "return [];"
        } else if value == "{}" {
            "return null;"
        } else if value.starts_with('{') {
            "return {};"
        } else if value.parse::<f64>().is_ok() {
            "return 0;"
        } else {
            "return null;"
        }
    }
}

impl MutationOperator for ReturnVal {
    fn name(&self) -> &'static str {
        "return_val"
    }

    fn description(&self) -> &'static str {
        "replace returned values with a default of another shape"
    }

    fn rewrites<'t>(&self, node: Node<'t>, program: &'t Program) -> Vec<(Node<'t>, String)> {
        if !matches!(node.kind(), "return_statement" | "return_expression") {
            return vec![];
        }
        let expr = (0..node.child_count())
            .filter_map(|i| node.child(i))
            .find(|c| c.is_named() && c.kind() != "comment")
            .map(|c| program.node_text(c));
        let replacement = match program.language() {
            Language::Python => Some(Self::python(expr)),
            Language::Rust => Self::rust(expr),
            _ => Some(Self::js(expr)),
        };
        replacement
            .map(|r| vec![(node, r.to_string())])
            .unwrap_or_default()
    }
}

pub struct BlockRemove;

impl MutationOperator for BlockRemove {
    fn name(&self) -> &'static str {
        "block_remove"
    }

    fn description(&self) -> &'static str {
        "empty the body of a conditional or loop"
    }

    fn rewrites<'t>(&self, node: Node<'t>, program: &'t Program) -> Vec<(Node<'t>, String)> {
        let language = program.language();
        let mut bodies = Vec::new();
        match (language, node.kind()) {
            (Language::Python, "if_statement") => bodies.extend(node.child_by_field_name("consequence")),
            (Language::Python, "for_statement" | "while_statement") => {
                bodies.extend(node.child_by_field_name("body"))
            }
            (Language::Rust, "if_expression") => bodies.extend(node.child_by_field_name("consequence")),
            (Language::Rust, "while_expression" | "for_expression" | "loop_expression") => {
                bodies.extend(node.child_by_field_name("body"))
            }
            (_, "if_statement") => {
                bodies.extend(node.child_by_field_name("consequence"));
                // `else { .. }`; an `else if` is its own if_statement.
                if let Some(alt) = node.child_by_field_name("alternative") {
                    bodies.extend((0..alt.child_count()).filter_map(|i| alt.child(i)).filter(|c| c.kind() == "statement_block"));
                }
            }
            (_, "for_statement" | "for_in_statement" | "while_statement") => {
                bodies.extend(node.child_by_field_name("body"))
            }
            _ => {}
        }

        let (block_kind, empty) = match language {
            Language::Python => ("block", "pass"),
            Language::Rust => ("block", "{}"),
            _ => ("statement_block", "{}"),
        };
        bodies
            .into_iter()
            .filter(|body| body.kind() == block_kind)
            .filter(|body| program.node_text(*body).trim() != empty)
            .map(|body| (body, empty.to_string()))
            .collect()
    }
}
