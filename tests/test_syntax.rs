use mutscope::Language;
use mutscope::mutants::NodeMarker;
use mutscope::syntax::{self, Program};

#[test]
fn construct_rejects_syntax_errors() {
    let program = Program::parse(Language::Python, "def f(:\n    pass\n").unwrap();
    let err = program.construct().unwrap_err();
    assert!(err.to_string().starts_with("syntax error at"));
}

#[test]
fn construct_accepts_valid_programs() {
    let program = Program::parse(Language::Rust, "fn main() {}\n").unwrap();
    let executable = program.construct().unwrap();
    assert_eq!(executable.text, "fn main() {}\n");
    assert_eq!(executable.language, Language::Rust);
}

#[test]
fn splice_replaces_the_marker_bytes() {
    let program = Program::parse(Language::Python, "x = a > 0\n").unwrap();
    assert_eq!(program.splice(NodeMarker::new(6, 7), ">="), "x = a >= 0\n");
    assert_eq!(program.marker_text(NodeMarker::new(6, 7)), Some(">"));
    assert_eq!(program.marker_text(NodeMarker::new(6, 99)), None);
}

#[test]
fn python_functions_and_tests() {
    let src = "def helper():\n    pass\n\ndef test_one():\n    pass\n\nclass TestGroup:\n    def test_two(self):\n        pass\n";
    let program = Program::parse(Language::Python, src).unwrap();
    assert_eq!(syntax::list_functions(&program), vec!["helper"]);
    assert_eq!(syntax::list_tests(&program), vec!["test_one", "TestGroup::test_two"]);
}

#[test]
fn rust_tests_need_the_attribute() {
    let src = "fn helper() {}\n\n#[cfg(test)]\nmod tests {\n    #[test]\n    fn works() {}\n\n    fn not_a_test() {}\n}\n";
    let program = Program::parse(Language::Rust, src).unwrap();
    assert_eq!(syntax::list_tests(&program), vec!["works"]);
}

#[test]
fn javascript_tests_are_named_by_their_string() {
    let src = "test('adds numbers', () => {});\nit(\"handles zero\", () => {});\nfoo('x');\n";
    let program = Program::parse(Language::JavaScript, src).unwrap();
    assert_eq!(syntax::list_tests(&program), vec!["adds numbers", "handles zero"]);
}

#[test]
fn javascript_arrow_functions_are_named() {
    let src = "const add = (a, b) => a + b;\nfunction sub(a, b) { return a - b; }\n";
    let program = Program::parse(Language::JavaScript, src).unwrap();
    assert_eq!(syntax::list_functions(&program), vec!["add", "sub"]);
}

#[test]
fn function_roots_narrow_to_the_named_function() {
    let src = "def a():\n    pass\n\ndef b():\n    pass\n";
    let program = Program::parse(Language::Python, src).unwrap();
    assert_eq!(syntax::function_roots(&program, None).len(), 2);
    let roots = syntax::function_roots(&program, Some("b"));
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].start_position().row, 3);
    assert!(syntax::function_roots(&program, Some("c")).is_empty());
}
