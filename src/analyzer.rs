// src/analyzer.rs

use crate::error::{panic_message, AnalysisError};
use crate::model::{FeatureCounts, Metric};
use crossbeam_channel::RecvTimeoutError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tree_sitter::{Node, Parser};

/// Turns the text of one source file into feature counts.
///
/// Implementations must be free of shared mutable state: the same analyzer
/// is called concurrently for different files.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, source: &str) -> Result<FeatureCounts, AnalysisError>;
}

/// Run `analyzer` on `source`, converting panics and (when `timeout` is
/// set) overruns into [`AnalysisError`]s.
///
/// With a timeout the analysis runs on its own thread. A thread that
/// overruns is abandoned, not killed; its result is discarded.
pub fn analyze_guarded(
    analyzer: &Arc<dyn Analyzer>,
    source: String,
    timeout: Option<Duration>,
) -> Result<FeatureCounts, AnalysisError> {
    let Some(limit) = timeout else {
        return run_caught(analyzer.as_ref(), &source);
    };

    let (tx, rx) = crossbeam_channel::bounded(1);
    let analyzer = Arc::clone(analyzer);
    thread::Builder::new()
        .name("js-miner-analyze".to_string())
        .spawn(move || {
            let _ = tx.send(run_caught(analyzer.as_ref(), &source));
        })
        .map_err(|e| AnalysisError::Worker(e.to_string()))?;

    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(AnalysisError::Timeout(limit)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(AnalysisError::Worker("analysis thread exited without a result".to_string()))
        }
    }
}

fn run_caught(analyzer: &dyn Analyzer, source: &str) -> Result<FeatureCounts, AnalysisError> {
    panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(source)))
        .unwrap_or_else(|payload| Err(AnalysisError::Panicked(panic_message(payload.as_ref()))))
}

/// JavaScript feature counter built on tree-sitter.
///
/// Files with any syntax error are rejected as a whole.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsAnalyzer;

impl Analyzer for JsAnalyzer {
    fn analyze(&self, source: &str) -> Result<FeatureCounts, AnalysisError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .map_err(|e| AnalysisError::Language(e.to_string()))?;

        let tree = parser.parse(source, None).ok_or(AnalysisError::NoTree)?;
        let root = tree.root_node();
        if root.has_error() {
            let (line, column) = first_problem(root)
                .map(|n| {
                    let p = n.start_position();
                    (p.row + 1, p.column + 1)
                })
                .unwrap_or((1, 1));
            return Err(AnalysisError::Syntax { line, column });
        }

        let bytes = source.as_bytes();
        let mut counts = FeatureCounts::new();
        let mut cursor = root.walk();
        loop {
            count_node(cursor.node(), bytes, &mut counts);

            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return Ok(counts);
                }
            }
        }
    }
}

fn count_node(node: Node<'_>, src: &[u8], counts: &mut FeatureCounts) {
    if !node.is_named() {
        return;
    }

    let kind = node.kind();
    if is_statement(kind) {
        counts.increment(Metric::Statements);
    }

    match kind {
        "function_declaration" | "function_expression" | "generator_function_declaration"
        | "generator_function" | "method_definition" => {
            if has_async_token(node) {
                counts.increment(Metric::AsyncDeclarations);
            }
        }
        "arrow_function" => {
            counts.increment(Metric::ArrowFunctionDeclarations);
            if has_async_token(node) {
                counts.increment(Metric::AsyncDeclarations);
            }
        }
        "await_expression" => counts.increment(Metric::AwaitDeclarations),
        "lexical_declaration" => match node.child_by_field_name("kind").map(|k| k.kind()) {
            Some("const") => counts.increment(Metric::ConstDeclarations),
            Some("let") => counts.increment(Metric::LetDeclarations),
            _ => {}
        },
        "class_declaration" | "class" => counts.increment(Metric::ClassDeclarations),
        "export_statement" => counts.increment(Metric::ExportDeclarations),
        "yield_expression" => counts.increment(Metric::YieldDeclarations),
        "import_statement" => counts.increment(Metric::ImportStatements),
        "new_expression" => {
            let constructor = node.child_by_field_name("constructor");
            if constructor.is_some_and(|c| c.kind() == "identifier" && text(c, src) == "Promise") {
                counts.increment(Metric::PromiseDeclarations);
            }
        }
        "call_expression" => {
            if is_promise_all_or_then(node, src) {
                counts.increment(Metric::PromiseAllAndThen);
            }
        }
        "assignment_pattern" => {
            if node.parent().is_some_and(|p| p.kind() == "formal_parameters") {
                counts.increment(Metric::DefaultParameters);
            }
        }
        "rest_pattern" => counts.increment(Metric::RestStatements),
        "spread_element" => counts.increment(Metric::SpreadArguments),
        "array_pattern" => counts.increment(Metric::ArrayDestructuring),
        "object_pattern" => counts.increment(Metric::ObjectDestructuring),
        _ => {}
    }
}

fn is_statement(kind: &str) -> bool {
    kind.ends_with("_statement")
        || matches!(
            kind,
            "lexical_declaration"
                | "variable_declaration"
                | "function_declaration"
                | "generator_function_declaration"
                | "class_declaration"
        )
}

fn has_async_token(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == "async");
    found
}

/// `Promise.all(...)` or `<anything>.then(...)`
fn is_promise_all_or_then(call: Node<'_>, src: &[u8]) -> bool {
    let Some(callee) = call.child_by_field_name("function") else {
        return false;
    };
    if callee.kind() != "member_expression" {
        return false;
    }
    let property = callee.child_by_field_name("property").map(|p| text(p, src));
    match property {
        Some("then") => true,
        Some("all") => callee
            .child_by_field_name("object")
            .is_some_and(|o| o.kind() == "identifier" && text(o, src) == "Promise"),
        _ => false,
    }
}

fn text<'a>(node: Node<'_>, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or_default()
}

/// Pre-order search for the first `ERROR` or missing node, with an explicit
/// stack so nesting depth never reaches the thread stack.
fn first_problem(root: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![root];
    let mut cursor = root.walk();
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        let children: Vec<_> = node
            .children(&mut cursor)
            .filter(|c| c.has_error() || c.is_missing())
            .collect();
        stack.extend(children.into_iter().rev());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
import fs from 'fs';
export const answer = 42;
let counter = 0;
class Greeter {
  async greet(name = 'world', ...rest) {
    await fs.promises.readFile(name);
    return [...rest];
  }
}
function* ids() { yield 1; }
const [first, second] = [1, 2];
const { a, b } = { a: 1, b: 2 };
const wait = () => new Promise((resolve) => resolve());
Promise.all([wait()]).then((xs) => xs);
"#;

    fn analyze(src: &str) -> FeatureCounts {
        JsAnalyzer.analyze(src).expect("sample should parse")
    }

    #[test]
    fn counts_modern_features() {
        let c = analyze(SAMPLE);
        assert_eq!(c.get(Metric::ImportStatements), 1);
        assert_eq!(c.get(Metric::ExportDeclarations), 1);
        assert_eq!(c.get(Metric::ConstDeclarations), 4);
        assert_eq!(c.get(Metric::LetDeclarations), 1);
        assert_eq!(c.get(Metric::ClassDeclarations), 1);
        assert_eq!(c.get(Metric::AsyncDeclarations), 1);
        assert_eq!(c.get(Metric::AwaitDeclarations), 1);
        assert_eq!(c.get(Metric::DefaultParameters), 1);
        assert_eq!(c.get(Metric::RestStatements), 1);
        assert_eq!(c.get(Metric::SpreadArguments), 1);
        assert_eq!(c.get(Metric::YieldDeclarations), 1);
        assert_eq!(c.get(Metric::ArrayDestructuring), 1);
        assert_eq!(c.get(Metric::ObjectDestructuring), 1);
        assert_eq!(c.get(Metric::ArrowFunctionDeclarations), 3);
        assert_eq!(c.get(Metric::PromiseDeclarations), 1);
        assert_eq!(c.get(Metric::PromiseAllAndThen), 2);
        // file/error tallies belong to the caller
        assert_eq!(c.get(Metric::Files), 0);
        assert_eq!(c.get(Metric::Errors), 0);
    }

    #[test]
    fn counts_statements() {
        let c = analyze("let a = 1;\nif (a) { a += 1; }\nwhile (a) { break; }\n");
        assert_eq!(c.get(Metric::Statements), 5);
    }

    #[test]
    fn legacy_code_has_no_modern_features() {
        let c = analyze("var x = 1;\nfunction f(y) { return y + x; }\n");
        assert_eq!(c.get(Metric::ConstDeclarations), 0);
        assert_eq!(c.get(Metric::LetDeclarations), 0);
        assert_eq!(c.get(Metric::ArrowFunctionDeclarations), 0);
        assert_eq!(c.get(Metric::Statements), 3);
    }

    #[test]
    fn syntax_error_is_rejected() {
        let err = JsAnalyzer.analyze("function broken( {").unwrap_err();
        assert!(matches!(err, AnalysisError::Syntax { line: 1, .. }), "got {err:?}");
    }

    #[test]
    fn deeply_nested_syntax_error_is_rejected() {
        let src = format!("x = {}1 +{};", "(".repeat(5_000), ")".repeat(5_000));
        let result = thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || JsAnalyzer.analyze(&src))
            .unwrap()
            .join()
            .unwrap();
        assert!(matches!(result, Err(AnalysisError::Syntax { line: 1, .. })), "got {result:?}");
    }

    struct Slow;

    impl Analyzer for Slow {
        fn analyze(&self, _source: &str) -> Result<FeatureCounts, AnalysisError> {
            thread::sleep(Duration::from_millis(500));
            Ok(FeatureCounts::new())
        }
    }

    struct Explodes;

    impl Analyzer for Explodes {
        fn analyze(&self, _source: &str) -> Result<FeatureCounts, AnalysisError> {
            panic!("kaboom")
        }
    }

    #[test]
    fn guarded_analysis_times_out() {
        let slow: Arc<dyn Analyzer> = Arc::new(Slow);
        let result = analyze_guarded(&slow, String::new(), Some(Duration::from_millis(20)));
        assert!(matches!(result, Err(AnalysisError::Timeout(_))));
    }

    #[test]
    fn guarded_analysis_catches_panics() {
        let bad: Arc<dyn Analyzer> = Arc::new(Explodes);
        let inline = analyze_guarded(&bad, String::new(), None);
        assert!(matches!(inline, Err(AnalysisError::Panicked(ref m)) if m == "kaboom"));
        let threaded = analyze_guarded(&bad, String::new(), Some(Duration::from_secs(5)));
        assert!(matches!(threaded, Err(AnalysisError::Panicked(_))));
    }

    #[test]
    fn guarded_analysis_passes_results_through() {
        let js: Arc<dyn Analyzer> = Arc::new(JsAnalyzer);
        let c = analyze_guarded(&js, "const x = 1;".to_string(), Some(Duration::from_secs(30))).unwrap();
        assert_eq!(c.get(Metric::ConstDeclarations), 1);
    }
}
