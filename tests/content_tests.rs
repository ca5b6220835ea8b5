/// Content compiler integration tests: compile passages, store them as RON,
/// and resolve their dependencies against engine state.

use serde::Deserialize;

use narrative_compiler::core::content::ContentError;
use narrative_compiler::core::earley::ParseError;
use narrative_compiler::core::eval::{EngineContext, EvalError, FunctionTable};
use narrative_compiler::core::logic::CompileError;
use narrative_compiler::core::markup::MarkupError;
use narrative_compiler::schema::content::{CompiledContent, ContentNode, DependencyKind};
use narrative_compiler::schema::value::{Qualities, State, Value};
use narrative_compiler::Compiler;

#[derive(Debug, Deserialize)]
struct Passage {
    name: String,
    source: String,
    collect_paragraphs: bool,
    dependencies: usize,
}

fn load_passages() -> Vec<Passage> {
    let contents = std::fs::read_to_string("tests/fixtures/passages.ron").unwrap();
    ron::from_str(&contents).unwrap()
}

fn compiler() -> Compiler {
    Compiler::builder().build().unwrap()
}

/// Engine stand-in that answers raw scripts of the form `Q.<name>`.
struct ScriptedEngine {
    table: FunctionTable,
}

impl EngineContext for ScriptedEngine {
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        self.table.call(name, args)
    }

    fn format(&self, formatter: &str, value: &Value) -> Result<Value, EvalError> {
        self.table.format(formatter, value)
    }

    fn run_raw_script(
        &self,
        _kind: DependencyKind,
        source: &str,
        _state: &State,
        qualities: &Qualities,
    ) -> Result<Value, EvalError> {
        let name = source
            .strip_prefix("Q.")
            .ok_or_else(|| EvalError::RawScriptUnsupported(source.to_string()))?;
        Ok(qualities.get(name).cloned().unwrap_or_default())
    }
}

fn engine() -> ScriptedEngine {
    ScriptedEngine {
        table: FunctionTable::standard()
            .with_formatter("coins", |value| format!("{} gold coins", value)),
    }
}

#[test]
fn fixture_passages_compile() {
    let compiler = compiler();
    for passage in load_passages() {
        let compiled = compiler
            .compile_content(&passage.source, passage.collect_paragraphs)
            .unwrap_or_else(|e| panic!("{} failed to compile: {}", passage.name, e));
        assert_eq!(
            compiled.dependencies.len(),
            passage.dependencies,
            "dependency count for {}",
            passage.name
        );
        let indices = compiled.root.dependency_indices();
        assert_eq!(
            indices,
            (0..passage.dependencies).collect::<Vec<_>>(),
            "indices for {}",
            passage.name
        );
    }
}

#[test]
fn inline_passages_have_at_most_one_root() {
    let compiler = compiler();
    for passage in load_passages().into_iter().filter(|p| !p.collect_paragraphs) {
        let compiled = compiler.compile_content(&passage.source, false).unwrap();
        assert!(
            !matches!(compiled.root, ContentNode::Paragraph(_)),
            "{} kept its implicit paragraph",
            passage.name
        );
    }
}

#[test]
fn compiled_content_survives_ron() {
    let compiler = compiler();
    for passage in load_passages() {
        let compiled = compiler
            .compile_content(&passage.source, passage.collect_paragraphs)
            .unwrap();
        let stored = ron::to_string(&compiled).unwrap();
        let restored: CompiledContent = ron::from_str(&stored).unwrap();
        assert_eq!(restored, compiled, "{} changed through RON", passage.name);
    }
}

#[test]
fn one_tree_resolves_against_many_states() {
    let compiled = compiler()
        .compile_content("[? if gold > 10 : Rich. ?] You have [+ gold : coins +].", false)
        .unwrap();
    let engine = engine();
    let state = State::new();

    let mut poor = Qualities::default();
    poor.insert("gold".to_string(), Value::Number(3.0));
    assert_eq!(
        compiled.resolve(&engine, &state, &poor).unwrap(),
        vec![Value::Bool(false), Value::Text("3 gold coins".to_string())]
    );

    let mut rich = Qualities::default();
    rich.insert("gold".to_string(), Value::Number(25.0));
    assert_eq!(
        compiled.resolve(&engine, &state, &rich).unwrap(),
        vec![Value::Bool(true), Value::Text("25 gold coins".to_string())]
    );
}

#[test]
fn raw_script_dependencies_go_to_engine() {
    let compiled = compiler()
        .compile_content("[? {! Q.brave !} : You stay. ?] [+ {! Q.name !} +]", false)
        .unwrap();
    let mut q = Qualities::default();
    q.insert("brave".to_string(), Value::Number(1.0));
    q.insert("name".to_string(), Value::Text("Ada".to_string()));
    assert_eq!(
        compiled.resolve(&engine(), &State::new(), &q).unwrap(),
        vec![Value::Bool(true), Value::Text("Ada".to_string())]
    );

    let plain = FunctionTable::new();
    assert_eq!(
        compiled.resolve(&plain, &State::new(), &q),
        Err(EvalError::RawScriptUnsupported("Q.brave".to_string()))
    );
}

#[test]
fn unknown_formatter_is_reported() {
    let compiled = compiler().compile_content("[+ gold : roman +]", false).unwrap();
    assert_eq!(
        compiled.resolve(&engine(), &State::new(), &Qualities::default()),
        Err(EvalError::UnknownFormatter("roman".to_string()))
    );
}

#[test]
fn relink_keeps_indices_stable() {
    let compiler = compiler();
    let mut compiled = compiler
        .compile_content("[? if torch : lit ?] [? if torch and oil : bright ?] [+ oil +]", false)
        .unwrap();
    let before = compiled.root.clone();
    compiler
        .relink(&mut compiled, |source| source.replace("torch", "lamp"))
        .unwrap();
    assert_eq!(compiled.root, before);
    assert_eq!(compiled.dependencies[1].source(), "lamp and oil");

    let mut q = Qualities::default();
    q.insert("lamp".to_string(), Value::Number(1.0));
    let values = compiled.resolve(&engine(), &State::new(), &q).unwrap();
    assert_eq!(values, vec![Value::Bool(true), Value::Bool(false), Value::Number(0.0)]);
}

#[test]
fn structure_errors_surface_as_markup_errors() {
    let compiler = compiler();
    assert!(matches!(
        compiler.compile_content("[+ a [+ b +] +]", false),
        Err(ContentError::Markup(MarkupError::NestedInsert { .. }))
    ));
    assert!(matches!(
        compiler.compile_content("[? if a : unclosed", false),
        Err(ContentError::Markup(MarkupError::Unclosed { kind: "conditional", .. }))
    ));
    assert!(matches!(
        compiler.compile_content("[+ gold : 9lives +]", false),
        Err(ContentError::Markup(MarkupError::InvalidDisplayName(_)))
    ));
}

#[test]
fn recompiling_content_is_deterministic() {
    let compiler = compiler();
    for passage in load_passages() {
        let first = compiler
            .compile_content(&passage.source, passage.collect_paragraphs)
            .unwrap();
        let second = compiler
            .compile_content(&passage.source, passage.collect_paragraphs)
            .unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn oversized_insert_fails_without_aborting() {
    let source = format!("[+ {} +]", vec!["1"; 5000].join(" + "));
    let result = compiler().compile_content(&source, false);
    assert!(matches!(
        result,
        Err(ContentError::Logic {
            error: CompileError::Parse {
                source: ParseError::TooLong { .. },
                ..
            },
            ..
        })
    ));
}
