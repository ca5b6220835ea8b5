/// Compiler facade integration tests: configuration loading and limits.

use std::path::Path;

use narrative_compiler::core::content::ContentError;
use narrative_compiler::core::markup::MarkupError;
use narrative_compiler::schema::logic::RootKind;
use narrative_compiler::{Compiler, CompilerConfig, CompilerError};

#[test]
fn fixture_config_loads() {
    let config = CompilerConfig::load_from_ron(Path::new("tests/fixtures/compiler.ron")).unwrap();
    assert_eq!(
        config,
        CompilerConfig {
            max_lex_iterations: 20000,
            max_nesting_depth: 6,
            max_logic_tokens: 256,
        }
    );
}

#[test]
fn builder_reads_config_file() {
    let compiler = Compiler::builder()
        .config_file("tests/fixtures/compiler.ron")
        .build()
        .unwrap();
    assert_eq!(compiler.config().max_nesting_depth, 6);

    let deep =
        "[? if a : [? if b : [? if c : [? if d : [? if e : [? if f : x ?] ?] ?] ?] ?] ?]";
    assert!(matches!(
        compiler.compile_content(deep, false),
        Err(ContentError::Markup(MarkupError::TooDeep { limit: 6 }))
    ));
    let shallow = "[? if a : [? if b : x ?] ?]";
    assert_eq!(compiler.compile_content(shallow, false).unwrap().dependencies.len(), 2);
}

#[test]
fn builder_override_beats_config_file() {
    let compiler = Compiler::builder()
        .config_file("tests/fixtures/compiler.ron")
        .max_nesting_depth(32)
        .build()
        .unwrap();
    assert_eq!(compiler.config().max_nesting_depth, 32);
    assert_eq!(compiler.config().max_lex_iterations, 20000);
}

#[test]
fn malformed_config_file_fails_build() {
    let path = std::env::temp_dir().join("narrative_compiler_bad_config.ron");
    std::fs::write(&path, "(max_nesting_depth: -1,").unwrap();
    let result = Compiler::builder().config_file(path.to_str().unwrap()).build();
    assert!(matches!(result, Err(CompilerError::Config(_))));
    let _ = std::fs::remove_file(path);
}

#[test]
fn one_compiler_serves_many_threads() {
    let compiler = std::sync::Arc::new(Compiler::builder().build().unwrap());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let compiler = std::sync::Arc::clone(&compiler);
            std::thread::spawn(move || {
                let source = format!("[? if gold > {} : rich ?] [+ gold * {} +]", i, i);
                compiler.compile_content(&source, true).unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().dependencies.len(), 2);
    }
    let unit = compiler.compile_logic("gold * 2", RootKind::Expression).unwrap();
    assert_eq!(unit.source, "gold * 2");
}
