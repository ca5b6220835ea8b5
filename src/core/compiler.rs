//! Compiler facade: one validated logic grammar plus the content feature
//! tokenizers, built once and shared.

use std::path::Path;
use thiserror::Error;
use tracing::debug;

use super::config::{CompilerConfig, ConfigError};
use super::content::{ContentCompiler, ContentError};
use super::earley::GrammarError;
use super::logic::{CompileError, LogicCompiler};
use super::tokenizer::TokenizeError;
use crate::schema::content::CompiledContent;
use crate::schema::logic::{CompiledLogicUnit, RootKind};

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("grammar error: {0}")]
    Grammar(#[from] GrammarError),
    #[error("tokenizer error: {0}")]
    Tokenize(#[from] TokenizeError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Built via `Compiler::builder()`.
pub struct Compiler {
    config: CompilerConfig,
    logic: LogicCompiler,
    content: ContentCompiler,
}

pub struct CompilerBuilder {
    config: Option<CompilerConfig>,
    config_path: Option<String>,
    max_nesting_depth: Option<usize>,
    max_lex_iterations: Option<usize>,
    max_logic_tokens: Option<usize>,
}

impl Compiler {
    pub fn builder() -> CompilerBuilder {
        CompilerBuilder {
            config: None,
            config_path: None,
            max_nesting_depth: None,
            max_lex_iterations: None,
            max_logic_tokens: None,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile_logic(
        &self,
        source: &str,
        root: RootKind,
    ) -> Result<CompiledLogicUnit, CompileError> {
        self.logic.compile(source, root)
    }

    pub fn compile_content(
        &self,
        source: &str,
        collect_paragraphs: bool,
    ) -> Result<CompiledContent, ContentError> {
        self.content.compile(&self.logic, source, collect_paragraphs)
    }

    /// Rewrite and recompile every dependency of `content` in place.
    pub fn relink(
        &self,
        content: &mut CompiledContent,
        rewrite: impl FnMut(&str) -> String,
    ) -> Result<(), ContentError> {
        content.relink(&self.logic, rewrite)
    }
}

impl CompilerBuilder {
    /// Provide a config directly (for testing without files).
    pub fn config(mut self, config: CompilerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn config_file(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    pub fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = Some(depth);
        self
    }

    pub fn max_lex_iterations(mut self, iterations: usize) -> Self {
        self.max_lex_iterations = Some(iterations);
        self
    }

    pub fn max_logic_tokens(mut self, tokens: usize) -> Self {
        self.max_logic_tokens = Some(tokens);
        self
    }

    /// Explicit limits override the config file, which overrides a config
    /// passed directly.
    pub fn build(self) -> Result<Compiler, CompilerError> {
        let mut config = match &self.config_path {
            Some(path) => CompilerConfig::load_from_ron(Path::new(path))?,
            None => self.config.unwrap_or_default(),
        };
        if let Some(depth) = self.max_nesting_depth {
            config.max_nesting_depth = depth;
        }
        if let Some(iterations) = self.max_lex_iterations {
            config.max_lex_iterations = iterations;
        }
        if let Some(tokens) = self.max_logic_tokens {
            config.max_logic_tokens = tokens;
        }
        debug!(
            max_lex_iterations = config.max_lex_iterations,
            max_nesting_depth = config.max_nesting_depth,
            max_logic_tokens = config.max_logic_tokens,
            "building compiler"
        );

        let logic = LogicCompiler::with_max_iterations(config.max_lex_iterations)?
            .with_max_tokens(config.max_logic_tokens);
        let content = ContentCompiler::new(config.max_lex_iterations, config.max_nesting_depth)?;
        Ok(Compiler { config, logic, content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::earley::ParseError;

    #[test]
    fn builds_with_defaults() {
        let compiler = Compiler::builder().build().unwrap();
        assert_eq!(compiler.config(), &CompilerConfig::default());
    }

    #[test]
    fn explicit_limits_override_config() {
        let compiler = Compiler::builder()
            .config(CompilerConfig {
                max_lex_iterations: 10,
                max_nesting_depth: 10,
                max_logic_tokens: 50,
            })
            .max_nesting_depth(3)
            .build()
            .unwrap();
        assert_eq!(compiler.config().max_nesting_depth, 3);
        assert_eq!(compiler.config().max_lex_iterations, 10);
    }

    #[test]
    fn missing_config_file_fails() {
        let result = Compiler::builder().config_file("no/such/compiler.ron").build();
        assert!(matches!(result, Err(CompilerError::Config(ConfigError::Io(_)))));
    }

    #[test]
    fn lex_limit_reaches_both_compilers() {
        let compiler = Compiler::builder().max_lex_iterations(3).build().unwrap();
        assert!(matches!(
            compiler.compile_logic("a + b + c + d", RootKind::Expression),
            Err(CompileError::Lex {
                source: TokenizeError::Runaway(3),
                ..
            })
        ));
        assert!(matches!(
            compiler.compile_content("*a* *b* *c*", false),
            Err(ContentError::Tokenize(TokenizeError::Runaway(3)))
        ));
    }

    #[test]
    fn logic_token_limit_reaches_content() {
        let compiler = Compiler::builder().max_logic_tokens(5).build().unwrap();
        assert!(compiler.compile_logic("a + b + c", RootKind::Expression).is_ok());
        assert!(matches!(
            compiler.compile_logic("a + b + c + d", RootKind::Expression),
            Err(CompileError::Parse {
                offset: 10,
                source: ParseError::TooLong { limit: 5, .. },
            })
        ));
        assert!(matches!(
            compiler.compile_content("[+ a + b + c + d +]", false),
            Err(ContentError::Logic { .. })
        ));
    }

    #[test]
    fn compiler_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Compiler>();
    }
}
