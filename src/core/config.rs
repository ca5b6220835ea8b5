//! Compiler limits, loadable from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::logic::DEFAULT_MAX_TOKENS;
use super::tokenizer::DEFAULT_MAX_ITERATIONS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Tokenizer step cap; guards against rules that match nothing.
    pub max_lex_iterations: usize,
    /// Deepest markup nesting accepted from authored content.
    pub max_nesting_depth: usize,
    /// Longest token stream accepted for one logic unit.
    pub max_logic_tokens: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_lex_iterations: DEFAULT_MAX_ITERATIONS,
            max_nesting_depth: 64,
            max_logic_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl CompilerConfig {
    pub fn load_from_ron(path: &Path) -> Result<CompilerConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<CompilerConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }
}
