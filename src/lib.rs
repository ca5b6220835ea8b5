//! Narrative Compiler: compiles authored narrative content for a runtime.
//!
//! Two compilers share one tokenizer and Earley parsing engine: a small
//! logic language producing predicates, expressions and action lists, and
//! a rich-text markup compiler producing a content tree whose state-dependent
//! spans live in an indexed dependency list, so one compiled tree can be
//! evaluated against any number of runtime states.

pub mod core;
pub mod schema;

pub use crate::core::compiler::{Compiler, CompilerBuilder, CompilerError};
pub use crate::core::config::CompilerConfig;
pub use crate::core::eval::{EngineContext, FunctionTable};
