pub mod compiler;
pub mod config;
pub mod content;
pub mod earley;
pub mod eval;
pub mod logic;
pub mod markup;
pub mod tokenizer;
