pub mod content;
pub mod logic;
pub mod value;
