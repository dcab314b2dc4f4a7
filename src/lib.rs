pub mod cli;
pub mod commands;
pub mod protocol;

pub use cli::{Input, prompt, split_words};
pub use commands::Commands;
pub use protocol::*;
