pub mod command;
pub mod error;
pub mod output;
pub mod runtime;
