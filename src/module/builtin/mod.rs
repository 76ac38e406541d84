//! Modules that ship with hostflow

mod assert;
mod command;
mod message;

pub use assert::AssertModule;
pub use command::CommandModule;
pub use message::MessageModule;
