//! Core data types shared by the relay components.

pub mod chat;
pub mod tools;
pub mod usage;

pub use chat::*;
pub use tools::*;
pub use usage::*;
