//! Core session logic

pub mod authorization;
pub mod command;
pub mod connector;
pub mod error;
pub mod listener;
pub mod profile;
pub mod scanner;
pub mod session;
pub mod sink;
pub mod state;
pub mod timer;
pub mod types;
