//! CLI commands.

pub mod check;
pub mod classify;
pub mod common;
pub mod config;
pub mod send;
