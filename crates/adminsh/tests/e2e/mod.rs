//! End-to-end SSH integration tests for adminsh.

#[path = "../common/mod.rs"]
mod common;

mod auth;
mod connection;
mod exec;
mod shell;
