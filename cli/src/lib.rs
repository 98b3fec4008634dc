//! pbench-cli library: command parsing and flows, exposed for unit tests.

pub mod commands;
pub mod flow;
