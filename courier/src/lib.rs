//! The `courier` command: configuration loading, job sources and the
//! `send` / `render` / `check` operations behind the CLI.

pub mod cli;
pub mod config;
pub mod controller;
