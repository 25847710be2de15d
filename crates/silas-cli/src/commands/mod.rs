//! Subcommand implementations for the `silas` binary.

pub mod init;
pub mod start;
