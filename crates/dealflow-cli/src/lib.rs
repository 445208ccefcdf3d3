//! Library half of the `dealflow` binary, so integration tests can drive
//! the same command code paths.

pub mod commands;
