//! SQLUP - Forward-only SQL migrations
//!
//! Command-line front end over [`sqlup_runtime::Upgrader`].

pub mod cli;

pub use sqlup_core;
pub use sqlup_runtime;
