//! Unattended application updater.
//!
//! Keeps a set of installed applications current by asking pluggable update
//! sources whether a newer version exists and, if so, stopping the
//! application, cleaning its directory, installing the new files and
//! recording a version fingerprint beside them.
//!
//! The public API is organised into four layers:
//!
//! - **[`config`]**: parse and validate the TOML target list
//! - **[`sources`]**: the [`UpdateSource`](sources::UpdateSource) contract, its registry and built-in backends
//! - **[`orchestrator`]**: the per-target state machine and batch loop, built on
//!   [`fingerprint`], [`cleanup`], [`process`] and [`runner`]
//! - **[`commands`]**: top-level subcommand orchestration (`run`, `check`, `sources`, `init`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cleanup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod fingerprint;
pub mod logging;
pub mod orchestrator;
pub mod process;
pub mod runner;
pub mod sources;
