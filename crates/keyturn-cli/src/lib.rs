//! # keyturn-cli
//!
//! Command-line front end for the secret lifecycle controller.
//!
//! Provides commands for:
//! - Creating bundles from a manifest
//! - Inspecting bundles without revealing values, or decoding one value
//! - Updating, rotating and deleting bundles
//! - Restarting dependent workloads tier by tier
//! - Verifying declared references and exporting the audit trail
//!
//! Every operation prints its report (table or JSON) and the process exits
//! non-zero if the operation failed or verification found drift.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod driver;
pub mod error;
pub mod manifest;
pub mod output;

pub use app::{Session, run};
pub use cli::{Cli, Commands, Format};
pub use config::Config;
pub use driver::{KubectlController, NoopController, RolloutDriver};
pub use error::{CliError, CliResult};
pub use output::OutputFormat;
