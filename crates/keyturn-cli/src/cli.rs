//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// keyturn - secret bundle lifecycle controller.
#[derive(Parser, Debug, Clone)]
#[command(name = "keyturn")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file. Defaults to `keyturn.toml` if it exists.
    #[arg(short, long, global = true, env = "KEYTURN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Directory for the file store and audit log.
    #[arg(long, global = true, env = "KEYTURN_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Name recorded in the audit trail. Falls back to `$USER`.
    #[arg(long, global = true, env = "KEYTURN_INITIATOR")]
    pub initiator: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create every bundle in a manifest.
    Create(CreateArgs),

    /// List bundles (metadata only).
    List,

    /// Show a bundle's key names and sizes.
    Describe {
        /// Bundle name.
        name: String,
    },

    /// Print one decoded value.
    Decode {
        /// Bundle name.
        name: String,
        /// Key to print.
        key: String,
    },

    /// Change keys of a bundle, optionally restarting dependents.
    Update(UpdateArgs),

    /// Delete bundles. Absent bundles are ignored.
    Delete {
        /// Bundle names.
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Replace keys of a bundle and restart every dependent workload.
    Rotate(RotateArgs),

    /// Re-run restart propagation for a bundle without changing it.
    Restart {
        /// Bundle name.
        name: String,
    },

    /// Check that every declared reference resolves.
    Verify {
        /// Limit the check to one bundle.
        #[arg(long)]
        bundle: Option<String>,
    },

    /// Show a bundle's change history or export the whole audit log.
    Audit {
        /// Bundle name.
        #[arg(required_unless_present = "export")]
        name: Option<String>,

        /// Write the whole log as JSON lines to this file.
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,
    },
}

/// Arguments for `create`.
#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// Manifest file (TOML).
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// Stop at the first failing bundle instead of attempting all.
    #[arg(long)]
    pub halt_on_failure: bool,
}

/// Key changes shared by `update` and `rotate`.
#[derive(Args, Debug, Clone, Default)]
pub struct KeyChanges {
    /// Set a key (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub set: Vec<(String, String)>,

    /// Set a key to a random 32-character alphanumeric value (repeatable).
    #[arg(long = "generate", value_name = "KEY")]
    pub generate: Vec<String>,
}

/// Arguments for `update`.
#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// Bundle name.
    pub name: String,

    /// Key changes.
    #[command(flatten)]
    pub changes: KeyChanges,

    /// Restart dependent workloads after the write.
    #[arg(long)]
    pub restart: bool,
}

/// Arguments for `rotate`.
#[derive(Args, Debug, Clone)]
pub struct RotateArgs {
    /// Bundle name.
    pub name: String,

    /// Key changes.
    #[command(flatten)]
    pub changes: KeyChanges,
}

/// Parses `KEY=VALUE`. The value may itself contain `=`.
///
/// # Errors
///
/// Returns a message if there is no `=` or the key is empty.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
