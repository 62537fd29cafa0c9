//! `keyturn update`, `rotate` and `restart`.

use std::io::Write;

use keyturn_lifecycle::WorkloadController;
use keyturn_store::{BundleName, SecretBackend, SecretKeys, SecretValue};
use rand::Rng;
use rand::distributions::Alphanumeric;

use super::finish;
use crate::app::Session;
use crate::cli::{KeyChanges, RotateArgs, UpdateArgs};
use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;

/// Length of values produced by `--generate`.
pub const GENERATED_LENGTH: usize = 32;

fn generate_value() -> SecretValue {
    let value: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_LENGTH)
        .map(char::from)
        .collect();
    SecretValue::from(value)
}

/// Turns `--set` and `--generate` flags into the keys to write.
///
/// # Errors
///
/// Returns [`CliError::InvalidArgument`] if no key is given or a key is
/// given twice.
pub fn build_keys(changes: &KeyChanges) -> CliResult<SecretKeys> {
    let mut keys = SecretKeys::new();
    let supplied = changes
        .set
        .iter()
        .map(|(k, v)| (k.clone(), SecretValue::from(v.as_str())))
        .chain(changes.generate.iter().map(|k| (k.clone(), generate_value())));

    for (key, value) in supplied {
        if keys.insert(key.clone(), value).is_some() {
            return Err(CliError::InvalidArgument(format!(
                "key '{key}' is given more than once"
            )));
        }
    }

    if keys.is_empty() {
        return Err(CliError::InvalidArgument(
            "nothing to change; pass --set KEY=VALUE or --generate KEY".to_string(),
        ));
    }
    Ok(keys)
}

/// Handler for commands that change or restart an existing bundle.
pub struct ChangeCommand<'a, B, W> {
    session: &'a Session<B, W>,
}

impl<'a, B: SecretBackend, W: WorkloadController> ChangeCommand<'a, B, W> {
    /// Creates a new change command handler.
    #[must_use]
    pub const fn new(session: &'a Session<B, W>) -> Self {
        Self { session }
    }

    /// Rotates a bundle and restarts its dependents.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are invalid or the rotation failed.
    pub async fn rotate<O: Write>(
        &self,
        out: &mut O,
        format: &OutputFormat,
        args: &RotateArgs,
    ) -> CliResult<()> {
        let name = BundleName::new(args.name.as_str())?;
        let keys = build_keys(&args.changes)?;
        let report = self
            .session
            .orchestrator()
            .rotate(&name, keys, self.session.initiator())
            .await?;
        finish(out, format, &report)
    }

    /// Updates a bundle, restarting dependents only with `--restart`.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are invalid or the update failed.
    pub async fn update<O: Write>(
        &self,
        out: &mut O,
        format: &OutputFormat,
        args: &UpdateArgs,
    ) -> CliResult<()> {
        let name = BundleName::new(args.name.as_str())?;
        let keys = build_keys(&args.changes)?;
        let report = self
            .session
            .orchestrator()
            .update(&name, keys, self.session.initiator(), args.restart)
            .await?;
        finish(out, format, &report)
    }

    /// Re-runs restart propagation without writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or propagation failed.
    pub async fn restart<O: Write>(
        &self,
        out: &mut O,
        format: &OutputFormat,
        name: &str,
    ) -> CliResult<()> {
        let name = BundleName::new(name)?;
        let report = self.session.orchestrator().restart(&name).await?;
        finish(out, format, &report)
    }
}
