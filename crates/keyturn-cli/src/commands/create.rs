//! `keyturn create`.

use std::io::Write;

use keyturn_lifecycle::WorkloadController;
use keyturn_store::SecretBackend;

use super::finish;
use crate::app::Session;
use crate::cli::CreateArgs;
use crate::error::CliResult;
use crate::manifest::Manifest;
use crate::output::OutputFormat;

/// Handler for `create`.
pub struct CreateCommand<'a, B, W> {
    session: &'a Session<B, W>,
}

impl<'a, B: SecretBackend, W: WorkloadController> CreateCommand<'a, B, W> {
    /// Creates a new create command handler.
    #[must_use]
    pub const fn new(session: &'a Session<B, W>) -> Self {
        Self { session }
    }

    /// Creates every bundle in the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is unreadable or any bundle failed,
    /// including entries with an invalid name.
    pub async fn execute<O: Write>(
        &self,
        out: &mut O,
        format: &OutputFormat,
        args: &CreateArgs,
    ) -> CliResult<()> {
        let entries = Manifest::from_file(&args.manifest)?.into_entries();
        let report = self.session.orchestrator().create_all(entries).await?;
        finish(out, format, &report)
    }
}
