//! `keyturn delete`.

use std::io::Write;

use keyturn_lifecycle::WorkloadController;
use keyturn_store::{BundleName, SecretBackend};

use super::finish;
use crate::app::Session;
use crate::error::CliResult;
use crate::output::OutputFormat;

/// Handler for `delete`.
pub struct DeleteCommand<'a, B, W> {
    session: &'a Session<B, W>,
}

impl<'a, B: SecretBackend, W: WorkloadController> DeleteCommand<'a, B, W> {
    /// Creates a new delete command handler.
    #[must_use]
    pub const fn new(session: &'a Session<B, W>) -> Self {
        Self { session }
    }

    /// Deletes the named bundles.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is invalid or a deletion failed.
    pub async fn execute<O: Write>(
        &self,
        out: &mut O,
        format: &OutputFormat,
        names: &[String],
    ) -> CliResult<()> {
        let names = names
            .iter()
            .map(|name| BundleName::new(name.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let report = self.session.orchestrator().delete(&names).await?;
        finish(out, format, &report)
    }
}
