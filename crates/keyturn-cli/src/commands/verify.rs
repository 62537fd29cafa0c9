//! `keyturn verify`.

use std::io::Write;

use keyturn_lifecycle::WorkloadController;
use keyturn_store::{BundleName, SecretBackend};

use crate::app::Session;
use crate::error::CliResult;
use crate::output::OutputFormat;

/// Handler for `verify`.
pub struct VerifyCommand<'a, B, W> {
    session: &'a Session<B, W>,
}

impl<'a, B: SecretBackend, W: WorkloadController> VerifyCommand<'a, B, W> {
    /// Creates a new verify command handler.
    #[must_use]
    pub const fn new(session: &'a Session<B, W>) -> Self {
        Self { session }
    }

    /// Prints the verification report.
    ///
    /// Unready workloads are reported but only dangling references fail
    /// the command.
    ///
    /// # Errors
    ///
    /// Returns [`keyturn_verify::VerifyError::ReferenceDrift`] if any
    /// reference does not resolve.
    pub async fn execute<O: Write>(
        &self,
        out: &mut O,
        format: &OutputFormat,
        bundle: Option<&str>,
    ) -> CliResult<()> {
        let bundle = bundle.map(BundleName::new).transpose()?;
        let report = self.session.reporter().verify(bundle.as_ref()).await?;
        format.write(out, &report)?;
        report.ensure_compliant()?;
        Ok(())
    }
}
