//! `keyturn audit`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use keyturn_lifecycle::WorkloadController;
use keyturn_store::{BundleName, SecretBackend};

use crate::app::Session;
use crate::error::CliResult;
use crate::output::{AuditTrail, Message, OutputFormat};

/// Handler for `audit`.
pub struct AuditCommand<'a, B, W> {
    session: &'a Session<B, W>,
}

impl<'a, B: SecretBackend, W: WorkloadController> AuditCommand<'a, B, W> {
    /// Creates a new audit command handler.
    #[must_use]
    pub const fn new(session: &'a Session<B, W>) -> Self {
        Self { session }
    }

    /// Prints a bundle's history and/or exports the whole log.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the export file cannot
    /// be written.
    pub fn execute<O: Write>(
        &self,
        out: &mut O,
        format: &OutputFormat,
        name: Option<&str>,
        export: Option<&Path>,
    ) -> CliResult<()> {
        if let Some(name) = name {
            let bundle = BundleName::new(name)?;
            let records = self.session.reporter().audit_trail(&bundle);
            format.write(out, &AuditTrail { bundle, records })?;
        }

        if let Some(path) = export {
            let mut file = BufWriter::new(File::create(path)?);
            let written = self.session.reporter().export_audit(&mut file)?;
            file.flush()?;
            format.write(
                out,
                &Message::success(format!(
                    "exported {written} record(s) to {}",
                    path.display()
                )),
            )?;
        }
        Ok(())
    }
}
