//! Command implementations.
//!
//! Each handler borrows the [`Session`](crate::app::Session) and writes its
//! result through [`OutputFormat`].

mod audit;
mod bundle;
mod change;
mod create;
mod delete;
mod verify;

use std::io::Write;

use keyturn_lifecycle::{OperationReport, OperationState};

pub use audit::AuditCommand;
pub use bundle::BundleCommand;
pub use change::{ChangeCommand, build_keys};
pub use create::CreateCommand;
pub use delete::DeleteCommand;
pub use verify::VerifyCommand;

use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;

/// Prints `report`, then fails if the operation did not complete.
fn finish<W: Write>(out: &mut W, format: &OutputFormat, report: &OperationReport) -> CliResult<()> {
    format.write(out, report)?;
    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::OperationFailed {
            kind: report.kind,
            id: report.id.to_string(),
            stage: report.failed_stage.unwrap_or(OperationState::Failed),
        })
    }
}
