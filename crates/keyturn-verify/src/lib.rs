//! # keyturn-verify
//!
//! Read-only verification of secret bundle consumers:
//!
//! - **Reference checks**: every declared `(bundle, key)` reference is
//!   resolved against the store and reported as `OK`, `MissingBundle` or
//!   `MissingKey`
//! - **Workload health**: readiness of every workload consuming a bundle
//! - **Audit trail**: the change history of a bundle in append order, and a
//!   JSON-lines export of the whole log
//!
//! ```rust,no_run
//! # async fn example<B, W>(reporter: keyturn_verify::Reporter<B, W>) -> keyturn_verify::VerifyResult<()>
//! # where B: keyturn_store::SecretBackend, W: keyturn_lifecycle::WorkloadController {
//! let report = reporter.verify(None).await?;
//! for check in report.drift() {
//!     eprintln!("{check}");
//! }
//! report.ensure_compliant()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod reporter;

pub use error::{VerifyError, VerifyResult};
pub use reporter::{ReferenceCheck, ReferenceStatus, Reporter, VerificationReport, WorkloadHealth};
