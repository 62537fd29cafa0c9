//! `keyturn list`, `describe` and `decode`.

use std::io::Write;

use keyturn_lifecycle::WorkloadController;
use keyturn_store::{BundleName, SecretBackend};

use crate::app::Session;
use crate::error::{CliError, CliResult};
use crate::output::{BundleDetail, BundleList, DecodedValue, OutputFormat};

/// Handler for the read-only bundle commands.
pub struct BundleCommand<'a, B, W> {
    session: &'a Session<B, W>,
}

impl<'a, B: SecretBackend, W: WorkloadController> BundleCommand<'a, B, W> {
    /// Creates a new bundle command handler.
    #[must_use]
    pub const fn new(session: &'a Session<B, W>) -> Self {
        Self { session }
    }

    /// Lists bundle metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list<O: Write>(&self, out: &mut O, format: &OutputFormat) -> CliResult<()> {
        let bundles = self.session.orchestrator().store().list().await?;
        format.write(out, &BundleList { bundles })
    }

    /// Shows key names and sizes of one bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle does not exist.
    pub async fn describe<O: Write>(
        &self,
        out: &mut O,
        format: &OutputFormat,
        name: &str,
    ) -> CliResult<()> {
        let name = BundleName::new(name)?;
        let bundle = self.session.orchestrator().store().get(&name).await?;
        format.write(out, &BundleDetail::from(&bundle))
    }

    /// Prints one value.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle or key does not exist.
    pub async fn decode<O: Write>(
        &self,
        out: &mut O,
        format: &OutputFormat,
        name: &str,
        key: &str,
    ) -> CliResult<()> {
        let name = BundleName::new(name)?;
        let bundle = self.session.orchestrator().store().get(&name).await?;
        let value = bundle.value(key).ok_or_else(|| CliError::KeyNotFound {
            bundle: name.to_string(),
            key: key.to_string(),
        })?;
        format.write(out, &DecodedValue::new(name.clone(), key, value.as_bytes()))
    }
}
