//! Wiring from parsed arguments to command handlers.

use std::io::Write;
use std::sync::Arc;

use keyturn_lifecycle::{
    AuditLog, CreatePolicy, Orchestrator, OrchestratorConfig, WorkloadController,
    WorkloadInventory,
};
use keyturn_store::{FileBackend, MemoryBackend, SecretBackend, StoreClient};
use keyturn_verify::Reporter;
use tracing::debug;

use crate::cli::{Cli, Commands};
use crate::commands::{
    AuditCommand, BundleCommand, ChangeCommand, CreateCommand, DeleteCommand, VerifyCommand,
};
use crate::config::{BackendKind, Config};
use crate::driver::RolloutDriver;
use crate::error::CliResult;
use crate::output::OutputFormat;

/// Recorded as initiator when neither `--initiator` nor `$USER` is set.
pub const UNKNOWN_INITIATOR: &str = "unknown";

/// The collaborators every command works against.
pub struct Session<B, W> {
    orchestrator: Orchestrator<B, W>,
    reporter: Reporter<B, W>,
    initiator: String,
}

impl<B: SecretBackend, W: WorkloadController> Session<B, W> {
    /// Builds a session; the reporter shares the orchestrator's store,
    /// controller, inventory and audit log.
    #[must_use]
    pub fn new(orchestrator: Orchestrator<B, W>, initiator: impl Into<String>) -> Self {
        let reporter = Reporter::for_orchestrator(&orchestrator);
        Self {
            orchestrator,
            reporter,
            initiator: initiator.into(),
        }
    }

    /// Returns the orchestrator.
    #[must_use]
    pub const fn orchestrator(&self) -> &Orchestrator<B, W> {
        &self.orchestrator
    }

    /// Returns the reporter.
    #[must_use]
    pub const fn reporter(&self) -> &Reporter<B, W> {
        &self.reporter
    }

    /// Returns the name recorded in audit records.
    #[must_use]
    pub fn initiator(&self) -> &str {
        &self.initiator
    }

    /// Runs one command.
    ///
    /// # Errors
    ///
    /// Returns the command's error.
    pub async fn dispatch<O: Write>(
        &self,
        command: &Commands,
        out: &mut O,
        format: &OutputFormat,
    ) -> CliResult<()> {
        match command {
            Commands::Create(args) => CreateCommand::new(self).execute(out, format, args).await,
            Commands::List => BundleCommand::new(self).list(out, format).await,
            Commands::Describe { name } => BundleCommand::new(self).describe(out, format, name).await,
            Commands::Decode { name, key } => {
                BundleCommand::new(self).decode(out, format, name, key).await
            }
            Commands::Update(args) => ChangeCommand::new(self).update(out, format, args).await,
            Commands::Rotate(args) => ChangeCommand::new(self).rotate(out, format, args).await,
            Commands::Restart { name } => ChangeCommand::new(self).restart(out, format, name).await,
            Commands::Delete { names } => DeleteCommand::new(self).execute(out, format, names).await,
            Commands::Verify { bundle } => {
                VerifyCommand::new(self)
                    .execute(out, format, bundle.as_deref())
                    .await
            }
            Commands::Audit { name, export } => {
                AuditCommand::new(self).execute(out, format, name.as_deref(), export.as_deref())
            }
        }
    }
}

/// Picks the audit initiator: explicit value, then `$USER`, then
/// [`UNKNOWN_INITIATOR`].
#[must_use]
pub fn resolve_initiator(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var("USER").ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_INITIATOR.to_string())
}

fn orchestrator_config(config: &Config, command: &Commands) -> OrchestratorConfig {
    let halt = matches!(command, Commands::Create(args) if args.halt_on_failure);
    OrchestratorConfig {
        rollout: config.rollout.policy(),
        create_concurrency: config.rollout.create_concurrency,
        create_policy: if halt {
            CreatePolicy::HaltOnFirstFailure
        } else {
            CreatePolicy::AttemptAll
        },
    }
}

struct Parts {
    controller: Arc<RolloutDriver>,
    inventory: Arc<WorkloadInventory>,
    settings: OrchestratorConfig,
    initiator: String,
}

impl Parts {
    fn session<B: SecretBackend>(
        self,
        store: StoreClient<B>,
        audit: AuditLog,
    ) -> Session<B, RolloutDriver> {
        let orchestrator = Orchestrator::new(
            Arc::new(store),
            self.controller,
            self.inventory,
            Arc::new(audit),
        )
        .with_config(self.settings);
        Session::new(orchestrator, self.initiator)
    }
}

/// Loads configuration, opens the store and runs the parsed command.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the store or audit log
/// cannot be opened, or the command fails.
pub async fn run<O: Write>(cli: Cli, out: &mut O) -> CliResult<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.state_dir {
        config.store.state_dir = dir;
    }

    let format = OutputFormat::new(cli.format);
    let retry = config.store.retry.policy();
    let parts = Parts {
        controller: Arc::new(RolloutDriver::from_config(&config.rollout)),
        inventory: Arc::new(config.inventory()?),
        settings: orchestrator_config(&config, &cli.command),
        initiator: resolve_initiator(cli.initiator.as_deref()),
    };

    debug!(
        backend = ?config.store.backend,
        driver = ?config.rollout.driver,
        workloads = parts.inventory.len(),
        state_dir = %config.store.state_dir.display(),
        "session configured"
    );

    match config.store.backend {
        BackendKind::Memory => {
            let store = StoreClient::new(MemoryBackend::new()).with_retry_policy(retry);
            let session = parts.session(store, AuditLog::in_memory());
            session.dispatch(&cli.command, out, &format).await
        }
        BackendKind::File => {
            let backend = FileBackend::open(&config.store.state_dir)?;
            let audit = AuditLog::open(config.store.audit_path())?;
            let session = parts.session(StoreClient::new(backend).with_retry_policy(retry), audit);
            session.dispatch(&cli.command, out, &format).await
        }
        #[cfg(feature = "vault")]
        BackendKind::Vault => {
            let mut vault = config.store.vault.clone().unwrap_or_default();
            if vault.token.is_none() {
                vault.token = std::env::var("VAULT_TOKEN").ok();
            }
            let backend = keyturn_store::VaultBackend::connect(&vault)?;
            let audit = AuditLog::open(config.store.audit_path())?;
            let session = parts.session(StoreClient::new(backend).with_retry_policy(retry), audit);
            session.dispatch(&cli.command, out, &format).await
        }
        #[cfg(not(feature = "vault"))]
        BackendKind::Vault => Err(crate::error::CliError::Config(
            "the vault backend is not compiled in; rebuild with --features vault".to_string(),
        )),
    }
}
