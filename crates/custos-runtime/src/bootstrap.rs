//! Assembling the subsystem from configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use custos_audit::{
    AuditLedger, BaselineStore, KvAuditStorage, SecurityNotifier, TracingNotifier,
};
use custos_config::Config;
use custos_core::{ActorId, EventCategory, RiskLevel};
use custos_crypto::{SecretSource, SigningKey};
use custos_keys::{FieldCipher, KeyManager, KvKeyStore};
use custos_storage::{KvStore, MemoryKvStore, SurrealKvStore};
use custos_telemetry::{LoggingGuard, OperationContext, setup_logging};
use tracing::{info, warn};

use crate::actions::{self, admin_event};
use crate::admin::AdminService;
use crate::bridge;
use crate::cipher::AuditedCipher;
use crate::error::RuntimeResult;
use crate::integrity::IntegritySweep;
use crate::rotation::RotationScheduler;
use crate::scheduler::TaskScheduler;

/// Install the global log subscriber described by `config.logging`.
///
/// # Errors
///
/// Returns an error for an unknown format or rotation name, an invalid
/// filter directive, or if a subscriber is already installed.
pub fn init_logging(config: &Config) -> RuntimeResult<LoggingGuard> {
    let log = bridge::log_config(&config.logging)?;
    Ok(setup_logging(&log)?)
}

/// Where each bootstrapped secret came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretSources {
    /// Ledger signing key.
    pub signing_key: SecretSource,
    /// Key-encryption key protecting stored key material.
    pub kek: SecretSource,
}

impl SecretSources {
    /// Whether either secret dies with the process.
    #[must_use]
    pub fn any_ephemeral(&self) -> bool {
        self.signing_key == SecretSource::Ephemeral || self.kek == SecretSource::Ephemeral
    }
}

/// Opened backends, one per distinct path.
#[derive(Default)]
struct Backends {
    opened: Vec<(PathBuf, Arc<dyn KvStore>)>,
}

impl Backends {
    fn open(&mut self, path: Option<&Path>) -> RuntimeResult<Arc<dyn KvStore>> {
        let Some(path) = path else {
            return Ok(Arc::new(MemoryKvStore::new()));
        };
        if let Some((_, store)) = self.opened.iter().find(|(p, _)| p == path) {
            return Ok(Arc::clone(store));
        }
        let store: Arc<dyn KvStore> = Arc::new(SurrealKvStore::open(path)?);
        info!(path = %path.display(), "Opened storage backend");
        self.opened.push((path.to_path_buf(), Arc::clone(&store)));
        Ok(store)
    }
}

/// The running subsystem: key manager, ledger and the surfaces over them.
pub struct Custos {
    config: Config,
    keys: Arc<KeyManager>,
    ledger: Arc<AuditLedger>,
    cipher: AuditedCipher,
    admin: AdminService,
    rotation: Arc<RotationScheduler>,
    integrity: Arc<IntegritySweep>,
    sources: SecretSources,
}

impl std::fmt::Debug for Custos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Custos")
            .field("sources", &self.sources)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl Custos {
    /// Open with secrets from the process environment and alerts sent to
    /// the log.
    ///
    /// # Errors
    ///
    /// See [`open_with`](Self::open_with).
    pub fn open(config: Config) -> RuntimeResult<Self> {
        Self::open_with(config, |var| std::env::var(var).ok(), Arc::new(TracingNotifier))
    }

    /// Open with an explicit environment lookup and alert sink.
    ///
    /// Appends a startup entry to the ledger; its risk is raised when a
    /// secret is ephemeral, since entries signed with an ephemeral key can
    /// no longer be verified after a restart.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Storage`](crate::RuntimeError::Storage) if a backend cannot be opened
    /// - [`RuntimeError::Crypto`](crate::RuntimeError::Crypto) if a secret cannot be resolved
    /// - [`RuntimeError::Key`](crate::RuntimeError::Key) for invalid policies or an unreadable key ring
    /// - [`RuntimeError::Audit`](crate::RuntimeError::Audit) if the ledger cannot be opened or written
    pub fn open_with<F>(
        config: Config,
        lookup: F,
        notifier: Arc<dyn SecurityNotifier>,
    ) -> RuntimeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let guard = OperationContext::new("custos-runtime", "bootstrap").enter();

        let mut backends = Backends::default();
        let ledger_store = backends.open(config.ledger.path.as_deref())?;
        let key_store = backends.open(config.keys.path.as_deref())?;

        let (signing_secret, signing_source) = bridge::secret_bootstrap(
            "audit signing key",
            &config.secrets.signing_key,
            &config.secrets,
            &lookup,
        )
        .resolve_with(&lookup)?;
        let (kek, kek_source) =
            bridge::secret_bootstrap("key-encryption key", &config.secrets.kek, &config.secrets, &lookup)
                .resolve_with(&lookup)?;
        let sources = SecretSources {
            signing_key: signing_source,
            kek: kek_source,
        };

        let keys = Arc::new(
            KeyManager::open(
                Arc::new(KvKeyStore::new(key_store)?),
                bridge::policy_set(&config.policies)?,
                kek,
            )?
            .with_export_iterations(config.keys.export_iterations),
        );

        let baselines = if config.ledger.persist_baselines && config.ledger.path.is_some() {
            BaselineStore::persistent(Arc::clone(&ledger_store))?
        } else {
            BaselineStore::in_memory()
        };
        let ledger = Arc::new(AuditLedger::open(
            Arc::new(KvAuditStorage::new(ledger_store)?),
            SigningKey::new(signing_secret),
            Arc::new(baselines),
            notifier,
            bridge::ledger_settings(&config.scoring),
        )?);

        let mut started = admin_event(&ActorId::system(), actions::SUBSYSTEM_STARTED)
            .category(EventCategory::System)
            .meta("signing_key_source", format!("{signing_source:?}"))
            .meta("kek_source", format!("{kek_source:?}"))
            .meta("durable_ledger", config.ledger.path.is_some())
            .meta("durable_keys", config.keys.path.is_some());
        if sources.any_ephemeral() {
            warn!(
                ?signing_source,
                ?kek_source,
                "Running with an ephemeral secret; data protected by it is lost on exit"
            );
            started = started.risk_hint(RiskLevel::High);
        }
        if let Err(e) = ledger.append(started) {
            guard.fail(e.to_string());
            return Err(e.into());
        }

        let cipher = AuditedCipher::new(FieldCipher::new(Arc::clone(&keys)), Arc::clone(&ledger));
        let admin = AdminService::new(Arc::clone(&keys), Arc::clone(&ledger));
        let rotation = Arc::new(RotationScheduler::new(Arc::clone(&keys), Arc::clone(&ledger)));
        let integrity = Arc::new(IntegritySweep::new(
            Arc::clone(&ledger),
            config.scheduler.integrity_window,
        ));
        guard.succeed();

        Ok(Self {
            config,
            keys,
            ledger,
            cipher,
            admin,
            rotation,
            integrity,
            sources,
        })
    }

    /// Start the background sweeps configured in `[scheduler]`.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned
    /// scheduler stops the sweeps.
    #[must_use]
    pub fn start_scheduler(&self) -> TaskScheduler {
        let mut scheduler = TaskScheduler::new();
        let section = &self.config.scheduler;
        if !section.enabled {
            info!("Background sweeps disabled");
            return scheduler;
        }
        scheduler.spawn(
            Arc::clone(&self.rotation) as _,
            Duration::from_secs(section.rotation_interval_secs),
        );
        if section.integrity_interval_secs > 0 {
            scheduler.spawn(
                Arc::clone(&self.integrity) as _,
                Duration::from_secs(section.integrity_interval_secs),
            );
        }
        scheduler
    }

    /// Configuration the subsystem was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Key manager.
    #[must_use]
    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Audit ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    /// Field encryption.
    #[must_use]
    pub fn cipher(&self) -> &AuditedCipher {
        &self.cipher
    }

    /// Administrative operations.
    #[must_use]
    pub fn admin(&self) -> &AdminService {
        &self.admin
    }

    /// The rotation sweep, for running outside the scheduler.
    #[must_use]
    pub fn rotation(&self) -> &Arc<RotationScheduler> {
        &self.rotation
    }

    /// The integrity sweep, for running outside the scheduler.
    #[must_use]
    pub fn integrity(&self) -> &Arc<IntegritySweep> {
        &self.integrity
    }

    /// Where the secrets came from.
    #[must_use]
    pub fn secret_sources(&self) -> SecretSources {
        self.sources
    }

    /// Flush pending key usage and ledger storage.
    ///
    /// # Errors
    ///
    /// Returns the first persistence failure.
    pub fn close(&self) -> RuntimeResult<()> {
        self.keys.close()?;
        self.ledger.close()?;
        info!("Custos closed");
        Ok(())
    }
}
