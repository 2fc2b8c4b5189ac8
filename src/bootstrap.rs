use anyhow::{Context, Result};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bedwatch_adapter_notification::NotificationService;
use bedwatch_adapter_store::InMemoryTelemetryStore;
use bedwatch_application::{Orchestrator, ShutdownSignal};
use bedwatch_domain::{
    BedwatchConfig, Department, DepartmentConfig, NotificationChannelConfig, NotificationsConfig,
    StoreBackend, StoreConfig,
};
use bedwatch_ports::{NotificationPort, TelemetryStore};

pub const CONFIG_ENV: &str = "BEDWATCH_CONFIG_PATH";

/// `RUST_LOG` wins; otherwise `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Where the config lives: `BEDWATCH_CONFIG_PATH`, else
/// `$HOME/.bedwatch/config.yaml`.
pub fn config_path() -> Option<PathBuf> {
    resolve_config_path(env::var_os(CONFIG_ENV), env::var_os("HOME"))
}

fn resolve_config_path(explicit: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(path) = explicit.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    home.map(|home| Path::new(&home).join(".bedwatch").join("config.yaml"))
}

/// Load the config. An explicit path must exist; the home-directory file is
/// optional and defaults apply without it.
pub fn load_config(explicit: Option<&Path>) -> Result<BedwatchConfig> {
    if let Some(path) = explicit {
        return BedwatchConfig::load_from_path(path);
    }
    match config_path() {
        Some(path) if path.exists() => {
            info!(path = %path.display(), "Loading config");
            BedwatchConfig::load_from_path(&path)
        }
        _ => {
            info!("No config file found, using defaults");
            Ok(BedwatchConfig::default())
        }
    }
}

pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn TelemetryStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryTelemetryStore::new())),
        StoreBackend::Sqlite => open_sqlite(config),
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(config: &StoreConfig) -> Result<Arc<dyn TelemetryStore>> {
    let store = bedwatch_adapter_store::SqliteTelemetryStore::open(
        &config.sqlite_path,
        config.pool_size,
        config.write_deadline(),
    )
    .with_context(|| format!("failed to open {}", config.sqlite_path.display()))?;
    info!(path = %config.sqlite_path.display(), "SQLite store ready");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_config: &StoreConfig) -> Result<Arc<dyn TelemetryStore>> {
    anyhow::bail!("built without the `sqlite` feature; set `store.backend: memory`")
}

/// Without configured channels alerts still reach the log.
pub fn build_notifier(config: &NotificationsConfig) -> Arc<dyn NotificationPort> {
    let channels = if config.channels.is_empty() {
        vec![NotificationChannelConfig::Log]
    } else {
        config.channels.clone()
    };
    Arc::new(NotificationService::from_config(channels))
}

/// Upsert the configured reference data.
pub async fn register_departments(
    store: &dyn TelemetryStore,
    departments: &[DepartmentConfig],
) -> Result<()> {
    for dept in departments {
        store
            .upsert_department(Department::new(&dept.id, &dept.name, dept.total_beds))
            .await
            .with_context(|| format!("failed to register department {}", dept.id))?;
    }
    Ok(())
}

/// A wired pipeline.
pub struct App {
    pub config: BedwatchConfig,
    pub store: Arc<dyn TelemetryStore>,
    pub orchestrator: Arc<Orchestrator>,
}

impl App {
    pub async fn build(config: BedwatchConfig, shutdown: ShutdownSignal) -> Result<Self> {
        let store = build_store(&config.store)?;
        register_departments(store.as_ref(), &config.departments).await?;
        let notifier = build_notifier(&config.notifications);
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            notifier,
            &config,
            shutdown,
        ));
        if config.departments.is_empty() {
            warn!("No departments configured; only departments already in the store will run");
        }
        Ok(Self {
            config,
            store,
            orchestrator,
        })
    }
}
