use gradebook::config::StorageConfig;
use gradebook::error::AppError;
use gradebook::grading::{
    GradingService, InMemoryPolicyStore, JsonFilePolicyStore, PolicyRegistry, PolicyStore,
    StoreError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Policy store chosen from configuration: a JSON directory when one is set.
#[derive(Debug, Clone)]
pub(crate) enum ConfiguredStore {
    Memory(InMemoryPolicyStore),
    File(JsonFilePolicyStore),
}

impl ConfiguredStore {
    pub(crate) fn open(storage: &StorageConfig) -> Result<Self, StoreError> {
        match &storage.policy_dir {
            Some(dir) => {
                let store = JsonFilePolicyStore::open(dir)?;
                info!(dir = %store.root().display(), "using file-backed policy store");
                Ok(Self::File(store))
            }
            None => Ok(Self::Memory(InMemoryPolicyStore::default())),
        }
    }
}

impl PolicyStore for ConfiguredStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            Self::Memory(store) => store.load_raw(key),
            Self::File(store) => store.load_raw(key),
        }
    }

    fn save_raw(&self, key: &str, json: String) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.save_raw(key, json),
            Self::File(store) => store.save_raw(key, json),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        match self {
            Self::Memory(store) => store.keys(),
            Self::File(store) => store.keys(),
        }
    }
}

pub(crate) type Service = GradingService<ConfiguredStore>;

/// Blocking bootstrap for one-shot CLI commands.
pub(crate) fn open_service(storage: &StorageConfig) -> Result<Service, AppError> {
    let store = Arc::new(ConfiguredStore::open(storage)?);
    Ok(GradingService::bootstrap(store))
}

/// Bootstrap off the async runtime, serving built-in policies if the store is slow or broken.
pub(crate) async fn load_service(storage: &StorageConfig) -> Result<Arc<Service>, AppError> {
    let store = Arc::new(ConfiguredStore::open(storage)?);
    let loading = tokio::task::spawn_blocking({
        let store = store.clone();
        move || GradingService::bootstrap(store)
    });

    let service = match tokio::time::timeout(storage.load_timeout(), loading).await {
        Ok(Ok(service)) => service,
        Ok(Err(err)) => {
            warn!(error = %err, "policy store load failed, serving built-in policies");
            GradingService::new(PolicyRegistry::with_built_ins(), store)
        }
        Err(_) => {
            warn!(
                timeout_ms = storage.load_timeout_ms,
                "policy store load timed out, serving built-in policies"
            );
            GradingService::new(PolicyRegistry::with_built_ins(), store)
        }
    };

    Ok(Arc::new(service))
}
