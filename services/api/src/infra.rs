use metrics_exporter_prometheus::PrometheusHandle;
use osk_warehouse::config::AppConfig;
use osk_warehouse::directory::StaticDirectory;
use osk_warehouse::error::AppError;
use osk_warehouse::store::Store;
use osk_warehouse::workflows::applications::ApplicationWorkflow;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) type SharedWorkflow = Arc<ApplicationWorkflow<StaticDirectory>>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

const BUNDLED_DIRECTORY: &str = include_str!("../../../fixtures/directory.json");

/// Sample users, warehouses and items shipped with the service.
pub(crate) fn bundled_directory() -> Result<StaticDirectory, AppError> {
    Ok(StaticDirectory::from_json(BUNDLED_DIRECTORY)?)
}

pub(crate) fn load_directory(config: &AppConfig) -> Result<StaticDirectory, AppError> {
    match &config.directory.path {
        Some(path) => {
            let directory = StaticDirectory::from_path(path)?;
            info!(path = %path.display(), "directory loaded");
            Ok(directory)
        }
        None => {
            warn!("OSK_DIRECTORY_PATH not set; using the bundled sample directory");
            bundled_directory()
        }
    }
}

/// Opens the store and wires the workflow the way every entry point needs it.
pub(crate) fn build_workflow(config: &AppConfig) -> Result<SharedWorkflow, AppError> {
    let store = Store::open(&config.store)?;
    if config.store.temporary {
        info!("using a temporary store");
    } else {
        info!(data_dir = %config.store.data_dir.display(), "store opened");
    }

    let directory = load_directory(config)?;
    Ok(Arc::new(ApplicationWorkflow::new(
        Arc::new(store),
        Arc::new(directory),
        config.workflow,
    )))
}
