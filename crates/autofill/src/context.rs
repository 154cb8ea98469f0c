use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::gateway::{build_gateway, Gateway};
use crate::jobs::store::JobStore;

/// Whether the host is currently in front of the user. Shared by every
/// scheduler and read fresh on each scheduling decision.
#[derive(Clone, Debug, Default)]
pub struct Visibility {
    hidden: Arc<AtomicBool>,
}

impl Visibility {
    pub fn visible() -> Self {
        Self::default()
    }

    pub fn hidden() -> Self {
        let v = Self::default();
        v.set_hidden(true);
        v
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::SeqCst)
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::SeqCst);
    }
}

/// Everything a job-tracking component needs, built once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub store: JobStore,
    pub gateway: Arc<dyn Gateway>,
    pub visibility: Visibility,
}

impl AppContext {
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let gateway = build_gateway(&config)?;
        let store = JobStore::open(&config.data_dir).await;
        Ok(Self {
            config,
            store,
            gateway,
            visibility: Visibility::visible(),
        })
    }

    /// Context over explicit parts, without touching the environment.
    pub fn with_parts(config: Config, store: JobStore, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            config,
            store,
            gateway,
            visibility: Visibility::visible(),
        }
    }
}
