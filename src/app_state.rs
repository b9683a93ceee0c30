use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{oneshot, Mutex as AsyncMutex, OnceCell};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::Result,
    ingest::{self, SampleCorpus},
    llm::LlmManager,
    session::{PipelineSettings, SessionContext},
};

/// Una sesión se atiende de una en una: el mutex asíncrono serializa sus acciones.
pub type SessionHandle = Arc<AsyncMutex<SessionContext>>;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub settings: PipelineSettings,
    pub llm_manager: LlmManager,
    pub sessions: SessionStore,
    pub samples: Arc<OnceCell<SampleCorpus>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    pub fn new(config: AppConfig, shutdown_tx: oneshot::Sender<()>) -> Self {
        Self {
            settings: PipelineSettings::from(&config),
            llm_manager: LlmManager::from_config(&config),
            config,
            sessions: SessionStore::default(),
            samples: Arc::new(OnceCell::new()),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
        }
    }

    /// Manuales de muestra indexados. Se construyen con la primera sesión y se
    /// reutilizan después; si la carga falla se reintentará con la siguiente.
    pub async fn sample_corpus(&self) -> Result<&SampleCorpus> {
        self.samples
            .get_or_try_init(|| {
                ingest::load_sample_corpus(
                    &self.llm_manager,
                    &self.config.sample_manuals_dir,
                    &self.settings.splitter,
                )
            })
            .await
    }
}

/// Sesiones activas en memoria, indexadas por id.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, SessionHandle>>>,
}

impl SessionStore {
    pub fn insert(&self, ctx: SessionContext) -> String {
        let id = Uuid::new_v4().to_string();
        self.lock()
            .insert(id.clone(), Arc::new(AsyncMutex::new(ctx)));
        id
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
