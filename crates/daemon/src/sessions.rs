use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::config::DaemonConfig;
use crate::db::Database;
use crate::pipeline::{PipelineController, Providers};

/// Independent pipeline sessions keyed by id.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<PipelineController>>>,
    providers: Providers,
    config: DaemonConfig,
    db: Option<Arc<Database>>,
}

impl SessionRegistry {
    pub fn new(providers: Providers, config: DaemonConfig, db: Option<Arc<Database>>) -> Self {
        SessionRegistry {
            sessions: RwLock::new(HashMap::new()),
            providers,
            config,
            db,
        }
    }

    pub fn db(&self) -> Option<&Arc<Database>> {
        self.db.as_ref()
    }

    pub async fn create(&self) -> Arc<PipelineController> {
        let session_id = Uuid::new_v4();
        let controller = PipelineController::spawn(
            session_id,
            self.providers.clone(),
            &self.config,
            self.db.clone(),
        );
        self.sessions.write().await.insert(session_id, controller.clone());
        info!(session_id = %session_id, "Session created");
        controller
    }

    pub async fn get(&self, session_id: Uuid) -> Option<Arc<PipelineController>> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    /// Reset the session's run and forget it.
    pub async fn remove(&self, session_id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&session_id);
        match removed {
            Some(controller) => {
                controller.reset().await;
                info!(session_id = %session_id, "Session removed");
                true
            }
            None => false,
        }
    }
}
