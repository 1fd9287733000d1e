//! Local backend: SQLite table plus a blob directory on disk.

mod auth;
mod inspection;
mod state;

use std::{
    collections::HashSet,
    path::Path,
    sync::{Arc, Mutex},
};

use state::LocalState;

use crate::config::LocalConfig;
use crate::core::gateway::{
    AuthError, Authenticator, Order, PersistenceError, PersistenceGateway, Session,
};
use crate::models::InspectionRecord;

pub use auth::{hash_password, AdminCredential};

#[derive(Debug, Clone)]
pub struct LocalGateway {
    state: Arc<LocalState>,
    admin: Option<AdminCredential>,
    /// Access tokens handed out by `authenticate` for the life of the process.
    sessions: Arc<Mutex<HashSet<String>>>,
}

impl LocalGateway {
    pub async fn open(
        database: impl AsRef<Path>,
        blob_dir: impl AsRef<Path>,
        public_base_url: &str,
    ) -> Result<Self, PersistenceError> {
        let state = LocalState::new(database.as_ref(), blob_dir.as_ref(), public_base_url).await?;
        Ok(Self {
            state: Arc::new(state),
            admin: None,
            sessions: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub async fn from_config(config: &LocalConfig) -> Result<Self, PersistenceError> {
        let gateway = Self::open(&config.database, &config.blob_dir, &config.public_base_url).await?;
        let admin = match (&config.admin_email, &config.admin_password_sha256) {
            (Some(email), Some(hash)) => Some(AdminCredential::new(email.clone(), hash.clone())),
            _ => None,
        };
        Ok(gateway.with_admin(admin))
    }

    pub fn with_admin(mut self, admin: Option<AdminCredential>) -> Self {
        self.admin = admin;
        self
    }

    pub fn blob_dir(&self) -> &Path {
        self.state.blob_dir()
    }

    fn check_session(&self, session: &Session) -> Result<(), PersistenceError> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if sessions.contains(&session.access_token) {
            Ok(())
        } else {
            Err(PersistenceError::Unauthorized)
        }
    }

    /// Close the connection pool. Further calls fail.
    pub async fn close(&self) {
        self.state.close().await;
    }
}

impl PersistenceGateway for LocalGateway {
    async fn upload(&self, bucket: &str, local_file: &Path) -> Result<String, PersistenceError> {
        self.state.store_blob(bucket, local_file).await
    }

    async fn insert(
        &self,
        table: &str,
        record: &InspectionRecord,
    ) -> Result<InspectionRecord, PersistenceError> {
        inspection::insert_inspection(&self.state, table, record).await
    }

    async fn query(
        &self,
        session: &Session,
        table: &str,
        order: Order,
    ) -> Result<Vec<InspectionRecord>, PersistenceError> {
        self.check_session(session)?;
        inspection::query_inspections(&self.state, table, order).await
    }

    async fn delete(&self, session: &Session, table: &str, id: i64) -> Result<bool, PersistenceError> {
        self.check_session(session)?;
        inspection::delete_inspection(&self.state, table, id).await
    }
}

impl Authenticator for LocalGateway {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<Session>, AuthError> {
        let admin = self.admin.as_ref().ok_or_else(|| {
            AuthError::NotConfigured("local.admin_email / local.admin_password_sha256".into())
        })?;
        let session = admin.verify(email, password);
        if let Some(session) = &session {
            self.sessions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(session.access_token.clone());
        }
        Ok(session)
    }
}
