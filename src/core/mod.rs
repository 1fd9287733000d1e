pub mod db;
pub mod gateway;
pub mod remote;

use std::path::Path;

use crate::config::{Backend, Config};
use crate::models::InspectionRecord;
use db::LocalGateway;
use gateway::{AuthError, Authenticator, Order, PersistenceError, PersistenceGateway, Session};
use remote::SupabaseGateway;

/// Backend chosen at runtime from `storage.backend`.
#[derive(Debug, Clone)]
pub enum AnyGateway {
    Local(LocalGateway),
    Remote(SupabaseGateway),
}

impl AnyGateway {
    pub async fn from_config(config: &Config) -> Result<Self, PersistenceError> {
        match config.storage.backend {
            Backend::Local => Ok(Self::Local(LocalGateway::from_config(&config.local).await?)),
            Backend::Remote => Ok(Self::Remote(SupabaseGateway::from_config(&config.remote)?)),
        }
    }
}

impl PersistenceGateway for AnyGateway {
    async fn upload(&self, bucket: &str, local_file: &Path) -> Result<String, PersistenceError> {
        match self {
            Self::Local(g) => g.upload(bucket, local_file).await,
            Self::Remote(g) => g.upload(bucket, local_file).await,
        }
    }

    async fn insert(
        &self,
        table: &str,
        record: &InspectionRecord,
    ) -> Result<InspectionRecord, PersistenceError> {
        match self {
            Self::Local(g) => g.insert(table, record).await,
            Self::Remote(g) => g.insert(table, record).await,
        }
    }

    async fn query(
        &self,
        session: &Session,
        table: &str,
        order: Order,
    ) -> Result<Vec<InspectionRecord>, PersistenceError> {
        match self {
            Self::Local(g) => g.query(session, table, order).await,
            Self::Remote(g) => g.query(session, table, order).await,
        }
    }

    async fn delete(&self, session: &Session, table: &str, id: i64) -> Result<bool, PersistenceError> {
        match self {
            Self::Local(g) => g.delete(session, table, id).await,
            Self::Remote(g) => g.delete(session, table, id).await,
        }
    }
}

impl Authenticator for AnyGateway {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<Session>, AuthError> {
        match self {
            Self::Local(g) => g.authenticate(email, password).await,
            Self::Remote(g) => g.authenticate(email, password).await,
        }
    }
}
