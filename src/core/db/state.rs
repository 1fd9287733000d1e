use sqlx::{
    pool::PoolConnection,
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
    },
    Sqlite,
};
use tokio::fs as async_fs;

use std::path::{Path, PathBuf};

use crate::core::gateway::{check_identifier, storage_key, PersistenceError};

pub(super) struct LocalState {
    database: PathBuf,
    blob_dir: PathBuf,
    public_base_url: String,
    pool: SqlitePool,
}

impl std::fmt::Debug for LocalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalState")
            .field("database", &self.database)
            .field("blob_dir", &self.blob_dir)
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

impl LocalState {
    pub(super) async fn new(
        database: &Path,
        blob_dir: &Path,
        public_base_url: &str,
    ) -> Result<Self, PersistenceError> {
        if let Some(parent) = database.parent() {
            if !parent.as_os_str().is_empty() {
                async_fs::create_dir_all(parent).await.map_err(|source| {
                    PersistenceError::LocalFile {
                        path: parent.to_path_buf(),
                        source,
                    }
                })?;
            }
        }
        async_fs::create_dir_all(blob_dir)
            .await
            .map_err(|source| PersistenceError::LocalFile {
                path: blob_dir.to_path_buf(),
                source,
            })?;

        let connect_opts = SqliteConnectOptions::new()
            .filename(database)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_opts)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            database: database.to_path_buf(),
            blob_dir: blob_dir.to_path_buf(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            pool,
        })
    }

    pub(super) async fn conn(&self) -> Result<PoolConnection<Sqlite>, PersistenceError> {
        Ok(self.pool.acquire().await?)
    }

    /// Copy `local_file` into `<blob_dir>/<bucket>/` under a fresh key and
    /// return the public URL for it.
    pub(super) async fn store_blob(
        &self,
        bucket: &str,
        local_file: &Path,
    ) -> Result<String, PersistenceError> {
        let bucket = check_identifier(bucket)?;
        if !local_file.is_file() {
            return Err(PersistenceError::LocalFile {
                path: local_file.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            });
        }

        let bucket_dir = self.blob_dir.join(bucket);
        async_fs::create_dir_all(&bucket_dir)
            .await
            .map_err(|e| PersistenceError::Upload {
                bucket: bucket.to_string(),
                reason: e.to_string(),
            })?;

        let key = storage_key(local_file);
        let dest_path = bucket_dir.join(&key);
        async_fs::copy(local_file, &dest_path)
            .await
            .map_err(|e| PersistenceError::Upload {
                bucket: bucket.to_string(),
                reason: format!("copy {:?} to {:?}: {}", local_file, dest_path, e),
            })?;

        Ok(format!("{}/{}/{}", self.public_base_url, bucket, key))
    }

    pub(super) fn blob_dir(&self) -> &Path {
        &self.blob_dir
    }

    pub(super) async fn close(&self) {
        self.pool.close().await;
    }
}
