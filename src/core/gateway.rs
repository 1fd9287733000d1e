use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::InspectionRecord;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to read {path:?} for upload: {source}")]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload to bucket '{bucket}' failed: {reason}")]
    Upload { bucket: String, reason: String },

    #[error("Insert into '{table}' failed: {reason}")]
    Insert { table: String, reason: String },

    #[error("Query on '{table}' failed: {reason}")]
    Query { table: String, reason: String },

    #[error("Delete from '{table}' failed: {reason}")]
    Delete { table: String, reason: String },

    #[error("Session is not valid for this backend")]
    Unauthorized,

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Backend unreachable: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Failures of the authentication call itself. Rejected credentials are not
/// an error; they come back as `Ok(None)`.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication service unreachable: {0}")]
    Transport(String),

    #[error("Authentication service error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Authentication is not configured: {0}")]
    NotConfigured(String),
}

/// Proof of a successful admin login. Passed explicitly into admin-only calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub email: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub descending: bool,
}

impl Order {
    /// Newest first.
    pub const NEWEST_FIRST: Order = Order {
        column: "created_at",
        descending: true,
    };
}

/// Columns of the `inspections` table, in schema order. `id` and `created_at`
/// are assigned by the store.
pub const INSPECTION_COLUMNS: [&str; 16] = [
    "inspection_id",
    "file_name",
    "detected_classes",
    "highest_confidence",
    "risk_level",
    "inference_time",
    "precision",
    "recall",
    "map50",
    "map5095",
    "image_url",
    "annotated_image_url",
    "pdf_url",
    "status",
    "created_at",
    "id",
];

/// Remote table + blob store. Uploads and inserts are independent calls with
/// no transaction spanning them.
pub trait PersistenceGateway: Send + Sync {
    /// Store `local_file` under a fresh random key and return its public URL.
    fn upload(
        &self,
        bucket: &str,
        local_file: &Path,
    ) -> impl Future<Output = Result<String, PersistenceError>> + Send;

    /// Insert one row; returns it with `id` and `created_at` filled in.
    fn insert(
        &self,
        table: &str,
        record: &InspectionRecord,
    ) -> impl Future<Output = Result<InspectionRecord, PersistenceError>> + Send;

    fn query(
        &self,
        session: &Session,
        table: &str,
        order: Order,
    ) -> impl Future<Output = Result<Vec<InspectionRecord>, PersistenceError>> + Send;

    /// Hard delete by `id`. `Ok(false)` when no row matched.
    fn delete(
        &self,
        session: &Session,
        table: &str,
        id: i64,
    ) -> impl Future<Output = Result<bool, PersistenceError>> + Send;
}

pub trait Authenticator: Send + Sync {
    fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Option<Session>, AuthError>> + Send;
}

/// Table and column names are interpolated into queries and URLs, so only
/// plain identifiers are accepted.
pub fn check_identifier(name: &str) -> Result<&str, PersistenceError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(name)
    } else {
        Err(PersistenceError::InvalidIdentifier(name.to_string()))
    }
}

/// `<uuid>.<ext>` keeping the extension of `local_file`.
pub fn storage_key(local_file: &Path) -> String {
    match local_file.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", uuid::Uuid::new_v4(), ext),
        None => uuid::Uuid::new_v4().to_string(),
    }
}
