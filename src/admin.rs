//! Admin reads and deletes. These bypass the inspection pipeline and take the
//! caller's `Session` explicitly; there is no ambient login state.

use tracing::info;

use crate::core::gateway::{
    AuthError, Authenticator, Order, PersistenceError, PersistenceGateway, Session,
};
use crate::models::InspectionRecord;

/// `Ok(None)` when the credentials are rejected.
pub async fn login<A: Authenticator>(
    auth: &A,
    email: &str,
    password: &str,
) -> Result<Option<Session>, AuthError> {
    let session = auth.authenticate(email, password).await?;
    match &session {
        Some(s) => info!(email = %s.email, "admin logged in"),
        None => info!(%email, "admin login rejected"),
    }
    Ok(session)
}

/// All stored inspections, newest first.
pub async fn list_inspections<G: PersistenceGateway>(
    gateway: &G,
    session: &Session,
    table: &str,
) -> Result<Vec<InspectionRecord>, PersistenceError> {
    gateway.query(session, table, Order::NEWEST_FIRST).await
}

/// Hard delete of one row. Its blobs stay in storage.
pub async fn delete_inspection<G: PersistenceGateway>(
    gateway: &G,
    session: &Session,
    table: &str,
    id: i64,
) -> Result<bool, PersistenceError> {
    let removed = gateway.delete(session, table, id).await?;
    info!(id, removed, by = %session.email, "admin delete");
    Ok(removed)
}
