//! Hosted backend reached over HTTPS: PostgREST tables, object storage and
//! password login, all under one project URL and API key.

use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::core::gateway::{
    check_identifier, storage_key, AuthError, Authenticator, Order, PersistenceError,
    PersistenceGateway, Session,
};
use crate::models::InspectionRecord;

#[derive(Debug, Clone)]
pub struct SupabaseGateway {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    user: Option<TokenUser>,
}

#[derive(Deserialize)]
struct TokenUser {
    #[serde(default)]
    email: Option<String>,
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

async fn error_body(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("{}: {}", status, body)
}

impl SupabaseGateway {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self, PersistenceError> {
        if config.url.trim().is_empty() {
            return Err(PersistenceError::Transport("remote.url is not set".into()));
        }
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PersistenceError::Transport("remote.api_key is not set".into()))?;
        Ok(Self::new(config.url.clone(), api_key))
    }

    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, key)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Anonymous requests carry the API key as bearer; admin requests the session token.
    fn authorized(&self, request: reqwest::RequestBuilder, session: Option<&Session>) -> reqwest::RequestBuilder {
        let bearer = session
            .map(|s| s.access_token.as_str())
            .unwrap_or(self.api_key.as_str());
        request
            .header("apikey", &self.api_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
    }
}

impl PersistenceGateway for SupabaseGateway {
    async fn upload(&self, bucket: &str, local_file: &Path) -> Result<String, PersistenceError> {
        let bucket = check_identifier(bucket)?;
        let bytes = tokio::fs::read(local_file)
            .await
            .map_err(|source| PersistenceError::LocalFile {
                path: local_file.to_path_buf(),
                source,
            })?;

        let key = storage_key(local_file);
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, key);
        debug!(%url, size = bytes.len(), "uploading blob");

        let response = self
            .authorized(self.client.post(&url), None)
            .header(header::CONTENT_TYPE, content_type_for(local_file))
            .body(bytes)
            .send()
            .await
            .map_err(|e| PersistenceError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PersistenceError::Upload {
                bucket: bucket.to_string(),
                reason: error_body(response).await,
            });
        }

        Ok(self.public_url(bucket, &key))
    }

    async fn insert(
        &self,
        table: &str,
        record: &InspectionRecord,
    ) -> Result<InspectionRecord, PersistenceError> {
        let table = check_identifier(table)?;
        let insert_err = |reason: String| PersistenceError::Insert {
            table: table.to_string(),
            reason,
        };

        let response = self
            .authorized(self.client.post(self.table_url(table)), None)
            .header("Prefer", "return=representation")
            .json(record)
            .send()
            .await
            .map_err(|e| PersistenceError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(insert_err(error_body(response).await));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PersistenceError::Transport(e.to_string()))?;
        first_row(&body).map_err(insert_err)
    }

    async fn query(
        &self,
        session: &Session,
        table: &str,
        order: Order,
    ) -> Result<Vec<InspectionRecord>, PersistenceError> {
        let table = check_identifier(table)?;
        let order = order_param(order)?;

        let response = self
            .authorized(self.client.get(self.table_url(table)), Some(session))
            .query(&[("select", "*".to_string()), ("order", order)])
            .send()
            .await
            .map_err(|e| PersistenceError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PersistenceError::Query {
                table: table.to_string(),
                reason: error_body(response).await,
            });
        }

        response.json().await.map_err(|e| PersistenceError::Query {
            table: table.to_string(),
            reason: e.to_string(),
        })
    }

    async fn delete(&self, session: &Session, table: &str, id: i64) -> Result<bool, PersistenceError> {
        let table = check_identifier(table)?;

        let response = self
            .authorized(self.client.delete(self.table_url(table)), Some(session))
            .header("Prefer", "return=representation")
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await
            .map_err(|e| PersistenceError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PersistenceError::Delete {
                table: table.to_string(),
                reason: error_body(response).await,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| PersistenceError::Transport(e.to_string()))?;
        removed_any(&body).map_err(|reason| PersistenceError::Delete {
            table: table.to_string(),
            reason,
        })
    }
}

impl Authenticator for SupabaseGateway {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<Session>, AuthError> {
        let url = format!("{}/auth/v1/token", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("grant_type", "password")])
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        login_outcome(status, &body, email)
    }
}

/// PostgREST `order` value: the requested column, then `id` in the same direction.
fn order_param(order: Order) -> Result<String, PersistenceError> {
    let column = check_identifier(order.column)?;
    let direction = if order.descending { "desc" } else { "asc" };
    Ok(format!("{column}.{direction},id.{direction}"))
}

/// Row echoed back by an insert made with `Prefer: return=representation`.
fn first_row(body: &str) -> Result<InspectionRecord, String> {
    let mut rows: Vec<InspectionRecord> = serde_json::from_str(body).map_err(|e| e.to_string())?;
    if rows.is_empty() {
        return Err("no row returned".into());
    }
    Ok(rows.swap_remove(0))
}

/// Whether a delete made with `Prefer: return=representation` matched a row.
fn removed_any(body: &str) -> Result<bool, String> {
    if body.trim().is_empty() {
        return Ok(false);
    }
    let removed: Vec<serde_json::Value> = serde_json::from_str(body).map_err(|e| e.to_string())?;
    Ok(!removed.is_empty())
}

/// Rejected credentials are `Ok(None)`; any other non-success status is a
/// server error.
fn login_outcome(status: StatusCode, body: &str, email: &str) -> Result<Option<Session>, AuthError> {
    if matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::UNPROCESSABLE_ENTITY
    ) {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(AuthError::Server {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }

    let token: TokenResponse = serde_json::from_str(body)
        .map_err(|e| AuthError::Transport(format!("invalid token response: {}", e)))?;
    let email = token
        .user
        .and_then(|u| u.email)
        .unwrap_or_else(|| email.to_string());
    Ok(Some(Session {
        email,
        access_token: token.access_token,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url() {
        let gw = SupabaseGateway::new("https://example.supabase.co/", "key");
        assert_eq!(
            gw.public_url("image_bucket", "abc.jpg"),
            "https://example.supabase.co/storage/v1/object/public/image_bucket/abc.jpg"
        );
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = RemoteConfig {
            url: "https://example.supabase.co".into(),
            api_key: None,
        };
        assert!(SupabaseGateway::from_config(&config).is_err());
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type_for(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("INS-1.pdf")), "application/pdf");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn test_order_breaks_ties_by_id() {
        assert_eq!(order_param(Order::NEWEST_FIRST).unwrap(), "created_at.desc,id.desc");
        let oldest = Order { column: "created_at", descending: false };
        assert_eq!(order_param(oldest).unwrap(), "created_at.asc,id.asc");
        let bad = Order { column: "created_at;drop", descending: true };
        assert!(order_param(bad).is_err());
    }

    #[test]
    fn test_login_rejections_are_none() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            let outcome = login_outcome(status, r#"{"error":"invalid_grant"}"#, "a@b.c");
            assert!(matches!(outcome, Ok(None)), "{}", status);
        }
    }

    #[test]
    fn test_login_server_error() {
        let outcome = login_outcome(StatusCode::INTERNAL_SERVER_ERROR, "boom", "a@b.c");
        match outcome {
            Err(AuthError::Server { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected server error, got {:?}", other),
        }
    }

    #[test]
    fn test_login_success_builds_session() {
        let body = r#"{"access_token":"tok-1","token_type":"bearer","user":{"email":"Admin@Example.com"}}"#;
        let session = login_outcome(StatusCode::OK, body, "admin@example.com")
            .unwrap()
            .expect("session");
        assert_eq!(session.access_token, "tok-1");
        assert_eq!(session.email, "Admin@Example.com");

        let no_user = login_outcome(StatusCode::OK, r#"{"access_token":"tok-2"}"#, "x@y.z")
            .unwrap()
            .expect("session");
        assert_eq!(no_user.email, "x@y.z");

        assert!(matches!(
            login_outcome(StatusCode::OK, "not json", "x@y.z"),
            Err(AuthError::Transport(_))
        ));
    }

    #[test]
    fn test_delete_body() {
        assert_eq!(removed_any(""), Ok(false));
        assert_eq!(removed_any("[]"), Ok(false));
        assert_eq!(removed_any(r#"[{"id":7}]"#), Ok(true));
        assert!(removed_any("{oops").is_err());
    }

    #[test]
    fn test_insert_takes_first_row() {
        let body = r#"[{"inspection_id":"INS-1234","file_name":"hull.jpg","detected_classes":["corrosion"],
            "highest_confidence":0.7,"risk_level":"MEDIUM","inference_time":0.12,"precision":0.886,
            "recall":0.844,"map50":0.882,"map5095":0.782,"image_url":"a","annotated_image_url":"b",
            "pdf_url":"c","status":"completed","created_at":"2025-03-01T12:00:00Z","id":42}]"#;
        let row = first_row(body).unwrap();
        assert_eq!(row.id, Some(42));
        assert_eq!(row.risk_level.as_str(), "MEDIUM");

        assert_eq!(first_row("[]").unwrap_err(), "no row returned");
    }
}
