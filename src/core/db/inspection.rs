use sqlx::{Row, sqlite::SqliteRow};

use crate::core::gateway::{check_identifier, Order, PersistenceError};
use crate::models::{InspectionRecord, InspectionStatus, RiskTier};

use super::state::LocalState;

const SELECT_COLUMNS: &str = "id, inspection_id, file_name, detected_classes, highest_confidence, \
     risk_level, inference_time, precision, recall, map50, map5095, image_url, \
     annotated_image_url, pdf_url, status, created_at";

fn decode_err(table: &str, reason: impl std::fmt::Display) -> PersistenceError {
    PersistenceError::Query {
        table: table.to_string(),
        reason: reason.to_string(),
    }
}

fn record_from_row(table: &str, row: &SqliteRow) -> Result<InspectionRecord, PersistenceError> {
    let classes: String = row.try_get("detected_classes")?;
    let detected_classes: Vec<String> =
        serde_json::from_str(&classes).map_err(|e| decode_err(table, e))?;

    let risk: String = row.try_get("risk_level")?;
    let risk_level: RiskTier = risk.parse().map_err(|e: String| decode_err(table, e))?;

    let status: String = row.try_get("status")?;
    let status = match status.as_str() {
        "completed" => InspectionStatus::Completed,
        other => return Err(decode_err(table, format!("unknown status '{}'", other))),
    };

    Ok(InspectionRecord {
        inspection_id: row.try_get("inspection_id")?,
        file_name: row.try_get("file_name")?,
        detected_classes,
        highest_confidence: row.try_get("highest_confidence")?,
        risk_level,
        inference_time: row.try_get("inference_time")?,
        precision: row.try_get("precision")?,
        recall: row.try_get("recall")?,
        map50: row.try_get("map50")?,
        map5095: row.try_get("map5095")?,
        image_url: row.try_get("image_url")?,
        annotated_image_url: row.try_get("annotated_image_url")?,
        pdf_url: row.try_get("pdf_url")?,
        status,
        created_at: Some(row.try_get("created_at")?),
        id: Some(row.try_get("id")?),
    })
}

pub(super) async fn insert_inspection(
    state: &LocalState,
    table: &str,
    record: &InspectionRecord,
) -> Result<InspectionRecord, PersistenceError> {
    let table = check_identifier(table)?;
    let classes = serde_json::to_string(&record.detected_classes).map_err(|e| {
        PersistenceError::Insert {
            table: table.to_string(),
            reason: e.to_string(),
        }
    })?;

    let sql = format!(
        "INSERT INTO {table} (inspection_id, file_name, detected_classes, highest_confidence, \
         risk_level, inference_time, precision, recall, map50, map5095, image_url, \
         annotated_image_url, pdf_url, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         RETURNING id, created_at"
    );

    let mut conn = state.conn().await?;
    let row = sqlx::query(&sql)
        .bind(&record.inspection_id)
        .bind(&record.file_name)
        .bind(classes)
        .bind(record.highest_confidence)
        .bind(record.risk_level.as_str())
        .bind(record.inference_time)
        .bind(record.precision)
        .bind(record.recall)
        .bind(record.map50)
        .bind(record.map5095)
        .bind(&record.image_url)
        .bind(&record.annotated_image_url)
        .bind(&record.pdf_url)
        .bind(record.status.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| PersistenceError::Insert {
            table: table.to_string(),
            reason: e.to_string(),
        })?;

    let mut stored = record.clone();
    stored.id = Some(row.try_get("id")?);
    stored.created_at = Some(row.try_get("created_at")?);
    Ok(stored)
}

pub(super) async fn query_inspections(
    state: &LocalState,
    table: &str,
    order: Order,
) -> Result<Vec<InspectionRecord>, PersistenceError> {
    let table = check_identifier(table)?;
    let column = check_identifier(order.column)?;
    let direction = if order.descending { "DESC" } else { "ASC" };

    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM {table} ORDER BY {column} {direction}, id {direction}"
    );

    let mut conn = state.conn().await?;
    sqlx::query(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| decode_err(table, e))?
        .iter()
        .map(|row| record_from_row(table, row))
        .collect()
}

pub(super) async fn delete_inspection(
    state: &LocalState,
    table: &str,
    id: i64,
) -> Result<bool, PersistenceError> {
    let table = check_identifier(table)?;
    let sql = format!("DELETE FROM {table} WHERE id = $1");

    let mut conn = state.conn().await?;
    let result = sqlx::query(&sql)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| PersistenceError::Delete {
            table: table.to_string(),
            reason: e.to_string(),
        })?;
    Ok(result.rows_affected() > 0)
}
