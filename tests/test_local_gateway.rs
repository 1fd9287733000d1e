mod common;

use common::*;
use marine_inspect::admin;
use marine_inspect::core::db::{AdminCredential, LocalGateway};
use marine_inspect::core::gateway::{
    AuthError, Authenticator, Order, PersistenceError, PersistenceGateway, Session,
};
use marine_inspect::models::RiskTier;

#[tokio::test]
async fn test_insert_assigns_id_and_created_at() -> anyhow::Result<()> {
    let (gateway, _dir) = create_local_gateway().await;

    let stored = gateway
        .insert("inspections", &make_record("INS-1111", RiskTier::Medium))
        .await?;

    assert!(stored.id.is_some());
    assert!(stored.created_at.is_some());
    assert_eq!(stored.inspection_id, "INS-1111");

    let session = login_admin(&gateway).await;
    let rows = gateway
        .query(&session, "inspections", Order::NEWEST_FIRST)
        .await?;
    assert_eq!(rows, vec![stored]);
    Ok(())
}

#[tokio::test]
async fn test_query_newest_first() -> anyhow::Result<()> {
    let (gateway, _dir) = create_local_gateway().await;

    for id in ["INS-1001", "INS-1002", "INS-1003"] {
        gateway
            .insert("inspections", &make_record(id, RiskTier::Low))
            .await?;
    }

    let session = login_admin(&gateway).await;
    let rows = admin::list_inspections(&gateway, &session, "inspections").await?;
    let ids: Vec<_> = rows.iter().map(|r| r.inspection_id.as_str()).collect();
    assert_eq!(ids, ["INS-1003", "INS-1002", "INS-1001"]);
    Ok(())
}

#[tokio::test]
async fn test_round_trip_keeps_classes_and_risk() -> anyhow::Result<()> {
    let (gateway, _dir) = create_local_gateway().await;
    let mut record = make_record("INS-2222", RiskTier::High);
    record.detected_classes = vec!["hull_crack".into(), "corrosion".into(), "hull_crack".into()];
    record.highest_confidence = 0.9100000262260437;

    gateway.insert("inspections", &record).await?;
    let session = login_admin(&gateway).await;
    let rows = gateway
        .query(&session, "inspections", Order::NEWEST_FIRST)
        .await?;

    assert_eq!(rows[0].detected_classes, record.detected_classes);
    assert_eq!(rows[0].risk_level, RiskTier::High);
    assert_eq!(rows[0].highest_confidence, record.highest_confidence);
    assert_eq!(rows[0].status.as_str(), "completed");
    Ok(())
}

#[tokio::test]
async fn test_delete_is_hard_delete() -> anyhow::Result<()> {
    let (gateway, _dir) = create_local_gateway().await;
    let keep = gateway
        .insert("inspections", &make_record("INS-3001", RiskTier::Safe))
        .await?;
    let gone = gateway
        .insert("inspections", &make_record("INS-3002", RiskTier::Low))
        .await?;
    let session = login_admin(&gateway).await;

    let removed =
        admin::delete_inspection(&gateway, &session, "inspections", gone.id.unwrap()).await?;
    assert!(removed);

    let again =
        admin::delete_inspection(&gateway, &session, "inspections", gone.id.unwrap()).await?;
    assert!(!again);

    let rows = admin::list_inspections(&gateway, &session, "inspections").await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, keep.id);
    Ok(())
}

#[tokio::test]
async fn test_upload_copies_blob_under_random_key() -> anyhow::Result<()> {
    let (gateway, dir) = create_local_gateway().await;
    let image = write_test_image(dir.path(), "INS-4001.png");

    let first = gateway.upload("image_bucket", &image).await?;
    let second = gateway.upload("image_bucket", &image).await?;

    assert_ne!(first, second);
    assert!(first.starts_with("file://storage/image_bucket/"));
    assert!(first.ends_with(".png"));
    assert!(!first.contains("INS-4001"));

    let key = first.rsplit('/').next().unwrap();
    let stored = gateway.blob_dir().join("image_bucket").join(key);
    assert_eq!(std::fs::read(stored)?, std::fs::read(&image)?);
    Ok(())
}

#[tokio::test]
async fn test_upload_missing_file_fails() -> anyhow::Result<()> {
    let (gateway, dir) = create_local_gateway().await;

    let err = gateway
        .upload("image_bucket", &dir.path().join("missing.png"))
        .await
        .unwrap_err();

    assert!(matches!(err, PersistenceError::LocalFile { .. }));
    Ok(())
}

#[tokio::test]
async fn test_upload_rejects_bucket_outside_blob_dir() -> anyhow::Result<()> {
    let (gateway, dir) = create_local_gateway().await;
    let image = write_test_image(dir.path(), "INS-4002.png");

    for bucket in ["../x", "image_bucket/../../x", ""] {
        let err = gateway.upload(bucket, &image).await.unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidIdentifier(_)), "{}", bucket);
    }
    assert!(!dir.path().join("x").exists());
    Ok(())
}

#[tokio::test]
async fn test_rejects_unsafe_table_names() -> anyhow::Result<()> {
    let (gateway, _dir) = create_local_gateway().await;

    let err = gateway
        .insert("inspections; DROP TABLE inspections", &make_record("INS-5", RiskTier::Low))
        .await
        .unwrap_err();

    assert!(matches!(err, PersistenceError::InvalidIdentifier(_)));
    Ok(())
}

#[tokio::test]
async fn test_login() -> anyhow::Result<()> {
    let (gateway, _dir) = create_local_gateway().await;

    let session = admin::login(&gateway, ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    assert_eq!(session.map(|s| s.email), Some(ADMIN_EMAIL.to_string()));

    let rejected = admin::login(&gateway, ADMIN_EMAIL, "wrong").await?;
    assert!(rejected.is_none());
    Ok(())
}

#[tokio::test]
async fn test_query_and_delete_require_issued_session() -> anyhow::Result<()> {
    let (gateway, _dir) = create_local_gateway().await;
    let stored = gateway
        .insert("inspections", &make_record("INS-6001", RiskTier::Low))
        .await?;
    let forged = Session {
        email: ADMIN_EMAIL.into(),
        access_token: "made-up-token".into(),
    };

    let err = gateway
        .query(&forged, "inspections", Order::NEWEST_FIRST)
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Unauthorized));

    let err = gateway
        .delete(&forged, "inspections", stored.id.unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Unauthorized));

    // a session issued by another gateway instance is not honoured either
    let (other, _other_dir) = create_local_gateway().await;
    let foreign = login_admin(&other).await;
    assert!(gateway
        .query(&foreign, "inspections", Order::NEWEST_FIRST)
        .await
        .is_err());

    let session = login_admin(&gateway).await;
    assert_eq!(gateway.query(&session, "inspections", Order::NEWEST_FIRST).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_login_without_admin_is_not_configured() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let gateway = LocalGateway::open(
        dir.path().join("inspect.db"),
        dir.path().join("storage"),
        "file://storage",
    )
    .await?;

    let err = gateway
        .authenticate(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::NotConfigured(_)));
    Ok(())
}

#[tokio::test]
async fn test_rows_survive_reopen() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let db = dir.path().join("inspect.db");
    let blobs = dir.path().join("storage");

    let gateway = LocalGateway::open(&db, &blobs, "file://storage").await?;
    gateway
        .insert("inspections", &make_record("INS-7007", RiskTier::Medium))
        .await?;
    gateway.close().await;

    let reopened = LocalGateway::open(&db, &blobs, "file://storage")
        .await?
        .with_admin(Some(AdminCredential::from_password(ADMIN_EMAIL, ADMIN_PASSWORD)));
    let session = login_admin(&reopened).await;
    let rows = reopened
        .query(&session, "inspections", Order::NEWEST_FIRST)
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].inspection_id, "INS-7007");
    Ok(())
}
