use upkeep_service::db::{DbClient, DbConfig};

pub async fn test_db_client() -> DbClient {
    let config = DbConfig::from_env();
    let db = DbClient::from_config(&config).expect("Failed to create database client");
    db.migrate().await.expect("Failed to apply schema");
    db
}

/// A request id that no earlier test run has used.
pub fn unique_request_id(prefix: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{}-{}", prefix, nanos)
}

/// A SKU that no earlier test run has used.
pub fn unique_sku(class: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{}-STL-M10-{}", class, nanos % 1_000_000_000)
}
