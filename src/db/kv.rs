use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::AuraError;

/// Local key-value cache. Values are opaque strings, usually JSON.
pub async fn put(pool: &SqlitePool, key: &str, value: &str) -> Result<(), AuraError> {
    if key.trim().is_empty() {
        return Err(AuraError::invalid("key is required"));
    }

    sqlx::query(
        r#"
        INSERT INTO aura_kv (key, value, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key.trim())
    .bind(value)
    .bind(Utc::now().timestamp_millis())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<String>, AuraError> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM aura_kv WHERE key = ?")
        .bind(key.trim())
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

pub async fn delete(pool: &SqlitePool, key: &str) -> Result<bool, AuraError> {
    let rows_affected = sqlx::query("DELETE FROM aura_kv WHERE key = ?")
        .bind(key.trim())
        .execute(pool)
        .await?
        .rows_affected();
    Ok(rows_affected > 0)
}
