//! Database initialization

use crate::error::Result;
use sqlx::{Pool, Sqlite};
use tracing::info;

/// Create the settings table and seed defaults for the keys whose absence
/// has a distinct meaning at startup.
pub async fn init_database(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Absent volume keys fall back to platform defaults, so only the
    // state-machine keys get seeded.
    let defaults = vec![
        // RingerMode::Normal
        ("ringer_mode", "2"),
        // GuardState::NotConfigured
        ("safe_volume_state", "0"),
        ("safe_volume_music_ms", "0"),
    ];

    for (key, default_value) in defaults {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
            .bind(key)
            .fetch_one(pool)
            .await?;

        if !exists {
            sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
    }

    Ok(())
}
