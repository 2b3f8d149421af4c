//! Settings database access
//!
//! Read/write settings from the settings table (key-value store). Volume
//! indices are stored per stream/device pair under exact keys like
//! `volume_music_wired_headset`; loads iterate every known stream/device
//! combination rather than parsing keys back apart, since both stream and
//! device names contain underscores.

use crate::error::{Error, Result};
use audiod_common::types::{AudioStream, DeviceType, RingerMode};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

fn volume_key(stream: AudioStream, device: DeviceType) -> String {
    format!("volume_{}_{}", stream.name(), device.name())
}

fn group_volume_key(group: &str, device: DeviceType) -> String {
    format!("group_volume_{}_{}", group, device.name())
}

/// Persist one stream/device index (x10 units)
pub async fn save_stream_volume(
    db: &Pool<Sqlite>,
    stream: AudioStream,
    device: DeviceType,
    index: i32,
) -> Result<()> {
    set_setting(db, &volume_key(stream, device), index).await
}

/// Load one stream/device index, if persisted
pub async fn load_stream_volume(
    db: &Pool<Sqlite>,
    stream: AudioStream,
    device: DeviceType,
) -> Result<Option<i32>> {
    get_setting::<i32>(db, &volume_key(stream, device)).await
}

/// Load every persisted stream/device index
pub async fn load_all_stream_volumes(
    db: &Pool<Sqlite>,
) -> Result<Vec<(AudioStream, DeviceType, i32)>> {
    let mut loaded = Vec::new();
    for stream in AudioStream::ALL {
        for device in DeviceType::ALL {
            if let Some(index) = load_stream_volume(db, stream, device).await? {
                loaded.push((stream, device, index));
            }
        }
    }
    Ok(loaded)
}

/// Persist one group/device index (x10 units)
pub async fn save_group_volume(
    db: &Pool<Sqlite>,
    group: &str,
    device: DeviceType,
    index: i32,
) -> Result<()> {
    set_setting(db, &group_volume_key(group, device), index).await
}

/// Load every persisted index for the named groups
pub async fn load_group_volumes(
    db: &Pool<Sqlite>,
    groups: &[&str],
) -> Result<Vec<(String, DeviceType, i32)>> {
    let mut loaded = Vec::new();
    for group in groups {
        for device in DeviceType::ALL {
            if let Some(index) = get_setting::<i32>(db, &group_volume_key(group, device)).await? {
                loaded.push((group.to_string(), device, index));
            }
        }
    }
    Ok(loaded)
}

/// Persist the internal ringer mode
pub async fn save_ringer_mode(db: &Pool<Sqlite>, mode: RingerMode) -> Result<()> {
    set_setting(db, "ringer_mode", mode.as_setting()).await
}

/// Load the persisted ringer mode; Normal when absent or unrecognized
pub async fn load_ringer_mode(db: &Pool<Sqlite>) -> Result<RingerMode> {
    match get_setting::<i64>(db, "ringer_mode").await? {
        Some(value) => Ok(RingerMode::from_setting(value).unwrap_or(RingerMode::Normal)),
        None => Ok(RingerMode::Normal),
    }
}

/// Persist the safe volume guard state and listening counter
pub async fn save_safe_volume_state(db: &Pool<Sqlite>, state: i64, music_ms: u64) -> Result<()> {
    set_setting(db, "safe_volume_state", state).await?;
    set_setting(db, "safe_volume_music_ms", music_ms).await
}

/// Load the persisted guard state and listening counter
pub async fn load_safe_volume_state(db: &Pool<Sqlite>) -> Result<(i64, u64)> {
    let state = get_setting::<i64>(db, "safe_volume_state").await?.unwrap_or(0);
    let music_ms = get_setting::<u64>(db, "safe_volume_music_ms")
        .await?
        .unwrap_or(0);
    Ok((state, music_ms))
}

/// Generic setting getter
///
/// Returns None if key doesn't exist in database.
/// Parses value from string using FromStr trait.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter
///
/// Inserts or updates setting in database.
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_database(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_generic_setting_get_set() {
        let db = setup_test_db().await;

        set_setting(&db, "test_int", 42).await.unwrap();
        let value: Option<i32> = get_setting(&db, "test_int").await.unwrap();
        assert_eq!(value, Some(42));

        set_setting(&db, "test_int", 43).await.unwrap();
        let value: Option<i32> = get_setting(&db, "test_int").await.unwrap();
        assert_eq!(value, Some(43));

        let value: Option<String> = get_setting(&db, "nonexistent").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_stream_volume_round_trip() {
        let db = setup_test_db().await;

        save_stream_volume(&db, AudioStream::Music, DeviceType::WiredHeadset, 60)
            .await
            .unwrap();
        let index = load_stream_volume(&db, AudioStream::Music, DeviceType::WiredHeadset)
            .await
            .unwrap();
        assert_eq!(index, Some(60));

        // Other devices are untouched
        let index = load_stream_volume(&db, AudioStream::Music, DeviceType::Speaker)
            .await
            .unwrap();
        assert_eq!(index, None);
    }

    #[tokio::test]
    async fn test_load_all_stream_volumes() {
        let db = setup_test_db().await;

        save_stream_volume(&db, AudioStream::Music, DeviceType::Speaker, 50)
            .await
            .unwrap();
        save_stream_volume(&db, AudioStream::Ring, DeviceType::Default, 40)
            .await
            .unwrap();
        // Underscore-heavy names must not confuse key handling
        save_stream_volume(&db, AudioStream::VoiceCall, DeviceType::WiredHeadset, 30)
            .await
            .unwrap();

        let mut loaded = load_all_stream_volumes(&db).await.unwrap();
        loaded.sort_by_key(|(s, d, _)| (s.name(), d.name()));
        assert_eq!(
            loaded,
            vec![
                (AudioStream::Music, DeviceType::Speaker, 50),
                (AudioStream::Ring, DeviceType::Default, 40),
                (AudioStream::VoiceCall, DeviceType::WiredHeadset, 30),
            ]
        );
    }

    #[tokio::test]
    async fn test_group_volume_round_trip() {
        let db = setup_test_db().await;

        save_group_volume(&db, "media", DeviceType::Speaker, 80)
            .await
            .unwrap();
        let loaded = load_group_volumes(&db, &["media", "call"]).await.unwrap();
        assert_eq!(loaded, vec![("media".to_string(), DeviceType::Speaker, 80)]);
    }

    #[tokio::test]
    async fn test_ringer_mode_defaults_to_normal() {
        let db = setup_test_db().await;
        assert_eq!(load_ringer_mode(&db).await.unwrap(), RingerMode::Normal);

        save_ringer_mode(&db, RingerMode::Silent).await.unwrap();
        assert_eq!(load_ringer_mode(&db).await.unwrap(), RingerMode::Silent);
    }

    #[tokio::test]
    async fn test_corrupt_ringer_mode_falls_back() {
        let db = setup_test_db().await;
        set_setting(&db, "ringer_mode", 99).await.unwrap();
        assert_eq!(load_ringer_mode(&db).await.unwrap(), RingerMode::Normal);
    }

    #[tokio::test]
    async fn test_safe_volume_state_round_trip() {
        let db = setup_test_db().await;
        assert_eq!(load_safe_volume_state(&db).await.unwrap(), (0, 0));

        save_safe_volume_state(&db, 3, 120_000).await.unwrap();
        assert_eq!(load_safe_volume_state(&db).await.unwrap(), (3, 120_000));
    }
}
