//! SettingsStore
//!
//! `settings` 테이블(key/value 단일본)에 대한 타입 있는 접근자.
//! 다섯 개의 키는 스키마 초기화 시 시드된다.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::OptionalExtension;

use crate::db::{schema, Store};
use crate::error::CoreError;

pub struct SettingsStore {
    store: Arc<Store>,
}

impl SettingsStore {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let key = key.to_string();
        self.store
            .with(move |conn| {
                Ok(conn
                    .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                        row.get(0)
                    })
                    .optional()?)
            })
            .await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.store
            .with(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                    [key, value],
                )?;
                Ok(())
            })
            .await
    }

    /// UI 표시용 전체 설정 맵
    pub async fn get_all(&self) -> Result<HashMap<String, String>, CoreError> {
        self.store
            .with(|conn| {
                let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
                let iter = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;

                let mut out = HashMap::new();
                for pair in iter {
                    let (key, value) = pair?;
                    out.insert(key, value);
                }
                Ok(out)
            })
            .await
    }

    pub async fn active_credential_id(&self) -> Result<Option<i64>, CoreError> {
        Ok(self
            .get(schema::SETTING_ACTIVE_CREDENTIAL_ID)
            .await?
            .and_then(|v| v.parse::<i64>().ok()))
    }

    pub async fn set_active_credential_id(&self, id: i64) -> Result<(), CoreError> {
        self.set(schema::SETTING_ACTIVE_CREDENTIAL_ID, &id.to_string())
            .await
    }

    pub async fn auto_switch_enabled(&self) -> Result<bool, CoreError> {
        Ok(self
            .get(schema::SETTING_AUTO_SWITCH_ENABLED)
            .await?
            .map(|v| v == "true")
            .unwrap_or(true))
    }

    pub async fn default_usage_limit(&self) -> Result<i64, CoreError> {
        Ok(self
            .get(schema::SETTING_DEFAULT_USAGE_LIMIT)
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(50))
    }

    pub async fn rotation_count(&self) -> Result<i64, CoreError> {
        Ok(self
            .get(schema::SETTING_ROTATION_COUNT)
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0))
    }

    pub async fn reinstall_after_rotations(&self) -> Result<i64, CoreError> {
        Ok(self
            .get(schema::SETTING_REINSTALL_AFTER_ROTATIONS)
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_seeded_defaults_and_typed_accessors() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("rotor.db")).unwrap());
        store.initialize().await.unwrap();
        let settings = SettingsStore::new(store);

        assert_eq!(settings.active_credential_id().await.unwrap(), None);
        assert!(settings.auto_switch_enabled().await.unwrap());
        assert_eq!(settings.default_usage_limit().await.unwrap(), 50);
        assert_eq!(settings.rotation_count().await.unwrap(), 0);
        assert_eq!(settings.reinstall_after_rotations().await.unwrap(), 3);

        settings.set_active_credential_id(12).await.unwrap();
        assert_eq!(settings.active_credential_id().await.unwrap(), Some(12));

        settings.set("auto_switch_enabled", "false").await.unwrap();
        assert!(!settings.auto_switch_enabled().await.unwrap());

        let all = settings.get_all().await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all.get("active_credential_id").map(String::as_str), Some("12"));
    }
}
