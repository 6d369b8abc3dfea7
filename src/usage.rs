//! UsageTracker
//!
//! 크리덴셜 단위 소비량 기록과 집계.
//!
//! `record`는 카운트 증가 + 당일 로그 upsert + last_used_at 갱신을
//! 한 트랜잭션으로 수행한다. 한도를 넘겨도 status는 건드리지 않는다 —
//! 상태 전이는 RotationPolicyEngine의 책임 (증가 경로는 재시도에 멱등).

use std::sync::Arc;

use rusqlite::OptionalExtension;

use crate::db::Store;
use crate::error::CoreError;
use crate::models::UsageLogEntry;

pub struct UsageTracker {
    store: Arc<Store>,
}

impl UsageTracker {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// 소비 1회 기록
    pub async fn record(&self, credential_id: i64) -> Result<(), CoreError> {
        self.store
            .with(move |conn| {
                let tx = conn.unchecked_transaction()?;

                let now = chrono::Utc::now().timestamp_millis();
                let changed = tx.execute(
                    "UPDATE credentials
                     SET usage_count = usage_count + 1, last_used_at = ?1
                     WHERE id = ?2",
                    rusqlite::params![now, credential_id],
                )?;
                if changed == 0 {
                    return Err(CoreError::CredentialNotFound(credential_id));
                }

                let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
                tx.execute(
                    "INSERT INTO usage_log (credential_id, count, date) VALUES (?1, 1, ?2)
                     ON CONFLICT (credential_id, date) DO UPDATE SET count = count + 1",
                    rusqlite::params![credential_id, today],
                )?;

                tx.commit()?;
                Ok(())
            })
            .await
    }

    /// 누적 소비량
    pub async fn total(&self, credential_id: i64) -> Result<i64, CoreError> {
        self.store
            .with(move |conn| {
                conn.query_row(
                    "SELECT usage_count FROM credentials WHERE id = ?1",
                    [credential_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(CoreError::CredentialNotFound(credential_id))
            })
            .await
    }

    /// 한도 도달 여부 (count >= limit)
    pub async fn is_exhausted(&self, credential_id: i64) -> Result<bool, CoreError> {
        self.store
            .with(move |conn| {
                conn.query_row(
                    "SELECT usage_count >= usage_limit FROM credentials WHERE id = ?1",
                    [credential_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(CoreError::CredentialNotFound(credential_id))
            })
            .await
    }

    /// 일 단위 사용량 로그 (최신 날짜 우선)
    pub async fn daily_totals(&self, credential_id: i64) -> Result<Vec<UsageLogEntry>, CoreError> {
        self.store
            .with(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT credential_id, count, date FROM usage_log
                     WHERE credential_id = ?1 ORDER BY date DESC",
                )?;
                let iter = stmt.query_map([credential_id], |row| {
                    Ok(UsageLogEntry {
                        credential_id: row.get(0)?,
                        count: row.get(1)?,
                        date: row.get(2)?,
                    })
                })?;

                let mut out = Vec::new();
                for entry in iter {
                    out.push(entry?);
                }
                Ok(out)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::cipher::{MasterKey, MASTER_KEY_LEN};
    use crate::vault::CredentialVault;
    use tempfile::tempdir;

    async fn setup(dir: &std::path::Path) -> (Arc<Store>, CredentialVault, UsageTracker) {
        let store = Arc::new(Store::open(&dir.join("rotor.db")).unwrap());
        store.initialize().await.unwrap();
        let vault =
            CredentialVault::new(Arc::clone(&store), MasterKey::from_bytes([7; MASTER_KEY_LEN]));
        let usage = UsageTracker::new(Arc::clone(&store));
        (store, vault, usage)
    }

    #[tokio::test]
    async fn test_record_increments_and_upserts_daily_log() {
        let dir = tempdir().unwrap();
        let (store, vault, usage) = setup(dir.path()).await;

        let credential = vault.create("u@example.com", "s", Some(3), None).await.unwrap();
        assert_eq!(usage.total(credential.id).await.unwrap(), 0);

        usage.record(credential.id).await.unwrap();
        usage.record(credential.id).await.unwrap();

        assert_eq!(usage.total(credential.id).await.unwrap(), 2);

        // 같은 날짜 upsert → 로그 행은 1개, count만 증가
        let daily = usage.daily_totals(credential.id).await.unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].count, 2);

        // last_used_at 갱신 확인
        let last_used: Option<i64> = store
            .with(move |conn| {
                Ok(conn.query_row(
                    "SELECT last_used_at FROM credentials WHERE id = ?1",
                    [credential.id],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert!(last_used.is_some());
    }

    #[tokio::test]
    async fn test_exhaustion_flag_without_status_change() {
        let dir = tempdir().unwrap();
        let (_store, vault, usage) = setup(dir.path()).await;

        let credential = vault.create("x@example.com", "s", Some(2), None).await.unwrap();
        assert!(!usage.is_exhausted(credential.id).await.unwrap());

        usage.record(credential.id).await.unwrap();
        usage.record(credential.id).await.unwrap();

        // 한도 도달을 보고하되 status는 active 그대로
        assert!(usage.is_exhausted(credential.id).await.unwrap());
        let refreshed = vault.get(credential.id).await.unwrap();
        assert_eq!(refreshed.status, crate::models::CredentialStatus::Active);
    }

    #[tokio::test]
    async fn test_record_unknown_credential() {
        let dir = tempdir().unwrap();
        let (_store, _vault, usage) = setup(dir.path()).await;

        assert!(matches!(
            usage.record(999).await,
            Err(CoreError::CredentialNotFound(999))
        ));
        assert!(matches!(
            usage.total(999).await,
            Err(CoreError::CredentialNotFound(999))
        ));
    }
}
