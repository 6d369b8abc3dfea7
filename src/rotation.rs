//! RotationPolicyEngine
//!
//! 활성 크리덴셜의 결정과 상태 전이.
//!
//! 상태 기계: `active → exhausted → disabled`. 재활성화/비활성화는
//! `set_status`를 통한 명시적 관리 조작으로만 일어난다.
//! 로테이션은 disabled/exhausted를 절대 선택하지 않는다.

use std::sync::Arc;

use rusqlite::OptionalExtension;

use crate::db::{schema, Store};
use crate::error::CoreError;
use crate::models::{Credential, CredentialStatus};
use crate::vault::{credential_from_row, CREDENTIAL_COLUMNS};

pub struct RotationPolicyEngine {
    store: Arc<Store>,
}

impl RotationPolicyEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// 설정의 `active_credential_id`가 가리키는 크리덴셜.
    /// 미설정이거나, 삭제되었거나, 더 이상 active가 아니면 None.
    pub async fn get_active(&self) -> Result<Option<Credential>, CoreError> {
        self.store
            .with(|conn| {
                let active_id: Option<i64> = conn
                    .query_row(
                        "SELECT value FROM settings WHERE key = ?1",
                        [schema::SETTING_ACTIVE_CREDENTIAL_ID],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?
                    .and_then(|v| v.parse::<i64>().ok());

                let Some(id) = active_id else {
                    return Ok(None);
                };

                let credential = conn
                    .query_row(
                        &format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = ?1"),
                        [id],
                        credential_from_row,
                    )
                    .optional()?;

                Ok(credential.filter(|c| c.status == CredentialStatus::Active))
            })
            .await
    }

    /// 다음 크리덴셜 선택: active이면서 한도 미만인 것 중
    /// least-recently-used (last_used_at NULL 우선), 동률이면 created_at 오름차순.
    /// 선택과 동시에 활성으로 설정하고 rotation_count를 증가시킨다.
    pub async fn select_next(&self) -> Result<Credential, CoreError> {
        self.store
            .with(|conn| {
                let tx = conn.unchecked_transaction()?;

                let candidate = tx
                    .query_row(
                        &format!(
                            "SELECT {CREDENTIAL_COLUMNS} FROM credentials
                             WHERE status = 'active' AND usage_count < usage_limit
                             ORDER BY (last_used_at IS NOT NULL), last_used_at ASC,
                                      created_at ASC, id ASC
                             LIMIT 1"
                        ),
                        [],
                        credential_from_row,
                    )
                    .optional()?;

                let Some(credential) = candidate else {
                    return Err(CoreError::NoEligibleCredential);
                };

                tx.execute(
                    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                    [
                        schema::SETTING_ACTIVE_CREDENTIAL_ID,
                        &credential.id.to_string(),
                    ],
                )?;
                tx.execute(
                    "UPDATE settings SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT)
                     WHERE key = ?1",
                    [schema::SETTING_ROTATION_COUNT],
                )?;

                tx.commit()?;

                println!(
                    "[Rotation] Switched active credential to {} (id={})",
                    credential.email, credential.id
                );
                Ok(credential)
            })
            .await
    }

    /// 한도에 도달했으면 `exhausted`로 전이. 전이가 일어났는지 반환.
    pub async fn mark_exhausted_if_needed(&self, credential_id: i64) -> Result<bool, CoreError> {
        self.store
            .with(move |conn| {
                let changed = conn.execute(
                    "UPDATE credentials SET status = 'exhausted'
                     WHERE id = ?1 AND status = 'active' AND usage_count >= usage_limit",
                    [credential_id],
                )?;
                if changed > 0 {
                    println!("[Rotation] Credential exhausted: id={}", credential_id);
                }
                Ok(changed > 0)
            })
            .await
    }

    /// 명시적 상태 전이 (관리 조작: disable / 재활성화)
    pub async fn set_status(
        &self,
        credential_id: i64,
        status: CredentialStatus,
    ) -> Result<(), CoreError> {
        self.store
            .with(move |conn| {
                let changed = conn.execute(
                    "UPDATE credentials SET status = ?1 WHERE id = ?2",
                    rusqlite::params![status.as_str(), credential_id],
                )?;
                if changed == 0 {
                    return Err(CoreError::CredentialNotFound(credential_id));
                }
                Ok(())
            })
            .await
    }

    /// auto-switch가 켜져 있고 활성 크리덴셜이 한도에 도달했으면
    /// exhausted로 전이 후 다음 크리덴셜을 선택한다.
    /// 로테이션이 일어났으면 새 활성 크리덴셜을 반환.
    pub async fn rotate_if_exhausted(&self) -> Result<Option<Credential>, CoreError> {
        let auto_switch = self
            .store
            .with(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT value FROM settings WHERE key = ?1",
                        [schema::SETTING_AUTO_SWITCH_ENABLED],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?
                    .map(|v| v == "true")
                    .unwrap_or(true))
            })
            .await?;
        if !auto_switch {
            return Ok(None);
        }

        match self.get_active().await? {
            Some(active) if active.usage_count >= active.usage_limit => {
                self.mark_exhausted_if_needed(active.id).await?;
                Ok(Some(self.select_next().await?))
            }
            Some(_) => Ok(None),
            // 활성 크리덴셜이 없으면 (미설정/삭제/소진) 새로 선택
            None => Ok(Some(self.select_next().await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsStore;
    use crate::usage::UsageTracker;
    use crate::vault::cipher::{MasterKey, MASTER_KEY_LEN};
    use crate::vault::CredentialVault;
    use tempfile::tempdir;

    struct Fixture {
        store: Arc<Store>,
        vault: CredentialVault,
        usage: UsageTracker,
        rotation: RotationPolicyEngine,
        settings: SettingsStore,
    }

    async fn setup(dir: &std::path::Path) -> Fixture {
        let store = Arc::new(Store::open(&dir.join("rotor.db")).unwrap());
        store.initialize().await.unwrap();
        Fixture {
            vault: CredentialVault::new(
                Arc::clone(&store),
                MasterKey::from_bytes([7; MASTER_KEY_LEN]),
            ),
            usage: UsageTracker::new(Arc::clone(&store)),
            rotation: RotationPolicyEngine::new(Arc::clone(&store)),
            settings: SettingsStore::new(Arc::clone(&store)),
            store,
        }
    }

    async fn set_last_used(store: &Store, id: i64, ts: Option<i64>) {
        store
            .with(move |conn| {
                conn.execute(
                    "UPDATE credentials SET last_used_at = ?1 WHERE id = ?2",
                    rusqlite::params![ts, id],
                )?;
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_select_next_prefers_never_used_then_lru() {
        let dir = tempdir().unwrap();
        let f = setup(dir.path()).await;

        let a = f.vault.create("a@x.com", "s", Some(50), None).await.unwrap();
        let b = f.vault.create("b@x.com", "s", Some(50), None).await.unwrap();
        let c = f.vault.create("c@x.com", "s", Some(50), None).await.unwrap();

        set_last_used(&f.store, a.id, Some(1_000)).await;
        set_last_used(&f.store, b.id, Some(2_000)).await;
        // c는 한 번도 사용 안 함 → NULL 우선

        let chosen = f.rotation.select_next().await.unwrap();
        assert_eq!(chosen.id, c.id);
        assert_eq!(f.settings.active_credential_id().await.unwrap(), Some(c.id));
        assert_eq!(f.settings.rotation_count().await.unwrap(), 1);

        // c도 사용되고 나면 LRU인 a가 선택됨
        set_last_used(&f.store, c.id, Some(3_000)).await;
        let chosen = f.rotation.select_next().await.unwrap();
        assert_eq!(chosen.id, a.id);
        assert_eq!(f.settings.rotation_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_select_next_created_at_tiebreak() {
        let dir = tempdir().unwrap();
        let f = setup(dir.path()).await;

        let first = f.vault.create("old@x.com", "s", Some(50), None).await.unwrap();
        let _second = f.vault.create("new@x.com", "s", Some(50), None).await.unwrap();

        // 둘 다 NULL last_used_at → created_at 오름차순 (같은 ms면 id 오름차순)
        let chosen = f.rotation.select_next().await.unwrap();
        assert_eq!(chosen.id, first.id);
    }

    #[tokio::test]
    async fn test_select_next_skips_exhausted_and_disabled() {
        let dir = tempdir().unwrap();
        let f = setup(dir.path()).await;

        let a = f.vault.create("a@x.com", "s", Some(1), None).await.unwrap();
        let b = f.vault.create("b@x.com", "s", Some(50), None).await.unwrap();
        let c = f.vault.create("c@x.com", "s", Some(50), None).await.unwrap();

        f.usage.record(a.id).await.unwrap();
        f.rotation.mark_exhausted_if_needed(a.id).await.unwrap();
        f.rotation
            .set_status(c.id, CredentialStatus::Disabled)
            .await
            .unwrap();

        let chosen = f.rotation.select_next().await.unwrap();
        assert_eq!(chosen.id, b.id);
    }

    #[tokio::test]
    async fn test_select_next_no_eligible() {
        let dir = tempdir().unwrap();
        let f = setup(dir.path()).await;

        assert!(matches!(
            f.rotation.select_next().await,
            Err(CoreError::NoEligibleCredential)
        ));

        // 한도 0짜리만 있어도 마찬가지
        f.vault.create("zero@x.com", "s", Some(0), None).await.unwrap();
        assert!(matches!(
            f.rotation.select_next().await,
            Err(CoreError::NoEligibleCredential)
        ));
    }

    #[tokio::test]
    async fn test_exhaustion_flow_never_reselected() {
        let dir = tempdir().unwrap();
        let f = setup(dir.path()).await;

        let a = f.vault.create("a@x.com", "s", Some(2), None).await.unwrap();
        let b = f.vault.create("b@x.com", "s", Some(50), None).await.unwrap();

        let chosen = f.rotation.select_next().await.unwrap();
        assert_eq!(chosen.id, a.id);

        f.usage.record(a.id).await.unwrap();
        // 한도 전에는 전이 안 됨
        assert!(!f.rotation.mark_exhausted_if_needed(a.id).await.unwrap());
        f.usage.record(a.id).await.unwrap();
        assert!(f.rotation.mark_exhausted_if_needed(a.id).await.unwrap());

        // exhausted가 된 활성 크리덴셜은 get_active에서도 사라짐
        assert!(f.rotation.get_active().await.unwrap().is_none());

        // 이후 select_next는 a를 절대 돌려주지 않음
        for _ in 0..3 {
            let chosen = f.rotation.select_next().await.unwrap();
            assert_eq!(chosen.id, b.id);
        }
    }

    #[tokio::test]
    async fn test_get_active_dangling_id() {
        let dir = tempdir().unwrap();
        let f = setup(dir.path()).await;

        f.settings.set_active_credential_id(424242).await.unwrap();
        assert!(f.rotation.get_active().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rotate_if_exhausted_auto_switch() {
        let dir = tempdir().unwrap();
        let f = setup(dir.path()).await;

        let a = f.vault.create("a@x.com", "s", Some(1), None).await.unwrap();
        let b = f.vault.create("b@x.com", "s", Some(50), None).await.unwrap();

        // 활성 미설정 → 첫 호출이 선택까지 수행
        let rotated = f.rotation.rotate_if_exhausted().await.unwrap();
        assert_eq!(rotated.map(|c| c.id), Some(a.id));

        // 아직 소진 전 → 아무 일도 없음
        assert!(f.rotation.rotate_if_exhausted().await.unwrap().is_none());

        f.usage.record(a.id).await.unwrap();
        let rotated = f.rotation.rotate_if_exhausted().await.unwrap();
        assert_eq!(rotated.map(|c| c.id), Some(b.id));

        // 전이 확인
        let a_after = f.vault.get(a.id).await.unwrap();
        assert_eq!(a_after.status, CredentialStatus::Exhausted);
    }

    #[tokio::test]
    async fn test_rotate_if_exhausted_respects_toggle() {
        let dir = tempdir().unwrap();
        let f = setup(dir.path()).await;

        f.vault.create("a@x.com", "s", Some(1), None).await.unwrap();
        f.settings.set("auto_switch_enabled", "false").await.unwrap();

        assert!(f.rotation.rotate_if_exhausted().await.unwrap().is_none());
    }
}
