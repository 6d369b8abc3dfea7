//! Credential Vault
//!
//! 크리덴셜(계정 시크릿)의 암호화 저장/조회.
//! 시크릿은 생성 시점에 즉시 암호화되며 평문은 절대 스토어에 닿지 않는다.
//! 상태 전이는 RotationPolicyEngine, 카운트 증가는 UsageTracker의 몫이고
//! Vault는 레코드와 시크릿 원문의 유일한 소유자다.

pub mod cipher;

use std::sync::Arc;

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use zeroize::Zeroize;

use crate::db::{schema, Store};
use crate::error::CoreError;
use crate::models::{Credential, CredentialStatus};
use cipher::{open_secret, seal_secret, MasterKey};

/// 시크릿 필드를 제외한 크리덴셜 SELECT 컬럼
pub(crate) const CREDENTIAL_COLUMNS: &str =
    "id, email, status, usage_count, usage_limit, last_used_at, created_at, notes";

/// 크리덴셜 행 매핑 (CREDENTIAL_COLUMNS 순서)
pub(crate) fn credential_from_row(row: &Row) -> rusqlite::Result<Credential> {
    let status: String = row.get(2)?;
    Ok(Credential {
        id: row.get(0)?,
        email: row.get(1)?,
        status: CredentialStatus::parse(&status),
        usage_count: row.get(3)?,
        usage_limit: row.get(4)?,
        last_used_at: row.get(5)?,
        created_at: row.get(6)?,
        notes: row.get(7)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("UNIQUE")
        }
        _ => false,
    }
}

/// Vault export 페이로드 (re-key용, AEAD로 밀봉되어 파일에만 존재)
#[derive(Debug, Serialize, Deserialize)]
struct VaultExport {
    version: u32,
    entries: Vec<VaultExportEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VaultExportEntry {
    email: String,
    secret: String,
    usage_limit: i64,
    notes: Option<String>,
}

/// 크리덴셜 볼트
pub struct CredentialVault {
    store: Arc<Store>,
    key: MasterKey,
}

impl CredentialVault {
    pub fn new(store: Arc<Store>, key: MasterKey) -> Self {
        Self { store, key }
    }

    /// 크리덴셜 생성. 시크릿은 fresh nonce로 즉시 암호화된다.
    ///
    /// `usage_limit`이 None이면 설정의 `default_usage_limit`을 사용.
    pub async fn create(
        &self,
        email: &str,
        plaintext_secret: &str,
        usage_limit: Option<i64>,
        notes: Option<String>,
    ) -> Result<Credential, CoreError> {
        let (ciphertext, nonce) = seal_secret(&self.key, plaintext_secret)?;
        let email = email.trim().to_string();

        self.store
            .with(move |conn| {
                let limit = match usage_limit {
                    Some(limit) => limit,
                    None => conn
                        .query_row(
                            "SELECT value FROM settings WHERE key = ?1",
                            [schema::SETTING_DEFAULT_USAGE_LIMIT],
                            |row| row.get::<_, String>(0),
                        )
                        .optional()?
                        .and_then(|v| v.parse::<i64>().ok())
                        .unwrap_or(50),
                };

                let now = chrono::Utc::now().timestamp_millis();
                let inserted = conn.execute(
                    "INSERT INTO credentials (email, secret_ciphertext, secret_nonce, usage_limit, created_at, notes)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![email, ciphertext, nonce, limit, now, notes],
                );

                if let Err(e) = inserted {
                    if is_unique_violation(&e) {
                        return Err(CoreError::DuplicateEmail(email));
                    }
                    return Err(e.into());
                }

                let id = conn.last_insert_rowid();
                println!("[Vault] Credential created: {} (id={})", email, id);

                Ok(conn.query_row(
                    &format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = ?1"),
                    [id],
                    credential_from_row,
                )?)
            })
            .await
    }

    /// 시크릿 평문 복호화. 암호문/논스 손상 또는 키 불일치 시 `DecryptionFailed`.
    pub async fn reveal(&self, credential_id: i64) -> Result<String, CoreError> {
        let sealed = self
            .store
            .with(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT secret_ciphertext, secret_nonce FROM credentials WHERE id = ?1",
                        [credential_id],
                        |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?)),
                    )
                    .optional()?)
            })
            .await?;

        let (ciphertext, nonce) =
            sealed.ok_or(CoreError::CredentialNotFound(credential_id))?;

        open_secret(&self.key, &ciphertext, &nonce)
    }

    /// 크리덴셜 삭제 (usage_log는 cascade)
    pub async fn delete(&self, credential_id: i64) -> Result<bool, CoreError> {
        self.store
            .with(move |conn| {
                let changed =
                    conn.execute("DELETE FROM credentials WHERE id = ?1", [credential_id])?;
                if changed > 0 {
                    println!("[Vault] Credential deleted: id={}", credential_id);
                }
                Ok(changed > 0)
            })
            .await
    }

    /// 크리덴셜 단건 조회 (시크릿 제외)
    pub async fn get(&self, credential_id: i64) -> Result<Credential, CoreError> {
        self.store
            .with(move |conn| {
                conn.query_row(
                    &format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = ?1"),
                    [credential_id],
                    credential_from_row,
                )
                .optional()?
                .ok_or(CoreError::CredentialNotFound(credential_id))
            })
            .await
    }

    /// 전체 크리덴셜 목록 (시크릿 제외, 생성 시각 내림차순)
    pub async fn list(&self) -> Result<Vec<Credential>, CoreError> {
        self.store
            .with(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CREDENTIAL_COLUMNS} FROM credentials ORDER BY created_at DESC, id DESC"
                ))?;
                let iter = stmt.query_map([], credential_from_row)?;

                let mut out = Vec::new();
                for credential in iter {
                    out.push(credential?);
                }
                Ok(out)
            })
            .await
    }

    /// Vault 전체를 `export_key`로 재암호화해 단일 파일로 내보내기 (re-key용).
    /// 반환값은 내보낸 시크릿 수.
    pub async fn export_vault(
        &self,
        path: &Path,
        export_key: &MasterKey,
    ) -> Result<usize, CoreError> {
        let sealed_rows = self
            .store
            .with(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT email, secret_ciphertext, secret_nonce, usage_limit, notes
                     FROM credentials ORDER BY created_at ASC, id ASC",
                )?;
                let iter = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })?;

                let mut rows = Vec::new();
                for row in iter {
                    rows.push(row?);
                }
                Ok(rows)
            })
            .await?;

        let mut entries = Vec::with_capacity(sealed_rows.len());
        for (email, ciphertext, nonce, usage_limit, notes) in sealed_rows {
            let secret = open_secret(&self.key, &ciphertext, &nonce)?;
            entries.push(VaultExportEntry {
                email,
                secret,
                usage_limit,
                notes,
            });
        }

        let count = entries.len();
        let export = VaultExport {
            version: 1,
            entries,
        };

        let mut payload = serde_json::to_vec(&export)?;
        let result = cipher::encrypt_and_write(path, export_key, &payload);
        payload.zeroize();
        result?;

        println!("[Vault] Exported {} secrets to {}", count, path.display());
        Ok(count)
    }

    /// Export 파일을 읽어 현재 마스터키로 재암호화하며 가져오기.
    /// 이미 존재하는 email은 건너뛴다. 반환값은 새로 추가된 수.
    pub async fn import_vault(
        &self,
        path: &Path,
        import_key: &MasterKey,
    ) -> Result<usize, CoreError> {
        let mut payload = cipher::read_and_decrypt(path, import_key)?;
        let export: VaultExport = match serde_json::from_slice(&payload) {
            Ok(export) => export,
            Err(e) => {
                payload.zeroize();
                return Err(CoreError::InvalidVaultFile(e.to_string()));
            }
        };
        payload.zeroize();

        let mut imported = 0usize;
        for entry in export.entries {
            match self
                .create(
                    &entry.email,
                    &entry.secret,
                    Some(entry.usage_limit),
                    entry.notes.clone(),
                )
                .await
            {
                Ok(_) => imported += 1,
                Err(CoreError::DuplicateEmail(email)) => {
                    println!("[Vault] Import skipped existing credential: {}", email);
                }
                Err(e) => return Err(e),
            }
        }

        println!("[Vault] Imported {} secrets from {}", imported, path.display());
        Ok(imported)
    }
}
