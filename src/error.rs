//! Rotor Error Types
//!
//! 애플리케이션 전역 에러 타입 정의

use serde::Serialize;
use thiserror::Error;

/// Rotor 코어 에러
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Credential with this email already exists: {0}")]
    DuplicateEmail(String),

    #[error("Credential not found: {0}")]
    CredentialNotFound(i64),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("No eligible credential for rotation")]
    NoEligibleCredential,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("No snapshot found for identity: {0}")]
    SnapshotNotFound(String),

    #[error("Master key not provisioned (set ROTOR_MASTER_KEY or provision the keychain entry)")]
    MasterKeyMissing,

    #[error("Invalid master key format")]
    InvalidMasterKey,

    #[error("Keychain error: {0}")]
    Keychain(String),

    #[error("Invalid vault file: {0}")]
    InvalidVaultFile(String),

    /// 파괴적 restore가 safety copy 이후 단계에서 실패한 경우.
    /// 수동 복구를 위해 safety copy 경로를 반드시 함께 전달한다.
    #[error("Restore failed after safety copy ({safety_backup}): {message}")]
    RestoreFailed {
        message: String,
        safety_backup: String,
    },
}

/// UI 경계(요청/응답)용 직렬화 가능한 에러
#[derive(Debug, Serialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl From<CoreError> for CommandError {
    fn from(error: CoreError) -> Self {
        let code = match &error {
            CoreError::Database(_) => "DB_ERROR",
            CoreError::Io(_) => "IO_ERROR",
            CoreError::Serialization(_) => "SERIALIZATION_ERROR",
            CoreError::DuplicateEmail(_) => "DUPLICATE_EMAIL",
            CoreError::CredentialNotFound(_) => "CREDENTIAL_NOT_FOUND",
            CoreError::DecryptionFailed(_) => "DECRYPTION_FAILED",
            CoreError::EncryptionFailed(_) => "ENCRYPTION_FAILED",
            CoreError::NoEligibleCredential => "NO_ELIGIBLE_CREDENTIAL",
            CoreError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            CoreError::BackupNotFound(_) => "BACKUP_NOT_FOUND",
            CoreError::SnapshotNotFound(_) => "SNAPSHOT_NOT_FOUND",
            CoreError::MasterKeyMissing => "MASTER_KEY_MISSING",
            CoreError::InvalidMasterKey => "INVALID_MASTER_KEY",
            CoreError::Keychain(_) => "KEYCHAIN_ERROR",
            CoreError::InvalidVaultFile(_) => "INVALID_VAULT_FILE",
            CoreError::RestoreFailed { .. } => "RESTORE_FAILED",
        };

        // Restore 실패는 details에 safety copy 경로를 실어 전달
        let details = match &error {
            CoreError::RestoreFailed { safety_backup, .. } => Some(safety_backup.clone()),
            _ => None,
        };

        CommandError {
            code: code.to_string(),
            message: error.to_string(),
            details,
        }
    }
}

/// 명령 결과 타입
pub type CommandResult<T> = Result<T, CommandError>;
