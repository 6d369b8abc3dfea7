//! Database Schema
//!
//! 엔진 자체 스토어(SQLite) 테이블 스키마 정의

/// 설정 키: 현재 활성 크리덴셜 id
pub const SETTING_ACTIVE_CREDENTIAL_ID: &str = "active_credential_id";
/// 설정 키: 소진 시 자동 로테이션 여부
pub const SETTING_AUTO_SWITCH_ENABLED: &str = "auto_switch_enabled";
/// 설정 키: 신규 크리덴셜 기본 사용량 한도
pub const SETTING_DEFAULT_USAGE_LIMIT: &str = "default_usage_limit";
/// 설정 키: 누적 로테이션 횟수
pub const SETTING_ROTATION_COUNT: &str = "rotation_count";
/// 설정 키: 몇 번의 로테이션마다 재설치를 권고할지
pub const SETTING_REINSTALL_AFTER_ROTATIONS: &str = "reinstall_after_rotations";

/// 데이터베이스 스키마 생성 SQL
pub const CREATE_SCHEMA: &str = r#"
-- 크리덴셜 테이블 (시크릿은 AEAD 암호문 + per-row nonce로만 저장)
CREATE TABLE IF NOT EXISTS credentials (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT UNIQUE NOT NULL,
    secret_ciphertext BLOB NOT NULL,
    secret_nonce BLOB NOT NULL,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'exhausted', 'disabled')),
    usage_count INTEGER NOT NULL DEFAULT 0,
    usage_limit INTEGER NOT NULL DEFAULT 50,
    last_used_at INTEGER,
    created_at INTEGER NOT NULL,
    notes TEXT
);

-- 일 단위 사용량 로그 (append-only, 크리덴셜 삭제 시 cascade)
CREATE TABLE IF NOT EXISTS usage_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    credential_id INTEGER NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    date TEXT NOT NULL,
    FOREIGN KEY (credential_id) REFERENCES credentials(id) ON DELETE CASCADE,
    UNIQUE (credential_id, date)
);

CREATE INDEX IF NOT EXISTS idx_usage_log_credential ON usage_log(credential_id);

-- 앱 설정 테이블 (단일 canonical 카피)
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// 기본 설정 시드 SQL (이미 있으면 건드리지 않음)
pub const SEED_SETTINGS: &str = r#"
INSERT OR IGNORE INTO settings (key, value) VALUES
    ('active_credential_id', ''),
    ('auto_switch_enabled', 'true'),
    ('default_usage_limit', '50'),
    ('rotation_count', '0'),
    ('reinstall_after_rotations', '3');
"#;
