//! Database Module
//!
//! 엔진 자체 스토어(SQLite) 관리.
//!
//! 모든 접근은 `tokio::sync::Mutex`로 직렬화된 단일 커넥션을 통한다.
//! (호출은 issue 순서대로 큐잉 — 명시적 single-writer 계약)

pub mod schema;

use std::path::{Path, PathBuf};

use rusqlite::backup::Backup;
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::error::CoreError;

/// 엔진 스토어 래퍼
pub struct Store {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl Store {
    /// 스토어 파일을 열고 (필요 시 디렉토리 생성) 커넥션을 구성
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // usage_log cascade delete를 위해 커넥션마다 활성화 필요
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    /// 스키마 초기화 + 기본 설정 시드
    pub async fn initialize(&self) -> Result<(), CoreError> {
        let conn = self.conn.lock().await;
        conn.execute_batch(schema::CREATE_SCHEMA)?;
        conn.execute_batch(schema::SEED_SETTINGS)?;
        Ok(())
    }

    /// 직렬화된 커넥션 액세스
    ///
    /// 클로저 안에서는 suspend하지 않으므로 동일 스토어에 대한
    /// 동시 호출은 lock 획득 순서대로 처리된다.
    pub async fn with<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&Connection) -> Result<T, CoreError>,
    {
        let conn = self.conn.lock().await;
        f(&conn)
    }

    /// 현재 스토어를 파일로 내보내기 (SQLite online backup)
    pub async fn export_to_file(&self, out_path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = self.conn.lock().await;
        let mut out_conn = Connection::open(out_path)?;

        let backup = Backup::new(&conn, &mut out_conn)?;
        backup.run_to_completion(5, std::time::Duration::from_millis(10), None)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
