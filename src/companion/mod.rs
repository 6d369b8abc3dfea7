//! Companion Store
//!
//! 컴패니언 앱의 SQLite 스토어를 읽기 전용으로 접근.
//! 스토어는 우리가 소유하지 않는 외부 데이터이며, restore 동안에는
//! 핸들을 닫았다가 다시 열어야 하므로 커넥션을 Option으로 보관한다.

pub mod probe;

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tokio::sync::Mutex;

use crate::error::CoreError;
use crate::models::{ActivityRecord, ActivityStats, ModelUsageRow, PeriodStats};

pub struct CompanionDb {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl CompanionDb {
    /// 컴패니언 스토어 핸들 구성. 파일이 없거나 열 수 없어도 실패하지 않고
    /// 닫힌 상태로 시작한다 (이후 호출이 `StoreUnavailable`로 보고).
    pub fn open(path: &Path) -> Self {
        let conn = match Self::open_read_only(path) {
            Ok(conn) => {
                println!("[Companion] Connected to store: {}", path.display());
                Some(conn)
            }
            Err(e) => {
                eprintln!("[Companion] Store not available ({}): {}", path.display(), e);
                None
            }
        };

        Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        }
    }

    fn open_read_only(path: &Path) -> Result<Connection, CoreError> {
        Ok(Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// restore 직전에 호출: 열린 핸들을 닫는다
    pub async fn close(&self) {
        let mut guard = self.conn.lock().await;
        if guard.take().is_some() {
            println!("[Companion] Store handle closed");
        }
    }

    /// restore 이후 재연결
    pub async fn reopen(&self) -> Result<(), CoreError> {
        let mut guard = self.conn.lock().await;
        *guard = Some(Self::open_read_only(&self.path)?);
        println!("[Companion] Store handle reopened");
        Ok(())
    }

    async fn with<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&Connection) -> Result<T, CoreError>,
    {
        let guard = self.conn.lock().await;
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(CoreError::StoreUnavailable(
                self.path.display().to_string(),
            )),
        }
    }

    /// 현재 로그인된 계정 email (없으면 None)
    pub async fn current_user_email(&self) -> Result<Option<String>, CoreError> {
        self.with(|conn| {
            Ok(conn
                .query_row(
                    "SELECT email FROM current_user_information LIMIT 1",
                    [],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?
                .flatten())
        })
        .await
    }

    /// 전체 활동 기록 (최신 우선)
    pub async fn activity_records(&self) -> Result<Vec<ActivityRecord>, CoreError> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, exchange_id, conversation_id, model_id,
                        output_status, start_ts, input, working_directory
                 FROM ai_queries ORDER BY start_ts DESC",
            )?;
            let iter = stmt.query_map([], |row| {
                Ok(ActivityRecord {
                    id: row.get(0)?,
                    exchange_id: row.get(1)?,
                    conversation_id: row.get(2)?,
                    model_id: row.get(3)?,
                    output_status: row.get(4)?,
                    start_ts: row.get(5)?,
                    input: row.get(6)?,
                    working_directory: row.get(7)?,
                })
            })?;

            let mut out = Vec::new();
            for record in iter {
                out.push(record?);
            }
            Ok(out)
        })
        .await
    }

    /// 종합 활동 통계
    pub async fn activity_stats(&self) -> Result<ActivityStats, CoreError> {
        self.with(|conn| {
            Ok(conn.query_row(
                "SELECT
                    COUNT(DISTINCT conversation_id) AS total_conversations,
                    COUNT(*) AS total_queries,
                    COUNT(DISTINCT model_id) AS models_used,
                    MAX(start_ts) AS last_query_time
                 FROM ai_queries",
                [],
                |row| {
                    Ok(ActivityStats {
                        total_conversations: row.get(0)?,
                        total_queries: row.get(1)?,
                        models_used: row.get(2)?,
                        last_query_time: row.get(3)?,
                    })
                },
            )?)
        })
        .await
    }

    /// 기간별 쿼리 수 (start_ts는 unix millis)
    pub async fn period_stats(&self) -> Result<PeriodStats, CoreError> {
        let now = chrono::Utc::now().timestamp_millis();
        let day_ms = 86_400_000i64;
        let today_start = now - (now % day_ms);
        let week_start = now - 7 * day_ms;
        let month_start = now - 30 * day_ms;

        self.with(move |conn| {
            Ok(conn.query_row(
                "SELECT
                    COUNT(CASE WHEN start_ts >= ?1 THEN 1 END),
                    COUNT(CASE WHEN start_ts >= ?2 THEN 1 END),
                    COUNT(CASE WHEN start_ts >= ?3 THEN 1 END),
                    COUNT(*)
                 FROM ai_queries",
                rusqlite::params![today_start, week_start, month_start],
                |row| {
                    Ok(PeriodStats {
                        queries_today: row.get(0)?,
                        queries_this_week: row.get(1)?,
                        queries_this_month: row.get(2)?,
                        queries_all_time: row.get(3)?,
                    })
                },
            )?)
        })
        .await
    }

    /// 모델별 사용량 분포
    pub async fn model_usage(&self) -> Result<Vec<ModelUsageRow>, CoreError> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT model_id, COUNT(*) AS usage_count, MAX(start_ts) AS last_used
                 FROM ai_queries
                 WHERE model_id IS NOT NULL
                 GROUP BY model_id
                 ORDER BY usage_count DESC",
            )?;
            let iter = stmt.query_map([], |row| {
                Ok(ModelUsageRow {
                    model_id: row.get(0)?,
                    usage_count: row.get(1)?,
                    last_used: row.get(2)?,
                })
            })?;

            let mut out = Vec::new();
            for row in iter {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use rusqlite::Connection;

    /// 테스트용 컴패니언 스토어 생성 (ai_queries + current_user_information)
    pub fn create_companion_fixture(path: &Path, email: &str, records: &[(i64, &str, i64)]) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS current_user_information (
                id INTEGER PRIMARY KEY,
                email TEXT
            );
            CREATE TABLE IF NOT EXISTS ai_queries (
                id INTEGER PRIMARY KEY,
                exchange_id TEXT,
                conversation_id TEXT,
                model_id TEXT,
                output_status TEXT,
                start_ts INTEGER,
                input TEXT,
                working_directory TEXT
            );",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO current_user_information (email) VALUES (?1)",
            [email],
        )
        .unwrap();
        for (id, conversation, start_ts) in records {
            conn.execute(
                "INSERT INTO ai_queries
                    (id, exchange_id, conversation_id, model_id, output_status, start_ts, input, working_directory)
                 VALUES (?1, 'ex', ?2, 'model-a', 'done', ?3, '[{\"Query\":{\"userQuery\":\"hello\"}}]', '/tmp')",
                rusqlite::params![id, conversation, start_ts],
            )
            .unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::create_companion_fixture;
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_reads_activity_and_user() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("companion.sqlite");
        create_companion_fixture(
            &db_path,
            "user@example.com",
            &[(1, "conv-1", 1_000), (2, "conv-1", 2_000), (3, "conv-2", 3_000)],
        );

        let companion = CompanionDb::open(&db_path);
        assert_eq!(
            companion.current_user_email().await.unwrap(),
            Some("user@example.com".to_string())
        );

        let records = companion.activity_records().await.unwrap();
        assert_eq!(records.len(), 3);
        // 최신 우선
        assert_eq!(records[0].id, 3);

        let stats = companion.activity_stats().await.unwrap();
        assert_eq!(stats.total_conversations, 2);
        assert_eq!(stats.total_queries, 3);
        assert_eq!(stats.last_query_time, Some(3_000));

        let models = companion.model_usage().await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].usage_count, 3);
    }

    #[tokio::test]
    async fn test_closed_handle_reports_unavailable() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("companion.sqlite");
        create_companion_fixture(&db_path, "user@example.com", &[]);

        let companion = CompanionDb::open(&db_path);
        companion.close().await;

        assert!(matches!(
            companion.activity_records().await,
            Err(CoreError::StoreUnavailable(_))
        ));

        companion.reopen().await.unwrap();
        assert!(companion.activity_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_store_starts_closed() {
        let dir = tempdir().unwrap();
        let companion = CompanionDb::open(&dir.path().join("nope.sqlite"));
        assert!(matches!(
            companion.current_user_email().await,
            Err(CoreError::StoreUnavailable(_))
        ));
    }
}
