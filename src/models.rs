//! Rotor Data Models
//!
//! UI(요청/응답 경계)와 매핑되는 Rust 데이터 모델

use serde::{Deserialize, Serialize};

/// 크리덴셜 상태
///
/// `active → exhausted → disabled`. 재활성화는 관리자의 명시적 조작으로만 가능.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Active,
    Exhausted,
    Disabled,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Exhausted => "exhausted",
            CredentialStatus::Disabled => "disabled",
        }
    }

    /// DB TEXT 컬럼 → 상태. 알 수 없는 값은 스키마 기본값(active)으로 취급.
    pub fn parse(s: &str) -> Self {
        match s {
            "exhausted" => CredentialStatus::Exhausted,
            "disabled" => CredentialStatus::Disabled,
            _ => CredentialStatus::Active,
        }
    }
}

/// 관리 대상 크리덴셜 (시크릿 필드 제외)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: i64,
    pub email: String,
    pub status: CredentialStatus,
    pub usage_count: i64,
    pub usage_limit: i64,
    /// unix millis, 한 번도 사용하지 않았으면 None
    pub last_used_at: Option<i64>,
    /// unix millis
    pub created_at: i64,
    pub notes: Option<String>,
}

/// 일 단위 사용량 집계 레코드 (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageLogEntry {
    pub credential_id: i64,
    pub count: i64,
    /// `YYYY-MM-DD`
    pub date: String,
}

/// 외부(컴패니언) 스토어의 활동 기록 한 건
///
/// 컴패니언 앱의 `ai_queries` 행과 1:1 매핑. 스냅샷 JSON에 그대로 직렬화된다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: i64,
    pub exchange_id: Option<String>,
    pub conversation_id: Option<String>,
    pub model_id: Option<String>,
    pub output_status: Option<String>,
    /// unix millis
    pub start_ts: Option<i64>,
    pub input: Option<String>,
    pub working_directory: Option<String>,
}

/// 스냅샷 수행 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotOutcome {
    Created,
    Replaced,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotReport {
    pub outcome: SnapshotOutcome,
    pub path: String,
    pub identity: String,
    pub record_count: usize,
}

/// 파괴적 restore의 성공 보고
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    /// 삭제 직전에 만든 safety copy 경로
    pub safety_backup: String,
    /// quick-restore가 사용한 풀백업 디렉토리 이름
    pub backup_used: Option<String>,
    pub message: String,
}

/// 컴패니언 스토어 활동 통계
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    pub total_conversations: i64,
    pub total_queries: i64,
    pub models_used: i64,
    pub last_query_time: Option<i64>,
}

/// 기간별 쿼리 수
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodStats {
    pub queries_today: i64,
    pub queries_this_week: i64,
    pub queries_this_month: i64,
    pub queries_all_time: i64,
}

/// 모델별 사용량
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsageRow {
    pub model_id: String,
    pub usage_count: i64,
    pub last_used: Option<i64>,
}

/// 데스크톱 스크래핑으로 읽어낸 크레딧 수치
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditReading {
    pub used: u32,
    pub total: u32,
}

impl CreditReading {
    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.used)
    }
}
