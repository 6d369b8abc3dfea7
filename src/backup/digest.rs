//! Snapshot Digest
//!
//! 스냅샷 디렉토리에 들어가는 사람이 읽을 수 있는 파일들:
//! `ai-context-<id>.txt` (대화 기록 다이제스트) 와 `README.txt`.

use chrono::{DateTime, Utc};

use crate::models::ActivityRecord;

const RULE: &str = "================================================================================";

/// 식별자(email 등)를 파일시스템 안전 키로 정규화.
/// 디렉토리 이름으로 쓰이므로 영숫자/`_`/`-` 외에는 전부 `_`.
pub fn sanitize_identity(identity: &str) -> String {
    let sanitized: String = identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

fn format_ts(ts: Option<i64>) -> String {
    ts.and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// 컴패니언 앱의 input 컬럼은 `[{"Query":{"userQuery":...}}]` 형태의
/// JSON일 수 있다. 파싱 실패 시 원문 그대로 사용.
fn extract_user_query(input: Option<&str>) -> String {
    let Some(raw) = input else {
        return "N/A".to_string();
    };

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
        if let Some(first) = value.as_array().and_then(|arr| arr.first()) {
            if let Some(query) = first.get("Query") {
                if let Some(user_query) = query.get("userQuery").and_then(|q| q.as_str()) {
                    return user_query.to_string();
                }
                return query.to_string();
            }
        }
    }

    raw.to_string()
}

/// `ai-context-<id>.txt` 본문 렌더링
pub fn render_ai_context(identity: &str, records: &[ActivityRecord]) -> String {
    let mut out = format!(
        "ROTOR CONVERSATION HISTORY\n\
         Account: {}\n\
         Generated: {}\n\
         Total Conversations: {}\n\
         {}\n\n",
        identity,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        records.len(),
        RULE,
    );

    for (i, record) in records.iter().enumerate() {
        out.push_str(&format!(
            "\n=== Conversation {} ===\n\
             Date: {}\n\
             Conversation ID: {}\n\
             Model: {}\n\
             Status: {}\n\
             Working Directory: {}\n\n\
             Query:\n{}\n\n{}\n",
            i + 1,
            format_ts(record.start_ts),
            record.conversation_id.as_deref().unwrap_or("N/A"),
            record.model_id.as_deref().unwrap_or("N/A"),
            record.output_status.as_deref().unwrap_or("N/A"),
            record.working_directory.as_deref().unwrap_or("N/A"),
            extract_user_query(record.input.as_deref()),
            RULE,
        ));
    }

    out
}

/// 스냅샷 디렉토리의 `README.txt` 본문 렌더링
pub fn render_readme(identity: &str, sanitized: &str, record_count: usize) -> String {
    format!(
        "ROTOR - HISTORY BACKUP\n\
         ==================================================\n\n\
         Account: {identity}\n\n\
         This folder contains the complete activity history for this account ONLY.\n\
         It auto-updates whenever the engine snapshots this account.\n\n\
         Files:\n\
         - history-{sanitized}.json: Full store export (raw data)\n\
         - ai-context-{sanitized}.txt: Human-readable format for feeding to new AI chats\n\
         - README.txt: This file\n\n\
         Last updated: {}\n\
         Total queries: {record_count}\n\n\
         IMPORTANT: Each account gets its own folder!\n\
         - When the active credential rotates, a NEW folder is created\n\
         - History is kept separated per account\n\
         - Files are replaced wholesale whenever the data changes\n\n\
         To use in a new AI chat:\n\
         Copy the contents of ai-context-{sanitized}.txt and paste it with:\n\
         \"Here is my previous conversation history for context:\"\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_identity() {
        assert_eq!(sanitize_identity("a.user@example.com"), "a_user_example_com");
        assert_eq!(sanitize_identity("plain-name_1"), "plain-name_1");
        assert_eq!(sanitize_identity("../../etc/passwd"), "______etc_passwd");
        assert_eq!(sanitize_identity(""), "unknown");
    }

    #[test]
    fn test_extract_user_query_shapes() {
        assert_eq!(
            extract_user_query(Some(r#"[{"Query":{"userQuery":"fix my build"}}]"#)),
            "fix my build"
        );
        // JSON이 아니면 원문 유지
        assert_eq!(extract_user_query(Some("raw text input")), "raw text input");
        assert_eq!(extract_user_query(None), "N/A");
    }

    #[test]
    fn test_render_ai_context_header_and_sections() {
        let records = vec![ActivityRecord {
            id: 1,
            exchange_id: None,
            conversation_id: Some("conv-9".to_string()),
            model_id: Some("model-a".to_string()),
            output_status: Some("done".to_string()),
            start_ts: Some(1_700_000_000_000),
            input: Some(r#"[{"Query":{"userQuery":"hello"}}]"#.to_string()),
            working_directory: None,
        }];

        let text = render_ai_context("user@example.com", &records);
        assert!(text.starts_with("ROTOR CONVERSATION HISTORY\nAccount: user@example.com\n"));
        assert!(text.contains("Total Conversations: 1"));
        assert!(text.contains("=== Conversation 1 ==="));
        assert!(text.contains("Conversation ID: conv-9"));
        assert!(text.contains("Query:\nhello"));
    }
}
