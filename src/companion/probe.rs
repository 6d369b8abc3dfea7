//! Usage Probe
//!
//! 실행 중인 컴패니언 앱이 화면/로그에 남긴 크레딧 표시를 긁어오는
//! best-effort 외부 소스. 본질적으로 신뢰할 수 없으므로 결과는
//! `Found | NotFound | Failed`의 셋 중 하나로만 코어에 전달되고,
//! 실패가 코어의 제어 흐름을 망가뜨리지 않는다.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::models::CreditReading;

/// 프로브 결과
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "camelCase")]
pub enum ProbeOutcome {
    Found(CreditReading),
    NotFound,
    Failed(String),
}

/// 외부 크레딧 소스 인터페이스
pub trait UsageProbe {
    fn probe(&self) -> impl std::future::Future<Output = ProbeOutcome> + Send;
}

fn credit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // "123 / 500", "123/500 credits" 류의 표시 텍스트
    PATTERN.get_or_init(|| Regex::new(r"(\d+)\s*/\s*(\d+)").expect("valid regex"))
}

/// 텍스트 조각에서 used/total 크레딧 수치 추출
pub fn parse_credit_fragment(text: &str) -> Option<CreditReading> {
    let captures = credit_pattern().captures(text)?;
    let used: u32 = captures.get(1)?.as_str().parse().ok()?;
    let total: u32 = captures.get(2)?.as_str().parse().ok()?;
    if total == 0 || used > total {
        return None;
    }
    Some(CreditReading { used, total })
}

/// 컴패니언 앱의 로그 파일에서 크레딧 표시를 찾는 프로브.
/// 최근 수정된 로그 5개만, 크레딧 관련 키워드가 있는 라인만 검사한다.
pub struct LogFileProbe {
    log_dir: PathBuf,
    max_files: usize,
}

impl LogFileProbe {
    pub fn new(log_dir: &Path) -> Self {
        Self {
            log_dir: log_dir.to_path_buf(),
            max_files: 5,
        }
    }

    fn recent_log_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&self.log_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|ext| ext == "log").unwrap_or(false) {
                let modified = entry
                    .metadata()?
                    .modified()
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                files.push((modified, path));
            }
        }

        // 최신 수정 우선
        files.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(files.into_iter().take(self.max_files).map(|(_, p)| p).collect())
    }
}

impl UsageProbe for LogFileProbe {
    async fn probe(&self) -> ProbeOutcome {
        let files = match self.recent_log_files() {
            Ok(files) => files,
            Err(e) => return ProbeOutcome::Failed(e.to_string()),
        };

        for path in files {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                // 개별 파일 읽기 실패는 건너뜀 (로테이션 중인 로그 등)
                Err(_) => continue,
            };

            for line in text.lines() {
                let lower = line.to_ascii_lowercase();
                if !(lower.contains("credit") || lower.contains("usage") || lower.contains("limit"))
                {
                    continue;
                }
                if let Some(reading) = parse_credit_fragment(line) {
                    println!(
                        "[Probe] Credits found in {}: {}/{}",
                        path.display(),
                        reading.used,
                        reading.total
                    );
                    return ProbeOutcome::Found(reading);
                }
            }
        }

        ProbeOutcome::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_credit_fragment() {
        let reading = parse_credit_fragment("credits remaining: 42 / 150").unwrap();
        assert_eq!(reading, CreditReading { used: 42, total: 150 });
        assert_eq!(reading.remaining(), 108);

        assert_eq!(parse_credit_fragment("no numbers here"), None);
        // used > total 은 표시 텍스트가 아님
        assert_eq!(parse_credit_fragment("9 / 3"), None);
        assert_eq!(parse_credit_fragment("0 / 0"), None);
    }

    #[tokio::test]
    async fn test_log_probe_found() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("noise.log"), "startup ok\nloaded theme\n").unwrap();
        std::fs::write(
            dir.path().join("app.log"),
            "boot\nAI credit usage: 12 / 50\nshutdown\n",
        )
        .unwrap();

        let probe = LogFileProbe::new(dir.path());
        match probe.probe().await {
            ProbeOutcome::Found(reading) => {
                assert_eq!(reading, CreditReading { used: 12, total: 50 });
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_log_probe_not_found_and_failed() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("app.log"), "nothing relevant\n").unwrap();

        let probe = LogFileProbe::new(dir.path());
        assert!(matches!(probe.probe().await, ProbeOutcome::NotFound));

        let missing = LogFileProbe::new(&dir.path().join("no-such-dir"));
        assert!(matches!(missing.probe().await, ProbeOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_log_probe_ignores_non_credit_lines() {
        let dir = tempdir().unwrap();
        // 숫자 비율이 있어도 키워드가 없는 라인은 무시
        std::fs::write(dir.path().join("app.log"), "progress 3 / 10 files\n").unwrap();

        let probe = LogFileProbe::new(dir.path());
        assert!(matches!(probe.probe().await, ProbeOutcome::NotFound));
    }
}
