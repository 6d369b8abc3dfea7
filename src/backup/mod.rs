//! BackupReconciler
//!
//! 컴패니언 앱 활동 히스토리의 스냅샷/풀백업/복원.
//!
//! - 스냅샷은 merge가 아니라 전체 교체: 파일은 항상 현재 소스 진실을
//!   그대로 반영한다. 변경 여부는 값싼 핑거프린트(레코드 수 + 시간상
//!   마지막 레코드의 id)로 판단해 불필요한 쓰기를 건너뛴다.
//! - restore는 파괴적이며 순서 불변식을 지킨다:
//!   핸들 close → safety copy → 삭제 → 복사 → reopen.
//!   safety copy가 완료되기 전에는 어떤 삭제도 일어나지 않는다.

pub mod digest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};

use crate::companion::CompanionDb;
use crate::db::Store;
use crate::error::CoreError;
use crate::models::{ActivityRecord, RestoreReport, SnapshotOutcome, SnapshotReport};

/// 풀백업 안의 컴패니언 스토어 사본 이름
const COMPANION_STORE_FILE: &str = "companion.sqlite";
/// 풀백업 안의 엔진 스토어 사본 이름
const ENGINE_STORE_FILE: &str = "rotor.db";
/// 풀백업 안의 활동 기록 JSON 이름
const HISTORY_EXPORT_FILE: &str = "query-history.json";
/// 풀백업 디렉토리 접두사
const BACKUP_DIR_PREFIX: &str = "backup-";

pub struct BackupReconciler {
    store: Arc<Store>,
    companion: Arc<CompanionDb>,
    history_root: PathBuf,
    backup_root: PathBuf,
}

/// 스냅샷 교체 판단용 핑거프린트: (레코드 수, 시간상 마지막 레코드의 id)
fn fingerprint(records: &[ActivityRecord]) -> (usize, Option<i64>) {
    let last_id = records
        .iter()
        .max_by_key(|r| (r.start_ts.unwrap_or(i64::MIN), r.id))
        .map(|r| r.id);
    (records.len(), last_id)
}

impl BackupReconciler {
    pub fn new(
        store: Arc<Store>,
        companion: Arc<CompanionDb>,
        history_root: &Path,
        backup_root: &Path,
    ) -> Self {
        Self {
            store,
            companion,
            history_root: history_root.to_path_buf(),
            backup_root: backup_root.to_path_buf(),
        }
    }

    /// 계정 단위 스냅샷. 핑거프린트가 같으면 아무것도 쓰지 않는다.
    pub async fn snapshot(
        &self,
        identity: &str,
        records: &[ActivityRecord],
    ) -> Result<SnapshotReport, CoreError> {
        let sanitized = digest::sanitize_identity(identity);
        let dir = self.history_root.join(&sanitized);
        let history_file = dir.join(format!("history-{sanitized}.json"));

        let existed = history_file.exists();
        if existed {
            // 이전 스냅샷과 비교. 파싱이 안 되는 파일은 변경된 것으로 취급.
            let unchanged = std::fs::read_to_string(&history_file)
                .ok()
                .and_then(|text| serde_json::from_str::<Vec<ActivityRecord>>(&text).ok())
                .map(|old| fingerprint(&old) == fingerprint(records))
                .unwrap_or(false);

            if unchanged {
                return Ok(SnapshotReport {
                    outcome: SnapshotOutcome::Skipped,
                    path: dir.display().to_string(),
                    identity: identity.to_string(),
                    record_count: records.len(),
                });
            }
        }

        std::fs::create_dir_all(&dir)?;
        std::fs::write(&history_file, serde_json::to_vec_pretty(records)?)?;
        std::fs::write(
            dir.join(format!("ai-context-{sanitized}.txt")),
            digest::render_ai_context(identity, records),
        )?;
        std::fs::write(
            dir.join("README.txt"),
            digest::render_readme(identity, &sanitized, records.len()),
        )?;

        let outcome = if existed {
            SnapshotOutcome::Replaced
        } else {
            SnapshotOutcome::Created
        };
        println!(
            "[Backup] Snapshot {:?} for {} ({} records)",
            outcome,
            identity,
            records.len()
        );

        Ok(SnapshotReport {
            outcome,
            path: dir.display().to_string(),
            identity: identity.to_string(),
            record_count: records.len(),
        })
    }

    /// 타임스탬프 디렉토리에 풀백업: 컴패니언 스토어 사본 + 엔진 스토어
    /// export + 활동 기록 JSON. 기존 백업은 절대 덮어쓰지 않는다.
    pub async fn full_backup(&self, records: &[ActivityRecord]) -> Result<PathBuf, CoreError> {
        let companion_path = self.companion.path().to_path_buf();
        if !companion_path.exists() {
            return Err(CoreError::StoreUnavailable(
                companion_path.display().to_string(),
            ));
        }

        std::fs::create_dir_all(&self.backup_root)?;

        let stamp = Utc::now()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");

        // 같은 밀리초에 두 번 호출돼도 디렉토리가 겹치지 않도록 suffix 탐색
        let mut dir = self.backup_root.join(format!("{BACKUP_DIR_PREFIX}{stamp}"));
        let mut attempt = 1u32;
        loop {
            match std::fs::create_dir(&dir) {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    dir = self
                        .backup_root
                        .join(format!("{BACKUP_DIR_PREFIX}{stamp}-{attempt}"));
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        std::fs::copy(&companion_path, dir.join(COMPANION_STORE_FILE))?;
        self.store.export_to_file(&dir.join(ENGINE_STORE_FILE)).await?;

        if !records.is_empty() {
            std::fs::write(
                dir.join(HISTORY_EXPORT_FILE),
                serde_json::to_vec_pretty(records)?,
            )?;
        }

        println!("[Backup] Full backup written to {}", dir.display());
        Ok(dir)
    }

    /// 컴패니언 스토어를 `source` 파일로 교체하는 파괴적 복원.
    ///
    /// 순서 불변식: safety copy가 끝난 뒤에만 삭제가 일어난다.
    /// safety copy 이후의 실패는 그 경로를 포함한 `RestoreFailed`로 보고된다.
    pub async fn restore(&self, source: &Path) -> Result<RestoreReport, CoreError> {
        if !source.exists() {
            return Err(CoreError::BackupNotFound(source.display().to_string()));
        }

        let target = self.companion.path().to_path_buf();
        self.companion.close().await;

        let safety = PathBuf::from(format!(
            "{}.backup-{}",
            target.display(),
            Utc::now().timestamp_millis()
        ));
        std::fs::copy(&target, &safety)?;
        println!("[Backup] Safety copy written to {}", safety.display());

        let fail = |message: String| CoreError::RestoreFailed {
            message,
            safety_backup: safety.display().to_string(),
        };

        if let Err(e) = std::fs::remove_file(&target) {
            return Err(fail(e.to_string()));
        }
        if let Err(e) = std::fs::copy(source, &target) {
            return Err(fail(format!("copy-in failed: {e}")));
        }
        if let Err(e) = self.companion.reopen().await {
            return Err(fail(format!("reopen failed: {e}")));
        }

        Ok(RestoreReport {
            safety_backup: safety.display().to_string(),
            backup_used: None,
            message: "Backup restored successfully".to_string(),
        })
    }

    /// 가장 최근 풀백업에서 복원.
    ///
    /// 계정별 JSON 스냅샷만으로는 네이티브 스토어 포맷을 재구성할 수 없으므로,
    /// identity는 해당 계정의 스냅샷 존재 확인에만 쓰이고 실제 복원은
    /// 최신 풀백업(전역)에서 이루어진다.
    pub async fn quick_restore(&self, identity: &str) -> Result<RestoreReport, CoreError> {
        let sanitized = digest::sanitize_identity(identity);
        let snapshot_file = self
            .history_root
            .join(&sanitized)
            .join(format!("history-{sanitized}.json"));
        if !snapshot_file.exists() {
            return Err(CoreError::SnapshotNotFound(identity.to_string()));
        }

        let latest = self.latest_full_backup()?;
        let companion_copy = latest.join(COMPANION_STORE_FILE);
        if !companion_copy.exists() {
            return Err(CoreError::BackupNotFound(
                companion_copy.display().to_string(),
            ));
        }

        let mut report = self.restore(&companion_copy).await?;
        report.backup_used = latest
            .file_name()
            .map(|name| name.to_string_lossy().to_string());
        report.message = "Store restored from latest full backup".to_string();
        Ok(report)
    }

    /// `backup-*` 디렉토리 중 이름 내림차순으로 가장 최근 것
    fn latest_full_backup(&self) -> Result<PathBuf, CoreError> {
        let entries = std::fs::read_dir(&self.backup_root).map_err(|_| {
            CoreError::BackupNotFound(self.backup_root.display().to_string())
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(BACKUP_DIR_PREFIX))
            .collect();

        names.sort();
        match names.pop() {
            Some(name) => Ok(self.backup_root.join(name)),
            None => Err(CoreError::BackupNotFound(
                self.backup_root.display().to_string(),
            )),
        }
    }
}
