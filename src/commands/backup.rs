//! Backup & Reconciliation Commands
//!
//! 스냅샷 / 풀백업 / 복원 / 외부 프로브 명령어.
//! 파괴적 복원까지 포함해 모든 실패는 envelope으로 보고되고
//! 프로세스를 죽이지 않는다.

use serde::{Deserialize, Serialize};

use crate::companion::probe::{LogFileProbe, ProbeOutcome, UsageProbe};
use crate::error::CommandResult;
use crate::models::{
    ActivityStats, ModelUsageRow, PeriodStats, RestoreReport, SnapshotReport,
};
use crate::AppCore;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreArgs {
    /// 복원에 사용할 컴패니언 스토어 사본 경로
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullBackupResult {
    pub path: String,
}

/// 현재 계정의 활동 히스토리를 스냅샷.
/// 데이터가 변하지 않았으면 `skipped`로 보고되고 아무것도 쓰지 않는다.
pub async fn run_snapshot(core: &AppCore) -> CommandResult<SnapshotReport> {
    // 계정 email을 읽지 못해도 스냅샷 자체는 진행한다
    let identity = core
        .companion
        .current_user_email()
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| "unknown".to_string());

    let records = core.companion.activity_records().await?;
    Ok(core.reconciler.snapshot(&identity, &records).await?)
}

/// 타임스탬프 디렉토리에 풀백업 (컴패니언 스토어 + 엔진 스토어 + JSON export)
pub async fn run_full_backup(core: &AppCore) -> CommandResult<FullBackupResult> {
    let records = core.companion.activity_records().await.unwrap_or_default();
    let path = core.reconciler.full_backup(&records).await?;
    Ok(FullBackupResult {
        path: path.display().to_string(),
    })
}

/// 지정한 백업 파일로 파괴적 복원
pub async fn run_restore(core: &AppCore, args: RestoreArgs) -> CommandResult<RestoreReport> {
    Ok(core
        .reconciler
        .restore(std::path::Path::new(&args.path))
        .await?)
}

/// 가장 최근 풀백업에서 복원 (identity는 스냅샷 존재 확인용)
pub async fn run_quick_restore(core: &AppCore, identity: String) -> CommandResult<RestoreReport> {
    Ok(core.reconciler.quick_restore(&identity).await?)
}

/// 실행 중인 컴패니언 앱에서 크레딧 표시를 긁어오기 (best-effort).
/// 실패해도 에러가 아니라 `failed` outcome으로 보고된다.
pub async fn probe_credits(core: &AppCore) -> CommandResult<ProbeOutcome> {
    let probe = LogFileProbe::new(&core.config.companion_log_dir);
    Ok(probe.probe().await)
}

/// 종합 활동 통계
pub async fn get_activity_stats(core: &AppCore) -> CommandResult<ActivityStats> {
    Ok(core.companion.activity_stats().await?)
}

/// 기간별 쿼리 수
pub async fn get_period_stats(core: &AppCore) -> CommandResult<PeriodStats> {
    Ok(core.companion.period_stats().await?)
}

/// 모델별 사용량 분포
pub async fn get_model_usage(core: &AppCore) -> CommandResult<Vec<ModelUsageRow>> {
    Ok(core.companion.model_usage().await?)
}
