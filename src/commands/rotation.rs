//! Rotation & Usage Commands
//!
//! 활성 크리덴셜 관리와 사용량 기록 명령어

use serde::Serialize;

use crate::error::CommandResult;
use crate::models::{Credential, CredentialStatus};
use crate::AppCore;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUsageResult {
    pub total: i64,
    pub exhausted: bool,
    /// auto-switch로 로테이션이 일어났으면 새 활성 크리덴셜
    pub rotated_to: Option<Credential>,
}

/// 현재 활성 크리덴셜 조회 (없으면 None)
pub async fn get_active_credential(core: &AppCore) -> CommandResult<Option<Credential>> {
    Ok(core.rotation.get_active().await?)
}

/// 다음 적격 크리덴셜로 로테이션
pub async fn select_next_credential(core: &AppCore) -> CommandResult<Credential> {
    Ok(core.rotation.select_next().await?)
}

/// 소비 1회 기록.
/// 한도에 도달했으면 소진 전이를 위임하고, auto-switch가 켜져 있으면
/// 다음 크리덴셜로의 로테이션까지 이 경계에서 orchestrate한다.
pub async fn record_usage(core: &AppCore, credential_id: i64) -> CommandResult<RecordUsageResult> {
    core.usage.record(credential_id).await?;

    let total = core.usage.total(credential_id).await?;
    let exhausted = core.usage.is_exhausted(credential_id).await?;

    let rotated_to = if exhausted {
        core.rotation.mark_exhausted_if_needed(credential_id).await?;
        core.rotation.rotate_if_exhausted().await?
    } else {
        None
    };

    Ok(RecordUsageResult {
        total,
        exhausted,
        rotated_to,
    })
}

/// 명시적 상태 전이 (disable / 재활성화)
pub async fn set_credential_status(
    core: &AppCore,
    credential_id: i64,
    status: CredentialStatus,
) -> CommandResult<()> {
    Ok(core.rotation.set_status(credential_id, status).await?)
}
