//! Credential Commands
//!
//! 크리덴셜 CRUD 명령어

use serde::{Deserialize, Serialize};

use crate::error::CommandResult;
use crate::models::Credential;
use crate::AppCore;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCredentialArgs {
    pub email: String,
    pub secret: String,
    pub usage_limit: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCredentialResult {
    pub deleted: bool,
}

/// 크리덴셜 추가 (시크릿은 즉시 암호화됨)
pub async fn add_credential(core: &AppCore, args: AddCredentialArgs) -> CommandResult<Credential> {
    let credential = core
        .vault
        .create(&args.email, &args.secret, args.usage_limit, args.notes)
        .await?;
    Ok(credential)
}

/// 전체 크리덴셜 목록 (시크릿 제외, 최신 생성 우선)
pub async fn list_credentials(core: &AppCore) -> CommandResult<Vec<Credential>> {
    Ok(core.vault.list().await?)
}

/// 크리덴셜 삭제
pub async fn delete_credential(
    core: &AppCore,
    credential_id: i64,
) -> CommandResult<DeleteCredentialResult> {
    let deleted = core.vault.delete(credential_id).await?;
    Ok(DeleteCredentialResult { deleted })
}

/// 시크릿 평문 조회 (로그인 자동화용)
pub async fn reveal_credential(core: &AppCore, credential_id: i64) -> CommandResult<String> {
    Ok(core.vault.reveal(credential_id).await?)
}
