//! Settings Commands

use std::collections::HashMap;

use crate::error::CommandResult;
use crate::AppCore;

/// 전체 설정 조회
pub async fn read_settings(core: &AppCore) -> CommandResult<HashMap<String, String>> {
    Ok(core.settings.get_all().await?)
}

/// 설정 값 변경 (auto-switch 토글 등)
pub async fn update_setting(core: &AppCore, key: String, value: String) -> CommandResult<()> {
    Ok(core.settings.set(&key, &value).await?)
}
