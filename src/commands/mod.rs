//! Commands
//!
//! UI/자동화 레이어에 노출되는 요청/응답 경계.
//! 모든 함수는 비동기이고 `CommandResult`(직렬화 가능한 에러 envelope)를
//! 반환한다 — 코어 에러가 이 경계를 예외로 넘어가는 일은 없다.

pub mod backup;
pub mod credentials;
pub mod rotation;
pub mod settings;
