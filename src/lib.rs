//! Rotor - Credential Vault & Rotation/Backup Engine
//!
//! 컴패니언 데스크톱 앱의 멀티 계정 운용을 자동화하는 백엔드 라이브러리:
//! 크리덴셜을 암호화 저장하고, 사용량 쿼터 기반으로 활성 계정을 로테이션하며,
//! 컴패니언 앱의 활동 히스토리를 계정 단위로 스냅샷/복원한다.
//! UI는 `commands` 모듈의 요청/응답 경계를 통해서만 코어에 접근한다.

pub mod backup;
pub mod commands;
pub mod companion;
pub mod db;
pub mod error;
pub mod models;
pub mod rotation;
pub mod settings;
pub mod usage;
pub mod vault;

use std::path::PathBuf;
use std::sync::Arc;

use backup::BackupReconciler;
use companion::CompanionDb;
use db::Store;
use error::CoreError;
use rotation::RotationPolicyEngine;
use settings::SettingsStore;
use usage::UsageTracker;
use vault::cipher::MasterKey;
use vault::CredentialVault;

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// 코어 경로 구성
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// 엔진 자체 스토어 (credentials / usage_log / settings)
    pub engine_db_path: PathBuf,
    /// 컴패니언 앱의 SQLite 스토어 (읽기 전용 + restore 대상)
    pub companion_db_path: PathBuf,
    /// 컴패니언 앱 로그 디렉토리 (크레딧 프로브용)
    pub companion_log_dir: PathBuf,
    /// 계정별 스냅샷 루트
    pub history_root: PathBuf,
    /// 풀백업 루트
    pub backup_root: PathBuf,
}

impl CoreConfig {
    /// `.env` + 환경변수에서 구성을 읽는다. 값이 없으면 플랫폼 기본 경로.
    pub fn from_env() -> Self {
        // production에서는 .env가 없을 수 있으므로 실패해도 무시
        let _ = dotenvy::dotenv();

        let data_dir = env_path("ROTOR_DATA_DIR").unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("rotor")
        });
        let companion_data = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("companion")
            .join("data");
        let desktop = dirs::desktop_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            engine_db_path: data_dir.join("rotor.db"),
            companion_db_path: env_path("ROTOR_COMPANION_DB")
                .unwrap_or_else(|| companion_data.join("companion.sqlite")),
            companion_log_dir: env_path("ROTOR_COMPANION_LOGS")
                .unwrap_or_else(|| companion_data.join("logs")),
            history_root: env_path("ROTOR_HISTORY_ROOT")
                .unwrap_or_else(|| desktop.join("Rotor History")),
            backup_root: env_path("ROTOR_BACKUP_ROOT")
                .unwrap_or_else(|| desktop.join("Rotor Backups")),
        }
    }
}

/// 애플리케이션 코어: 모든 컴포넌트의 소유자
pub struct AppCore {
    pub config: CoreConfig,
    pub store: Arc<Store>,
    pub companion: Arc<CompanionDb>,
    pub vault: CredentialVault,
    pub usage: UsageTracker,
    pub rotation: RotationPolicyEngine,
    pub settings: SettingsStore,
    pub reconciler: BackupReconciler,
}

impl AppCore {
    /// 기동: 마스터키를 1회 결정하고 스토어를 연다.
    /// 마스터키가 어디에도 없으면 `MasterKeyMissing` — 조용한 재생성으로
    /// 기존 암호문을 고아로 만드는 대신 기동을 실패시킨다.
    pub async fn init(config: CoreConfig) -> Result<Self, CoreError> {
        let key = MasterKey::resolve()?;
        Self::init_with_key(config, key).await
    }

    /// 명시적으로 주입된 마스터키로 기동 (테스트 및 re-key 시나리오)
    pub async fn init_with_key(config: CoreConfig, key: MasterKey) -> Result<Self, CoreError> {
        let store = Arc::new(Store::open(&config.engine_db_path)?);
        store.initialize().await?;

        // 컴패니언 스토어가 없어도 기동은 한다 — 관련 명령이
        // StoreUnavailable로 보고할 뿐이다.
        let companion = Arc::new(CompanionDb::open(&config.companion_db_path));

        let core = Self {
            vault: CredentialVault::new(Arc::clone(&store), key),
            usage: UsageTracker::new(Arc::clone(&store)),
            rotation: RotationPolicyEngine::new(Arc::clone(&store)),
            settings: SettingsStore::new(Arc::clone(&store)),
            reconciler: BackupReconciler::new(
                Arc::clone(&store),
                Arc::clone(&companion),
                &config.history_root,
                &config.backup_root,
            ),
            store,
            companion,
            config,
        };

        println!(
            "[Core] Initialized (store: {})",
            core.config.engine_db_path.display()
        );
        Ok(core)
    }
}
