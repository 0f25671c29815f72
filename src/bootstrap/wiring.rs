//! # Dependency Injection / 依赖注入模块
//!
//! ## Responsibilities / 职责
//!
//! - ✅ Create infra implementations (HTTP clients, directory, clock) / 创建 infra 层具体实现
//! - ✅ Inject them into `HandshakeOrchestrator` through port traits / 通过 Port trait 注入
//!
//! ## Prohibited / 禁止事项
//!
//! ❌ **No business logic / 禁止包含任何业务逻辑**
//!
//! > This is the only place allowed to depend on sg-infra and sg-app simultaneously.
//! > 这是唯一允许同时依赖 sg-infra 和 sg-app 的地方。

use std::sync::Arc;

use sg_app::{HandshakeConfig, HandshakeDeps, HandshakeOrchestrator};
use sg_core::AppConfig;
use sg_infra::{
    build_http_client, HttpBackendConfig, HttpBadgeSessionClient, HttpGuardedActionClient,
    StaticDeviceDirectory, SystemClock,
};

/// Result type for wiring operations
pub type WiringResult<T> = Result<T, WiringError>;

/// Errors during dependency injection
/// 依赖注入错误（基础设施初始化失败）
#[derive(Debug, thiserror::Error)]
pub enum WiringError {
    #[error("Backend configuration invalid: {0}")]
    BackendConfig(String),

    #[error("HTTP client initialization failed: {0}")]
    HttpClient(String),
}

/// Wire the ports for `config`.
pub fn wire_dependencies(config: &AppConfig) -> WiringResult<HandshakeDeps> {
    let backend = HttpBackendConfig::from_app_config(config)
        .map_err(|e| WiringError::BackendConfig(format!("{e:#}")))?;
    let client =
        build_http_client(&backend).map_err(|e| WiringError::HttpClient(format!("{e:#}")))?;

    let directory = StaticDeviceDirectory::from_config(config);
    if directory.is_empty() {
        tracing::warn!("No card readers configured; every guarded action will be refused");
    }

    Ok(HandshakeDeps {
        device_directory: Arc::new(directory),
        badge_sessions: Arc::new(
            HttpBadgeSessionClient::new(client.clone(), backend.base_url.clone())
                .with_release_timeout(backend.call_timeout),
        ),
        guarded_actions: Arc::new(
            HttpGuardedActionClient::new(client, backend.base_url)
                .with_timeout(backend.call_timeout),
        ),
        clock: Arc::new(SystemClock),
    })
}

/// Build a ready-to-use orchestrator from the loaded configuration.
pub fn build_orchestrator(config: &AppConfig) -> WiringResult<HandshakeOrchestrator> {
    let deps = wire_dependencies(config)?;
    let handshake = HandshakeConfig::from_app_config(config);
    tracing::info!(
        require_confirmation = handshake.require_confirmation,
        scan_expiry = ?handshake.scan_expiry,
        readers = config.devices.len(),
        "Handshake orchestrator wired"
    );
    Ok(HandshakeOrchestrator::new(handshake, deps))
}
