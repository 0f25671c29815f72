//! Badge backend over HTTP.

mod badge_session_client;
mod guarded_action_client;
mod wire;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use sg_core::AppConfig;

pub use badge_session_client::HttpBadgeSessionClient;
pub use guarded_action_client::HttpGuardedActionClient;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const MAX_CONNECT_TIMEOUT_SECS: u64 = 30;
const CALL_TIMEOUT_SECS: u64 = 30;

/// Backend endpoint and timeouts.
///
/// bind / verify 请求没有总超时：读卡器等待刷卡期间只能由操作员取消。
/// `call_timeout` 只用于释放会话和受保护的写操作。
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub base_url: Url,
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
}

impl HttpBackendConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let base_url = Url::parse(config.backend_base_url.trim())
            .with_context(|| format!("Invalid backend base_url: {:?}", config.backend_base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Backend base_url cannot carry a path: {base_url}");
        }
        let connect = match config.connect_timeout_secs {
            0 => DEFAULT_CONNECT_TIMEOUT_SECS,
            secs => secs.min(MAX_CONNECT_TIMEOUT_SECS),
        };
        Ok(Self {
            base_url,
            connect_timeout: Duration::from_secs(connect),
            call_timeout: Duration::from_secs(CALL_TIMEOUT_SECS),
        })
    }
}

/// Shared reqwest client for both adapters. Only connecting is bounded here;
/// per-call limits are set by the adapters.
pub fn build_http_client(config: &HttpBackendConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// `base` with `segments` appended, each percent-encoded.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_escapes_token_segment() {
        let base = Url::parse("https://club.example/api/").unwrap();
        let url = endpoint(&base, &["badge-sessions", "a/b c", "verify"]);
        assert_eq!(
            url.as_str(),
            "https://club.example/api/badge-sessions/a%2Fb%20c/verify"
        );
    }

    #[test]
    fn config_defaults_connect_timeout() {
        let mut app = AppConfig::empty();
        app.backend_base_url = "http://localhost:8080".to_string();
        let config = HttpBackendConfig::from_app_config(&app).unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));

        app.connect_timeout_secs = 600;
        let config = HttpBackendConfig::from_app_config(&app).unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn config_rejects_missing_base_url() {
        assert!(HttpBackendConfig::from_app_config(&AppConfig::empty()).is_err());
    }
}
