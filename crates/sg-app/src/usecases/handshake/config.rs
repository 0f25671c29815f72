//! Handshake policy derived from the configuration DTO.

use std::collections::HashSet;
use std::time::Duration;

use sg_core::handshake::{ActionKind, HandshakePolicy};
use sg_core::AppConfig;

/// Upper bound for the scan expiry; larger values are clamped.
const MAX_SCAN_EXPIRY_SECS: u64 = 15 * 60;

/// 握手编排器配置
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// 每次启动都需要操作员确认
    pub require_confirmation: bool,
    /// 始终需要确认的动作类型
    pub confirm_actions: HashSet<ActionKind>,
    /// 刷卡等待时间上限；`None` 表示不过期
    pub scan_expiry: Option<Duration>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            require_confirmation: false,
            confirm_actions: HashSet::from([ActionKind::AuthorizeDestruction]),
            scan_expiry: None,
        }
    }
}

impl HandshakeConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let mut confirm_actions = HashSet::new();
        for raw in &config.confirm_actions {
            match raw.parse::<ActionKind>() {
                Ok(kind) => {
                    confirm_actions.insert(kind);
                }
                Err(error) => {
                    tracing::warn!(%error, "Ignoring confirm_actions entry");
                }
            }
        }
        if config.confirm_actions.is_empty() {
            confirm_actions = Self::default().confirm_actions;
        }

        let scan_expiry = config
            .scan_expiry_secs
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs.min(MAX_SCAN_EXPIRY_SECS)));

        Self {
            require_confirmation: config.require_confirmation,
            confirm_actions,
            scan_expiry,
        }
    }

    /// Whether a handshake for `kind` starts in `AwaitingConfirmation`.
    /// A per-request override wins over configuration.
    pub fn requires_confirmation(&self, kind: ActionKind, requested: Option<bool>) -> bool {
        requested
            .unwrap_or_else(|| self.require_confirmation || self.confirm_actions.contains(&kind))
    }

    pub fn policy(&self) -> HandshakePolicy {
        HandshakePolicy {
            scan_expiry: self
                .scan_expiry
                .and_then(|expiry| chrono::Duration::from_std(expiry).ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_confirm_only_destruction() {
        let config = HandshakeConfig::from_app_config(&AppConfig::empty());
        assert!(!config.require_confirmation);
        assert!(config.requires_confirmation(ActionKind::AuthorizeDestruction, None));
        assert!(!config.requires_confirmation(ActionKind::RecordPurchase, None));
        assert!(config.scan_expiry.is_none());
        assert!(config.policy().scan_expiry.is_none());
    }

    #[test]
    fn zero_expiry_disables_timer_and_large_values_are_clamped() {
        let mut app = AppConfig::empty();
        app.scan_expiry_secs = Some(0);
        assert!(HandshakeConfig::from_app_config(&app).scan_expiry.is_none());

        app.scan_expiry_secs = Some(86_400);
        assert_eq!(
            HandshakeConfig::from_app_config(&app).scan_expiry,
            Some(Duration::from_secs(MAX_SCAN_EXPIRY_SECS))
        );
    }

    #[test]
    fn unknown_action_kinds_are_skipped() {
        let mut app = AppConfig::empty();
        app.confirm_actions = vec!["save_rating".to_string(), "launch_rocket".to_string()];
        let config = HandshakeConfig::from_app_config(&app);
        assert_eq!(config.confirm_actions, HashSet::from([ActionKind::SaveRating]));
    }

    #[test]
    fn request_override_wins() {
        let config = HandshakeConfig {
            require_confirmation: true,
            ..HandshakeConfig::default()
        };
        assert!(!config.requires_confirmation(ActionKind::SaveRating, Some(false)));
        assert!(config.requires_confirmation(ActionKind::SaveRating, None));
    }
}
