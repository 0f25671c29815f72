//! # Pure Data Module / 纯数据模块 - Data Transfer Objects Only
//!
//! ## Responsibilities / 职责
//!
//! - ✅ Define configuration data structures / 定义配置数据结构
//! - ✅ Provide TOML → DTO mapping / 提供 TOML → DTO 的映射
//!
//! ## Prohibited / 禁止事项
//!
//! ❌ **No validation logic / 禁止验证逻辑**
//! ❌ **No default value calculation / 禁止默认值计算**
//!
//! Clamping and defaults live in `sg_app::HandshakeConfig`.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Application configuration DTO (pure data, no logic)
/// 应用配置 DTO（纯数据，无逻辑）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Backend base URL (may be empty - this is a fact, not an error)
    pub backend_base_url: String,

    /// HTTP connect timeout in seconds (0 when missing)
    pub connect_timeout_secs: u64,

    /// Ask for confirmation before arming the reader for every action
    pub require_confirmation: bool,

    /// Action kinds (snake_case) that always ask for confirmation
    pub confirm_actions: Vec<String>,

    /// Scan session expiry in seconds; `None` keeps the reader armed until cancelled
    pub scan_expiry_secs: Option<u64>,

    /// Location → reader device id
    pub devices: BTreeMap<String, String>,

    /// Directory for the rolling log file (empty = stdout only)
    pub log_dir: PathBuf,
}

impl AppConfig {
    /// Create AppConfig from TOML value
    /// 从 TOML 值创建 AppConfig
    ///
    /// **Prohibited / 禁止**: no validation or default value logic here.
    pub fn from_toml(toml_value: &toml::Value) -> anyhow::Result<Self> {
        let section = |name: &str| toml_value.get(name);

        let devices = section("devices")
            .and_then(|d| d.as_table())
            .map(|table| {
                table
                    .iter()
                    .filter_map(|(location, device)| {
                        device
                            .as_str()
                            .map(|device| (location.clone(), device.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let confirm_actions = section("handshake")
            .and_then(|h| h.get("confirm_actions"))
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            backend_base_url: section("backend")
                .and_then(|b| b.get("base_url"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            connect_timeout_secs: section("backend")
                .and_then(|b| b.get("connect_timeout_secs"))
                .and_then(|v| v.as_integer())
                .map(|v| v.max(0) as u64)
                .unwrap_or(0),
            require_confirmation: section("handshake")
                .and_then(|h| h.get("require_confirmation"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            confirm_actions,
            scan_expiry_secs: section("handshake")
                .and_then(|h| h.get("scan_expiry_secs"))
                .and_then(|v| v.as_integer())
                .map(|v| v.max(0) as u64),
            devices,
            log_dir: PathBuf::from(
                section("logging")
                    .and_then(|l| l.get("log_dir"))
                    .and_then(|v| v.as_str())
                    .unwrap_or(""),
            ),
        })
    }

    /// Create empty AppConfig (all empty/default values)
    /// 创建空的 AppConfig（所有字段为空/默认值）
    pub fn empty() -> Self {
        Self {
            backend_base_url: String::new(),
            connect_timeout_secs: 0,
            require_confirmation: false,
            confirm_actions: Vec::new(),
            scan_expiry_secs: None,
            devices: BTreeMap::new(),
            log_dir: PathBuf::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_toml_maps_all_sections() {
        let value: toml::Value = toml::from_str(
            r#"
            [backend]
            base_url = "https://club.example/api"
            connect_timeout_secs = 5

            [handshake]
            require_confirmation = true
            confirm_actions = ["authorize_destruction"]
            scan_expiry_secs = 90

            [devices]
            counter-1 = "reader-a"
            lab = "reader-b"

            [logging]
            log_dir = "/var/log/scangate"
            "#,
        )
        .unwrap();

        let config = AppConfig::from_toml(&value).unwrap();
        assert_eq!(config.backend_base_url, "https://club.example/api");
        assert_eq!(config.connect_timeout_secs, 5);
        assert!(config.require_confirmation);
        assert_eq!(config.confirm_actions, vec!["authorize_destruction"]);
        assert_eq!(config.scan_expiry_secs, Some(90));
        assert_eq!(config.devices.get("lab").map(String::as_str), Some("reader-b"));
        assert_eq!(config.log_dir, PathBuf::from("/var/log/scangate"));
    }

    #[test]
    fn missing_sections_are_empty_facts() {
        let value: toml::Value = toml::from_str("").unwrap();
        assert_eq!(AppConfig::from_toml(&value).unwrap(), AppConfig::empty());
    }
}
