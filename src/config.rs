//! Server configuration, loaded from a TOML file and validated at startup.

use omadm_core::dispatch::DispatchConfig;
use serde::Deserialize;
use std::path::PathBuf;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[serde(default = "default_server_id")]
    pub server_id: String,

    #[serde(default = "default_host")]
    pub server_host: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    /// Base URL devices use to reach package downloads, e.g.
    /// `http://updates.example.com:8080`. Left empty to emit root-relative
    /// `/packages/<file>` URLs.
    #[serde(default)]
    pub server_url: String,

    pub packages_dir: PathBuf,

    /// Path the OMA DM endpoint is served on. HP TouchPad firmware is
    /// hardcoded to `/palmcsext/swupdateserver`.
    #[serde(default = "default_management_path")]
    pub management_path: String,

    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_username")]
    pub default_username: String,

    #[serde(default = "default_password")]
    pub default_password: String,

    #[serde(default = "default_username")]
    pub server_username: String,

    #[serde(default = "default_password")]
    pub server_password: String,

    /// Reject a client whose MAC does not match the expected value with
    /// `Status 401` instead of the legacy soft-accept behavior.
    #[serde(default)]
    pub strict_auth: bool,

    /// `SyncHdr` status code to send on successful authentication: 212
    /// (`STATUS_AUTH_ACCEPTED`) or 200 (`STATUS_OK`).
    #[validate(custom(function = "validate_auth_success_status"))]
    #[serde(default = "default_auth_success_status")]
    pub auth_success_status: u16,
}

fn default_server_id() -> String {
    "webos-update-server".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_management_path() -> String {
    "/palmcsext/swupdateserver".to_string()
}

fn default_session_timeout() -> u64 {
    3600
}

fn default_username() -> String {
    "guest".to_string()
}

fn default_password() -> String {
    "guest".to_string()
}

fn default_auth_success_status() -> u16 {
    212
}

fn validate_auth_success_status(value: u16) -> Result<(), ValidationError> {
    if value == 200 || value == 212 {
        Ok(())
    } else {
        Err(ValidationError::new("auth_success_status must be 200 or 212"))
    }
}

impl Config {
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            server_id: self.server_id.clone(),
            default_username: self.default_username.clone(),
            default_password: self.default_password.clone(),
            server_username: self.server_username.clone(),
            server_password: self.server_password.clone(),
            package_base_url: self.server_url.clone(),
            strict_auth: self.strict_auth,
            auth_success_status: self.auth_success_status as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_a_valid_config() {
        let toml = r#"
            packages_dir = "/tmp/omadm-packages"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.auth_success_status, 212);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_an_unsupported_auth_success_status() {
        let toml = r#"
            packages_dir = "/tmp/omadm-packages"
            auth_success_status = 500
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }
}
