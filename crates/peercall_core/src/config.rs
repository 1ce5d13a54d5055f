/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::signaling::socketio;

pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, Clone, Deserialize)]
pub struct CallConfig {
    pub server_url: String,
    #[serde(default)]
    pub socket_path: Option<String>,
    #[serde(default)]
    pub reconnect: Option<bool>,
    /// Consecutive failed connects before giving up; unset retries forever.
    #[serde(default)]
    pub reconnect_attempts: Option<u32>,
    #[serde(default)]
    pub reconnect_delay_ms: Option<u64>,
    #[serde(default)]
    pub reconnect_delay_max_ms: Option<u64>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub ice_urls: Option<Vec<String>>,
    #[serde(default)]
    pub ice_username: Option<String>,
    #[serde(default)]
    pub ice_credential: Option<String>,
    #[serde(default)]
    pub audio: Option<bool>,
    #[serde(default)]
    pub video: Option<bool>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".to_string(),
            socket_path: None,
            reconnect: None,
            reconnect_attempts: None,
            reconnect_delay_ms: None,
            reconnect_delay_max_ms: None,
            connect_timeout_secs: None,
            ice_urls: None,
            ice_username: None,
            ice_credential: None,
            audio: None,
            video: None,
        }
    }
}

/// Resolved settings for the signaling channel.
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    pub url: String,
    pub reconnect: bool,
    pub reconnect_attempts: Option<u32>,
    pub reconnect_delay: Duration,
    pub reconnect_delay_max: Duration,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ice_urls: Vec<String>,
    pub ice_username: Option<String>,
    pub ice_credential: Option<String>,
    pub audio: bool,
    pub video: bool,
}

impl CallConfig {
    pub fn signaling(&self) -> Result<SignalingConfig> {
        let path = self.socket_path.as_deref().unwrap_or(socketio::DEFAULT_PATH);
        let url = socketio::websocket_url(&self.server_url, path)?;
        let delay_ms = self.reconnect_delay_ms.unwrap_or(200).max(50).min(10_000);
        let delay_max_ms = self
            .reconnect_delay_max_ms
            .unwrap_or(5_000)
            .max(delay_ms)
            .min(60_000);
        Ok(SignalingConfig {
            url,
            reconnect: self.reconnect.unwrap_or(true),
            reconnect_attempts: self.reconnect_attempts.map(|n| n.max(1)),
            reconnect_delay: Duration::from_millis(delay_ms),
            reconnect_delay_max: Duration::from_millis(delay_max_ms),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs.unwrap_or(10).max(1).min(120)),
        })
    }

    pub fn engine(&self) -> EngineConfig {
        let ice_urls = self
            .ice_urls
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_STUN_URL.to_string()])
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        EngineConfig {
            ice_urls,
            ice_username: non_empty(self.ice_username.as_deref()),
            ice_credential: non_empty(self.ice_credential.as_deref()),
            audio: self.audio.unwrap_or(true),
            video: self.video.unwrap_or(true),
        }
    }

    fn with_server_override(mut self, server_url: Option<String>) -> Self {
        if let Some(url) = server_url.as_deref().and_then(|u| non_empty(Some(u))) {
            self.server_url = url;
        }
        self
    }
}

fn non_empty(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

pub fn parse_config(text: &str) -> Result<CallConfig> {
    serde_json::from_str(text).context("decode CallConfig")
}

/// Reads a JSON config file; `PEERCALL_SERVER_URL` wins over the file's `server_url`.
pub fn load_config_file(path: &Path) -> Result<CallConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg = parse_config(&text).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg.with_server_override(std::env::var("PEERCALL_SERVER_URL").ok()))
}

/// Config built only from the environment, for runs without a config file.
pub fn config_from_env() -> CallConfig {
    CallConfig::default().with_server_override(std::env::var("PEERCALL_SERVER_URL").ok())
}

pub fn default_config_path() -> Result<PathBuf> {
    let proj = ProjectDirs::from("net", "peercall", "PeerCall")
        .context("unable to determine platform config dir")?;
    Ok(proj.config_dir().join("config.json"))
}

/// `--config <path>`, then `PEERCALL_CONFIG`, then the platform config dir.
pub fn config_path() -> Result<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return Ok(PathBuf::from(path));
            }
            return Err(anyhow::anyhow!("--config requires a path"));
        }
    }
    if let Ok(path) = std::env::var("PEERCALL_CONFIG") {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    default_config_path()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg = parse_config(r#"{"server_url": "http://192.168.68.58:3000"}"#).unwrap();
        let sig = cfg.signaling().unwrap();
        assert_eq!(sig.url, "ws://192.168.68.58:3000/socket.io/?EIO=4&transport=websocket");
        assert!(sig.reconnect);
        assert_eq!(sig.reconnect_attempts, None);
        assert_eq!(sig.reconnect_delay, Duration::from_millis(200));
        assert_eq!(sig.reconnect_delay_max, Duration::from_secs(5));
        assert_eq!(sig.connect_timeout, Duration::from_secs(10));

        let engine = cfg.engine();
        assert_eq!(engine.ice_urls, vec![DEFAULT_STUN_URL.to_string()]);
        assert!(engine.audio && engine.video);
        assert!(engine.ice_username.is_none());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let cfg = parse_config(
            r#"{
                "server_url": "https://signal.example.org",
                "reconnect_attempts": 0,
                "reconnect_delay_ms": 1,
                "reconnect_delay_max_ms": 10,
                "connect_timeout_secs": 9999
            }"#,
        )
        .unwrap();
        let sig = cfg.signaling().unwrap();
        assert!(sig.url.starts_with("wss://signal.example.org/socket.io/"));
        assert_eq!(sig.reconnect_attempts, Some(1));
        assert_eq!(sig.reconnect_delay, Duration::from_millis(50));
        assert_eq!(sig.reconnect_delay_max, Duration::from_millis(50));
        assert_eq!(sig.connect_timeout, Duration::from_secs(120));
    }

    #[test]
    fn blank_ice_entries_are_dropped() {
        let cfg = CallConfig {
            ice_urls: Some(vec![" turn:turn.example.org:3478 ".into(), "  ".into()]),
            ice_username: Some("  ".into()),
            ice_credential: Some("secret".into()),
            video: Some(false),
            ..CallConfig::default()
        };
        let engine = cfg.engine();
        assert_eq!(engine.ice_urls, vec!["turn:turn.example.org:3478".to_string()]);
        assert_eq!(engine.ice_username, None);
        assert_eq!(engine.ice_credential.as_deref(), Some("secret"));
        assert!(engine.audio);
        assert!(!engine.video);
    }

    #[test]
    fn server_override_replaces_file_value() {
        let cfg = CallConfig::default().with_server_override(Some("http://10.0.0.9:3000".into()));
        assert_eq!(cfg.server_url, "http://10.0.0.9:3000");
        let cfg = cfg.with_server_override(Some("   ".into()));
        assert_eq!(cfg.server_url, "http://10.0.0.9:3000");
    }

    #[test]
    fn missing_server_url_is_rejected() {
        assert!(parse_config("{}").is_err());
    }

    #[test]
    fn unsupported_scheme_is_a_config_error() {
        let cfg = CallConfig {
            server_url: "ftp://example.org".into(),
            ..CallConfig::default()
        };
        assert!(cfg.signaling().is_err());
    }
}
