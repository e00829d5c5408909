//! 設定檔
//!
//! JSON 格式，預設位於 `<config_dir>/tooperbot/config.json`。
//! 每個伺服器一組連線與頻道設定，倒數清單與塔台紀錄的檔案位置則全域共用。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use botcore::store::ensure_parent_dir;
use botcore::{Backing, ConnectionConfig, OperCredentials, SessionConfig, TextCodec};
use serde::{Deserialize, Serialize};

/// 單一伺服器設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 顯示用名稱
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub nickname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub servername: String,
    #[serde(default)]
    pub realname: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub oper_user: Option<String>,
    #[serde(default)]
    pub oper_password: Option<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    /// 可使用管理指令的頻道
    #[serde(default)]
    pub privileged_channels: Vec<String>,
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_port() -> u16 {
    6667
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_read_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    30
}

fn or_default(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

impl ServerConfig {
    /// 轉換為工作階段設定；未填的身分欄位以暱稱或 `localhost` 補上
    pub fn session_config(&self) -> SessionConfig {
        let oper = match (&self.oper_user, &self.oper_password) {
            (Some(user), Some(password)) => Some(OperCredentials {
                user: user.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        SessionConfig {
            nick: self.nickname.clone(),
            user: or_default(&self.username, &self.nickname),
            host: or_default(&self.hostname, "localhost"),
            server: or_default(&self.servername, "localhost"),
            real: or_default(&self.realname, &self.nickname),
            password: self.password.clone().filter(|p| !p.is_empty()),
            oper,
            channels: self.channels.clone(),
            privileged_channels: self.privileged_channels.clone(),
        }
    }
}

/// 全域設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    /// 倒數清單檔案；未設定時只存在記憶體
    #[serde(default)]
    pub countdown_file: Option<PathBuf>,
    /// 塔台紀錄檔案
    #[serde(default)]
    pub towers_file: Option<PathBuf>,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            countdown_file: None,
            towers_file: None,
            read_timeout_secs: default_read_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl BotConfig {
    /// 預設設定檔路徑
    pub fn default_path() -> PathBuf {
        config_dir().join("config.json")
    }

    /// 讀取設定檔
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("無法讀取設定檔 {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("設定檔格式錯誤 {}", path.display()))?;
        Ok(config)
    }

    /// 儲存設定檔
    pub fn save(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path).with_context(|| format!("無法建立設定目錄 {}", path.display()))?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("無法寫入設定檔 {}", path.display()))?;
        Ok(())
    }

    /// 範例設定
    pub fn sample() -> Self {
        Self {
            servers: vec![ServerConfig {
                name: "example".to_string(),
                host: "irc.example.net".to_string(),
                port: default_port(),
                nickname: "tooper".to_string(),
                username: "tooper".to_string(),
                hostname: "localhost".to_string(),
                servername: "localhost".to_string(),
                realname: "Tooper Bot".to_string(),
                password: None,
                oper_user: None,
                oper_password: None,
                channels: vec!["#ops".to_string(), "#public".to_string()],
                privileged_channels: vec!["#ops".to_string()],
                encoding: default_encoding(),
            }],
            countdown_file: Some(config_dir().join("countdown.json")),
            towers_file: Some(config_dir().join("towers.json")),
            ..Default::default()
        }
    }

    /// 連線設定；未知的編碼名稱視為錯誤
    pub fn connection_config(&self, server: &ServerConfig) -> Result<ConnectionConfig> {
        let codec = TextCodec::for_label(&server.encoding)
            .ok_or_else(|| anyhow!("{}: 未知的編碼 '{}'", server.name, server.encoding))?;
        Ok(ConnectionConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs.max(1)),
            codec,
            ..Default::default()
        })
    }

    pub fn countdown_backing(&self) -> Backing {
        backing(&self.countdown_file)
    }

    pub fn towers_backing(&self) -> Backing {
        backing(&self.towers_file)
    }
}

fn backing(path: &Option<PathBuf>) -> Backing {
    match path {
        Some(path) => Backing::file(path),
        None => Backing::memory(),
    }
}

/// 獲取設定目錄
pub fn config_dir() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        config_dir.join("tooperbot")
    } else {
        PathBuf::from(".")
    }
}
