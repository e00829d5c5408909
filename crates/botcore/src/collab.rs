//! 外部協作者介面
//!
//! 市場價格查詢、網頁標題擷取與遊戲伺服器狀態由外部實作，核心只定義介面。

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// 協作者錯誤
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("服務未設定")]
    Unavailable,

    #[error("查詢失敗: {0}")]
    Failed(String),
}

/// 市場交易中心
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketHub {
    Jita,
    Amarr,
    Dodixie,
    Rens,
    Hek,
}

impl MarketHub {
    pub const ALL: [MarketHub; 5] = [
        MarketHub::Jita,
        MarketHub::Amarr,
        MarketHub::Dodixie,
        MarketHub::Rens,
        MarketHub::Hek,
    ];

    /// 指令名稱，同時作為查詢鍵
    pub fn key(&self) -> &'static str {
        match self {
            MarketHub::Jita => "jita",
            MarketHub::Amarr => "amarr",
            MarketHub::Dodixie => "dodixie",
            MarketHub::Rens => "rens",
            MarketHub::Hek => "hek",
        }
    }
}

impl fmt::Display for MarketHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// 遊戲伺服器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameServer {
    /// 正式伺服器（`.eve`）
    Tranquility,
    /// 測試伺服器（`.sisi`）
    Singularity,
}

impl GameServer {
    pub fn name(&self) -> &'static str {
        match self {
            GameServer::Tranquility => "Tranquility",
            GameServer::Singularity => "Singularity",
        }
    }
}

impl fmt::Display for GameServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 伺服器狀態查詢結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerReport {
    pub online: bool,
    pub players: u64,
}

/// 價格查詢
#[async_trait]
pub trait PriceLookup: Send + Sync {
    /// 查詢單一品項，回傳已格式化的結果行（最多 `max_results` 筆）
    async fn lookup_prices(
        &self,
        hub: MarketHub,
        item: &str,
        max_results: usize,
    ) -> Result<Vec<String>, CollaboratorError>;
}

/// 網頁標題擷取
#[async_trait]
pub trait TitleFetcher: Send + Sync {
    /// `Ok(None)` 表示不是 HTML 頁面或沒有標題
    async fn fetch_title(&self, url: &str) -> Result<Option<String>, CollaboratorError>;
}

/// 遊戲伺服器狀態
#[async_trait]
pub trait ServerStatus: Send + Sync {
    async fn server_status(&self, server: GameServer) -> Result<ServerReport, CollaboratorError>;
}

/// 未接上後端時使用：所有查詢都回傳 [`CollaboratorError::Unavailable`]
#[derive(Debug, Default, Clone, Copy)]
pub struct Unavailable;

#[async_trait]
impl PriceLookup for Unavailable {
    async fn lookup_prices(
        &self,
        _hub: MarketHub,
        _item: &str,
        _max_results: usize,
    ) -> Result<Vec<String>, CollaboratorError> {
        Err(CollaboratorError::Unavailable)
    }
}

#[async_trait]
impl TitleFetcher for Unavailable {
    async fn fetch_title(&self, _url: &str) -> Result<Option<String>, CollaboratorError> {
        Err(CollaboratorError::Unavailable)
    }
}

#[async_trait]
impl ServerStatus for Unavailable {
    async fn server_status(&self, _server: GameServer) -> Result<ServerReport, CollaboratorError> {
        Err(CollaboratorError::Unavailable)
    }
}
