//! Bot Core Library
//!
//! 提供 IRC 指令機器人的核心功能：
//! - `framer`: 位元組流切行
//! - `irc`: IRC 連線、協定解析與指令編碼
//! - `encoding`: 文字編解碼
//! - `roster`: 頻道成員名單與權限判斷
//! - `trigger`: 指令表
//! - `args`: 指令參數文法
//! - `dispatch`: 指令分派
//! - `countdown`: 倒數清單
//! - `towers`: 塔台紀錄
//! - `collab`: 外部查詢介面
//! - `session`: 連線工作階段

pub mod args;
pub mod clock;
pub mod collab;
pub mod countdown;
pub mod dispatch;
pub mod encoding;
pub mod framer;
pub mod irc;
pub mod roster;
pub mod session;
pub mod store;
pub mod towers;
pub mod trigger;

pub use clock::{Clock, FixedClock, SystemClock};
pub use collab::{
    CollaboratorError, GameServer, MarketHub, PriceLookup, ServerReport, ServerStatus, TitleFetcher, Unavailable,
};
pub use countdown::{CountdownBoard, CountdownStore};
pub use dispatch::{Dispatcher, ReplyTarget};
pub use encoding::TextCodec;
pub use framer::LineFramer;
pub use irc::{ConnectionConfig, IrcConnection, OutboundCommand, ProtocolEvent};
pub use roster::ChannelRoster;
pub use session::{OperCredentials, Session, SessionConfig, SessionError, SessionState};
pub use store::Backing;
pub use towers::TowerLedger;
pub use trigger::CommandTable;
