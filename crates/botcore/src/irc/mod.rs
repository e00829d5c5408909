//! IRC 協定模組
//!
//! 連線管理、協定行解析與送出指令的編碼

mod client;
mod command;
mod protocol;

pub use client::{ConnectionConfig, ConnectionError, IrcConnection};
pub use command::OutboundCommand;
pub use protocol::{parse, ProtocolEvent};
