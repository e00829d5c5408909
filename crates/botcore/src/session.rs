//! 連線工作階段
//!
//! 註冊、加入頻道、維護成員名單，並把聊天訊息交給分派器。
//! 每個連線一個 `Session`，依序處理每一行，處理完才讀下一行。

use std::collections::HashMap;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info};

use crate::dispatch::{Dispatcher, Incoming};
use crate::irc::{parse, ConnectionError, IrcConnection, OutboundCommand, ProtocolEvent};
use crate::roster::{is_channel, ChannelRoster};

/// 工作階段錯誤
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("暱稱已被使用: {0}")]
    NickInUse(String),

    #[error("伺服器錯誤: {0}")]
    ServerError(String),
}

/// 工作階段狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Registering,
    AwaitingWelcome,
    Joined,
    Terminating,
    Closed,
}

/// OPER 帳號
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperCredentials {
    pub user: String,
    pub password: String,
}

/// 工作階段配置
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub nick: String,
    pub user: String,
    pub host: String,
    pub server: String,
    pub real: String,
    /// 伺服器密碼（PASS）
    pub password: Option<String>,
    pub oper: Option<OperCredentials>,
    /// 歡迎訊息後加入的頻道
    pub channels: Vec<String>,
    /// 具權限的頻道
    pub privileged_channels: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            nick: "tooper".to_string(),
            user: "tooper".to_string(),
            host: "localhost".to_string(),
            server: "localhost".to_string(),
            real: "Tooper Bot".to_string(),
            password: None,
            oper: None,
            channels: Vec::new(),
            privileged_channels: Vec::new(),
        }
    }
}

/// 工作階段
pub struct Session {
    config: SessionConfig,
    dispatcher: Dispatcher,
    roster: ChannelRoster,
    state: SessionState,
    /// 目前的暱稱（被改名時更新）
    nick: String,
    joined: bool,
    /// 頻道（小寫） -> 剩餘要略過的重播訊息數
    replay: HashMap<String, u8>,
}

impl Session {
    pub fn new(config: SessionConfig, dispatcher: Dispatcher) -> Self {
        let roster = ChannelRoster::with_privileged(&config.privileged_channels);
        let nick = config.nick.clone();
        Self {
            config,
            dispatcher,
            roster,
            state: SessionState::Connecting,
            nick,
            joined: false,
            replay: HashMap::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn roster(&self) -> &ChannelRoster {
        &self.roster
    }

    /// 註冊指令：`[PASS]`、`NICK`、`USER`
    pub fn registration(&mut self) -> Vec<OutboundCommand> {
        self.state = SessionState::Registering;

        let mut commands = Vec::new();
        if let Some(password) = &self.config.password {
            commands.push(OutboundCommand::Pass {
                password: password.clone(),
            });
        }
        commands.push(OutboundCommand::Nick {
            nick: self.nick.clone(),
        });
        commands.push(OutboundCommand::User {
            user: self.config.user.clone(),
            host: self.config.host.clone(),
            server: self.config.server.clone(),
            real: self.config.real.clone(),
        });

        self.state = SessionState::AwaitingWelcome;
        commands
    }

    /// 處理一個協定事件，回傳要送出的指令
    pub async fn handle_event(&mut self, event: ProtocolEvent) -> Result<Vec<OutboundCommand>, SessionError> {
        match event {
            ProtocolEvent::Ping { token } => Ok(vec![OutboundCommand::Pong { token }]),
            ProtocolEvent::Welcome => Ok(self.on_welcome()),
            ProtocolEvent::NamesReply { channel, names } => {
                self.roster.set_names(&channel, &names);
                Ok(Vec::new())
            }
            ProtocolEvent::NamesEnd { channel } => {
                self.roster.end_names(&channel);
                Ok(Vec::new())
            }
            ProtocolEvent::Join { nick, channel } => {
                if nick.eq_ignore_ascii_case(&self.nick) {
                    info!("已加入 {}", channel);
                }
                self.roster.join(&nick, &channel);
                Ok(Vec::new())
            }
            ProtocolEvent::Part { nick, channel } => {
                self.roster.part(&nick, &channel);
                Ok(Vec::new())
            }
            ProtocolEvent::NickChanged { old, new } => {
                if old.eq_ignore_ascii_case(&self.nick) {
                    info!("暱稱變更為 {}", new);
                    self.nick = new.clone();
                }
                self.roster.nick_changed(&old, &new);
                Ok(Vec::new())
            }
            ProtocolEvent::ReplayNotice { channel, line_count } => {
                debug!("{} 將重播 {} 行", channel, line_count);
                self.replay.insert(channel.to_ascii_lowercase(), line_count);
                Ok(Vec::new())
            }
            ProtocolEvent::ChatMessage {
                sender,
                recipient,
                body,
            } => {
                if self.is_replayed(&recipient) {
                    debug!("略過重播訊息: <{}> {}", sender, body);
                    return Ok(Vec::new());
                }
                let message = Incoming {
                    sender: &sender,
                    recipient: &recipient,
                    body: &body,
                };
                Ok(self.dispatcher.dispatch(message, &self.nick, &self.roster).await)
            }
            ProtocolEvent::TopicReply | ProtocolEvent::Unrecognized => Ok(Vec::new()),
            ProtocolEvent::NickConflict => {
                self.state = SessionState::Terminating;
                error!("暱稱 {} 已被使用", self.nick);
                Err(SessionError::NickInUse(self.nick.clone()))
            }
            ProtocolEvent::Error { reason } => {
                self.state = SessionState::Terminating;
                error!("伺服器錯誤: {}", reason);
                Err(SessionError::ServerError(reason))
            }
        }
    }

    fn on_welcome(&mut self) -> Vec<OutboundCommand> {
        if self.joined {
            debug!("重複的歡迎訊息，忽略");
            return Vec::new();
        }
        self.joined = true;
        self.state = SessionState::Joined;
        info!("註冊完成，加入 {} 個頻道", self.config.channels.len());

        let mut commands = Vec::new();
        if let Some(oper) = &self.config.oper {
            commands.push(OutboundCommand::Oper {
                user: oper.user.clone(),
                password: oper.password.clone(),
            });
        }
        commands.extend(self.config.channels.iter().map(|channel| OutboundCommand::Join {
            channel: channel.clone(),
        }));
        commands
    }

    /// 重播中的頻道訊息：計數減一並回傳 true
    fn is_replayed(&mut self, recipient: &str) -> bool {
        if !is_channel(recipient) {
            return false;
        }
        match self.replay.get_mut(&recipient.to_ascii_lowercase()) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    /// 執行工作階段直到連線結束
    ///
    /// 結束時一定會關閉連線並進入 `Closed`；不會自動重連。
    pub async fn run<S>(&mut self, connection: &mut IrcConnection<S>) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.drive(connection).await;
        self.state = SessionState::Terminating;
        connection.close().await;
        self.state = SessionState::Closed;

        match &result {
            Ok(()) => info!("工作階段結束"),
            Err(e) => error!("工作階段異常結束: {}", e),
        }
        result
    }

    async fn drive<S>(&mut self, connection: &mut IrcConnection<S>) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        for command in self.registration() {
            connection.send(&command).await?;
        }

        while let Some(line) = connection.next_line().await? {
            debug!("收到: {}", line);
            let event = parse(&line);
            if event == ProtocolEvent::Unrecognized {
                debug!("無法辨識的行: {}", line);
            }
            for reply in self.handle_event(event).await? {
                connection.send(&reply).await?;
            }
        }
        Ok(())
    }

    /// 重新連線前重設：清除名單與連線相關狀態
    pub fn reset(&mut self) {
        self.roster.clear();
        self.replay.clear();
        self.joined = false;
        self.nick = self.config.nick.clone();
        self.state = SessionState::Connecting;
    }
}
