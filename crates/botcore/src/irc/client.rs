//! IRC 連線
//!
//! 非同步連線管理：讀取時切行、逾時時送出存活探測、送出指令

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::command::OutboundCommand;
use crate::encoding::TextCodec;
use crate::framer::{LineFramer, DEFAULT_MAX_LINE_LEN};

/// 連續幾次讀取逾時視為連線已死
const MAX_MISSED_PROBES: u8 = 2;

/// 連線錯誤
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("連線失敗: {0}")]
    ConnectionFailed(#[from] io::Error),

    #[error("連線逾時")]
    Timeout,

    #[error("未連線")]
    NotConnected,

    #[error("DNS 解析失敗: {0}")]
    DnsResolutionFailed(String),
}

/// 連線配置
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// 建立連線逾時
    pub connect_timeout: Duration,
    /// 讀取逾時；逾時一次送出探測，連續兩次即斷線
    pub read_timeout: Duration,
    /// 每次讀取的最大位元組數
    pub read_buffer_size: usize,
    /// 單行最大長度
    pub max_line_len: usize,
    /// 文字編碼
    pub codec: TextCodec,
    /// 存活探測 PING 的 token
    pub probe_token: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(300),
            read_buffer_size: 4096,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            codec: TextCodec::default(),
            probe_token: "keepalive".to_string(),
        }
    }
}

/// IRC 連線
///
/// 讀寫都在同一個控制流程中依序進行。
pub struct IrcConnection<S = TcpStream> {
    stream: Option<S>,
    config: ConnectionConfig,
    framer: LineFramer,
    read_buffer: Vec<u8>,
    missed_probes: u8,
    eof: bool,
}

impl IrcConnection<TcpStream> {
    /// 連線到 IRC 伺服器
    ///
    /// # Arguments
    /// * `host` - 主機名稱或 IP
    /// * `port` - 連接埠
    pub async fn connect(host: &str, port: u16, config: ConnectionConfig) -> Result<Self, ConnectionError> {
        info!("正在連線到 {}:{}", host, port);

        let addr = format!("{}:{}", host, port);
        let socket_addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| ConnectionError::DnsResolutionFailed(e.to_string()))?
            .collect();

        let Some(target) = socket_addrs.first() else {
            return Err(ConnectionError::DnsResolutionFailed(format!("無法解析主機: {}", host)));
        };

        debug!("已解析到位址: {:?}", socket_addrs);

        let stream = timeout(config.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| ConnectionError::Timeout)?
            .map_err(ConnectionError::ConnectionFailed)?;

        stream.set_nodelay(true)?;

        info!("已連線到 {}:{}", host, port);
        Ok(Self::new(stream, config))
    }
}

impl<S> IrcConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// 以既有的串流建立連線（測試時可傳入模擬串流）
    pub fn new(stream: S, config: ConnectionConfig) -> Self {
        let framer = LineFramer::with_max_line_len(config.max_line_len);
        let read_buffer = vec![0u8; config.read_buffer_size.max(1)];
        Self {
            stream: Some(stream),
            config,
            framer,
            read_buffer,
            missed_probes: 0,
            eof: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some() && !self.eof
    }

    pub fn codec(&self) -> &TextCodec {
        &self.config.codec
    }

    /// 送出一個指令（自動加上 CRLF）
    pub async fn send(&mut self, command: &OutboundCommand) -> Result<(), ConnectionError> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotConnected)?;

        let mut data = self.config.codec.encode(&command.encode());
        data.extend_from_slice(b"\r\n");

        stream.write_all(&data).await?;
        stream.flush().await?;

        debug!("已發送: {}", command);
        Ok(())
    }

    /// 讀取下一個完整行
    ///
    /// 連線正常結束時，先輸出殘留片段，之後回傳 `Ok(None)`。
    pub async fn next_line(&mut self) -> Result<Option<String>, ConnectionError> {
        loop {
            if let Some(line) = self.framer.next_line() {
                return Ok(Some(line.into_text(&self.config.codec)));
            }
            if self.eof {
                return Ok(self.framer.finish().map(|line| line.into_text(&self.config.codec)));
            }

            let stream = self.stream.as_mut().ok_or(ConnectionError::NotConnected)?;
            match timeout(self.config.read_timeout, stream.read(&mut self.read_buffer)).await {
                Ok(Ok(0)) => {
                    info!("伺服器關閉連線");
                    self.eof = true;
                }
                Ok(Ok(n)) => {
                    self.missed_probes = 0;
                    self.framer.push(&self.read_buffer[..n]);
                }
                Ok(Err(e)) => {
                    self.stream = None;
                    return Err(ConnectionError::ConnectionFailed(e));
                }
                Err(_) => {
                    self.missed_probes += 1;
                    if self.missed_probes >= MAX_MISSED_PROBES {
                        warn!("連續 {} 次讀取逾時，視為斷線", self.missed_probes);
                        return Err(ConnectionError::Timeout);
                    }
                    warn!("讀取逾時，送出存活探測");
                    let probe = OutboundCommand::Ping {
                        token: self.config.probe_token.clone(),
                    };
                    if let Err(e) = self.send(&probe).await {
                        warn!("存活探測送出失敗，視為斷線: {}", e);
                        self.stream = None;
                        return Err(ConnectionError::Timeout);
                    }
                }
            }
        }
    }

    /// 關閉連線
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.eof = true;
        info!("已斷開連線");
    }
}
