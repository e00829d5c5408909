//! IRC 指令機器人

mod config;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use botcore::{
    CommandTable, ConnectionConfig, CountdownBoard, Dispatcher, IrcConnection, Session, TowerLedger,
};
use clap::Parser;
use config::{BotConfig, ServerConfig};
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "botd", version, about = "IRC 指令機器人")]
struct Args {
    /// 設定檔路徑
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// 顯示除錯訊息（未設定 RUST_LOG 時生效）
    #[arg(short, long)]
    verbose: bool,

    /// 寫出範例設定檔後結束
    #[arg(long, value_name = "PATH")]
    write_sample: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日誌
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    if let Some(path) = args.write_sample {
        BotConfig::sample().save(&path)?;
        info!("已寫出範例設定檔: {}", path.display());
        return Ok(());
    }

    let path = args.config.unwrap_or_else(BotConfig::default_path);
    let config = BotConfig::load(&path)?;
    if config.servers.is_empty() {
        bail!("設定檔 {} 沒有任何伺服器", path.display());
    }

    let countdown = CountdownBoard::open(config.countdown_backing()).context("無法載入倒數清單")?;
    let towers = TowerLedger::open(config.towers_backing()).context("無法載入塔台紀錄")?;
    let dispatcher = Dispatcher::new(Arc::new(CommandTable::standard()))
        .with_countdown(Arc::new(Mutex::new(countdown)))
        .with_towers(Arc::new(Mutex::new(towers)));

    let mut tasks = JoinSet::new();
    for server in &config.servers {
        let connection = config.connection_config(server)?;
        tasks.spawn(run_server(server.clone(), connection, dispatcher.clone()));
    }

    let mut failures = 0;
    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                None => break,
                Some(Ok(Ok(name))) => info!("{} 連線結束", name),
                Some(Ok(Err(e))) => {
                    error!("{:#}", e);
                    failures += 1;
                }
                Some(Err(e)) => {
                    error!("連線工作中止: {}", e);
                    failures += 1;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("收到中斷訊號，結束所有連線");
                tasks.abort_all();
                return Ok(());
            }
        }
    }

    if failures > 0 {
        bail!("{} 個連線異常結束", failures);
    }
    Ok(())
}

/// 執行單一伺服器的連線直到結束；不自動重連
async fn run_server(server: ServerConfig, connection: ConnectionConfig, dispatcher: Dispatcher) -> Result<String> {
    let mut connection = IrcConnection::connect(&server.host, server.port, connection)
        .await
        .with_context(|| format!("{}: 無法連線到 {}:{}", server.name, server.host, server.port))?;

    let mut session = Session::new(server.session_config(), dispatcher);
    session
        .run(&mut connection)
        .await
        .with_context(|| format!("{}: 連線中斷", server.name))?;
    Ok(server.name)
}
