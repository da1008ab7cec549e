mod config;
mod engine;
mod error;
mod font;
mod graph;
mod message;
mod overlay;
mod playlist;
mod request;
mod state;
mod storage;
mod supervisor;
mod web;

use clap::Parser;
use config::AppConfig;
use state::AppState;
use std::sync::Arc;
use tracing::info;

/// Castpanel - self-hosted live streaming control panel
/// 解析命令行参数，加载配置文件，清空叠加消息并启动HTTP服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "castpanel.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统，设置格式
    tracing_subscriber::fmt::init();

    // 解析命令行参数，获取配置文件路径
    let args = Args::parse();

    // 加载配置文件
    let config = AppConfig::load(&args.config)?;
    info!(
        "Castpanel initialized. Data dir: {:?}, transcoder: {}",
        config.server.data_dir, config.server.ffmpeg_binary
    );

    for dir in [
        &config.server.data_dir,
        &config.server.videos_dir,
        &config.server.uploads_dir,
    ] {
        tokio::fs::create_dir_all(dir).await?;
    }

    // 初始化全局状态；推流会话不跨进程保留，从空闲状态开始
    let state = Arc::new(AppState::new(config.clone()));

    // 上一次运行残留的消息不应出现在新的推流中
    state.messages.reset().await?;

    let app = web::router(state);

    // 启动HTTP服务，监听指定的地址和端口
    info!("Listening on {}", config.server.listen);
    let listener = tokio::net::TcpListener::bind(&config.server.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
