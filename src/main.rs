//! Sprout - Rust 花园智能体系统
//!
//! 入口：初始化日志、创建编排器并启动周期监测，Ctrl-C 时停止监测后退出。

use anyhow::Context;
use sprout::core::{create_orchestrator, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sprout::observability::init();

    // 创建编排器：返回命令发送端、状态接收端、通知接收端
    let (cmd_tx, _status_rx, _notice_rx) = create_orchestrator(None)
        .await
        .context("Failed to create orchestrator")?;

    cmd_tx
        .send(Command::StartMonitoring)
        .context("Orchestrator loop unavailable")?;

    // 通知与状态变化都已镜像到日志；前台只等退出信号
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutting down");

    let _ = cmd_tx.send(Command::StopMonitoring);
    let _ = cmd_tx.send(Command::Quit);
    Ok(())
}
