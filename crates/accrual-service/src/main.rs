//! 积分入账服务入口
//!
//! 启动积分流水线与未决订单补偿轮询，收到关闭信号后通知所有 worker 退出。
//!
//! 进程本身不对外提供接口：订单由外部写入方落库（或经 `OrderService` 嵌入调用），
//! 这里只通过补偿轮询把未决订单送入流水线。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use loyalty_shared::{config::AppConfig, database::Database, observability};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use accrual_service::{
    MIGRATOR,
    accrual_client::AccrualHttpClient,
    pipeline::{AccrualPipeline, PendingOrderSweeper},
    repository::{OrderRepository, OrderRepositoryTrait},
};

const SERVICE_NAME: &str = "accrual-service";
const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置，失败时退回默认值
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        AppConfig::default()
    });

    // 2. 初始化可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(environment = %config.environment, "Starting accrual-service...");

    // 3. 数据库与迁移
    let db = Database::connect(&config.database).await?;
    if config.database.run_migrations {
        db.run_migrations(&MIGRATOR).await?;
    }

    // 4. 仓储与 oracle 客户端
    let orders: Arc<dyn OrderRepositoryTrait> = Arc::new(OrderRepository::new(db.pool().clone()));
    let oracle = Arc::new(AccrualHttpClient::new(&config.accrual)?);

    // 5. 启动流水线
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = Arc::new(AccrualPipeline::new(
        orders.clone(),
        oracle,
        &config.pipeline,
    ));
    let mut handles = pipeline.start(shutdown_rx.clone());

    // 6. 补偿轮询，启动时先登记一轮遗留的未决订单
    match config.pipeline.sweep_interval() {
        Some(interval) => {
            let sweeper = PendingOrderSweeper::new(
                orders.clone(),
                pipeline.clone(),
                interval,
                config.pipeline.sweep_batch_size,
            );
            if let Err(e) = sweeper.sweep_once().await {
                warn!(error = %e, "启动时补偿轮询失败");
            }
            handles.push(tokio::spawn(sweeper.run(shutdown_rx.clone())));
        }
        None => info!("补偿轮询已关闭"),
    }

    info!("accrual-service is running");
    shutdown_signal().await;

    // 7. 通知 worker 退出并等待
    let _ = shutdown_tx.send(true);
    let joined = tokio::time::timeout(WORKER_STOP_TIMEOUT, futures::future::join_all(handles)).await;
    match joined {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    error!(error = %e, "worker 任务异常退出");
                }
            }
        }
        Err(_) => warn!(
            timeout_secs = WORKER_STOP_TIMEOUT.as_secs(),
            "等待 worker 退出超时"
        ),
    }

    db.close().await;
    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
