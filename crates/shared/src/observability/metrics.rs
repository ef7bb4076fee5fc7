//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册指标描述，出现在 /metrics 的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "accrual_oracle_calls_total",
        "Total number of accrual oracle lookups"
    );
    metrics::describe_histogram!(
        "accrual_oracle_call_duration_seconds",
        "Accrual oracle lookup duration in seconds"
    );

    metrics::describe_counter!(
        "accrual_pipeline_orders_total",
        "Orders routed by the preprocessing stage"
    );
    metrics::describe_counter!("accruals_total", "Total number of accrual credit attempts");
    metrics::describe_histogram!(
        "accrual_duration_seconds",
        "Accrual credit transaction duration in seconds"
    );

    metrics::describe_counter!("withdrawals_total", "Total number of withdrawal attempts");

    metrics::describe_gauge!(
        "accrual_pipeline_queue_depth",
        "Items waiting in a pipeline queue"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次 oracle 查询，outcome 为 ok / error
#[inline]
pub fn record_oracle_call(outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "accrual_oracle_calls_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "accrual_oracle_call_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);
}

/// 记录预处理阶段的路由结果
#[inline]
pub fn record_order_routed(route: &str) {
    metrics::counter!(
        "accrual_pipeline_orders_total",
        "route" => route.to_string()
    )
    .increment(1);
}

/// 记录入账事务
#[inline]
pub fn record_accrual(status: &str, duration_secs: f64) {
    metrics::counter!("accruals_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("accrual_duration_seconds").record(duration_secs);
}

/// 记录提现请求
#[inline]
pub fn record_withdrawal(status: &str) {
    metrics::counter!("withdrawals_total", "status" => status.to_string()).increment(1);
}

/// 更新队列积压
#[inline]
pub fn set_queue_depth(queue: &str, depth: usize) {
    metrics::gauge!(
        "accrual_pipeline_queue_depth",
        "queue" => queue.to_string()
    )
    .set(depth as f64);
}
