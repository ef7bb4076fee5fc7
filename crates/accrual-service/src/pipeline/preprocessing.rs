//! 预处理阶段
//!
//! 向 oracle 查询订单结果并分流：PROCESSED 进入处理队列，PROCESSING / INVALID 直接更新状态，
//! 其余状态保持不变。oracle 调用失败时本轮放弃该订单。

use std::sync::Arc;

use async_channel::{Receiver, Sender};
use loyalty_shared::observability::metrics::{record_order_routed, set_queue_depth};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{INTAKE_QUEUE, PROCESSING_QUEUE, shutdown_requested};
use crate::accrual_client::{AccrualOracle, AccrualStatus};
use crate::models::{AccrueRecord, Order, OrderStatus};
use crate::repository::OrderRepositoryTrait;

/// 单个订单的分流结果
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// oracle 已完成计算，需要入账
    Accrue(AccrueRecord),
    MarkedProcessing,
    MarkedInvalid,
    /// oracle 尚无结论，订单保持原状
    Unchanged,
    /// oracle 调用失败，本轮不做任何决定
    OracleFailed,
    /// 状态写入失败
    StoreFailed,
}

impl Route {
    fn label(&self) -> &'static str {
        match self {
            Self::Accrue(_) => "accrue",
            Self::MarkedProcessing => "processing",
            Self::MarkedInvalid => "invalid",
            Self::Unchanged => "unchanged",
            Self::OracleFailed => "oracle_error",
            Self::StoreFailed => "store_error",
        }
    }
}

pub struct PreprocessingWorker {
    id: usize,
    orders: Arc<dyn OrderRepositoryTrait>,
    oracle: Arc<dyn AccrualOracle>,
    intake: Receiver<Order>,
    processing: Sender<AccrueRecord>,
}

impl PreprocessingWorker {
    pub fn new(
        id: usize,
        orders: Arc<dyn OrderRepositoryTrait>,
        oracle: Arc<dyn AccrualOracle>,
        intake: Receiver<Order>,
        processing: Sender<AccrueRecord>,
    ) -> Self {
        Self {
            id,
            orders,
            oracle,
            intake,
            processing,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(worker = self.id, "预处理 worker 已启动");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown) => {
                    debug!(worker = self.id, "收到关闭信号，预处理 worker 退出");
                    break;
                }

                received = self.intake.recv() => {
                    let Ok(order) = received else {
                        info!(worker = self.id, "intake 队列已关闭，预处理 worker 退出");
                        break;
                    };
                    set_queue_depth(INTAKE_QUEUE, self.intake.len());

                    if let Route::Accrue(record) = self.route_order(&order).await {
                        if !self.forward(record, &mut shutdown).await {
                            break;
                        }
                    }
                }
            }
        }
    }

    /// 查询 oracle 并根据结果更新订单，PROCESSED 时返回待入账记录
    pub async fn route_order(&self, order: &Order) -> Route {
        let route = match self.oracle.get_order(&order.number).await {
            Ok(result) => match result.status {
                AccrualStatus::Processed => {
                    let amount = result.accrual.unwrap_or(Decimal::ZERO);
                    Route::Accrue(AccrueRecord::for_order(order, amount))
                }
                AccrualStatus::Processing => {
                    self.mark(order, OrderStatus::Processing, Route::MarkedProcessing)
                        .await
                }
                AccrualStatus::Invalid => {
                    self.mark(order, OrderStatus::Invalid, Route::MarkedInvalid)
                        .await
                }
                AccrualStatus::Registered | AccrualStatus::Unknown => Route::Unchanged,
            },
            Err(e) => {
                warn!(
                    worker = self.id,
                    number = %order.number,
                    error = %e,
                    "查询 oracle 失败，本轮跳过该订单"
                );
                Route::OracleFailed
            }
        };

        record_order_routed(route.label());
        debug!(worker = self.id, number = %order.number, route = route.label(), "订单分流完成");
        route
    }

    async fn mark(&self, order: &Order, status: OrderStatus, route: Route) -> Route {
        match self.orders.mark_order_status(&[order.id], status).await {
            Ok(_) => route,
            Err(e) => {
                warn!(
                    worker = self.id,
                    number = %order.number,
                    status = %status,
                    error = %e,
                    "更新订单状态失败"
                );
                Route::StoreFailed
            }
        }
    }

    /// 投递到处理队列，返回 false 表示 worker 应当退出
    async fn forward(&self, record: AccrueRecord, shutdown: &mut watch::Receiver<bool>) -> bool {
        let number = record.number.clone();

        tokio::select! {
            biased;

            _ = shutdown_requested(shutdown) => {
                debug!(worker = self.id, number = %number, "关闭期间放弃投递入账记录");
                false
            }

            sent = self.processing.send(record) => {
                if sent.is_err() {
                    info!(worker = self.id, "processing 队列已关闭，预处理 worker 退出");
                    return false;
                }
                set_queue_depth(PROCESSING_QUEUE, self.processing.len());
                true
            }
        }
    }
}
