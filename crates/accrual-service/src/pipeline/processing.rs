//! 处理阶段：执行入账事务

use std::sync::Arc;
use std::time::Instant;

use async_channel::Receiver;
use loyalty_shared::observability::metrics::{record_accrual, set_queue_depth};
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::{PROCESSING_QUEUE, shutdown_requested};
use crate::models::AccrueRecord;
use crate::repository::OrderRepositoryTrait;

/// 入账结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualOutcome {
    Credited,
    /// 订单已处于终态，未重复入账
    AlreadySettled,
    Failed,
}

impl AccrualOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Credited => "credited",
            Self::AlreadySettled => "already_settled",
            Self::Failed => "failed",
        }
    }
}

pub struct ProcessingWorker {
    id: usize,
    orders: Arc<dyn OrderRepositoryTrait>,
    records: Receiver<AccrueRecord>,
}

impl ProcessingWorker {
    pub fn new(
        id: usize,
        orders: Arc<dyn OrderRepositoryTrait>,
        records: Receiver<AccrueRecord>,
    ) -> Self {
        Self {
            id,
            orders,
            records,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(worker = self.id, "处理 worker 已启动");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown) => {
                    debug!(worker = self.id, "收到关闭信号，处理 worker 退出");
                    break;
                }

                received = self.records.recv() => {
                    let Ok(record) = received else {
                        info!(worker = self.id, "processing 队列已关闭，处理 worker 退出");
                        break;
                    };
                    set_queue_depth(PROCESSING_QUEUE, self.records.len());
                    self.apply(&record).await;
                }
            }
        }
    }

    /// 执行一次入账，失败时记录日志并丢弃该记录
    pub async fn apply(&self, record: &AccrueRecord) -> AccrualOutcome {
        let start = Instant::now();

        let outcome = match self.orders.accrue_order(record).await {
            Ok(true) => AccrualOutcome::Credited,
            Ok(false) => {
                debug!(
                    worker = self.id,
                    number = %record.number,
                    "订单已结算，跳过重复入账"
                );
                AccrualOutcome::AlreadySettled
            }
            Err(e) => {
                error!(
                    worker = self.id,
                    user_id = %record.user_id,
                    number = %record.number,
                    amount = %record.amount,
                    error = %e,
                    "积分入账失败"
                );
                AccrualOutcome::Failed
            }
        };

        record_accrual(outcome.label(), start.elapsed().as_secs_f64());
        outcome
    }
}
