//! 未决订单补偿轮询
//!
//! 定期把仍处于 NEW / PROCESSING 的订单重新登记到流水线，覆盖 oracle 暂时不可用、
//! 进程重启导致队列丢失等情况。
//!
//! 扫描位置在轮次之间保留：队列满时下一轮从上次登记的订单之后继续，扫到末尾再回到开头，
//! 长期未决的旧订单不会挤占新订单的轮询机会。

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{AccrualPipeline, shutdown_requested};
use crate::error::Result;
use crate::models::PendingCursor;
use crate::repository::OrderRepositoryTrait;

pub struct PendingOrderSweeper {
    orders: Arc<dyn OrderRepositoryTrait>,
    pipeline: Arc<AccrualPipeline>,
    interval: Duration,
    batch_size: i64,
    cursor: Mutex<Option<PendingCursor>>,
}

impl PendingOrderSweeper {
    pub fn new(
        orders: Arc<dyn OrderRepositoryTrait>,
        pipeline: Arc<AccrualPipeline>,
        interval: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            orders,
            pipeline,
            interval,
            batch_size,
            cursor: Mutex::new(None),
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "未决订单补偿轮询已启动"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown) => {
                    info!("收到关闭信号，补偿轮询退出");
                    break;
                }

                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "补偿轮询失败");
                    }
                }
            }
        }
    }

    /// 执行一轮补偿，返回重新登记的订单数
    ///
    /// 队列已满时提前结束本轮，剩余订单留给下一轮。
    pub async fn sweep_once(&self) -> Result<usize> {
        let after = *self.cursor.lock();
        let mut pending = self.orders.list_pending_orders(after, self.batch_size).await?;
        if pending.is_empty() && after.is_some() {
            debug!("补偿扫描到达末尾，从头开始");
            pending = self.orders.list_pending_orders(None, self.batch_size).await?;
        }

        let fetched = pending.len();
        let mut registered = 0;
        let mut last = after;

        for order in pending {
            let position = order.cursor();
            if !self.pipeline.try_register_order(order)? {
                debug!(registered, "intake 队列已满，本轮补偿提前结束");
                break;
            }
            last = Some(position);
            registered += 1;
        }

        // 整批登记完且不足一批，说明已扫到末尾
        let exhausted = registered == fetched && (fetched as i64) < self.batch_size;
        *self.cursor.lock() = if exhausted { None } else { last };

        if registered > 0 {
            info!(registered, "未决订单已重新登记");
        }
        Ok(registered)
    }
}
