//! 积分入账流水线
//!
//! 两级有界队列加固定数量的 worker：
//!
//! ```text
//! register_order ──► intake 队列 ──► 预处理 worker（查询 oracle、分流）
//!                                        │
//!                                        ▼
//!                              processing 队列 ──► 处理 worker（入账事务）
//! ```
//!
//! 队列满时 `register_order` 异步等待，形成背压。所有 worker 共享同一个关闭信号，
//! 收到信号后退出，队列中剩余的订单由补偿轮询在下次启动后重新登记。

mod preprocessing;
mod processing;
mod sweeper;

pub use preprocessing::{PreprocessingWorker, Route};
pub use processing::{AccrualOutcome, ProcessingWorker};
pub use sweeper::PendingOrderSweeper;

use std::sync::Arc;

use async_channel::{Receiver, Sender, TrySendError};
use async_trait::async_trait;
use loyalty_shared::config::PipelineConfig;
use loyalty_shared::observability::metrics::set_queue_depth;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::accrual_client::AccrualOracle;
use crate::error::{AccrualError, Result};
use crate::models::{AccrueRecord, Order};
use crate::repository::OrderRepositoryTrait;

pub(crate) const INTAKE_QUEUE: &str = "intake";
pub(crate) const PROCESSING_QUEUE: &str = "processing";

/// 订单登记入口
///
/// 订单服务只依赖该接口，测试时可替换为 mock。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderIntake: Send + Sync {
    async fn register_order(&self, order: Order) -> Result<()>;
}

/// 流水线
///
/// 由应用根部显式构造，通过 `Arc` 共享。
pub struct AccrualPipeline {
    orders: Arc<dyn OrderRepositoryTrait>,
    oracle: Arc<dyn AccrualOracle>,
    intake_tx: Sender<Order>,
    intake_rx: Receiver<Order>,
    processing_tx: Sender<AccrueRecord>,
    processing_rx: Receiver<AccrueRecord>,
    preprocessing_workers: usize,
    processing_workers: usize,
}

impl AccrualPipeline {
    pub fn new(
        orders: Arc<dyn OrderRepositoryTrait>,
        oracle: Arc<dyn AccrualOracle>,
        config: &PipelineConfig,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (intake_tx, intake_rx) = async_channel::bounded(capacity);
        let (processing_tx, processing_rx) = async_channel::bounded(capacity);

        Self {
            orders,
            oracle,
            intake_tx,
            intake_rx,
            processing_tx,
            processing_rx,
            preprocessing_workers: config.preprocessing_workers.max(1),
            processing_workers: config.processing_workers.max(1),
        }
    }

    /// 登记订单，队列满时等待
    pub async fn register_order(&self, order: Order) -> Result<()> {
        self.intake_tx
            .send(order)
            .await
            .map_err(|_| AccrualError::PipelineClosed)?;
        set_queue_depth(INTAKE_QUEUE, self.intake_tx.len());
        Ok(())
    }

    /// 非阻塞登记，队列已满时返回 `Ok(false)`
    pub fn try_register_order(&self, order: Order) -> Result<bool> {
        match self.intake_tx.try_send(order) {
            Ok(()) => {
                set_queue_depth(INTAKE_QUEUE, self.intake_tx.len());
                Ok(true)
            }
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Closed(_)) => Err(AccrualError::PipelineClosed),
        }
    }

    pub fn intake_len(&self) -> usize {
        self.intake_tx.len()
    }

    pub fn processing_len(&self) -> usize {
        self.processing_tx.len()
    }

    /// 启动两级 worker，返回全部任务句柄
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.preprocessing_workers + self.processing_workers);

        for id in 0..self.preprocessing_workers {
            let worker = PreprocessingWorker::new(
                id,
                self.orders.clone(),
                self.oracle.clone(),
                self.intake_rx.clone(),
                self.processing_tx.clone(),
            );
            handles.push(tokio::spawn(worker.run(shutdown.clone())));
        }

        for id in 0..self.processing_workers {
            let worker =
                ProcessingWorker::new(id, self.orders.clone(), self.processing_rx.clone());
            handles.push(tokio::spawn(worker.run(shutdown.clone())));
        }

        info!(
            preprocessing_workers = self.preprocessing_workers,
            processing_workers = self.processing_workers,
            queue_capacity = self.intake_tx.capacity().unwrap_or_default(),
            "积分流水线已启动"
        );

        handles
    }
}

#[async_trait]
impl OrderIntake for AccrualPipeline {
    async fn register_order(&self, order: Order) -> Result<()> {
        AccrualPipeline::register_order(self, order).await
    }
}

/// 等待关闭信号，发送端被丢弃同样视为关闭
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
