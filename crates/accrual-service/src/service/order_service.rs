//! 订单服务
//!
//! 订单号全局唯一：同一用户重复提交返回 `OrderAlreadyAccepted`，
//! 其他用户已提交返回 `OrderAlreadyRegistered`。

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::error::{AccrualError, Result};
use crate::models::Order;
use crate::pipeline::OrderIntake;
use crate::repository::OrderRepositoryTrait;
use crate::validation::is_valid_order_number;

pub struct OrderService<OR, I>
where
    OR: OrderRepositoryTrait,
    I: OrderIntake,
{
    order_repo: Arc<OR>,
    intake: Arc<I>,
}

impl<OR, I> OrderService<OR, I>
where
    OR: OrderRepositoryTrait,
    I: OrderIntake,
{
    pub fn new(order_repo: Arc<OR>, intake: Arc<I>) -> Self {
        Self { order_repo, intake }
    }

    /// 提交订单
    ///
    /// 写入成功即视为受理；登记到流水线失败只记录日志，订单由补偿轮询重新登记。
    #[instrument(skip(self))]
    pub async fn create_order(&self, user_id: &str, number: &str) -> Result<Order> {
        if !is_valid_order_number(number) {
            return Err(AccrualError::InvalidOrderNumber(number.to_string()));
        }

        if let Some(existing) = self.order_repo.get_order_by_number(number).await? {
            return Err(conflict_for(&existing, user_id));
        }

        let order = match self.order_repo.create_order(user_id, number).await {
            Ok(order) => order,
            Err(AccrualError::DuplicateOrderNumber(_)) => {
                // 并发提交同一订单号，以先写入的一方为准
                let existing = self
                    .order_repo
                    .get_order_by_number(number)
                    .await?
                    .ok_or_else(|| AccrualError::DuplicateOrderNumber(number.to_string()))?;
                return Err(conflict_for(&existing, user_id));
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self.intake.register_order(order.clone()).await {
            warn!(number = %order.number, error = %e, "订单登记到流水线失败，等待补偿轮询");
        }

        info!(user_id = %user_id, number = %number, "订单已受理");
        Ok(order)
    }

    /// 用户订单列表，按上传时间升序
    pub async fn user_orders(&self, user_id: &str) -> Result<Vec<Order>> {
        self.order_repo.list_user_orders(user_id).await
    }

    pub async fn get_user_order(&self, user_id: &str, number: &str) -> Result<Order> {
        self.order_repo
            .get_user_order(user_id, number)
            .await?
            .ok_or_else(|| AccrualError::OrderNotFound(number.to_string()))
    }
}

fn conflict_for(existing: &Order, user_id: &str) -> AccrualError {
    if existing.user_id == user_id {
        AccrualError::OrderAlreadyAccepted(existing.number.clone())
    } else {
        AccrualError::OrderAlreadyRegistered(existing.number.clone())
    }
}
