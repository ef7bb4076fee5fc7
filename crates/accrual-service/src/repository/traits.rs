//! 仓储 Trait 定义
//!
//! 服务层与流水线只依赖这些接口，PostgreSQL 实现与内存实现可以互换。

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AccrueRecord, Balance, Order, OrderStatus, PendingCursor, Withdrawal};

/// 订单仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepositoryTrait: Send + Sync {
    /// 以 NEW 状态写入订单，订单号冲突时返回 `DuplicateOrderNumber`
    async fn create_order(&self, user_id: &str, number: &str) -> Result<Order>;
    async fn get_order_by_number(&self, number: &str) -> Result<Option<Order>>;
    async fn get_user_order(&self, user_id: &str, number: &str) -> Result<Option<Order>>;
    /// 按 uploaded_at 升序
    async fn list_user_orders(&self, user_id: &str) -> Result<Vec<Order>>;
    /// 非终态订单，按 (uploaded_at, order_id) 升序，只返回 after 之后的最多 limit 条
    async fn list_pending_orders(
        &self,
        after: Option<PendingCursor>,
        limit: i64,
    ) -> Result<Vec<Order>>;

    /// 批量标记为 PROCESSING 或 INVALID，已处于终态的订单保持不变
    ///
    /// 返回实际更新的行数
    async fn mark_order_status(&self, order_ids: &[Uuid], status: OrderStatus) -> Result<u64>;

    /// 原子入账：订单置为 PROCESSED 并记录积分，同时增加用户余额
    ///
    /// 订单已处于终态（或不存在）时不做任何修改并返回 false
    async fn accrue_order(&self, record: &AccrueRecord) -> Result<bool>;
}

/// 余额仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceRepositoryTrait: Send + Sync {
    /// 获取用户余额，不存在时创建零余额
    async fn get_or_create_balance(&self, user_id: &str) -> Result<Balance>;

    /// 原子扣款并写入提现记录，余额不足时返回 `InsufficientFunds` 且不产生任何修改
    async fn debit_balance(
        &self,
        user_id: &str,
        order_number: &str,
        amount: Decimal,
    ) -> Result<Withdrawal>;

    /// 按 processed_at 升序
    async fn list_user_withdrawals(&self, user_id: &str) -> Result<Vec<Withdrawal>>;
}
