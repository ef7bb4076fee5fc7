//! 订单仓储
//!
//! 订单号由唯一索引保证全局唯一，入账时与余额在同一事务内更新。

use std::time::Instant;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::balance_repo::BalanceRepository;
use super::traits::OrderRepositoryTrait;
use crate::error::{AccrualError, Result, is_unique_violation};
use crate::models::{AccrueRecord, Order, OrderStatus, PendingCursor};

/// 订单仓储
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 查询操作 ====================

    pub async fn get_order_by_number(&self, number: &str) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT order_id, user_id, number, status, accrual, uploaded_at
            FROM orders
            WHERE number = $1
            "#,
        )
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    pub async fn get_user_order(&self, user_id: &str, number: &str) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT order_id, user_id, number, status, accrual, uploaded_at
            FROM orders
            WHERE user_id = $1 AND number = $2
            "#,
        )
        .bind(user_id)
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// 列出用户订单，按上传时间升序
    pub async fn list_user_orders(&self, user_id: &str) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT order_id, user_id, number, status, accrual, uploaded_at
            FROM orders
            WHERE user_id = $1
            ORDER BY uploaded_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// 列出尚未进入终态的订单，供补偿轮询使用
    ///
    /// 按 (uploaded_at, order_id) 做键集分页，after 为空时从头扫描。
    pub async fn list_pending_orders(
        &self,
        after: Option<PendingCursor>,
        limit: i64,
    ) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT order_id, user_id, number, status, accrual, uploaded_at
            FROM orders
            WHERE status IN ('NEW', 'PROCESSING')
              AND ($1::timestamptz IS NULL OR (uploaded_at, order_id) > ($1, $2))
            ORDER BY uploaded_at ASC, order_id ASC
            LIMIT $3
            "#,
        )
        .bind(after.map(|c| c.uploaded_at))
        .bind(after.map(|c| c.order_id))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    // ==================== 写入操作 ====================

    /// 以 NEW 状态创建订单
    pub async fn create_order(&self, user_id: &str, number: &str) -> Result<Order> {
        let order = Order::new(user_id, number);

        let created = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (order_id, user_id, number, status, accrual, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING order_id, user_id, number, status, accrual, uploaded_at
            "#,
        )
        .bind(order.id)
        .bind(&order.user_id)
        .bind(&order.number)
        .bind(order.status)
        .bind(order.accrual)
        .bind(order.uploaded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AccrualError::DuplicateOrderNumber(number.to_string())
            } else {
                AccrualError::Database(e)
            }
        })?;

        Ok(created)
    }

    /// 批量更新订单状态
    ///
    /// 只接受 PROCESSING 和 INVALID，PROCESSED 必须经由 `accrue_order` 与余额一起提交。
    pub async fn mark_order_status(&self, order_ids: &[Uuid], status: OrderStatus) -> Result<u64> {
        if !matches!(status, OrderStatus::Processing | OrderStatus::Invalid) {
            return Err(AccrualError::InvalidStatusTransition(status));
        }
        if order_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2
            WHERE order_id = ANY($1) AND status IN ('NEW', 'PROCESSING')
            "#,
        )
        .bind(order_ids)
        .bind(status)
        .execute(&self.pool)
        .await?;

        debug!(
            count = order_ids.len(),
            updated = result.rows_affected(),
            status = %status,
            "订单状态已更新"
        );

        Ok(result.rows_affected())
    }

    /// 原子入账
    ///
    /// 锁顺序固定为先余额后订单，与扣款路径一致。订单已处于终态时回滚并返回 false，
    /// 同一订单因此只会入账一次。
    pub async fn accrue_order(&self, record: &AccrueRecord) -> Result<bool> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        BalanceRepository::get_or_create_in_tx(&mut tx, &record.user_id).await?;
        BalanceRepository::get_balance_for_update(&mut tx, &record.user_id).await?;

        let updated = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE orders
            SET status = 'PROCESSED', accrual = $3
            WHERE number = $1 AND user_id = $2 AND status IN ('NEW', 'PROCESSING')
            RETURNING order_id
            "#,
        )
        .bind(&record.number)
        .bind(&record.user_id)
        .bind(record.amount)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            tx.rollback().await?;
            debug!(number = %record.number, "订单已处于终态或不存在，跳过入账");
            return Ok(false);
        }

        BalanceRepository::credit_in_tx(&mut tx, &record.user_id, record.amount).await?;
        tx.commit().await?;

        info!(
            user_id = %record.user_id,
            number = %record.number,
            amount = %record.amount,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "积分入账完成"
        );

        Ok(true)
    }
}

#[async_trait]
impl OrderRepositoryTrait for OrderRepository {
    async fn create_order(&self, user_id: &str, number: &str) -> Result<Order> {
        self.create_order(user_id, number).await
    }

    async fn get_order_by_number(&self, number: &str) -> Result<Option<Order>> {
        self.get_order_by_number(number).await
    }

    async fn get_user_order(&self, user_id: &str, number: &str) -> Result<Option<Order>> {
        self.get_user_order(user_id, number).await
    }

    async fn list_user_orders(&self, user_id: &str) -> Result<Vec<Order>> {
        self.list_user_orders(user_id).await
    }

    async fn list_pending_orders(
        &self,
        after: Option<PendingCursor>,
        limit: i64,
    ) -> Result<Vec<Order>> {
        self.list_pending_orders(after, limit).await
    }

    async fn mark_order_status(&self, order_ids: &[Uuid], status: OrderStatus) -> Result<u64> {
        self.mark_order_status(order_ids, status).await
    }

    async fn accrue_order(&self, record: &AccrueRecord) -> Result<bool> {
        self.accrue_order(record).await
    }
}
