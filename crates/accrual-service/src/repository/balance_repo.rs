//! 余额仓储
//!
//! 余额行在首次访问时创建，扣款在事务内持有行级锁完成。

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::traits::BalanceRepositoryTrait;
use crate::error::{AccrualError, Result};
use crate::models::{Balance, Withdrawal};

/// 余额仓储
pub struct BalanceRepository {
    pool: PgPool,
}

impl BalanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 查询操作 ====================

    /// 获取用户余额，不存在时创建
    pub async fn get_or_create_balance(&self, user_id: &str) -> Result<Balance> {
        let mut conn = self.pool.acquire().await?;
        Self::get_or_create_in_tx(&mut conn, user_id).await
    }

    /// 列出用户提现记录
    pub async fn list_user_withdrawals(&self, user_id: &str) -> Result<Vec<Withdrawal>> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT withdrawal_id, user_id, order_number, sum, processed_at
            FROM withdrawals
            WHERE user_id = $1
            ORDER BY processed_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(withdrawals)
    }

    // ==================== 写入操作 ====================

    /// 扣款并写入提现记录
    ///
    /// 先锁定余额行再判断是否足额，余额不足时回滚，不留下任何修改。
    pub async fn debit_balance(
        &self,
        user_id: &str,
        order_number: &str,
        amount: Decimal,
    ) -> Result<Withdrawal> {
        let mut tx = self.pool.begin().await?;

        Self::get_or_create_in_tx(&mut tx, user_id).await?;
        let locked = Self::get_balance_for_update(&mut tx, user_id).await?;

        if locked.current < amount {
            tx.rollback().await?;
            return Err(AccrualError::InsufficientFunds {
                requested: amount,
                available: locked.current,
            });
        }

        let updated = sqlx::query_as::<_, Balance>(
            r#"
            UPDATE balances
            SET current = current - $2, withdrawn = withdrawn + $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING balance_id, user_id, current, withdrawn, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

        // 不变量：current >= 0
        if updated.current < Decimal::ZERO {
            tx.rollback().await?;
            return Err(AccrualError::InsufficientFunds {
                requested: amount,
                available: updated.current + amount,
            });
        }

        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
            INSERT INTO withdrawals (withdrawal_id, user_id, order_number, sum, processed_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING withdrawal_id, user_id, order_number, sum, processed_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(order_number)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            user_id = %user_id,
            order_number = %order_number,
            sum = %amount,
            current = %updated.current,
            "扣款完成"
        );

        Ok(withdrawal)
    }

    // ==================== 事务操作 ====================

    /// 在事务中确保余额行存在并返回
    ///
    /// ON CONFLICT DO NOTHING 保证并发首次访问时只会有一行
    pub async fn get_or_create_in_tx(tx: &mut PgConnection, user_id: &str) -> Result<Balance> {
        sqlx::query(
            r#"
            INSERT INTO balances (balance_id, user_id, current, withdrawn, created_at, updated_at)
            VALUES ($1, $2, 0, 0, NOW(), NOW())
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let balance = sqlx::query_as::<_, Balance>(
            r#"
            SELECT balance_id, user_id, current, withdrawn, created_at, updated_at
            FROM balances
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        Ok(balance)
    }

    /// 在事务中获取余额（带行级锁）
    pub async fn get_balance_for_update(tx: &mut PgConnection, user_id: &str) -> Result<Balance> {
        let balance = sqlx::query_as::<_, Balance>(
            r#"
            SELECT balance_id, user_id, current, withdrawn, created_at, updated_at
            FROM balances
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_one(tx)
        .await?;

        Ok(balance)
    }

    /// 在事务中增加可用余额
    pub async fn credit_in_tx(tx: &mut PgConnection, user_id: &str, amount: Decimal) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE balances
            SET current = current + $2, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .execute(tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl BalanceRepositoryTrait for BalanceRepository {
    async fn get_or_create_balance(&self, user_id: &str) -> Result<Balance> {
        self.get_or_create_balance(user_id).await
    }

    async fn debit_balance(
        &self,
        user_id: &str,
        order_number: &str,
        amount: Decimal,
    ) -> Result<Withdrawal> {
        self.debit_balance(user_id, order_number, amount).await
    }

    async fn list_user_withdrawals(&self, user_id: &str) -> Result<Vec<Withdrawal>> {
        self.list_user_withdrawals(user_id).await
    }
}
