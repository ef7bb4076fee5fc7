//! 余额服务
//!
//! 余额首次访问时创建。提现在仓储层的单个事务内完成扣款与记录写入。

use std::sync::Arc;

use loyalty_shared::observability::metrics::record_withdrawal;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::error::{AccrualError, Result};
use crate::models::{Balance, MONEY_SCALE, Withdrawal};
use crate::repository::BalanceRepositoryTrait;
use crate::validation::is_valid_order_number;

pub struct BalanceService<BR>
where
    BR: BalanceRepositoryTrait,
{
    balance_repo: Arc<BR>,
}

impl<BR> BalanceService<BR>
where
    BR: BalanceRepositoryTrait,
{
    pub fn new(balance_repo: Arc<BR>) -> Self {
        Self { balance_repo }
    }

    pub async fn get_balance(&self, user_id: &str) -> Result<Balance> {
        self.balance_repo.get_or_create_balance(user_id).await
    }

    /// 提现
    #[instrument(skip(self))]
    pub async fn withdraw(
        &self,
        user_id: &str,
        order_number: &str,
        amount: Decimal,
    ) -> Result<Withdrawal> {
        if !is_valid_order_number(order_number) {
            record_withdrawal("invalid_order");
            return Err(AccrualError::InvalidOrderNumber(order_number.to_string()));
        }
        // 账本只保存两位小数，更高精度的金额会被静默截断
        if amount <= Decimal::ZERO || amount.normalize().scale() > MONEY_SCALE {
            record_withdrawal("invalid_amount");
            return Err(AccrualError::InvalidAmount(amount));
        }

        match self
            .balance_repo
            .debit_balance(user_id, order_number, amount)
            .await
        {
            Ok(withdrawal) => {
                record_withdrawal("success");
                info!(user_id = %user_id, order_number = %order_number, sum = %amount, "提现成功");
                Ok(withdrawal)
            }
            Err(e @ AccrualError::InsufficientFunds { .. }) => {
                record_withdrawal("insufficient_funds");
                info!(user_id = %user_id, sum = %amount, "余额不足，提现被拒绝");
                Err(e)
            }
            Err(e) => {
                record_withdrawal("error");
                Err(e)
            }
        }
    }

    /// 提现记录，按处理时间升序
    pub async fn user_withdrawals(&self, user_id: &str) -> Result<Vec<Withdrawal>> {
        self.balance_repo.list_user_withdrawals(user_id).await
    }
}
