//! 余额与提现实体定义

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 用户积分余额
///
/// 不变量：current >= 0，withdrawn 只增不减。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    #[sqlx(rename = "balance_id")]
    pub id: Uuid,
    pub user_id: String,
    /// 当前可用积分
    pub current: Decimal,
    /// 累计已提现积分
    pub withdrawn: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// 新用户的零余额
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            current: Decimal::ZERO,
            withdrawn: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// 累计入账总额，等于 current + withdrawn
    pub fn total_accrued(&self) -> Decimal {
        self.current + self.withdrawn
    }
}

/// 提现记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    #[sqlx(rename = "withdrawal_id")]
    pub id: Uuid,
    pub user_id: String,
    /// 提现关联的订单号
    pub order_number: String,
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn new(user_id: impl Into<String>, order_number: impl Into<String>, sum: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            order_number: order_number.into(),
            sum,
            processed_at: Utc::now(),
        }
    }
}
