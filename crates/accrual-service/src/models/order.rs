//! 订单实体定义

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::OrderStatus;

/// 金额列为 NUMERIC(16,2)
pub const MONEY_SCALE: u32 = 2;

/// 用户提交的订单
///
/// 订单号全局唯一，accrual 在进入 PROCESSED 之前保持为 0。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[sqlx(rename = "order_id")]
    pub id: Uuid,
    pub user_id: String,
    /// 订单号（数字字符串，通过 Luhn 校验）
    pub number: String,
    pub status: OrderStatus,
    /// 已入账积分
    pub accrual: Decimal,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    /// 以 NEW 状态创建新订单
    pub fn new(user_id: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            number: number.into(),
            status: OrderStatus::New,
            accrual: Decimal::ZERO,
            uploaded_at: Utc::now(),
        }
    }

    /// 是否仍需向 oracle 轮询
    pub fn is_pending(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn cursor(&self) -> PendingCursor {
        PendingCursor {
            uploaded_at: self.uploaded_at,
            order_id: self.id,
        }
    }
}

/// 补偿轮询的扫描位置
///
/// 未决订单按 (uploaded_at, order_id) 排序，下一轮从该位置之后继续。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PendingCursor {
    pub uploaded_at: DateTime<Utc>,
    pub order_id: Uuid,
}

/// 入账指令
///
/// 预处理阶段在 oracle 返回 PROCESSED 后生成，由处理阶段消费。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrueRecord {
    pub user_id: String,
    pub number: String,
    pub amount: Decimal,
}

impl AccrueRecord {
    /// 金额按账本精度取整，舍入方式与 PostgreSQL NUMERIC 一致
    pub fn for_order(order: &Order, amount: Decimal) -> Self {
        Self {
            user_id: order.user_id.clone(),
            number: order.number.clone(),
            amount: amount
                .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero),
        }
    }
}
