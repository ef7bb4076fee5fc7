//! 积分服务枚举类型定义
//!
//! 枚举同时支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 订单状态
///
/// 状态只会向前推进：NEW → PROCESSING → PROCESSED / INVALID，
/// PROCESSED 与 INVALID 为终态。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// 已登记，尚未从 oracle 得到结论
    #[default]
    New,
    /// oracle 正在计算
    Processing,
    /// oracle 拒绝计算积分
    Invalid,
    /// 积分已入账
    Processed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Processing => "PROCESSING",
            Self::Invalid => "INVALID",
            Self::Processed => "PROCESSED",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid | Self::Processed)
    }

    /// 是否允许从当前状态迁移到 next
    ///
    /// 同状态迁移视为幂等操作（PROCESSING → PROCESSING 合法），终态不可离开。
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            (Self::New, _) => true,
            (Self::Processing, Self::New) => false,
            (Self::Processing, _) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
