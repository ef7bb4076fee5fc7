//! 积分服务错误类型
//!
//! 定义订单登记、积分入账与提现流程中的业务错误和系统错误。

use loyalty_shared::error::LoyaltyError;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::OrderStatus;

/// 积分服务错误类型
#[derive(Debug, Error)]
pub enum AccrualError {
    // === 订单相关错误 ===
    #[error("订单已由当前用户提交: {0}")]
    OrderAlreadyAccepted(String),

    #[error("订单已被其他用户提交: {0}")]
    OrderAlreadyRegistered(String),

    #[error("订单不存在: {0}")]
    OrderNotFound(String),

    #[error("订单号格式错误: {0}")]
    InvalidOrderNumber(String),

    /// 存储层唯一约束冲突，由服务层重新查询后转换为具体的冲突类型
    #[error("订单号重复: {0}")]
    DuplicateOrderNumber(String),

    #[error("不允许手动设置的订单状态: {0:?}")]
    InvalidStatusTransition(OrderStatus),

    // === 余额相关错误 ===
    #[error("余额不足: 需要 {requested}, 可用 {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    #[error("提现金额必须大于 0 且最多两位小数: {0}")]
    InvalidAmount(Decimal),

    // === 流水线错误 ===
    #[error("积分流水线已关闭")]
    PipelineClosed,

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Shared(#[from] LoyaltyError),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 积分服务 Result 类型别名
pub type Result<T> = std::result::Result<T, AccrualError>;

impl AccrualError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(_) => true,
            Self::Shared(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::Shared(_) | Self::Internal(_) | Self::PipelineClosed
        )
    }

    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::OrderAlreadyAccepted(_) => "ORDER_ALREADY_ACCEPTED",
            Self::OrderAlreadyRegistered(_) => "ORDER_ALREADY_REGISTERED",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::InvalidOrderNumber(_) => "INVALID_ORDER_NUMBER",
            Self::DuplicateOrderNumber(_) => "DUPLICATE_ORDER_NUMBER",
            Self::InvalidStatusTransition(_) => "INVALID_STATUS_TRANSITION",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::PipelineClosed => "PIPELINE_CLOSED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Shared(e) => e.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// 判断 sqlx 错误是否为唯一约束冲突（PostgreSQL 23505）
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == "23505")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_display() {
        let err = AccrualError::OrderAlreadyAccepted("4311889127".to_string());
        assert_eq!(err.to_string(), "订单已由当前用户提交: 4311889127");

        let err = AccrualError::InsufficientFunds {
            requested: dec!(200),
            available: dec!(150.5),
        };
        assert_eq!(err.to_string(), "余额不足: 需要 200, 可用 150.5");

        let err = AccrualError::Shared(LoyaltyError::ExternalServiceTimeout {
            service: "accrual".to_string(),
        });
        assert_eq!(err.to_string(), "外部服务超时: accrual");
    }

    #[test]
    fn test_business_error_classification() {
        assert!(AccrualError::OrderAlreadyRegistered("1".to_string()).is_business_error());
        assert!(AccrualError::InvalidAmount(dec!(0)).is_business_error());
        assert!(!AccrualError::PipelineClosed.is_business_error());
        assert!(!AccrualError::Database(sqlx::Error::PoolTimedOut).is_business_error());
    }

    #[test]
    fn test_retryable_delegates_to_shared() {
        assert!(AccrualError::Database(sqlx::Error::PoolTimedOut).is_retryable());

        let transient = AccrualError::Shared(LoyaltyError::ExternalServiceStatus {
            service: "accrual".to_string(),
            status: 503,
        });
        assert!(transient.is_retryable());

        let permanent = AccrualError::Shared(LoyaltyError::ExternalServiceStatus {
            service: "accrual".to_string(),
            status: 404,
        });
        assert!(!permanent.is_retryable());
        assert_eq!(permanent.error_code(), "EXTERNAL_SERVICE_STATUS");
    }
}
