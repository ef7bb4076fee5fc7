//! 积分服务领域模型

pub mod balance;
pub mod enums;
pub mod order;

pub use balance::{Balance, Withdrawal};
pub use enums::OrderStatus;
pub use order::{AccrueRecord, MONEY_SCALE, Order, PendingCursor};
