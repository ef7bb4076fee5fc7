//! 服务层
//!
//! - `order_service`: 订单提交与查询，提交成功后登记到积分流水线
//! - `balance_service`: 余额查询、提现与提现记录

pub mod balance_service;
pub mod order_service;

pub use balance_service::BalanceService;
pub use order_service::OrderService;
