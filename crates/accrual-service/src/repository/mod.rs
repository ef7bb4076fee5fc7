//! 数据仓储层
//!
//! - `OrderRepository` / `BalanceRepository`：基于 PostgreSQL，入账与扣款使用行级锁
//! - `MemoryLedger`：进程内实现，同时实现两个仓储接口，用于测试与本地调试

mod balance_repo;
mod memory;
mod order_repo;
mod traits;

pub use balance_repo::BalanceRepository;
pub use memory::MemoryLedger;
pub use order_repo::OrderRepository;
pub use traits::*;
