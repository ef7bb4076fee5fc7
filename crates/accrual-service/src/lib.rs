//! 积分入账服务
//!
//! 用户提交订单后，订单经由两级流水线向外部积分计算系统（accrual oracle）查询结果，
//! 计算完成的订单在单个事务内入账到用户余额；用户可以用余额提现。
//!
//! ## 模块结构
//!
//! - `pipeline`: 预处理 / 处理两级 worker 与未决订单补偿轮询
//! - `accrual_client`: oracle HTTP 客户端
//! - `repository`: PostgreSQL 与内存两种账本实现
//! - `service`: 订单提交、余额与提现

pub mod accrual_client;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod service;
pub mod validation;

/// 本服务的数据库迁移集
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
