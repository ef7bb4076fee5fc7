//! 外部积分计算系统（accrual oracle）HTTP 客户端
//!
//! 通过 `AccrualOracle` trait 抽象查询接口，流水线只依赖该 trait，测试时可注入脚本化实现。
//! 查询地址为 `GET {base}/api/orders/{number}`。

use std::time::Instant;

use async_trait::async_trait;
use loyalty_shared::config::AccrualConfig;
use loyalty_shared::error::LoyaltyError;
use loyalty_shared::observability::metrics::record_oracle_call;
use loyalty_shared::retry::{RetryPolicy, retry_with_policy};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

const SERVICE_NAME: &str = "accrual";

/// oracle 返回的订单状态
///
/// 未识别的状态值统一解析为 `Unknown`，按非终态处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
    #[serde(other)]
    Unknown,
}

/// oracle 对单个订单的计算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleOrder {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(default)]
    pub accrual: Option<Decimal>,
}

impl OracleOrder {
    /// oracle 尚未登记该订单（HTTP 204）
    pub fn unregistered(number: &str) -> Self {
        Self {
            order: number.to_string(),
            status: AccrualStatus::Unknown,
            accrual: None,
        }
    }
}

/// 积分 oracle 查询接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccrualOracle: Send + Sync {
    async fn get_order(&self, number: &str) -> Result<OracleOrder>;
}

/// 基于 reqwest 的 oracle 客户端
///
/// 网络错误、超时、429 与 5xx 按配置的退避策略重试，其余非 2xx 直接失败。
pub struct AccrualHttpClient {
    client: reqwest::Client,
    base_url: String,
    retry_policy: RetryPolicy,
}

impl AccrualHttpClient {
    pub fn new(config: &AccrualConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| LoyaltyError::Internal(format!("创建 HTTP 客户端失败: {e}")))?;

        let base_url = normalize_base_url(&config.base_url);
        info!(
            base_url = %base_url,
            retry_count = config.retry_count,
            "accrual oracle 客户端已初始化"
        );

        Ok(Self {
            client,
            base_url,
            retry_policy: config.retry_policy(),
        })
    }

    /// 覆盖重试策略
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn order_url(&self, number: &str) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }

    /// 单次查询，不含重试
    async fn fetch_once(&self, number: &str) -> std::result::Result<OracleOrder, LoyaltyError> {
        let response = self
            .client
            .get(self.order_url(number))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(OracleOrder::unregistered(number));
        }
        if !status.is_success() {
            return Err(LoyaltyError::ExternalServiceStatus {
                service: SERVICE_NAME.to_string(),
                status: status.as_u16(),
            });
        }

        // 响应体格式错误重试也无济于事，归为不可重试的内部错误
        response
            .json::<OracleOrder>()
            .await
            .map_err(|e| LoyaltyError::Internal(format!("accrual 响应解析失败: {e}")))
    }
}

#[async_trait]
impl AccrualOracle for AccrualHttpClient {
    async fn get_order(&self, number: &str) -> Result<OracleOrder> {
        let start = Instant::now();

        let result = retry_with_policy(
            &self.retry_policy,
            "accrual.get_order",
            LoyaltyError::is_retryable,
            || self.fetch_once(number),
        )
        .await;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        record_oracle_call(outcome, start.elapsed().as_secs_f64());

        let order = result?;
        debug!(number = %number, status = ?order.status, accrual = ?order.accrual, "oracle 查询完成");
        Ok(order)
    }
}

/// 补全协议前缀并去掉末尾斜杠
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn transport_error(err: reqwest::Error) -> LoyaltyError {
    if err.is_timeout() {
        LoyaltyError::ExternalServiceTimeout {
            service: SERVICE_NAME.to_string(),
        }
    } else {
        LoyaltyError::ExternalService {
            service: SERVICE_NAME.to_string(),
            message: err.to_string(),
        }
    }
}
