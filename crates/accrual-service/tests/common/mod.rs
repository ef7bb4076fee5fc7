#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use accrual_service::accrual_client::{AccrualOracle, AccrualStatus, OracleOrder};
use accrual_service::error::{AccrualError, Result};
use async_trait::async_trait;
use fake::Fake;
use fake::faker::internet::en::Username;
use loyalty_shared::error::LoyaltyError;
use parking_lot::Mutex;
use rust_decimal::Decimal;

/// oracle 的一次应答
#[derive(Debug, Clone)]
pub enum Reply {
    Status(AccrualStatus, Option<Decimal>),
    Fail,
}

/// 按订单号脚本化应答的 oracle，脚本的最后一步会一直重复
#[derive(Default)]
pub struct ScriptedOracle {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, number: &str, replies: impl IntoIterator<Item = Reply>) {
        self.scripts
            .lock()
            .insert(number.to_string(), replies.into_iter().collect());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccrualOracle for ScriptedOracle {
    async fn get_order(&self, number: &str) -> Result<OracleOrder> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let reply = {
            let mut scripts = self.scripts.lock();
            match scripts.get_mut(number) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Status(status, accrual)) => Ok(OracleOrder {
                order: number.to_string(),
                status,
                accrual,
            }),
            Some(Reply::Fail) => Err(AccrualError::Shared(LoyaltyError::ExternalServiceStatus {
                service: "accrual".to_string(),
                status: 503,
            })),
            None => Ok(OracleOrder::unregistered(number)),
        }
    }
}

/// 生成不重复的用户 ID
pub fn user_id() -> String {
    let name: String = Username().fake();
    format!("{}-{}", name, uuid::Uuid::new_v4().simple())
}

/// 在 prefix 后补上 Luhn 校验位
pub fn luhn_number(prefix: u64) -> String {
    let digits = prefix.to_string();
    let sum: u32 = digits
        .bytes()
        .rev()
        .map(|b| u32::from(b - b'0'))
        .enumerate()
        .map(|(i, digit)| {
            // 校验位追加后，原来的个位变为从右数第二位，需要翻倍
            if i % 2 == 0 {
                let doubled = digit * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                digit
            }
        })
        .sum();
    let check = (10 - sum % 10) % 10;
    format!("{digits}{check}")
}

/// 轮询直到条件成立，超时则 panic
pub async fn wait_until<F, Fut>(description: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {description}");
}

/// 跨测试运行不重复的合法订单号（数据库测试使用）
pub fn unique_order_number() -> String {
    static SEQ: AtomicUsize = AtomicUsize::new(0);
    let micros = chrono::Utc::now().timestamp_micros().unsigned_abs();
    let seq = SEQ.fetch_add(1, Ordering::SeqCst) as u64;
    luhn_number(micros * 1_000 + seq % 1_000)
}
