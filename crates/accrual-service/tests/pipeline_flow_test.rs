//! 流水线端到端测试：内存账本 + 脚本化 oracle

mod common;

use std::sync::Arc;
use std::time::Duration;

use accrual_service::accrual_client::AccrualStatus;
use accrual_service::models::OrderStatus;
use accrual_service::pipeline::{AccrualPipeline, PendingOrderSweeper};
use accrual_service::repository::{BalanceRepositoryTrait, MemoryLedger, OrderRepositoryTrait};
use accrual_service::service::OrderService;
use common::{Reply, ScriptedOracle, user_id, wait_until};
use loyalty_shared::config::PipelineConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Harness {
    ledger: Arc<MemoryLedger>,
    oracle: Arc<ScriptedOracle>,
    pipeline: Arc<AccrualPipeline>,
    orders: OrderService<MemoryLedger, AccrualPipeline>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Harness {
    fn start() -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        let oracle = Arc::new(ScriptedOracle::new());
        let config = PipelineConfig {
            queue_capacity: 4,
            preprocessing_workers: 3,
            processing_workers: 2,
            ..Default::default()
        };
        let pipeline = Arc::new(AccrualPipeline::new(ledger.clone(), oracle.clone(), &config));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handles = pipeline.start(shutdown_rx);
        let orders = OrderService::new(ledger.clone(), pipeline.clone());

        Self {
            ledger,
            oracle,
            pipeline,
            orders,
            shutdown,
            handles,
        }
    }

    fn sweeper(&self) -> PendingOrderSweeper {
        PendingOrderSweeper::new(
            self.ledger.clone(),
            self.pipeline.clone(),
            Duration::from_secs(3600),
            100,
        )
    }

    async fn status_of(&self, number: &str) -> OrderStatus {
        self.ledger
            .get_order_by_number(number)
            .await
            .unwrap()
            .map(|o| o.status)
            .unwrap_or_default()
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        let joined = tokio::time::timeout(
            Duration::from_secs(2),
            futures::future::join_all(self.handles),
        )
        .await
        .expect("workers should stop after shutdown");
        assert!(joined.iter().all(|r| r.is_ok()));
    }
}

#[tokio::test]
async fn test_processed_order_is_credited() {
    let h = Harness::start();
    let user = user_id();
    h.oracle.script(
        "4311889127",
        [Reply::Status(AccrualStatus::Processed, Some(dec!(500)))],
    );

    h.orders.create_order(&user, "4311889127").await.unwrap();

    wait_until("order processed", || async {
        h.status_of("4311889127").await == OrderStatus::Processed
    })
    .await;

    let order = h.orders.get_user_order(&user, "4311889127").await.unwrap();
    assert_eq!(order.accrual, dec!(500));
    let balance = h.ledger.get_or_create_balance(&user).await.unwrap();
    assert_eq!(balance.current, dec!(500));
    assert_eq!(balance.withdrawn, Decimal::ZERO);

    h.stop().await;
}

#[tokio::test]
async fn test_invalid_order_is_terminal_without_credit() {
    let h = Harness::start();
    let user = user_id();
    h.oracle
        .script("79927398713", [Reply::Status(AccrualStatus::Invalid, None)]);

    h.orders.create_order(&user, "79927398713").await.unwrap();
    wait_until("order invalid", || async {
        h.status_of("79927398713").await == OrderStatus::Invalid
    })
    .await;

    // 再次轮询也不会离开终态
    h.oracle.script(
        "79927398713",
        [Reply::Status(AccrualStatus::Processed, Some(dec!(100)))],
    );
    assert_eq!(h.sweeper().sweep_once().await.unwrap(), 0);

    let balance = h.ledger.get_or_create_balance(&user).await.unwrap();
    assert_eq!(balance.current, Decimal::ZERO);
    h.stop().await;
}

#[tokio::test]
async fn test_order_progresses_through_repolls() {
    let h = Harness::start();
    let user = user_id();
    h.oracle
        .script("12345678903", [Reply::Status(AccrualStatus::Registered, None)]);

    h.orders.create_order(&user, "12345678903").await.unwrap();
    wait_until("first oracle call", || async { h.oracle.calls() >= 1 }).await;
    assert_eq!(h.status_of("12345678903").await, OrderStatus::New);

    h.oracle
        .script("12345678903", [Reply::Status(AccrualStatus::Processing, None)]);
    assert_eq!(h.sweeper().sweep_once().await.unwrap(), 1);
    wait_until("order processing", || async {
        h.status_of("12345678903").await == OrderStatus::Processing
    })
    .await;

    h.oracle.script(
        "12345678903",
        [Reply::Status(AccrualStatus::Processed, Some(dec!(729.98)))],
    );
    assert_eq!(h.sweeper().sweep_once().await.unwrap(), 1);
    wait_until("order processed", || async {
        h.status_of("12345678903").await == OrderStatus::Processed
    })
    .await;

    let balance = h.ledger.get_or_create_balance(&user).await.unwrap();
    assert_eq!(balance.current, dec!(729.98));
    h.stop().await;
}

#[tokio::test]
async fn test_oracle_failure_leaves_order_for_next_sweep() {
    let h = Harness::start();
    let user = user_id();
    h.oracle.script(
        "4311889127",
        [
            Reply::Fail,
            Reply::Status(AccrualStatus::Processed, Some(dec!(42))),
        ],
    );

    h.orders.create_order(&user, "4311889127").await.unwrap();
    wait_until("failed oracle call", || async { h.oracle.calls() >= 1 }).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.status_of("4311889127").await, OrderStatus::New);

    assert_eq!(h.sweeper().sweep_once().await.unwrap(), 1);
    wait_until("order processed", || async {
        h.status_of("4311889127").await == OrderStatus::Processed
    })
    .await;

    let balance = h.ledger.get_or_create_balance(&user).await.unwrap();
    assert_eq!(balance.current, dec!(42));
    h.stop().await;
}

#[tokio::test]
async fn test_repeated_registration_credits_once() {
    let h = Harness::start();
    let user = user_id();
    h.oracle.script(
        "4311889127",
        [Reply::Status(AccrualStatus::Processed, Some(dec!(500)))],
    );

    let order = h.orders.create_order(&user, "4311889127").await.unwrap();
    // 模拟补偿轮询与首次登记重叠
    for _ in 0..5 {
        h.pipeline.register_order(order.clone()).await.unwrap();
    }

    wait_until("all registrations handled", || async {
        h.oracle.calls() >= 6 && h.pipeline.intake_len() == 0 && h.pipeline.processing_len() == 0
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let balance = h.ledger.get_or_create_balance(&user).await.unwrap();
    assert_eq!(balance.current, dec!(500));
    h.stop().await;
}

#[tokio::test]
async fn test_many_orders_across_users() {
    let h = Harness::start();
    let users: Vec<String> = (0..4).map(|_| user_id()).collect();
    let mut expected = vec![Decimal::ZERO; users.len()];

    for i in 0..40u64 {
        let number = common::luhn_number(5_000_000_000 + i);
        let amount = Decimal::from(i + 1);
        h.oracle.script(
            &number,
            [Reply::Status(AccrualStatus::Processed, Some(amount))],
        );
        let owner = (i % users.len() as u64) as usize;
        h.orders.create_order(&users[owner], &number).await.unwrap();
        expected[owner] += amount;
    }

    wait_until("all orders processed", || async {
        h.ledger.list_pending_orders(None, 100).await.unwrap().is_empty()
    })
    .await;

    for (user, total) in users.iter().zip(expected) {
        let balance = h.ledger.get_or_create_balance(user).await.unwrap();
        assert_eq!(balance.current, total, "balance mismatch for {user}");

        let orders = h.orders.user_orders(user).await.unwrap();
        assert_eq!(orders.len(), 10);
        assert!(orders.windows(2).all(|w| w[0].uploaded_at <= w[1].uploaded_at));
    }
    h.stop().await;
}

#[tokio::test]
async fn test_workers_stop_on_shutdown_with_idle_queues() {
    let h = Harness::start();
    h.stop().await;
}
