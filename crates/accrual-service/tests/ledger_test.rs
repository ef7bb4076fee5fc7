//! 余额与提现测试：内存账本上的并发入账 / 扣款

mod common;

use std::sync::Arc;

use accrual_service::error::AccrualError;
use accrual_service::models::AccrueRecord;
use accrual_service::repository::{MemoryLedger, OrderRepositoryTrait};
use accrual_service::service::BalanceService;
use common::{luhn_number, user_id};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_test::assert_ok;

async fn credit(ledger: &MemoryLedger, user: &str, number: &str, amount: Decimal) {
    ledger.create_order(user, number).await.unwrap();
    let record = AccrueRecord {
        user_id: user.to_string(),
        number: number.to_string(),
        amount,
    };
    assert!(ledger.accrue_order(&record).await.unwrap());
}

#[tokio::test]
async fn test_new_user_has_zero_balance() {
    let service = BalanceService::new(Arc::new(MemoryLedger::new()));
    let balance = service.get_balance(&user_id()).await.unwrap();
    assert_eq!(balance.current, Decimal::ZERO);
    assert_eq!(balance.withdrawn, Decimal::ZERO);
}

#[tokio::test]
async fn test_withdraw_and_history() {
    let ledger = Arc::new(MemoryLedger::new());
    let service = BalanceService::new(ledger.clone());
    let user = user_id();
    credit(&ledger, &user, "4311889127", dec!(500)).await;

    let first = assert_ok!(service.withdraw(&user, "2377225624", dec!(200)).await);
    assert_eq!(first.sum, dec!(200));
    assert_ok!(service.withdraw(&user, "79927398713", dec!(50.5)).await);

    let balance = service.get_balance(&user).await.unwrap();
    assert_eq!(balance.current, dec!(249.5));
    assert_eq!(balance.withdrawn, dec!(250.5));
    assert_eq!(balance.total_accrued(), dec!(500));

    let history = service.user_withdrawals(&user).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].order_number, "2377225624");
    assert_eq!(history[1].order_number, "79927398713");
    assert!(history[0].processed_at <= history[1].processed_at);
}

#[tokio::test]
async fn test_over_withdrawal_rejected_without_side_effects() {
    let ledger = Arc::new(MemoryLedger::new());
    let service = BalanceService::new(ledger.clone());
    let user = user_id();
    credit(&ledger, &user, "4311889127", dec!(100)).await;

    let err = service
        .withdraw(&user, "2377225624", dec!(100.01))
        .await
        .unwrap_err();
    match err {
        AccrualError::InsufficientFunds {
            requested,
            available,
        } => {
            assert_eq!(requested, dec!(100.01));
            assert_eq!(available, dec!(100));
        }
        other => panic!("unexpected error: {other}"),
    }

    let balance = service.get_balance(&user).await.unwrap();
    assert_eq!(balance.current, dec!(100));
    assert_eq!(balance.withdrawn, Decimal::ZERO);
    assert!(service.user_withdrawals(&user).await.unwrap().is_empty());

    // 恰好等于余额的提现可以成功
    assert_ok!(service.withdraw(&user, "2377225624", dec!(100)).await);
    assert_eq!(service.get_balance(&user).await.unwrap().current, Decimal::ZERO);
}

#[tokio::test]
async fn test_withdrawals_are_isolated_per_user() {
    let ledger = Arc::new(MemoryLedger::new());
    let service = BalanceService::new(ledger.clone());
    let (alice, bob) = (user_id(), user_id());
    credit(&ledger, &alice, "4311889127", dec!(10)).await;

    assert!(matches!(
        service.withdraw(&bob, "2377225624", dec!(1)).await,
        Err(AccrualError::InsufficientFunds { .. })
    ));
    service.withdraw(&alice, "2377225624", dec!(1)).await.unwrap();
    assert!(service.user_withdrawals(&bob).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_credits_and_debits_keep_invariants() {
    let ledger = Arc::new(MemoryLedger::new());
    let service = Arc::new(BalanceService::new(ledger.clone()));
    let user = user_id();

    // 初始余额 100，之后并发执行 50 次 +1 入账与 200 次 -1 提现
    credit(&ledger, &user, &luhn_number(9_000_000_000), dec!(100)).await;
    for i in 1..=50u64 {
        ledger
            .create_order(&user, &luhn_number(9_000_000_000 + i))
            .await
            .unwrap();
    }

    let mut tasks = Vec::new();
    for i in 1..=50u64 {
        let ledger = ledger.clone();
        let user = user.clone();
        tasks.push(tokio::spawn(async move {
            let record = AccrueRecord {
                user_id: user,
                number: luhn_number(9_000_000_000 + i),
                amount: dec!(1),
            };
            ledger.accrue_order(&record).await.map(|_| ())
        }));
    }
    for _ in 0..200 {
        let service = service.clone();
        let user = user.clone();
        tasks.push(tokio::spawn(async move {
            match service.withdraw(&user, "2377225624", dec!(1)).await {
                Ok(_) | Err(AccrualError::InsufficientFunds { .. }) => Ok(()),
                Err(e) => Err(e),
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let balance = service.get_balance(&user).await.unwrap();
    let withdrawals = service.user_withdrawals(&user).await.unwrap();
    let withdrawn: Decimal = withdrawals.iter().map(|w| w.sum).sum();

    assert!(balance.current >= Decimal::ZERO);
    assert_eq!(balance.withdrawn, withdrawn);
    assert_eq!(balance.total_accrued(), dec!(150));
    assert_eq!(Decimal::from(withdrawals.len()), balance.withdrawn);
}
