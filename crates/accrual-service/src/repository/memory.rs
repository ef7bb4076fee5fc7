//! 进程内账本
//!
//! 同时实现订单与余额仓储接口。单把互斥锁覆盖全部状态，入账与扣款天然串行化，
//! 语义与 PostgreSQL 实现的行级锁一致。

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use super::traits::{BalanceRepositoryTrait, OrderRepositoryTrait};
use crate::error::{AccrualError, Result};
use crate::models::{AccrueRecord, Balance, Order, OrderStatus, PendingCursor, Withdrawal};

#[derive(Default)]
struct LedgerState {
    orders: Vec<Order>,
    balances: HashMap<String, Balance>,
    withdrawals: Vec<Withdrawal>,
}

impl LedgerState {
    fn order_mut(&mut self, number: &str) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.number == number)
    }

    fn balance_entry(&mut self, user_id: &str) -> &mut Balance {
        self.balances
            .entry(user_id.to_string())
            .or_insert_with(|| Balance::new(user_id))
    }
}

/// 内存账本
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订单总数
    pub fn order_count(&self) -> usize {
        self.state.lock().orders.len()
    }
}

#[async_trait]
impl OrderRepositoryTrait for MemoryLedger {
    async fn create_order(&self, user_id: &str, number: &str) -> Result<Order> {
        let mut state = self.state.lock();
        if state.orders.iter().any(|o| o.number == number) {
            return Err(AccrualError::DuplicateOrderNumber(number.to_string()));
        }

        let order = Order::new(user_id, number);
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn get_order_by_number(&self, number: &str) -> Result<Option<Order>> {
        let state = self.state.lock();
        Ok(state.orders.iter().find(|o| o.number == number).cloned())
    }

    async fn get_user_order(&self, user_id: &str, number: &str) -> Result<Option<Order>> {
        let state = self.state.lock();
        Ok(state
            .orders
            .iter()
            .find(|o| o.number == number && o.user_id == user_id)
            .cloned())
    }

    async fn list_user_orders(&self, user_id: &str) -> Result<Vec<Order>> {
        let state = self.state.lock();
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.uploaded_at);
        Ok(orders)
    }

    async fn list_pending_orders(
        &self,
        after: Option<PendingCursor>,
        limit: i64,
    ) -> Result<Vec<Order>> {
        let state = self.state.lock();
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| o.is_pending())
            .filter(|o| after.is_none_or(|cursor| o.cursor() > cursor))
            .cloned()
            .collect();
        orders.sort_by_key(Order::cursor);
        orders.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(orders)
    }

    async fn mark_order_status(&self, order_ids: &[Uuid], status: OrderStatus) -> Result<u64> {
        if !matches!(status, OrderStatus::Processing | OrderStatus::Invalid) {
            return Err(AccrualError::InvalidStatusTransition(status));
        }

        let mut state = self.state.lock();
        let mut updated = 0;
        for order in state
            .orders
            .iter_mut()
            .filter(|o| order_ids.contains(&o.id) && o.status.can_transition_to(status))
        {
            order.status = status;
            updated += 1;
        }
        Ok(updated)
    }

    async fn accrue_order(&self, record: &AccrueRecord) -> Result<bool> {
        let mut state = self.state.lock();

        let Some(order) = state
            .order_mut(&record.number)
            .filter(|o| {
                o.user_id == record.user_id && o.status.can_transition_to(OrderStatus::Processed)
            })
        else {
            return Ok(false);
        };
        order.status = OrderStatus::Processed;
        order.accrual = record.amount;

        let balance = state.balance_entry(&record.user_id);
        balance.current += record.amount;
        balance.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl BalanceRepositoryTrait for MemoryLedger {
    async fn get_or_create_balance(&self, user_id: &str) -> Result<Balance> {
        let mut state = self.state.lock();
        Ok(state.balance_entry(user_id).clone())
    }

    async fn debit_balance(
        &self,
        user_id: &str,
        order_number: &str,
        amount: Decimal,
    ) -> Result<Withdrawal> {
        let mut state = self.state.lock();

        let balance = state.balance_entry(user_id);
        if balance.current < amount {
            return Err(AccrualError::InsufficientFunds {
                requested: amount,
                available: balance.current,
            });
        }
        balance.current -= amount;
        balance.withdrawn += amount;
        balance.updated_at = Utc::now();

        let withdrawal = Withdrawal::new(user_id, order_number, amount);
        state.withdrawals.push(withdrawal.clone());
        Ok(withdrawal)
    }

    async fn list_user_withdrawals(&self, user_id: &str) -> Result<Vec<Withdrawal>> {
        let state = self.state.lock();
        let mut withdrawals: Vec<Withdrawal> = state
            .withdrawals
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        withdrawals.sort_by_key(|w| w.processed_at);
        Ok(withdrawals)
    }
}
