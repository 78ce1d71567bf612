// core/src/store/memory.rs

//! In-process store used by tests, benchmarks and the demo server mode.
//!
//! Transactions are serialized behind one async writer gate. `begin` clones
//! the committed tables into a private snapshot; `commit` swaps the snapshot
//! back in. Dropping a transaction discards its snapshot, which gives the
//! same all-or-nothing behaviour as a database rollback.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{constraints, Store, StoreError, StoreResult, StoreTx};
use crate::models::{
  Coupon, CouponUsage, Event, EventRegistration, Order, OrderItem, WithdrawalRequest, WithdrawalStatus,
};

#[derive(Debug, Clone, Default)]
struct Tables {
  events: HashMap<Uuid, Event>,
  orders: HashMap<Uuid, Order>,
  order_items: Vec<OrderItem>,
  coupons: HashMap<Uuid, Coupon>,
  coupon_usages: Vec<CouponUsage>,
  registrations: Vec<EventRegistration>,
  withdrawals: Vec<WithdrawalRequest>,
}

#[derive(Default)]
struct MemoryInner {
  committed: RwLock<Tables>,
  writer_gate: Arc<tokio::sync::Mutex<()>>,
  op_delay: Mutex<Option<Duration>>,
  transient_failures: AtomicUsize,
}

/// In-memory `Store`. Enforces the same uniqueness rules as the PostgreSQL
/// schema and exposes seeding, inspection and failure-injection helpers.
#[derive(Clone, Default)]
pub struct MemoryStore {
  inner: Arc<MemoryInner>,
}

impl std::fmt::Debug for MemoryStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let tables = self.inner.committed.read();
    f.debug_struct("MemoryStore")
      .field("events", &tables.events.len())
      .field("orders", &tables.orders.len())
      .field("coupons", &tables.coupons.len())
      .field("registrations", &tables.registrations.len())
      .finish()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  // Seeding and inspection. These touch committed state directly and must
  // not be called while a transaction is open.

  pub fn insert_event(&self, event: Event) {
    self.inner.committed.write().events.insert(event.id, event);
  }

  /// Simulates an event deleted from the catalogue after orders were placed.
  pub fn remove_event(&self, event_id: Uuid) -> Option<Event> {
    self.inner.committed.write().events.remove(&event_id)
  }

  pub fn insert_coupon(&self, coupon: Coupon) {
    self.inner.committed.write().coupons.insert(coupon.id, coupon);
  }

  pub fn order(&self, order_id: Uuid) -> Option<Order> {
    self.inner.committed.read().orders.get(&order_id).cloned()
  }

  pub fn orders(&self) -> Vec<Order> {
    self.inner.committed.read().orders.values().cloned().collect()
  }

  /// Items of one order, in insertion order.
  pub fn order_items(&self, order_id: Uuid) -> Vec<OrderItem> {
    let tables = self.inner.committed.read();
    items_of(&tables, order_id)
  }

  pub fn coupon_usages(&self) -> Vec<CouponUsage> {
    self.inner.committed.read().coupon_usages.clone()
  }

  /// Every registration ever written, cancelled ones included.
  pub fn registrations(&self) -> Vec<EventRegistration> {
    self.inner.committed.read().registrations.clone()
  }

  pub fn registration(&self, registration_id: Uuid) -> Option<EventRegistration> {
    let tables = self.inner.committed.read();
    tables.registrations.iter().find(|r| r.id == registration_id).cloned()
  }

  pub fn withdrawal(&self, request_id: Uuid) -> Option<WithdrawalRequest> {
    let tables = self.inner.committed.read();
    tables.withdrawals.iter().find(|w| w.id == request_id).cloned()
  }

  /// Every subsequent storage call sleeps for `delay` first. Used to push a
  /// transaction past its timeout.
  pub fn set_op_delay(&self, delay: Option<Duration>) {
    *self.inner.op_delay.lock() = delay;
  }

  /// The next `count` commits fail with `StoreError::Transient`.
  pub fn fail_next_commits(&self, count: usize) {
    self.inner.transient_failures.store(count, Ordering::SeqCst);
  }
}

#[async_trait]
impl Store for MemoryStore {
  type Tx = MemoryTx;

  async fn begin(&self) -> StoreResult<MemoryTx> {
    let guard = self.inner.writer_gate.clone().lock_owned().await;
    let tables = self.inner.committed.read().clone();
    Ok(MemoryTx {
      inner: self.inner.clone(),
      tables,
      _guard: guard,
    })
  }
}

pub struct MemoryTx {
  inner: Arc<MemoryInner>,
  tables: Tables,
  _guard: OwnedMutexGuard<()>,
}

impl MemoryTx {
  async fn pause(&self) {
    let delay = *self.inner.op_delay.lock();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
  }
}

fn items_of(tables: &Tables, order_id: Uuid) -> Vec<OrderItem> {
  let mut items: Vec<OrderItem> = tables.order_items.iter().filter(|i| i.order_id == order_id).cloned().collect();
  items.sort_by_key(|i| i.line_no);
  items
}

#[async_trait]
impl StoreTx for MemoryTx {
  async fn find_event(&mut self, id: Uuid) -> StoreResult<Option<Event>> {
    self.pause().await;
    Ok(self.tables.events.get(&id).cloned())
  }

  async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
    self.pause().await;
    self.tables.orders.insert(order.id, order.clone());
    Ok(())
  }

  async fn insert_order_item(&mut self, item: &OrderItem) -> StoreResult<()> {
    self.pause().await;
    self.tables.order_items.push(item.clone());
    Ok(())
  }

  async fn find_order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
    self.pause().await;
    Ok(self.tables.orders.get(&id).cloned())
  }

  async fn lock_order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
    // The writer gate already excludes every other transaction.
    self.find_order(id).await
  }

  async fn order_items(&mut self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
    self.pause().await;
    Ok(items_of(&self.tables, order_id))
  }

  async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
    self.pause().await;
    match self.tables.orders.get_mut(&order.id) {
      Some(existing) => {
        *existing = order.clone();
        Ok(())
      }
      None => Err(StoreError::Backend(anyhow::anyhow!("order {} does not exist", order.id))),
    }
  }

  async fn find_coupon(&mut self, id: Uuid) -> StoreResult<Option<Coupon>> {
    self.pause().await;
    Ok(self.tables.coupons.get(&id).cloned())
  }

  async fn find_coupon_by_code(&mut self, code: &str) -> StoreResult<Option<Coupon>> {
    self.pause().await;
    Ok(self.tables.coupons.values().find(|c| c.code == code).cloned())
  }

  async fn lock_coupon_quota(&mut self, _user_id: Uuid, _coupon_id: Uuid) -> StoreResult<()> {
    self.pause().await;
    Ok(())
  }

  async fn count_coupon_usages(&mut self, user_id: Uuid, coupon_id: Uuid) -> StoreResult<i64> {
    self.pause().await;
    let count = self
      .tables
      .coupon_usages
      .iter()
      .filter(|u| u.user_id == user_id && u.coupon_id == coupon_id)
      .count();
    Ok(count as i64)
  }

  async fn find_coupon_usage_for_order(&mut self, order_id: Uuid) -> StoreResult<Option<CouponUsage>> {
    self.pause().await;
    Ok(self.tables.coupon_usages.iter().find(|u| u.order_id == order_id).cloned())
  }

  async fn insert_coupon_usage(&mut self, usage: &CouponUsage) -> StoreResult<()> {
    self.pause().await;
    if self.tables.coupon_usages.iter().any(|u| u.order_id == usage.order_id) {
      return Err(StoreError::UniqueViolation(constraints::COUPON_USAGE_ORDER.to_string()));
    }
    self.tables.coupon_usages.push(usage.clone());
    Ok(())
  }

  async fn find_registration(&mut self, id: Uuid) -> StoreResult<Option<EventRegistration>> {
    self.pause().await;
    Ok(self.tables.registrations.iter().find(|r| r.id == id).cloned())
  }

  async fn lock_registration(&mut self, id: Uuid) -> StoreResult<Option<EventRegistration>> {
    self.find_registration(id).await
  }

  async fn find_open_registration(
    &mut self,
    user_id: Uuid,
    event_id: Uuid,
  ) -> StoreResult<Option<EventRegistration>> {
    self.pause().await;
    Ok(
      self
        .tables
        .registrations
        .iter()
        .find(|r| r.user_id == user_id && r.event_id == event_id && r.is_open())
        .cloned(),
    )
  }

  async fn registrations_for_order(&mut self, order_id: Uuid) -> StoreResult<Vec<EventRegistration>> {
    self.pause().await;
    Ok(
      self
        .tables
        .registrations
        .iter()
        .filter(|r| r.order_id == Some(order_id))
        .cloned()
        .collect(),
    )
  }

  async fn insert_registration(&mut self, registration: &EventRegistration) -> StoreResult<()> {
    self.pause().await;
    let clash = registration.is_open()
      && self
        .tables
        .registrations
        .iter()
        .any(|r| r.user_id == registration.user_id && r.event_id == registration.event_id && r.is_open());
    if clash {
      return Err(StoreError::UniqueViolation(constraints::OPEN_REGISTRATION.to_string()));
    }
    self.tables.registrations.push(registration.clone());
    Ok(())
  }

  async fn update_registration(&mut self, registration: &EventRegistration) -> StoreResult<()> {
    self.pause().await;
    match self.tables.registrations.iter_mut().find(|r| r.id == registration.id) {
      Some(existing) => {
        *existing = registration.clone();
        Ok(())
      }
      None => Err(StoreError::Backend(anyhow::anyhow!(
        "registration {} does not exist",
        registration.id
      ))),
    }
  }

  async fn find_withdrawal(&mut self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
    self.pause().await;
    Ok(self.tables.withdrawals.iter().find(|w| w.id == id).cloned())
  }

  async fn lock_withdrawal(&mut self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
    self.find_withdrawal(id).await
  }

  async fn open_withdrawal_for_registration(&mut self, register_id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
    self.pause().await;
    Ok(
      self
        .tables
        .withdrawals
        .iter()
        .find(|w| w.register_id == register_id && w.status.is_open())
        .cloned(),
    )
  }

  async fn list_withdrawals(&mut self, status: Option<WithdrawalStatus>) -> StoreResult<Vec<WithdrawalRequest>> {
    self.pause().await;
    let mut requests: Vec<WithdrawalRequest> = self
      .tables
      .withdrawals
      .iter()
      .filter(|w| status.map_or(true, |s| w.status == s))
      .cloned()
      .collect();
    requests.reverse();
    Ok(requests)
  }

  async fn insert_withdrawal(&mut self, request: &WithdrawalRequest) -> StoreResult<()> {
    self.pause().await;
    let clash = request.status.is_open()
      && self
        .tables
        .withdrawals
        .iter()
        .any(|w| w.register_id == request.register_id && w.status.is_open());
    if clash {
      return Err(StoreError::UniqueViolation(constraints::OPEN_WITHDRAWAL.to_string()));
    }
    self.tables.withdrawals.push(request.clone());
    Ok(())
  }

  async fn update_withdrawal(&mut self, request: &WithdrawalRequest) -> StoreResult<()> {
    self.pause().await;
    match self.tables.withdrawals.iter_mut().find(|w| w.id == request.id) {
      Some(existing) => {
        *existing = request.clone();
        Ok(())
      }
      None => Err(StoreError::Backend(anyhow::anyhow!("withdrawal {} does not exist", request.id))),
    }
  }

  async fn commit(self) -> StoreResult<()> {
    self.pause().await;
    let injected = self
      .inner
      .transient_failures
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if injected {
      warn!("MemoryStore: injected transient commit failure");
      return Err(StoreError::Transient("injected commit failure".to_string()));
    }
    let MemoryTx { inner, tables, _guard } = self;
    *inner.committed.write() = tables;
    debug!("MemoryStore: transaction committed");
    Ok(())
  }
}
