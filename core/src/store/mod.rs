// core/src/store/mod.rs

//! Transactional storage seam. Components are written against `Store` /
//! `StoreTx`; the application plugs in PostgreSQL, tests use `MemoryStore`.
//!
//! A `StoreTx` is one open transaction. Dropping it without `commit` rolls
//! back every write made through it.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
  Coupon, CouponUsage, Event, EventRegistration, Order, OrderItem, WithdrawalRequest, WithdrawalStatus,
};

/// Names of the uniqueness rules a backend must enforce. Reported back in
/// `StoreError::UniqueViolation`.
pub mod constraints {
  pub const COUPON_USAGE_ORDER: &str = "coupon_usages_order_id_key";
  pub const OPEN_REGISTRATION: &str = "event_registrations_open_user_event_idx";
  pub const OPEN_WITHDRAWAL: &str = "withdrawal_requests_open_register_idx";
}

#[derive(Debug, Error)]
pub enum StoreError {
  /// Serialization failure, deadlock or lock wait timeout. Retrying the whole
  /// transaction may succeed.
  #[error("transient storage failure: {0}")]
  Transient(String),

  #[error("unique constraint '{0}' violated")]
  UniqueViolation(String),

  #[error(transparent)]
  Backend(#[from] anyhow::Error),
}

impl StoreError {
  pub fn violates(&self, constraint: &str) -> bool {
    matches!(self, StoreError::UniqueViolation(name) if name == constraint)
  }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A handle to a transactional backend. Cheap to clone; every clone talks to
/// the same data.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
  type Tx: StoreTx + 'static;

  async fn begin(&self) -> StoreResult<Self::Tx>;
}

/// One open transaction.
///
/// Reads see the transaction's own writes. `lock_*` methods take a lock that
/// is held until commit or drop; plain `find_*` methods do not lock. Nothing
/// written is visible to other transactions before `commit`.
#[async_trait]
pub trait StoreTx: Send {
  // Reference data
  async fn find_event(&mut self, id: Uuid) -> StoreResult<Option<Event>>;

  // Orders
  async fn insert_order(&mut self, order: &Order) -> StoreResult<()>;
  async fn insert_order_item(&mut self, item: &OrderItem) -> StoreResult<()>;
  async fn find_order(&mut self, id: Uuid) -> StoreResult<Option<Order>>;
  /// Row-locks the order until the transaction ends.
  async fn lock_order(&mut self, id: Uuid) -> StoreResult<Option<Order>>;
  /// Items ordered by `line_no`.
  async fn order_items(&mut self, order_id: Uuid) -> StoreResult<Vec<OrderItem>>;
  async fn update_order(&mut self, order: &Order) -> StoreResult<()>;

  // Coupons
  async fn find_coupon(&mut self, id: Uuid) -> StoreResult<Option<Coupon>>;
  async fn find_coupon_by_code(&mut self, code: &str) -> StoreResult<Option<Coupon>>;
  /// Serializes quota checks for one (user, coupon) pair until the
  /// transaction ends.
  async fn lock_coupon_quota(&mut self, user_id: Uuid, coupon_id: Uuid) -> StoreResult<()>;
  async fn count_coupon_usages(&mut self, user_id: Uuid, coupon_id: Uuid) -> StoreResult<i64>;
  async fn find_coupon_usage_for_order(&mut self, order_id: Uuid) -> StoreResult<Option<CouponUsage>>;
  /// Fails with `UniqueViolation(COUPON_USAGE_ORDER)` when the order already
  /// has a usage row.
  async fn insert_coupon_usage(&mut self, usage: &CouponUsage) -> StoreResult<()>;

  // Registrations
  async fn find_registration(&mut self, id: Uuid) -> StoreResult<Option<EventRegistration>>;
  async fn lock_registration(&mut self, id: Uuid) -> StoreResult<Option<EventRegistration>>;
  async fn find_open_registration(&mut self, user_id: Uuid, event_id: Uuid)
    -> StoreResult<Option<EventRegistration>>;
  async fn registrations_for_order(&mut self, order_id: Uuid) -> StoreResult<Vec<EventRegistration>>;
  /// Fails with `UniqueViolation(OPEN_REGISTRATION)` when the user already
  /// holds a non-cancelled registration for the event.
  async fn insert_registration(&mut self, registration: &EventRegistration) -> StoreResult<()>;
  async fn update_registration(&mut self, registration: &EventRegistration) -> StoreResult<()>;

  // Withdrawals
  async fn find_withdrawal(&mut self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>>;
  async fn lock_withdrawal(&mut self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>>;
  async fn open_withdrawal_for_registration(&mut self, register_id: Uuid)
    -> StoreResult<Option<WithdrawalRequest>>;
  /// Newest first.
  async fn list_withdrawals(&mut self, status: Option<WithdrawalStatus>) -> StoreResult<Vec<WithdrawalRequest>>;
  /// Fails with `UniqueViolation(OPEN_WITHDRAWAL)` when the registration
  /// already has a pending or approved request.
  async fn insert_withdrawal(&mut self, request: &WithdrawalRequest) -> StoreResult<()>;
  async fn update_withdrawal(&mut self, request: &WithdrawalRequest) -> StoreResult<()>;

  /// Makes every write of this transaction visible. A `Transient` error
  /// means nothing was committed and the whole unit of work may be retried.
  async fn commit(self) -> StoreResult<()>;
}
