// app/src/db/pg_store.rs

//! PostgreSQL implementation of the fulfillment store.
//!
//! Status enums are stored as lowercase TEXT. Uniqueness rules are enforced
//! by constraints and partial unique indexes; inserts use
//! `ON CONFLICT DO NOTHING` so a conflict does not abort the surrounding
//! transaction and can be reported as `StoreError::UniqueViolation`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fulfillment::models::{
  Coupon, CouponUsage, Event, EventRegistration, Order, OrderItem, ParseEnumError, WithdrawalRequest,
  WithdrawalStatus,
};
use fulfillment::store::{constraints, Store, StoreError, StoreResult, StoreTx};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{event, Level};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PgStore {
  pool: PgPool,
  lock_timeout: Duration,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self {
      pool,
      lock_timeout: Duration::from_secs(3),
    }
  }

  /// Lock waits longer than this fail with a transient error instead of
  /// running into the transaction timeout.
  pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
    self.lock_timeout = lock_timeout;
    self
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }
}

#[async_trait]
impl Store for PgStore {
  type Tx = PgTx;

  async fn begin(&self) -> StoreResult<PgTx> {
    let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
    // SET does not take bind parameters.
    let statement = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
    sqlx::query(&statement).execute(&mut *tx).await.map_err(map_sqlx_error)?;
    Ok(PgTx { tx })
  }
}

pub struct PgTx {
  tx: Transaction<'static, Postgres>,
}

/// Classifies driver errors: serialization failures, deadlocks, lock
/// timeouts and pool exhaustion are transient; 23505 is a unique violation.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
  let classified = match &err {
    sqlx::Error::Database(db) => match db.code().as_deref() {
      Some("40001") | Some("40P01") | Some("55P03") => Some(StoreError::Transient(db.message().to_string())),
      Some("23505") => Some(StoreError::UniqueViolation(
        db.constraint().unwrap_or("unknown").to_string(),
      )),
      _ => None,
    },
    sqlx::Error::PoolTimedOut => Some(StoreError::Transient("connection pool timed out".to_string())),
    _ => None,
  };
  classified.unwrap_or_else(|| StoreError::Backend(err.into()))
}

fn decode_error(err: ParseEnumError) -> StoreError {
  StoreError::Backend(anyhow::Error::new(err))
}

// --- Row types ---

#[derive(FromRow)]
struct EventRow {
  id: Uuid,
  title: String,
  price_cents: i64,
  created_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
  fn from(row: EventRow) -> Self {
    Event {
      id: row.id,
      title: row.title,
      price_cents: row.price_cents,
      created_at: row.created_at,
    }
  }
}

const ORDER_COLUMNS: &str =
  "id, user_id, order_no, status, price_cents, payment_method, discount_cents, coupon_id, created_at, updated_at";

#[derive(FromRow)]
struct OrderRow {
  id: Uuid,
  user_id: Uuid,
  order_no: String,
  status: String,
  price_cents: i64,
  payment_method: String,
  discount_cents: i64,
  coupon_id: Option<Uuid>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
  type Error = StoreError;

  fn try_from(row: OrderRow) -> StoreResult<Self> {
    Ok(Order {
      id: row.id,
      user_id: row.user_id,
      order_no: row.order_no,
      status: row.status.parse().map_err(decode_error)?,
      price_cents: row.price_cents,
      payment_method: row.payment_method,
      discount_cents: row.discount_cents,
      coupon_id: row.coupon_id,
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

#[derive(FromRow)]
struct OrderItemRow {
  id: Uuid,
  order_id: Uuid,
  event_id: Uuid,
  line_no: i32,
  price_cents: i64,
}

impl From<OrderItemRow> for OrderItem {
  fn from(row: OrderItemRow) -> Self {
    OrderItem {
      id: row.id,
      order_id: row.order_id,
      event_id: row.event_id,
      line_no: row.line_no,
      price_cents: row.price_cents,
    }
  }
}

const COUPON_COLUMNS: &str =
  "id, code, is_active, min_order_cents, discount_value, discount_type, usage_limit, expiry_date";

#[derive(FromRow)]
struct CouponRow {
  id: Uuid,
  code: String,
  is_active: bool,
  min_order_cents: i64,
  discount_value: i64,
  discount_type: String,
  usage_limit: i32,
  expiry_date: Option<DateTime<Utc>>,
}

impl TryFrom<CouponRow> for Coupon {
  type Error = StoreError;

  fn try_from(row: CouponRow) -> StoreResult<Self> {
    Ok(Coupon {
      id: row.id,
      code: row.code,
      is_active: row.is_active,
      min_order_cents: row.min_order_cents,
      discount_value: row.discount_value,
      discount_type: row.discount_type.parse().map_err(decode_error)?,
      usage_limit: row.usage_limit,
      expiry_date: row.expiry_date,
    })
  }
}

#[derive(FromRow)]
struct CouponUsageRow {
  id: Uuid,
  user_id: Uuid,
  coupon_id: Uuid,
  order_id: Uuid,
  discount_cents: i64,
  used_at: DateTime<Utc>,
}

impl From<CouponUsageRow> for CouponUsage {
  fn from(row: CouponUsageRow) -> Self {
    CouponUsage {
      id: row.id,
      user_id: row.user_id,
      coupon_id: row.coupon_id,
      order_id: row.order_id,
      discount_cents: row.discount_cents,
      used_at: row.used_at,
    }
  }
}

const REGISTRATION_COLUMNS: &str =
  "id, user_id, event_id, order_id, status, invoice_url, receipt_url, registered_at, updated_at";

#[derive(FromRow)]
struct RegistrationRow {
  id: Uuid,
  user_id: Uuid,
  event_id: Uuid,
  order_id: Option<Uuid>,
  status: String,
  invoice_url: Option<String>,
  receipt_url: Option<String>,
  registered_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl TryFrom<RegistrationRow> for EventRegistration {
  type Error = StoreError;

  fn try_from(row: RegistrationRow) -> StoreResult<Self> {
    Ok(EventRegistration {
      id: row.id,
      user_id: row.user_id,
      event_id: row.event_id,
      order_id: row.order_id,
      status: row.status.parse().map_err(decode_error)?,
      invoice_url: row.invoice_url,
      receipt_url: row.receipt_url,
      registered_at: row.registered_at,
      updated_at: row.updated_at,
    })
  }
}

const WITHDRAWAL_COLUMNS: &str =
  "id, register_id, user_id, reason, document, status, refund_amount_cents, reviewed_by, created_at, reviewed_at";

#[derive(FromRow)]
struct WithdrawalRow {
  id: Uuid,
  register_id: Uuid,
  user_id: Uuid,
  reason: String,
  document: String,
  status: String,
  refund_amount_cents: Option<i64>,
  reviewed_by: Option<Uuid>,
  created_at: DateTime<Utc>,
  reviewed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WithdrawalRow> for WithdrawalRequest {
  type Error = StoreError;

  fn try_from(row: WithdrawalRow) -> StoreResult<Self> {
    Ok(WithdrawalRequest {
      id: row.id,
      register_id: row.register_id,
      user_id: row.user_id,
      reason: row.reason,
      document: row.document,
      status: row.status.parse().map_err(decode_error)?,
      refund_amount_cents: row.refund_amount_cents,
      reviewed_by: row.reviewed_by,
      created_at: row.created_at,
      reviewed_at: row.reviewed_at,
    })
  }
}

impl PgTx {
  async fn fetch_order(&mut self, id: Uuid, for_update: bool) -> StoreResult<Option<Order>> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {} FROM orders WHERE id = $1{}", ORDER_COLUMNS, lock);
    let row = sqlx::query_as::<_, OrderRow>(&sql)
      .bind(id)
      .fetch_optional(&mut *self.tx)
      .await
      .map_err(map_sqlx_error)?;
    row.map(Order::try_from).transpose()
  }

  async fn fetch_registration(&mut self, id: Uuid, for_update: bool) -> StoreResult<Option<EventRegistration>> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {} FROM event_registrations WHERE id = $1{}", REGISTRATION_COLUMNS, lock);
    let row = sqlx::query_as::<_, RegistrationRow>(&sql)
      .bind(id)
      .fetch_optional(&mut *self.tx)
      .await
      .map_err(map_sqlx_error)?;
    row.map(EventRegistration::try_from).transpose()
  }

  async fn fetch_withdrawal(&mut self, id: Uuid, for_update: bool) -> StoreResult<Option<WithdrawalRequest>> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {} FROM withdrawal_requests WHERE id = $1{}", WITHDRAWAL_COLUMNS, lock);
    let row = sqlx::query_as::<_, WithdrawalRow>(&sql)
      .bind(id)
      .fetch_optional(&mut *self.tx)
      .await
      .map_err(map_sqlx_error)?;
    row.map(WithdrawalRequest::try_from).transpose()
  }
}

#[async_trait]
impl StoreTx for PgTx {
  async fn find_event(&mut self, id: Uuid) -> StoreResult<Option<Event>> {
    let row = sqlx::query_as::<_, EventRow>("SELECT id, title, price_cents, created_at FROM events WHERE id = $1")
      .bind(id)
      .fetch_optional(&mut *self.tx)
      .await
      .map_err(map_sqlx_error)?;
    Ok(row.map(Event::from))
  }

  async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
    sqlx::query(
      "INSERT INTO orders (id, user_id, order_no, status, price_cents, payment_method, discount_cents, coupon_id, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(order.id)
    .bind(order.user_id)
    .bind(&order.order_no)
    .bind(order.status.as_str())
    .bind(order.price_cents)
    .bind(&order.payment_method)
    .bind(order.discount_cents)
    .bind(order.coupon_id)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *self.tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
  }

  async fn insert_order_item(&mut self, item: &OrderItem) -> StoreResult<()> {
    sqlx::query("INSERT INTO order_items (id, order_id, event_id, line_no, price_cents) VALUES ($1, $2, $3, $4, $5)")
      .bind(item.id)
      .bind(item.order_id)
      .bind(item.event_id)
      .bind(item.line_no)
      .bind(item.price_cents)
      .execute(&mut *self.tx)
      .await
      .map_err(map_sqlx_error)?;
    Ok(())
  }

  async fn find_order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
    self.fetch_order(id, false).await
  }

  async fn lock_order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
    self.fetch_order(id, true).await
  }

  async fn order_items(&mut self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
    let rows = sqlx::query_as::<_, OrderItemRow>(
      "SELECT id, order_id, event_id, line_no, price_cents FROM order_items WHERE order_id = $1 ORDER BY line_no",
    )
    .bind(order_id)
    .fetch_all(&mut *self.tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(rows.into_iter().map(OrderItem::from).collect())
  }

  async fn update_order(&mut self, order: &Order) -> StoreResult<()> {
    sqlx::query(
      "UPDATE orders SET status = $2, price_cents = $3, discount_cents = $4, coupon_id = $5, updated_at = $6 WHERE id = $1",
    )
    .bind(order.id)
    .bind(order.status.as_str())
    .bind(order.price_cents)
    .bind(order.discount_cents)
    .bind(order.coupon_id)
    .bind(order.updated_at)
    .execute(&mut *self.tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
  }

  async fn find_coupon(&mut self, id: Uuid) -> StoreResult<Option<Coupon>> {
    let sql = format!("SELECT {} FROM coupons WHERE id = $1", COUPON_COLUMNS);
    let row = sqlx::query_as::<_, CouponRow>(&sql)
      .bind(id)
      .fetch_optional(&mut *self.tx)
      .await
      .map_err(map_sqlx_error)?;
    row.map(Coupon::try_from).transpose()
  }

  async fn find_coupon_by_code(&mut self, code: &str) -> StoreResult<Option<Coupon>> {
    let sql = format!("SELECT {} FROM coupons WHERE code = $1", COUPON_COLUMNS);
    let row = sqlx::query_as::<_, CouponRow>(&sql)
      .bind(code)
      .fetch_optional(&mut *self.tx)
      .await
      .map_err(map_sqlx_error)?;
    row.map(Coupon::try_from).transpose()
  }

  async fn lock_coupon_quota(&mut self, user_id: Uuid, coupon_id: Uuid) -> StoreResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text), hashtext($2::text))")
      .bind(user_id)
      .bind(coupon_id)
      .execute(&mut *self.tx)
      .await
      .map_err(map_sqlx_error)?;
    Ok(())
  }

  async fn count_coupon_usages(&mut self, user_id: Uuid, coupon_id: Uuid) -> StoreResult<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM coupon_usages WHERE user_id = $1 AND coupon_id = $2")
      .bind(user_id)
      .bind(coupon_id)
      .fetch_one(&mut *self.tx)
      .await
      .map_err(map_sqlx_error)
  }

  async fn find_coupon_usage_for_order(&mut self, order_id: Uuid) -> StoreResult<Option<CouponUsage>> {
    let row = sqlx::query_as::<_, CouponUsageRow>(
      "SELECT id, user_id, coupon_id, order_id, discount_cents, used_at FROM coupon_usages WHERE order_id = $1",
    )
    .bind(order_id)
    .fetch_optional(&mut *self.tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(row.map(CouponUsage::from))
  }

  async fn insert_coupon_usage(&mut self, usage: &CouponUsage) -> StoreResult<()> {
    let result = sqlx::query(
      "INSERT INTO coupon_usages (id, user_id, coupon_id, order_id, discount_cents, used_at) \
       VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (order_id) DO NOTHING",
    )
    .bind(usage.id)
    .bind(usage.user_id)
    .bind(usage.coupon_id)
    .bind(usage.order_id)
    .bind(usage.discount_cents)
    .bind(usage.used_at)
    .execute(&mut *self.tx)
    .await
    .map_err(map_sqlx_error)?;
    if result.rows_affected() == 0 {
      return Err(StoreError::UniqueViolation(constraints::COUPON_USAGE_ORDER.to_string()));
    }
    Ok(())
  }

  async fn find_registration(&mut self, id: Uuid) -> StoreResult<Option<EventRegistration>> {
    self.fetch_registration(id, false).await
  }

  async fn lock_registration(&mut self, id: Uuid) -> StoreResult<Option<EventRegistration>> {
    self.fetch_registration(id, true).await
  }

  async fn find_open_registration(&mut self, user_id: Uuid, event_id: Uuid) -> StoreResult<Option<EventRegistration>> {
    let sql = format!(
      "SELECT {} FROM event_registrations WHERE user_id = $1 AND event_id = $2 AND status <> 'cancelled'",
      REGISTRATION_COLUMNS
    );
    let row = sqlx::query_as::<_, RegistrationRow>(&sql)
      .bind(user_id)
      .bind(event_id)
      .fetch_optional(&mut *self.tx)
      .await
      .map_err(map_sqlx_error)?;
    row.map(EventRegistration::try_from).transpose()
  }

  async fn registrations_for_order(&mut self, order_id: Uuid) -> StoreResult<Vec<EventRegistration>> {
    let sql = format!(
      "SELECT {} FROM event_registrations WHERE order_id = $1 ORDER BY registered_at, id",
      REGISTRATION_COLUMNS
    );
    let rows = sqlx::query_as::<_, RegistrationRow>(&sql)
      .bind(order_id)
      .fetch_all(&mut *self.tx)
      .await
      .map_err(map_sqlx_error)?;
    rows.into_iter().map(EventRegistration::try_from).collect()
  }

  async fn insert_registration(&mut self, registration: &EventRegistration) -> StoreResult<()> {
    let result = sqlx::query(
      "INSERT INTO event_registrations (id, user_id, event_id, order_id, status, invoice_url, receipt_url, registered_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
       ON CONFLICT (user_id, event_id) WHERE status <> 'cancelled' DO NOTHING",
    )
    .bind(registration.id)
    .bind(registration.user_id)
    .bind(registration.event_id)
    .bind(registration.order_id)
    .bind(registration.status.as_str())
    .bind(&registration.invoice_url)
    .bind(&registration.receipt_url)
    .bind(registration.registered_at)
    .bind(registration.updated_at)
    .execute(&mut *self.tx)
    .await
    .map_err(map_sqlx_error)?;
    if result.rows_affected() == 0 {
      return Err(StoreError::UniqueViolation(constraints::OPEN_REGISTRATION.to_string()));
    }
    Ok(())
  }

  async fn update_registration(&mut self, registration: &EventRegistration) -> StoreResult<()> {
    sqlx::query(
      "UPDATE event_registrations SET status = $2, invoice_url = $3, receipt_url = $4, updated_at = $5 WHERE id = $1",
    )
    .bind(registration.id)
    .bind(registration.status.as_str())
    .bind(&registration.invoice_url)
    .bind(&registration.receipt_url)
    .bind(registration.updated_at)
    .execute(&mut *self.tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
  }

  async fn find_withdrawal(&mut self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
    self.fetch_withdrawal(id, false).await
  }

  async fn lock_withdrawal(&mut self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
    self.fetch_withdrawal(id, true).await
  }

  async fn open_withdrawal_for_registration(&mut self, register_id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
    let sql = format!(
      "SELECT {} FROM withdrawal_requests WHERE register_id = $1 AND status IN ('pending', 'approved')",
      WITHDRAWAL_COLUMNS
    );
    let row = sqlx::query_as::<_, WithdrawalRow>(&sql)
      .bind(register_id)
      .fetch_optional(&mut *self.tx)
      .await
      .map_err(map_sqlx_error)?;
    row.map(WithdrawalRequest::try_from).transpose()
  }

  async fn list_withdrawals(&mut self, status: Option<WithdrawalStatus>) -> StoreResult<Vec<WithdrawalRequest>> {
    let sql = format!(
      "SELECT {} FROM withdrawal_requests WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC",
      WITHDRAWAL_COLUMNS
    );
    let rows = sqlx::query_as::<_, WithdrawalRow>(&sql)
      .bind(status.map(WithdrawalStatus::as_str))
      .fetch_all(&mut *self.tx)
      .await
      .map_err(map_sqlx_error)?;
    rows.into_iter().map(WithdrawalRequest::try_from).collect()
  }

  async fn insert_withdrawal(&mut self, request: &WithdrawalRequest) -> StoreResult<()> {
    let result = sqlx::query(
      "INSERT INTO withdrawal_requests (id, register_id, user_id, reason, document, status, refund_amount_cents, reviewed_by, created_at, reviewed_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
       ON CONFLICT (register_id) WHERE status IN ('pending', 'approved') DO NOTHING",
    )
    .bind(request.id)
    .bind(request.register_id)
    .bind(request.user_id)
    .bind(&request.reason)
    .bind(&request.document)
    .bind(request.status.as_str())
    .bind(request.refund_amount_cents)
    .bind(request.reviewed_by)
    .bind(request.created_at)
    .bind(request.reviewed_at)
    .execute(&mut *self.tx)
    .await
    .map_err(map_sqlx_error)?;
    if result.rows_affected() == 0 {
      return Err(StoreError::UniqueViolation(constraints::OPEN_WITHDRAWAL.to_string()));
    }
    Ok(())
  }

  async fn update_withdrawal(&mut self, request: &WithdrawalRequest) -> StoreResult<()> {
    sqlx::query(
      "UPDATE withdrawal_requests SET status = $2, refund_amount_cents = $3, reviewed_by = $4, reviewed_at = $5 WHERE id = $1",
    )
    .bind(request.id)
    .bind(request.status.as_str())
    .bind(request.refund_amount_cents)
    .bind(request.reviewed_by)
    .bind(request.reviewed_at)
    .execute(&mut *self.tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
  }

  async fn commit(self) -> StoreResult<()> {
    self.tx.commit().await.map_err(map_sqlx_error)?;
    event!(Level::TRACE, "PgStore: transaction committed");
    Ok(())
  }
}
