// core/src/coupons.rs

//! Coupon validation and quota-safe redemption.

use chrono::Utc;
use serde::Serialize;
use tracing::{event, instrument, Level};
use uuid::Uuid;

use crate::error::{FulfillmentError, FulfillmentResult};
use crate::models::{Coupon, CouponUsage, DiscountQuote};
use crate::store::{constraints, Store, StoreError, StoreTx};
use crate::txn::TransactionRunner;

/// Result of `CouponQuotaEngine::redeem`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
  pub usage: CouponUsage,
  /// The order already held a usage row; nothing new was consumed.
  pub replayed: bool,
}

impl Redemption {
  pub fn discount_cents(&self) -> i64 {
    self.usage.discount_cents
  }
}

pub struct CouponQuotaEngine<S: Store> {
  store: S,
  runner: TransactionRunner,
}

impl<S: Store> CouponQuotaEngine<S> {
  pub fn new(store: S, runner: TransactionRunner) -> Self {
    Self { store, runner }
  }

  /// Read-only check of whether `code` applies to an order of
  /// `order_amount_cents` for `user_id`, and what it would discount.
  #[instrument(name = "CouponQuotaEngine::validate", skip(self), err(Display))]
  pub async fn validate(&self, code: &str, user_id: Uuid, order_amount_cents: i64) -> FulfillmentResult<DiscountQuote> {
    self
      .runner
      .run("coupon.validate", || self.validate_once(code, user_id, order_amount_cents))
      .await
  }

  async fn validate_once(&self, code: &str, user_id: Uuid, order_amount_cents: i64) -> FulfillmentResult<DiscountQuote> {
    let mut tx = self.store.begin().await?;
    // Nothing to commit; dropping the transaction releases it.
    self.validate_in(&mut tx, code, user_id, order_amount_cents).await
  }

  /// `validate` inside a caller's transaction. Consumes no quota.
  pub async fn validate_in(
    &self,
    tx: &mut S::Tx,
    code: &str,
    user_id: Uuid,
    order_amount_cents: i64,
  ) -> FulfillmentResult<DiscountQuote> {
    let code = code.trim();
    if code.is_empty() {
      return Err(FulfillmentError::validation("code", "must not be empty"));
    }
    check_amount(order_amount_cents)?;

    let coupon = tx
      .find_coupon_by_code(code)
      .await?
      .ok_or_else(|| FulfillmentError::CouponNotFound { code: code.to_string() })?;
    let used = tx.count_coupon_usages(user_id, coupon.id).await?;
    let discount_cents = check_rules(&coupon, order_amount_cents, used)?;

    Ok(DiscountQuote {
      final_amount_cents: order_amount_cents - discount_cents,
      discount_cents,
      coupon,
    })
  }

  /// Consumes one unit of the user's quota for `coupon_id` on behalf of
  /// `order_id`. Replaying for an order that already redeemed returns the
  /// recorded usage without touching the quota.
  #[instrument(name = "CouponQuotaEngine::redeem", skip(self, tx), err(Display))]
  pub async fn redeem(
    &self,
    tx: &mut S::Tx,
    user_id: Uuid,
    coupon_id: Uuid,
    order_id: Uuid,
    order_amount_cents: i64,
  ) -> FulfillmentResult<Redemption> {
    if let Some(usage) = tx.find_coupon_usage_for_order(order_id).await? {
      event!(Level::DEBUG, %order_id, "Coupon already redeemed for order, replaying.");
      return Ok(Redemption { usage, replayed: true });
    }
    check_amount(order_amount_cents)?;

    let coupon = tx.find_coupon(coupon_id).await?.ok_or_else(|| FulfillmentError::CouponNotFound {
      code: coupon_id.to_string(),
    })?;

    tx.lock_coupon_quota(user_id, coupon.id).await?;
    let used = tx.count_coupon_usages(user_id, coupon.id).await?;
    let discount_cents = check_rules(&coupon, order_amount_cents, used)?;

    let usage = CouponUsage {
      id: Uuid::new_v4(),
      user_id,
      coupon_id: coupon.id,
      order_id,
      discount_cents,
      used_at: Utc::now(),
    };
    match tx.insert_coupon_usage(&usage).await {
      Ok(()) => {
        event!(Level::INFO, %order_id, code = %coupon.code, discount_cents, "Coupon redeemed.");
        Ok(Redemption { usage, replayed: false })
      }
      Err(err) if err.violates(constraints::COUPON_USAGE_ORDER) => {
        // A concurrent attempt for the same order won; its row is the answer.
        let usage = tx
          .find_coupon_usage_for_order(order_id)
          .await?
          .ok_or(StoreError::UniqueViolation(constraints::COUPON_USAGE_ORDER.to_string()))?;
        Ok(Redemption { usage, replayed: true })
      }
      Err(err) => Err(err.into()),
    }
  }
}

fn check_amount(order_amount_cents: i64) -> FulfillmentResult<()> {
  if order_amount_cents < 0 {
    return Err(FulfillmentError::validation("orderAmountCents", "must not be negative"));
  }
  Ok(())
}

/// Applies every coupon rule in order and returns the discount.
fn check_rules(coupon: &Coupon, order_amount_cents: i64, used: i64) -> FulfillmentResult<i64> {
  if !coupon.is_active {
    return Err(FulfillmentError::CouponInactive {
      code: coupon.code.clone(),
    });
  }
  if let Some(expired_at) = coupon.expiry_date.filter(|_| coupon.is_expired_at(Utc::now())) {
    return Err(FulfillmentError::CouponExpired {
      code: coupon.code.clone(),
      expired_at,
    });
  }
  if order_amount_cents < coupon.min_order_cents {
    return Err(FulfillmentError::MinimumOrderNotMet {
      order_amount_cents,
      minimum_cents: coupon.min_order_cents,
    });
  }
  if used >= i64::from(coupon.usage_limit) {
    return Err(FulfillmentError::QuotaExceeded {
      code: coupon.code.clone(),
      usage_limit: coupon.usage_limit,
    });
  }
  Ok(coupon.discount_for(order_amount_cents))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rules_are_checked_in_order() {
    let coupon = Coupon::percentage("SPRING", 10, 1).with_min_order(10_000).deactivated();
    assert!(matches!(check_rules(&coupon, 1, 5), Err(FulfillmentError::CouponInactive { .. })));

    let coupon = Coupon::percentage("SPRING", 10, 1).with_min_order(10_000);
    assert!(matches!(check_rules(&coupon, 1, 5), Err(FulfillmentError::MinimumOrderNotMet { .. })));
    assert!(matches!(check_rules(&coupon, 10_000, 1), Err(FulfillmentError::QuotaExceeded { .. })));
    assert_eq!(check_rules(&coupon, 10_000, 0).unwrap(), 1_000);
  }

  #[test]
  fn expired_coupon_is_rejected() {
    let coupon = Coupon::fixed("OLD", 100, 5).with_expiry(Utc::now() - chrono::Duration::days(1));
    assert!(matches!(check_rules(&coupon, 500, 0), Err(FulfillmentError::CouponExpired { .. })));
  }
}
