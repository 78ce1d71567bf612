// tests/coupon_quota_tests.rs
mod common;

use chrono::{Duration, Utc};
use common::*;
use fulfillment::models::Coupon;
use fulfillment::{FulfillmentError, Store, StoreTx};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn percentage_coupon_quotes_discount_and_final_amount() {
  let fx = Fixture::new();
  fx.seed_coupon(Coupon::percentage("SPRING10", 10, 3));

  let quote = fx.fulfillment.coupons().validate("SPRING10", fx.customer.id, 25_000).await.unwrap();

  assert_eq!(quote.discount_cents, 2_500);
  assert_eq!(quote.final_amount_cents, 22_500);
  assert_eq!(quote.coupon.code, "SPRING10");
}

#[tokio::test]
async fn fixed_coupon_never_discounts_below_zero() {
  let fx = Fixture::new();
  fx.seed_coupon(Coupon::fixed("FLAT50", 5_000, 1));

  let quote = fx.fulfillment.coupons().validate("FLAT50", fx.customer.id, 3_000).await.unwrap();

  assert_eq!(quote.discount_cents, 3_000);
  assert_eq!(quote.final_amount_cents, 0);
}

#[tokio::test]
async fn validation_reports_each_rule_violation() {
  let fx = Fixture::new();
  fx.seed_coupon(Coupon::fixed("OFF", 100, 1).deactivated());
  fx.seed_coupon(Coupon::fixed("OLD", 100, 1).with_expiry(Utc::now() - Duration::days(1)));
  fx.seed_coupon(Coupon::fixed("BIG", 100, 1).with_min_order(10_000));
  let coupons = fx.fulfillment.coupons();
  let user = fx.customer.id;

  assert!(matches!(
    coupons.validate("NOPE", user, 1_000).await,
    Err(FulfillmentError::CouponNotFound { .. })
  ));
  assert!(matches!(
    coupons.validate("OFF", user, 1_000).await,
    Err(FulfillmentError::CouponInactive { .. })
  ));
  assert!(matches!(
    coupons.validate("OLD", user, 1_000).await,
    Err(FulfillmentError::CouponExpired { .. })
  ));
  assert!(matches!(
    coupons.validate("BIG", user, 9_999).await,
    Err(FulfillmentError::MinimumOrderNotMet {
      order_amount_cents: 9_999,
      minimum_cents: 10_000
    })
  ));
  assert!(matches!(
    coupons.validate("BIG", user, -1).await,
    Err(FulfillmentError::Validation { field: "orderAmountCents", .. })
  ));
  assert!(matches!(
    coupons.validate("  ", user, 1_000).await,
    Err(FulfillmentError::Validation { field: "code", .. })
  ));
}

#[tokio::test]
async fn validation_does_not_consume_quota() {
  let fx = Fixture::new();
  fx.seed_coupon(Coupon::percentage("ONCE", 10, 1));

  for _ in 0..3 {
    fx.fulfillment.coupons().validate("ONCE", fx.customer.id, 1_000).await.unwrap();
  }
  assert!(fx.store.coupon_usages().is_empty());
}

#[tokio::test]
async fn redeem_is_idempotent_per_order() {
  let fx = Fixture::new();
  let coupon = fx.seed_coupon(Coupon::percentage("TWICE", 10, 2));
  let order_id = Uuid::new_v4();
  let coupons = fx.fulfillment.coupons();

  let mut tx = fx.store.begin().await.unwrap();
  let first = coupons.redeem(&mut tx, fx.customer.id, coupon.id, order_id, 20_000).await.unwrap();
  let replay = coupons.redeem(&mut tx, fx.customer.id, coupon.id, order_id, 99_999).await.unwrap();
  tx.commit().await.unwrap();

  assert!(!first.replayed);
  assert!(replay.replayed);
  assert_eq!(replay.usage, first.usage);
  assert_eq!(replay.discount_cents(), 2_000);
  assert_eq!(fx.store.coupon_usages().len(), 1);
}

#[tokio::test]
async fn redeem_beyond_limit_is_rejected() {
  let fx = Fixture::new();
  let coupon = fx.seed_coupon(Coupon::fixed("ONE", 500, 1));
  let coupons = fx.fulfillment.coupons();

  let mut tx = fx.store.begin().await.unwrap();
  coupons.redeem(&mut tx, fx.customer.id, coupon.id, Uuid::new_v4(), 1_000).await.unwrap();
  let err = coupons
    .redeem(&mut tx, fx.customer.id, coupon.id, Uuid::new_v4(), 1_000)
    .await
    .unwrap_err();
  assert!(matches!(err, FulfillmentError::QuotaExceeded { usage_limit: 1, .. }));

  // Quota is per user.
  coupons.redeem(&mut tx, Uuid::new_v4(), coupon.id, Uuid::new_v4(), 1_000).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redeems_never_exceed_the_limit() {
  let fx = Arc::new(Fixture::new());
  let coupon = fx.seed_coupon(Coupon::percentage("RUSH", 5, 3));
  let user = fx.customer.id;

  let mut handles = Vec::new();
  for _ in 0..10 {
    let fx = fx.clone();
    let coupon_id = coupon.id;
    handles.push(tokio::spawn(async move {
      let mut tx = fx.store.begin().await?;
      let redemption = fx
        .fulfillment
        .coupons()
        .redeem(&mut tx, user, coupon_id, Uuid::new_v4(), 10_000)
        .await?;
      tx.commit().await?;
      Ok::<_, FulfillmentError>(redemption)
    }));
  }

  let mut succeeded = 0;
  let mut rejected = 0;
  for handle in handles {
    match handle.await.unwrap() {
      Ok(_) => succeeded += 1,
      Err(FulfillmentError::QuotaExceeded { .. }) => rejected += 1,
      Err(other) => panic!("unexpected error: {other}"),
    }
  }

  assert_eq!(succeeded, 3);
  assert_eq!(rejected, 7);
  assert_eq!(fx.store.coupon_usages().len(), 3);
}
