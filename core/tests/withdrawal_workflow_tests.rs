// tests/withdrawal_workflow_tests.rs
mod common;

use common::*;
use fulfillment::models::{Coupon, OrderStatus, Principal, RegistrationStatus, WithdrawalStatus};
use fulfillment::{FulfillmentError, Store, StoreTx};
use uuid::Uuid;

#[tokio::test]
async fn request_on_pending_order_is_rejected() {
  let fx = Fixture::new();
  let events = fx.seed_events(1, 5_000);
  let placed = fx.place_order(&events, None).await;

  let err = fx
    .fulfillment
    .withdrawals()
    .request_withdrawal(&fx.customer, placed.registrations[0].id, "Cannot attend", "doc-1")
    .await
    .unwrap_err();

  assert!(matches!(err, FulfillmentError::RegistrationNotCompleted(_)));
}

#[tokio::test]
async fn second_open_request_is_a_duplicate() {
  let fx = Fixture::new();
  let events = fx.seed_events(1, 5_000);
  let completed = fx.completed_order(&events, None).await;
  let registration_id = completed.registrations[0].id;
  let withdrawals = fx.fulfillment.withdrawals();

  let first = withdrawals
    .request_withdrawal(&fx.customer, registration_id, "Cannot attend", "doc-1")
    .await
    .unwrap();
  assert_eq!(first.status, WithdrawalStatus::Pending);

  let err = withdrawals
    .request_withdrawal(&fx.customer, registration_id, "Still cannot attend", "doc-2")
    .await
    .unwrap_err();
  assert!(matches!(err, FulfillmentError::DuplicateRequest(id) if id == registration_id));
}

#[tokio::test]
async fn request_validates_owner_and_input() {
  let fx = Fixture::new();
  let events = fx.seed_events(1, 5_000);
  let completed = fx.completed_order(&events, None).await;
  let registration_id = completed.registrations[0].id;
  let withdrawals = fx.fulfillment.withdrawals();

  assert!(matches!(
    withdrawals.request_withdrawal(&fx.customer, registration_id, " ", "doc").await,
    Err(FulfillmentError::Validation { field: "reason", .. })
  ));
  assert!(matches!(
    withdrawals.request_withdrawal(&fx.customer, registration_id, "why", "").await,
    Err(FulfillmentError::Validation { field: "document", .. })
  ));
  let stranger = Principal::customer(Uuid::new_v4());
  assert!(matches!(
    withdrawals.request_withdrawal(&stranger, registration_id, "why", "doc").await,
    Err(FulfillmentError::Forbidden(_))
  ));
  assert!(matches!(
    withdrawals.request_withdrawal(&fx.customer, Uuid::new_v4(), "why", "doc").await,
    Err(FulfillmentError::RegistrationNotFound(_))
  ));
}

#[tokio::test]
async fn approval_of_only_registration_refunds_the_order() {
  let fx = Fixture::new();
  let events = fx.seed_events(1, 10_000);
  fx.seed_coupon(Coupon::percentage("TEN", 10, 1));
  let completed = fx.completed_order(&events, Some("TEN")).await;
  let registration_id = completed.registrations[0].id;
  let withdrawals = fx.fulfillment.withdrawals();
  let request = withdrawals
    .request_withdrawal(&fx.customer, registration_id, "Sick", "doc-1")
    .await
    .unwrap();

  let decision = withdrawals.manage(request.id, WithdrawalStatus::Approved, &fx.admin).await.unwrap();

  assert_eq!(decision.request.status, WithdrawalStatus::Approved);
  assert_eq!(decision.request.refund_amount_cents, Some(9_000));
  assert_eq!(decision.request.reviewed_by, Some(fx.admin.id));
  let refund = decision.refund.expect("approval drives a refund");
  assert_eq!(refund.order.status, OrderStatus::Refunded);
  assert_eq!(fx.store.order(completed.order.id).unwrap().status, OrderStatus::Refunded);
  assert_eq!(fx.store.registration(registration_id).unwrap().status, RegistrationStatus::Cancelled);
  // Coupon usage is never reversed.
  assert_eq!(fx.store.coupon_usages().len(), 1);
}

#[tokio::test]
async fn approval_of_one_item_is_a_partial_refund() {
  let fx = Fixture::new();
  let events = vec![fx.seed_event("Main", 6_000), fx.seed_event("Side", 3_000)];
  fx.seed_coupon(Coupon::percentage("TEN", 10, 1));
  let completed = fx.completed_order(&events, Some("TEN")).await;
  let side = completed.registrations.iter().find(|r| r.event_id == events[1].id).unwrap().clone();
  let withdrawals = fx.fulfillment.withdrawals();

  let request = withdrawals.request_withdrawal(&fx.customer, side.id, "Clash", "doc").await.unwrap();
  let decision = withdrawals.manage(request.id, WithdrawalStatus::Approved, &fx.admin).await.unwrap();

  // 3000 of 9000 gross, 8100 paid.
  assert_eq!(decision.request.refund_amount_cents, Some(2_700));
  let refund = decision.refund.unwrap();
  assert!(!refund.changed);
  assert_eq!(refund.order.status, OrderStatus::Completed);
  assert_eq!(fx.store.registration(side.id).unwrap().status, RegistrationStatus::Cancelled);

  let main = completed.registrations.iter().find(|r| r.event_id == events[0].id).unwrap();
  assert_eq!(fx.store.registration(main.id).unwrap().status, RegistrationStatus::Active);

  // Refunding the remaining item closes the order.
  let request = withdrawals.request_withdrawal(&fx.customer, main.id, "Clash", "doc").await.unwrap();
  let decision = withdrawals.manage(request.id, WithdrawalStatus::Approved, &fx.admin).await.unwrap();
  assert_eq!(decision.refund.unwrap().order.status, OrderStatus::Refunded);
}

#[tokio::test]
async fn rejection_is_final_and_allows_a_new_request() {
  let fx = Fixture::new();
  let events = fx.seed_events(1, 5_000);
  let completed = fx.completed_order(&events, None).await;
  let registration_id = completed.registrations[0].id;
  let withdrawals = fx.fulfillment.withdrawals();
  let request = withdrawals.request_withdrawal(&fx.customer, registration_id, "why", "doc").await.unwrap();

  let rejected = withdrawals.manage(request.id, WithdrawalStatus::Rejected, &fx.admin).await.unwrap();
  assert_eq!(rejected.request.status, WithdrawalStatus::Rejected);
  assert!(rejected.refund.is_none());
  assert_eq!(fx.store.order(completed.order.id).unwrap().status, OrderStatus::Completed);

  // Same decision again is a no-op; flipping it is not allowed.
  let replay = withdrawals.manage(request.id, WithdrawalStatus::Rejected, &fx.admin).await.unwrap();
  assert_eq!(replay.request, rejected.request);
  assert!(matches!(
    withdrawals.manage(request.id, WithdrawalStatus::Approved, &fx.admin).await,
    Err(FulfillmentError::InvalidStateTransition { entity: "withdrawal", .. })
  ));

  withdrawals.request_withdrawal(&fx.customer, registration_id, "again", "doc").await.unwrap();
}

#[tokio::test]
async fn only_admins_review_and_list() {
  let fx = Fixture::new();
  let events = fx.seed_events(1, 5_000);
  let completed = fx.completed_order(&events, None).await;
  let withdrawals = fx.fulfillment.withdrawals();
  let request = withdrawals
    .request_withdrawal(&fx.customer, completed.registrations[0].id, "why", "doc")
    .await
    .unwrap();

  assert!(matches!(
    withdrawals.manage(request.id, WithdrawalStatus::Approved, &fx.customer).await,
    Err(FulfillmentError::Forbidden(_))
  ));
  assert!(matches!(
    withdrawals.manage(request.id, WithdrawalStatus::Pending, &fx.admin).await,
    Err(FulfillmentError::Validation { field: "status", .. })
  ));
  assert!(matches!(
    withdrawals.manage(Uuid::new_v4(), WithdrawalStatus::Approved, &fx.admin).await,
    Err(FulfillmentError::RequestNotFound(_))
  ));
  assert!(matches!(withdrawals.list(&fx.customer, None).await, Err(FulfillmentError::Forbidden(_))));

  let pending = withdrawals.list(&fx.admin, Some(WithdrawalStatus::Pending)).await.unwrap();
  assert_eq!(pending.len(), 1);
  assert!(withdrawals.list(&fx.admin, Some(WithdrawalStatus::Approved)).await.unwrap().is_empty());
}

#[tokio::test]
async fn refund_is_not_accepted_through_the_order_api() {
  let fx = Fixture::new();
  let events = fx.seed_events(1, 5_000);
  let completed = fx.completed_order(&events, None).await;

  for actor in [&fx.customer, &fx.admin, &fx.system] {
    let err = fx
      .fulfillment
      .orders()
      .transition(completed.order.id, OrderStatus::Refunded, actor)
      .await
      .unwrap_err();
    assert!(matches!(err, FulfillmentError::Validation { field: "status", .. }));
  }
  assert_eq!(fx.store.order(completed.order.id).unwrap().status, OrderStatus::Completed);
  assert_eq!(
    fx.store.registration(completed.registrations[0].id).unwrap().status,
    RegistrationStatus::Active
  );
}

#[tokio::test]
async fn refunds_of_every_item_never_exceed_the_price_paid() {
  let fx = Fixture::new();
  let events = vec![
    fx.seed_event("A", 333),
    fx.seed_event("B", 333),
    fx.seed_event("C", 334),
  ];
  fx.seed_coupon(Coupon::fixed("CENT", 1, 1));
  let completed = fx.completed_order(&events, Some("CENT")).await;
  assert_eq!(completed.order.price_cents, 999);
  let withdrawals = fx.fulfillment.withdrawals();

  let mut refunded = Vec::new();
  for registration in &completed.registrations {
    let request = withdrawals
      .request_withdrawal(&fx.customer, registration.id, "Cannot attend", "doc")
      .await
      .unwrap();
    let decision = withdrawals.manage(request.id, WithdrawalStatus::Approved, &fx.admin).await.unwrap();
    refunded.push(decision.request.refund_amount_cents.unwrap());
  }

  // Each share alone rounds up; the last refund takes only what is left.
  assert_eq!(refunded.iter().sum::<i64>(), 999);
  assert!(refunded.iter().all(|cents| (332..=334).contains(cents)));
  assert_eq!(fx.store.order(completed.order.id).unwrap().status, OrderStatus::Refunded);
}

#[tokio::test]
async fn approval_rechecks_that_the_registration_is_still_active() {
  let fx = Fixture::new();
  let events = fx.seed_events(1, 10_000);
  let completed = fx.completed_order(&events, None).await;
  let registration_id = completed.registrations[0].id;
  let withdrawals = fx.fulfillment.withdrawals();
  let request = withdrawals
    .request_withdrawal(&fx.customer, registration_id, "Sick", "doc")
    .await
    .unwrap();

  // The registration is cancelled behind the workflow's back.
  let mut tx = fx.store.begin().await.unwrap();
  let mut registration = tx.find_registration(registration_id).await.unwrap().unwrap();
  registration.status = RegistrationStatus::Cancelled;
  tx.update_registration(&registration).await.unwrap();
  tx.commit().await.unwrap();

  let err = withdrawals
    .manage(request.id, WithdrawalStatus::Approved, &fx.admin)
    .await
    .unwrap_err();
  assert!(matches!(err, FulfillmentError::RegistrationNotCompleted(id) if id == registration_id));

  let stored = fx.store.withdrawal(request.id).unwrap();
  assert_eq!(stored.status, WithdrawalStatus::Pending);
  assert_eq!(stored.refund_amount_cents, None);
}
