// core/src/fulfillment.rs

use std::sync::Arc;

use crate::config::FulfillmentConfig;
use crate::coupons::CouponQuotaEngine;
use crate::orders::OrderLifecycleManager;
use crate::registrations::RegistrationLedger;
use crate::store::Store;
use crate::txn::TransactionRunner;
use crate::withdrawals::WithdrawalApprovalWorkflow;

/// Wires the four components over one store handle.
pub struct Fulfillment<S: Store> {
  store: S,
  coupons: Arc<CouponQuotaEngine<S>>,
  ledger: Arc<RegistrationLedger>,
  orders: Arc<OrderLifecycleManager<S>>,
  withdrawals: WithdrawalApprovalWorkflow<S>,
}

impl<S: Store> Fulfillment<S> {
  pub fn new(store: S, config: FulfillmentConfig) -> Self {
    let runner = TransactionRunner::new(config.transaction);
    let coupons = Arc::new(CouponQuotaEngine::new(store.clone(), runner.clone()));
    let ledger = Arc::new(RegistrationLedger::new(config.documents));
    let orders = Arc::new(OrderLifecycleManager::new(
      store.clone(),
      coupons.clone(),
      ledger.clone(),
      runner.clone(),
    ));
    let withdrawals = WithdrawalApprovalWorkflow::new(store.clone(), orders.clone(), runner);
    Self {
      store,
      coupons,
      ledger,
      orders,
      withdrawals,
    }
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  pub fn coupons(&self) -> &CouponQuotaEngine<S> {
    &self.coupons
  }

  pub fn registrations(&self) -> &RegistrationLedger {
    &self.ledger
  }

  pub fn orders(&self) -> &OrderLifecycleManager<S> {
    &self.orders
  }

  pub fn withdrawals(&self) -> &WithdrawalApprovalWorkflow<S> {
    &self.withdrawals
  }
}
