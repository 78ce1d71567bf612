// src/lib.rs

//! Fulfillment: the order, coupon and registration pipeline of the ticketing
//! platform.
//!
//! The crate provides:
//!  - A named-step pipeline engine with before/on/after handlers, skip
//!    conditions and early stopping, run over an exclusively borrowed context.
//!  - `CouponQuotaEngine` for coupon validation and quota-safe redemption.
//!  - `RegistrationLedger` for per-(user, event) registrations and their
//!    invoice/receipt documents.
//!  - `OrderLifecycleManager`, which creates orders and executes each status
//!    transition as one pipeline inside one storage transaction.
//!  - `WithdrawalApprovalWorkflow` for refund requests and admin review.
//!  - A `Store` abstraction with an in-memory implementation.

pub mod config;
pub mod coupons;
pub mod error;
pub mod fulfillment;
pub mod models;
pub mod orders;
pub mod pipeline;
pub mod registrations;
pub mod store;
pub mod txn;
pub mod withdrawals;

// --- Re-exports for the Public API ---

pub use crate::pipeline::{Pipeline, PipelineControl, PipelineResult, StepDef};

pub use crate::config::{DocumentConfig, FulfillmentConfig, TransactionConfig};
pub use crate::coupons::{CouponQuotaEngine, Redemption};
pub use crate::error::{ErrorKind, FulfillmentError, FulfillmentResult, PipelineError};
pub use crate::fulfillment::Fulfillment;
pub use crate::orders::{NewOrder, OrderDetails, OrderLifecycleManager, RefundScope, TransitionOutcome};
pub use crate::registrations::RegistrationLedger;
pub use crate::store::{MemoryStore, Store, StoreError, StoreTx};
pub use crate::txn::TransactionRunner;
pub use crate::withdrawals::{WithdrawalApprovalWorkflow, WithdrawalDecision};

/*
    Transition flow:
    1. `OrderLifecycleManager::transition` asks the `TransactionRunner` for an attempt.
    2. The attempt begins a transaction and moves it into a `TransitionCtx`.
    3. The transition pipeline runs: load_order -> check_transition -> redeem_coupon
       -> activate_registrations | cancel_registrations -> update_order_status.
    4. On success the context hands the transaction back and it is committed;
       on any error the context (and the transaction) is dropped and rolled back.
*/
