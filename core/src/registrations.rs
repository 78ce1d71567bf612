// core/src/registrations.rs

//! Per-(user, event) registrations and their documents.

use chrono::Utc;
use tracing::{event, instrument, Level};
use uuid::Uuid;

use crate::config::DocumentConfig;
use crate::error::{FulfillmentError, FulfillmentResult};
use crate::models::{EventRegistration, RegistrationStatus};
use crate::store::{constraints, StoreTx};

#[derive(Debug, Clone)]
pub struct RegistrationLedger {
  documents: DocumentConfig,
}

impl RegistrationLedger {
  pub fn new(documents: DocumentConfig) -> Self {
    Self { documents }
  }

  /// Opens a Pending registration. A user may hold only one non-cancelled
  /// registration per event.
  #[instrument(name = "RegistrationLedger::create", skip(self, tx), err(Display))]
  pub(crate) async fn create<T: StoreTx>(
    &self,
    tx: &mut T,
    user_id: Uuid,
    event_id: Uuid,
    order_id: Option<Uuid>,
  ) -> FulfillmentResult<EventRegistration> {
    if tx.find_open_registration(user_id, event_id).await?.is_some() {
      return Err(FulfillmentError::DuplicateRegistration { user_id, event_id });
    }

    let now = Utc::now();
    let registration = EventRegistration {
      id: Uuid::new_v4(),
      user_id,
      event_id,
      order_id,
      status: RegistrationStatus::Pending,
      invoice_url: None,
      receipt_url: None,
      registered_at: now,
      updated_at: now,
    };
    match tx.insert_registration(&registration).await {
      Ok(()) => Ok(registration),
      Err(err) if err.violates(constraints::OPEN_REGISTRATION) => {
        Err(FulfillmentError::DuplicateRegistration { user_id, event_id })
      }
      Err(err) => Err(err.into()),
    }
  }

  /// Marks the registration Active and attaches its invoice and receipt.
  /// Document numbers derive from the order number and item line, so a
  /// replay yields the same URLs.
  #[instrument(name = "RegistrationLedger::activate", skip(self, tx), err(Display))]
  pub(crate) async fn activate<T: StoreTx>(
    &self,
    tx: &mut T,
    registration_id: Uuid,
  ) -> FulfillmentResult<EventRegistration> {
    let mut registration = tx
      .lock_registration(registration_id)
      .await?
      .ok_or(FulfillmentError::RegistrationNotFound(registration_id))?;

    match registration.status {
      RegistrationStatus::Active => return Ok(registration),
      RegistrationStatus::Cancelled => {
        return Err(FulfillmentError::InvalidStateTransition {
          entity: "registration",
          from: registration.status.to_string(),
          to: RegistrationStatus::Active.to_string(),
        })
      }
      RegistrationStatus::Pending => {}
    }

    if tx.find_event(registration.event_id).await?.is_none() {
      return Err(FulfillmentError::EventNotFound(registration.event_id));
    }

    let number = self.document_number(tx, &registration).await?;
    registration.invoice_url = Some(self.documents.invoice_url(&format!("INV-{}", number)));
    registration.receipt_url = Some(self.documents.receipt_url(&format!("RCT-{}", number)));
    registration.status = RegistrationStatus::Active;
    registration.updated_at = Utc::now();
    tx.update_registration(&registration).await?;

    event!(Level::DEBUG, registration_id = %registration.id, document = %number, "Registration activated.");
    Ok(registration)
  }

  /// Idempotent.
  #[instrument(name = "RegistrationLedger::cancel", skip(self, tx), err(Display))]
  pub(crate) async fn cancel<T: StoreTx>(&self, tx: &mut T, registration_id: Uuid) -> FulfillmentResult<EventRegistration> {
    let mut registration = tx
      .lock_registration(registration_id)
      .await?
      .ok_or(FulfillmentError::RegistrationNotFound(registration_id))?;
    if registration.status == RegistrationStatus::Cancelled {
      return Ok(registration);
    }
    registration.status = RegistrationStatus::Cancelled;
    registration.updated_at = Utc::now();
    tx.update_registration(&registration).await?;
    Ok(registration)
  }

  pub async fn for_order<T: StoreTx>(&self, tx: &mut T, order_id: Uuid) -> FulfillmentResult<Vec<EventRegistration>> {
    Ok(tx.registrations_for_order(order_id).await?)
  }

  /// `{order_no}-{line_no:02}` for order-backed registrations.
  async fn document_number<T: StoreTx>(&self, tx: &mut T, registration: &EventRegistration) -> FulfillmentResult<String> {
    let Some(order_id) = registration.order_id else {
      let short = registration.id.simple().to_string()[..8].to_ascii_uppercase();
      return Ok(format!("REG-{}-01", short));
    };
    let order = tx.find_order(order_id).await?.ok_or(FulfillmentError::OrderNotFound(order_id))?;
    let line_no = tx
      .order_items(order_id)
      .await?
      .into_iter()
      .find(|item| item.event_id == registration.event_id)
      .map(|item| item.line_no)
      .ok_or(FulfillmentError::EventNotFound(registration.event_id))?;
    Ok(format!("{}-{:02}", order.order_no, line_no))
  }
}
