//! The action staging state machine.
//!
//! Agents propose writes; nothing touches a connector until the owner
//! approves. Transitions are one-way and guarded by the store's
//! compare-and-set, so two concurrent resolvers cannot both win: the loser's
//! guard fails and surfaces as "not pending".

use std::sync::Arc;

use chrono::Utc;
use gatehouse_core::{
  audit::{AuditEvent, NewAuditEntry},
  connector::{ActionResult, ConnectorRegistry},
  row::FieldMap,
  staging::{ActionStatus, Decision, NewAction, StagingAction},
  store::BrokerStore,
};
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};

pub struct StagingEngine<S> {
  store:      Arc<S>,
  connectors: ConnectorRegistry,
}

impl<S: BrokerStore> StagingEngine<S> {
  pub fn new(store: Arc<S>, connectors: ConnectorRegistry) -> Self {
    Self { store, connectors }
  }

  /// Stage a new action as `pending` and audit the proposal.
  pub async fn propose(&self, input: NewAction) -> Result<StagingAction> {
    let action = StagingAction {
      action_id:   Uuid::new_v4(),
      source:      input.source,
      action_type: input.action_type,
      payload:     input.payload,
      purpose:     input.purpose,
      status:      ActionStatus::Pending,
      proposed_at: Utc::now(),
      resolved_at: None,
    };

    self
      .store
      .insert_action(action.clone())
      .await
      .map_err(Error::store)?;
    self
      .audit(AuditEvent::ActionProposed, &action, json!({
        "action_id":   action.action_id,
        "action_type": action.action_type,
        "purpose":     action.purpose,
      }))
      .await?;

    tracing::info!(
      action_id = %action.action_id,
      source = %action.source,
      action_type = %action.action_type,
      "action proposed"
    );
    Ok(action)
  }

  /// Replace the payload of a still-pending action.
  pub async fn edit_payload(
    &self,
    id: Uuid,
    payload: FieldMap,
  ) -> Result<StagingAction> {
    let payload_json =
      serde_json::to_string(&serde_json::Value::Object(payload))?;
    let updated = self
      .store
      .update_action_payload(id, payload_json)
      .await
      .map_err(Error::store)?;
    if !updated {
      return Err(self.not_pending(id).await);
    }
    self.fetch(id).await
  }

  /// Apply the owner's decision to a pending action.
  ///
  /// Approval executes the action through the source's connector and then
  /// marks it committed whether or not the execution succeeded; the outcome
  /// lands in the audit detail. Rejection executes nothing.
  pub async fn resolve(
    &self,
    id: Uuid,
    decision: Decision,
  ) -> Result<StagingAction> {
    let action = self.fetch(id).await?;
    if action.status != ActionStatus::Pending {
      return Err(Error::Core(gatehouse_core::Error::ActionNotPending {
        id,
        status: action.status.to_string(),
      }));
    }

    match decision {
      Decision::Reject => self.reject(action).await,
      Decision::Approve => self.approve(action).await,
    }
  }

  async fn reject(&self, action: StagingAction) -> Result<StagingAction> {
    let moved = self
      .store
      .transition_action(
        action.action_id,
        ActionStatus::Pending,
        ActionStatus::Rejected,
        Some(Utc::now()),
      )
      .await
      .map_err(Error::store)?;
    if !moved {
      return Err(self.not_pending(action.action_id).await);
    }

    self
      .audit(AuditEvent::ActionRejected, &action, json!({
        "action_id":   action.action_id,
        "action_type": action.action_type,
      }))
      .await?;
    self.fetch(action.action_id).await
  }

  async fn approve(&self, action: StagingAction) -> Result<StagingAction> {
    // Resolve the connector before any state moves; a missing connector
    // must leave the action pending and editable.
    let connector = self.connectors.require(&action.source)?;

    let moved = self
      .store
      .transition_action(
        action.action_id,
        ActionStatus::Pending,
        ActionStatus::Approved,
        None,
      )
      .await
      .map_err(Error::store)?;
    if !moved {
      return Err(self.not_pending(action.action_id).await);
    }
    self
      .audit(AuditEvent::ActionApproved, &action, json!({
        "action_id":   action.action_id,
        "action_type": action.action_type,
      }))
      .await?;

    let result = match connector
      .execute_action(&action.action_type, &action.payload)
      .await
    {
      Ok(result) => result,
      Err(error) => ActionResult {
        success:     false,
        message:     error.to_string(),
        result_data: None,
      },
    };

    self
      .store
      .transition_action(
        action.action_id,
        ActionStatus::Approved,
        ActionStatus::Committed,
        Some(Utc::now()),
      )
      .await
      .map_err(Error::store)?;
    self
      .audit(AuditEvent::ActionCommitted, &action, json!({
        "action_id":   action.action_id,
        "action_type": action.action_type,
        "success":     result.success,
        "message":     result.message,
      }))
      .await?;

    if !result.success {
      tracing::warn!(
        action_id = %action.action_id,
        source = %action.source,
        message = %result.message,
        "approved action failed at the connector"
      );
    }
    self.fetch(action.action_id).await
  }

  async fn fetch(&self, id: Uuid) -> Result<StagingAction> {
    self
      .store
      .get_action(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::Core(gatehouse_core::Error::ActionNotFound(id)))
  }

  /// The error for a failed pending-guard: re-read to report the real
  /// current status.
  async fn not_pending(&self, id: Uuid) -> Error {
    let status = match self.store.get_action(id).await {
      Ok(Some(action)) => action.status.to_string(),
      Ok(None) => {
        return Error::Core(gatehouse_core::Error::ActionNotFound(id));
      }
      Err(_) => "unknown".to_string(),
    };
    Error::Core(gatehouse_core::Error::ActionNotPending { id, status })
  }

  async fn audit(
    &self,
    event: AuditEvent,
    action: &StagingAction,
    details: serde_json::Value,
  ) -> Result<()> {
    self
      .store
      .append_audit(NewAuditEntry { event, source: action.source.clone(), details })
      .await
      .map_err(Error::store)?;
    Ok(())
  }
}
