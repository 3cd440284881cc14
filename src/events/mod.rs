use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// Workflow state is already committed by the time events go out.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping workflow event");
        }
    }
}

/// Workflow events emitted after each committed state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    InitiationDraftSaved(Uuid),
    InitiationSubmitted {
        initiation_id: Uuid,
        manager_approver_id: Uuid,
    },
    ManagerDecided {
        initiation_id: Uuid,
        approved: bool,
    },
    ProcurementDecided {
        initiation_id: Uuid,
        approved: bool,
    },
    SupplierEmailed {
        initiation_id: Uuid,
        supplier_id: Uuid,
    },
    InitiationDeleted(Uuid),
    DelegationCreated(Uuid),
    DelegationRevoked(Uuid),
    SupplierFormSubmitted {
        supplier_id: Uuid,
        version: u32,
    },
    RevisionRequested {
        supplier_id: Uuid,
        revision_count: i32,
    },
    FinalApprovalRequested(Uuid),
    SupplierStatusChanged {
        supplier_id: Uuid,
        old_status: String,
        new_status: String,
    },
    AiAnalysisStarted {
        job_id: Uuid,
        supplier_id: Uuid,
    },
    AiAnalysisFinished {
        job_id: Uuid,
        supplier_id: Uuid,
        succeeded: bool,
    },
    RemindersSent {
        delivered: usize,
        failed: usize,
    },
}

impl Event {
    /// Metric label for the event family.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::InitiationDraftSaved(_) => "initiation_draft_saved",
            Event::InitiationSubmitted { .. } => "initiation_submitted",
            Event::ManagerDecided { .. } => "manager_decided",
            Event::ProcurementDecided { .. } => "procurement_decided",
            Event::SupplierEmailed { .. } => "supplier_emailed",
            Event::InitiationDeleted(_) => "initiation_deleted",
            Event::DelegationCreated(_) => "delegation_created",
            Event::DelegationRevoked(_) => "delegation_revoked",
            Event::SupplierFormSubmitted { .. } => "supplier_form_submitted",
            Event::RevisionRequested { .. } => "revision_requested",
            Event::FinalApprovalRequested(_) => "final_approval_requested",
            Event::SupplierStatusChanged { .. } => "supplier_status_changed",
            Event::AiAnalysisStarted { .. } => "ai_analysis_started",
            Event::AiAnalysisFinished { .. } => "ai_analysis_finished",
            Event::RemindersSent { .. } => "reminders_sent",
        }
    }
}

/// Drains the event channel, recording a counter per event kind.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("supplier_onboarding.workflow_events", 1, "kind" => event.kind());

        match &event {
            Event::ManagerDecided {
                initiation_id,
                approved,
            }
            | Event::ProcurementDecided {
                initiation_id,
                approved,
            } => {
                let outcome = if *approved { "approved" } else { "rejected" };
                counter!("supplier_onboarding.approvals_decided", 1, "outcome" => outcome);
                info!(%initiation_id, kind = event.kind(), outcome, "approval decided");
            }
            Event::AiAnalysisFinished {
                job_id,
                supplier_id,
                succeeded,
            } => {
                let outcome = if *succeeded { "completed" } else { "failed" };
                counter!("supplier_onboarding.ai_jobs_finished", 1, "outcome" => outcome);
                info!(%job_id, %supplier_id, outcome, "ai analysis finished");
            }
            Event::RemindersSent { delivered, failed } => {
                counter!("supplier_onboarding.reminders", *delivered as u64, "outcome" => "delivered");
                counter!("supplier_onboarding.reminders", *failed as u64, "outcome" => "failed");
                info!(delivered, failed, "reminder sweep finished");
            }
            other => info!(event = ?other, "workflow event"),
        }
    }

    info!("Event channel closed; event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_tolerates_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        sender.send_or_log(Event::InitiationDeleted(Uuid::nil())).await;
        assert!(sender
            .send(Event::InitiationDeleted(Uuid::nil()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn processor_drains_until_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(process_events(rx));
        let sender = EventSender::new(tx);
        sender
            .send(Event::ManagerDecided {
                initiation_id: Uuid::new_v4(),
                approved: true,
            })
            .await
            .unwrap();
        drop(sender);
        handle.await.unwrap();
    }
}
