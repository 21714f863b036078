//! Audit notifications.
//!
//! Delivery is fire-and-forget: a failed notification is logged and never
//! blocks or rolls back the claim or audit state that triggered it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use offset_claims::AuditVerdict;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Error delivering a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Outbound notification collaborator.
#[async_trait]
pub trait AuditNotifier: Send + Sync {
    /// Notifier name for logs.
    fn name(&self) -> &str;

    /// An audit was scheduled for a claim.
    async fn notify_audit_scheduled(
        &self,
        claim_ref: &str,
        due_date: DateTime<Utc>,
    ) -> Result<(), NotifyError>;

    /// An audit completed.
    async fn notify_audit_result(
        &self,
        claim_ref: &str,
        result: AuditVerdict,
        corrective_actions: Option<&str>,
    ) -> Result<(), NotifyError>;
}

/// Notifier that writes structured log events.
pub struct TracingNotifier;

#[async_trait]
impl AuditNotifier for TracingNotifier {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn notify_audit_scheduled(
        &self,
        claim_ref: &str,
        due_date: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        info!(claim_id = %claim_ref, due_date = %due_date, "Audit scheduled notification");
        Ok(())
    }

    async fn notify_audit_result(
        &self,
        claim_ref: &str,
        result: AuditVerdict,
        corrective_actions: Option<&str>,
    ) -> Result<(), NotifyError> {
        info!(
            claim_id = %claim_ref,
            result = %result,
            corrective_actions = corrective_actions.unwrap_or(""),
            "Audit result notification"
        );
        Ok(())
    }
}

/// Sends notifications on background tasks.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn AuditNotifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn AuditNotifier>) -> Self {
        Self { notifier }
    }

    /// Send an audit-scheduled notification without waiting for it.
    pub fn audit_scheduled(&self, claim_ref: String, due_date: DateTime<Utc>) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify_audit_scheduled(&claim_ref, due_date).await {
                warn!(
                    notifier = notifier.name(),
                    claim_id = %claim_ref,
                    error = %e,
                    "Failed to send audit scheduled notification"
                );
            }
        })
    }

    /// Send an audit-result notification without waiting for it.
    pub fn audit_result(
        &self,
        claim_ref: String,
        result: AuditVerdict,
        corrective_actions: Option<String>,
    ) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier
                .notify_audit_result(&claim_ref, result, corrective_actions.as_deref())
                .await
            {
                warn!(
                    notifier = notifier.name(),
                    claim_id = %claim_ref,
                    error = %e,
                    "Failed to send audit result notification"
                );
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Notification observed by [`RecordingNotifier`].
    #[derive(Debug, Clone, PartialEq)]
    pub enum Sent {
        Scheduled { claim_ref: String, due_date: DateTime<Utc> },
        Result { claim_ref: String, result: AuditVerdict, corrective_actions: Option<String> },
    }

    /// Records every notification; optionally fails each delivery.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<Sent>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuditNotifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn notify_audit_scheduled(
            &self,
            claim_ref: &str,
            due_date: DateTime<Utc>,
        ) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(Sent::Scheduled {
                claim_ref: claim_ref.to_string(),
                due_date,
            });
            if self.fail {
                return Err(NotifyError::Delivery("smtp down".into()));
            }
            Ok(())
        }

        async fn notify_audit_result(
            &self,
            claim_ref: &str,
            result: AuditVerdict,
            corrective_actions: Option<&str>,
        ) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(Sent::Result {
                claim_ref: claim_ref.to_string(),
                result,
                corrective_actions: corrective_actions.map(str::to_string),
            });
            if self.fail {
                return Err(NotifyError::Delivery("smtp down".into()));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn test_dispatch_delivers() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = NotificationDispatcher::new(notifier.clone());
        let due = Utc::now();

        dispatcher.audit_scheduled("c1".into(), due).await.unwrap();
        dispatcher
            .audit_result("c1".into(), AuditVerdict::Failed, Some("resubmit".into()))
            .await
            .unwrap();

        assert_eq!(
            notifier.sent(),
            vec![
                Sent::Scheduled { claim_ref: "c1".into(), due_date: due },
                Sent::Result {
                    claim_ref: "c1".into(),
                    result: AuditVerdict::Failed,
                    corrective_actions: Some("resubmit".into()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_delivery_failure_is_contained() {
        let dispatcher = NotificationDispatcher::new(Arc::new(RecordingNotifier::failing()));
        // The task completes normally even though delivery failed.
        assert!(dispatcher.audit_scheduled("c1".into(), Utc::now()).await.is_ok());
    }
}
