//! Mock workflow notifier.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use lab_orders_core::workflow::{NotifierError, WorkflowNotification, WorkflowNotifier};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// How the mock answers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotifierBehavior {
    /// Accept every notification
    Succeed,
    /// Return this error
    Fail(NotifierError),
    /// Never complete
    Hang,
}

/// [`WorkflowNotifier`] that records calls and answers as configured.
#[derive(Clone, Debug)]
pub struct MockWorkflowNotifier {
    behavior: Arc<Mutex<NotifierBehavior>>,
    calls: Arc<Mutex<Vec<WorkflowNotification>>>,
}

impl MockWorkflowNotifier {
    /// A notifier that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::with_behavior(NotifierBehavior::Succeed)
    }

    /// A notifier with the given behavior.
    #[must_use]
    pub fn with_behavior(behavior: NotifierBehavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Change behavior for subsequent calls.
    pub fn set_behavior(&self, behavior: NotifierBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Every notification received, including failed and hung ones.
    #[must_use]
    pub fn calls(&self) -> Vec<WorkflowNotification> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockWorkflowNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowNotifier for MockWorkflowNotifier {
    fn notify<'a>(
        &'a self,
        notification: &'a WorkflowNotification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifierError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls
                .lock()
                .map_err(|_| NotifierError::Unreachable("mock lock poisoned".into()))?
                .push(notification.clone());

            let behavior = self
                .behavior
                .lock()
                .map_err(|_| NotifierError::Unreachable("mock lock poisoned".into()))?
                .clone();

            match behavior {
                NotifierBehavior::Succeed => Ok(()),
                NotifierBehavior::Fail(err) => Err(err),
                NotifierBehavior::Hang => std::future::pending().await,
            }
        })
    }
}
