//! # Activation Email Trigger

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::info;

use super::errors::{TriggerError, TriggerResult};
use super::topic::{spawn_topic, HandlerError, Publisher, TopicHandler, WorkerStats};

pub const ACTIVATION_EMAIL: &str = "activation_email";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationReq {
    pub user_id: String,
}

/// Outbound email delivery
pub trait Mailer: Send + Sync + std::fmt::Debug + 'static {
    fn send_activation(&self, req: &ActivationReq) -> Result<(), HandlerError>;
}

#[derive(Debug)]
struct MailerHandler {
    mailer: Arc<dyn Mailer>,
}

impl TopicHandler<ActivationReq> for MailerHandler {
    fn handle(&self, req: ActivationReq) -> Result<(), HandlerError> {
        self.mailer.send_activation(&req)?;
        info!(user_id = %req.user_id, "Activation email sent");
        Ok(())
    }
}

/// Publishing side of the activation email topic
#[derive(Debug, Clone)]
pub struct ActivationTrigger {
    publisher: Publisher<ActivationReq>,
}

impl ActivationTrigger {
    pub fn spawn(mailer: Arc<dyn Mailer>, capacity: usize) -> (Self, JoinHandle<WorkerStats>) {
        let (publisher, worker) =
            spawn_topic(ACTIVATION_EMAIL, capacity, Arc::new(MailerHandler { mailer }));
        (Self { publisher }, worker)
    }

    pub fn trigger_activation(&self, req: ActivationReq) -> TriggerResult<()> {
        if req.user_id.is_empty() {
            return Err(TriggerError::InvalidEvent("user_id is required".into()));
        }
        self.publisher.publish(req)
    }
}

/// Mailer that keeps sent requests in memory
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<ActivationReq>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<ActivationReq> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Mailer for RecordingMailer {
    fn send_activation(&self, req: &ActivationReq) -> Result<(), HandlerError> {
        self.sent
            .lock()
            .map_err(|_| "Lock poisoned")?
            .push(req.clone());
        Ok(())
    }
}
