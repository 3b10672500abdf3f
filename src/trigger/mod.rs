//! # Trigger Module
//!
//! In-process, fire-and-forget topics feeding background workers.

pub mod achievement;
pub mod errors;
pub mod mailer;
pub mod topic;

pub use achievement::{ActivityEvent, AchievementTrigger, CHECK_ACHIEVED_CHALLENGE};
pub use errors::{TriggerError, TriggerResult};
pub use mailer::{ActivationReq, ActivationTrigger, Mailer, RecordingMailer, ACTIVATION_EMAIL};
pub use topic::{spawn_topic, HandlerError, Publisher, TopicHandler, WorkerStats};
