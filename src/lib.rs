// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod agent;
pub mod config;
pub mod deliver;
pub mod digest;
pub mod error;
pub mod session;

// ---- Re-exports for stable public API ----
pub use crate::agent::{AgentClient, AgentError, AgentReply};
pub use crate::deliver::{deliver, split_message, DeliveryChannel, MAX_MESSAGE_LEN};
pub use crate::digest::scheduler::{DigestScheduler, ScheduleConfig};
pub use crate::digest::{DigestOutcome, DigestPipeline};
pub use crate::error::DigestError;
pub use crate::session::SessionStore;
