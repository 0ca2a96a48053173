//! Inference gateway common types
//!
//! Shared by the gateway and the model servers: wire names, the request
//! parameter extractor, notification queues and time formatting.

pub mod envelope;
pub mod notification;
pub mod params;
pub mod protocol;
pub mod timefmt;

pub use notification::{group_by_call, Notification, NotificationQueue};
pub use params::ApiParams;
pub use protocol::PathsResponse;
