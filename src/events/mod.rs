//! Typed publish/subscribe bus shared by the session and its round managers.

pub mod bus;
pub mod types;

pub use bus::{ConnectionStats, EndpointId, EventBus, SubscriptionId};
pub use types::{DenialReason, GameEvent, Topic, TransitionFailure};
