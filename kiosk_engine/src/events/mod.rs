mod bus;
mod event_types;

pub use bus::{EventBus, EventHandlerFn, EventPublisher};
pub use event_types::*;
