//! Priority-aware consumer scheduler (spec §4.4): one logical consumer per
//! destination, each with destination-specific prefetch, concurrency, and
//! retry discipline.

mod handler;
mod pool;
mod state;

pub use handler::{DestinationHandler, HandlerOutcome, TaskHandler};
pub use pool::ConsumerPool;
pub use state::DeliveryState;
