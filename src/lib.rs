//! AI-optimized, priority-routed task queue core library.
//!
//! Five components compose the graded core (spec §2): the Prediction
//! Client (`prediction_client`), the Routing Engine (`routing`), the
//! Publisher (`publisher`), the Consumer Pool (`consumer`), and the
//! Training Reporter (`training`). `platform` and `internal_api` wire
//! those into runnable services and are ambient, not core.

pub mod autotask;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod destinations;
pub mod error;
pub mod features;
pub mod internal_api;
pub mod metrics;
pub mod platform;
pub mod prediction_client;
pub mod predictions;
pub mod publisher;
pub mod routing;
pub mod task;
pub mod trace;
pub mod training;

pub use destinations::Destination;
pub use features::Features;
pub use predictions::Predictions;
pub use routing::{RoutingDecision, RoutingEngine};
pub use task::{Task, TaskType};
