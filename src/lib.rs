//! Thing Shadow - synchronized snapshot of independently updating things
//!
//! Keeps a full shadow of every public thing, batches their changes into a
//! delta shadow, and raises debounced `ShadowChanged` / `ShadowPublishing`
//! notifications. Externally supplied state documents are routed back into
//! the things through the same shadow.

pub mod config;
pub mod paths;
pub mod registry;
pub mod shadow;

pub use config::{AppConfig, ShadowConfig, ThingConfig};
pub use registry::{InMemoryRegistry, ThingListener, ThingRegistry};
pub use shadow::{ShadowActor, ShadowEngine, ShadowError, ShadowHandle};
