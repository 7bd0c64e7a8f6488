//! tender-registry — tracks waterfall runs by (lane, load).
//!
//! The `RunRegistry` owns every active `WaterfallRunner` and enforces that
//! at most one non-terminal run exists per lane/load pair. Finished runs
//! are archived when the host ends them.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher (Arc<RwLock<..>>, background tick loop, injected Clock)
//!   └── RunRegistry
//!       ├── active: RunKey → slot { generation, WaterfallRunner }
//!       └── archived: finished runs awaiting collection
//! ```
//!
//! The registry itself is not synchronized. Multithreaded hosts either
//! wrap it themselves or use the `Dispatcher`.

pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod snapshot;

pub use dispatcher::Dispatcher;
pub use error::{RegistryError, RegistryResult};
pub use registry::{ArchivedRun, RunHandle, RunKey, RunRegistry};
pub use snapshot::{RegistrySnapshot, RunSnapshot};
