//! Cache purge coordination.
//!
//! Host events come in through [`bindings`], take either the immediate or the
//! debounced path via [`trigger`], and end in one [`orchestrator`] run across
//! the configured [`backends`].

mod lock;

pub mod backends;
pub mod bindings;
pub mod compat;
pub mod diagnostics;
pub mod error;
pub mod jobs;
pub mod object_cache;
pub mod orchestrator;
pub mod scheduler;
pub mod store;
pub mod trigger;

pub use backends::{
    BuilderAssetPurger, CachePurger, LiteSpeedPurger, NullPurger, PurgerKind, ReverseProxyPurger,
};
pub use bindings::{BuilderEventPolicy, DispatchOutcome, EventBindings, HostEvent, UnknownEvent};
pub use compat::{CacheCompatibility, CompatError, CompatibilityRegistry, TriggerCompatibility};
pub use diagnostics::DiagnosticLog;
pub use error::PurgeError;
pub use jobs::{JobQueue, TokioJobQueue};
pub use object_cache::{MemoryObjectCache, ObjectCache};
pub use orchestrator::{PurgeOrchestrator, PurgePath};
pub use scheduler::{DebounceScheduler, ScheduleOutcome};
pub use store::{KeyedStore, MemoryStore};
pub use trigger::PurgeTrigger;
