//! Local task-list store: persistent records with a manual rank order,
//! transactional mutations, and live filtered views.

pub mod backend;
mod clock;
pub mod config;
mod emitter;
mod error;
pub mod query;
mod rank;
mod record;
mod store;

pub use backend::{Backend, BackendError, Batch, Change, InMemoryBackend};
#[cfg(feature = "file")]
pub use backend::{Codec, FileBackend};
#[cfg(feature = "sqlite")]
pub use backend::SqliteBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackendConfig, ConfigError, StoreConfig};
pub use emitter::{Emitter, ListenerId};
pub use error::StoreError;
pub use query::{QueryView, ViewChanged, ViewKind, ViewSpec};
pub use rank::RankAssigner;
pub use record::{Category, CategoryColor, Rank, Record, RecordId};
pub use store::{ChangeEvent, ChangeKind, RecordEdit, Snapshot, Store};
