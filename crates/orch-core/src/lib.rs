pub mod agent;
pub mod consumer;
pub mod error;
pub mod observer;
pub mod table;

pub use agent::OrchAgent;
pub use consumer::{Consumer, DrainAction};
pub use error::{core_error_from_request_error, CoreError, CoreReason, CoreResult};
pub use observer::{
    NeighborEntry, NeighborUpdate, Observer, ObserverHub, SubjectEvent, SubjectKind,
};
pub use table::{FileProducerTable, MemoryTable, ProducerTable, TableReader};
