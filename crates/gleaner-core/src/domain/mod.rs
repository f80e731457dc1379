//! Domain model (tasks, signals, results, records, errors, ids).

pub mod errors;
pub mod ids;
pub mod record;
pub mod result;
pub mod signal;
pub mod task;

pub use errors::{
    CycleError, EngineError, ExtractError, NavigateError, PersistError, SessionError,
    SourceError, StagingError,
};
pub use ids::{CycleId, SessionId};
pub use record::PersistentRecord;
pub use result::{ExtractedPage, ExtractionResult, ExtractionStatus, FieldMap};
pub use signal::{Batch, ControlSignal};
pub use task::{Task, WorkerIdentity};
