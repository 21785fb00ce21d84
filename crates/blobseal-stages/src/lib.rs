//! Encrypt and decrypt stages for blobseal
//!
//! Each stage is a linear run over injected capabilities (object store, key
//! source, log sink) and stops at the first failure:
//!
//! ```text
//! START -> OBJECT_NAMED -> KEY_FETCHED -> TRANSFORMED -> COMPLETE
//! ```
//!
//! Every checkpoint emits one structured [`LogEvent`] carrying the run's
//! correlation labels from its [`RunContext`].

pub mod context;
pub mod decrypt;
pub mod encrypt;
pub mod error;
pub mod event;
pub mod logging;

pub use context::RunContext;
pub use decrypt::DecryptStage;
pub use encrypt::EncryptStage;
pub use error::{NamingError, Phase, StageError, TransformError};
pub use event::{EventError, StorageEvent};
pub use logging::{
    CheckpointLogger, CloudLoggingFactory, CloudLoggingSink, FixedSink, LogEvent, LogLabels,
    LogSink, LogSinkError, LogSinkFactory, Severity, StdoutJsonSink,
};

/// Metadata key carrying the process correlation identifier
pub const PROCESS_ID_KEY: &str = "process_id";

/// Metadata key carrying the caller-supplied job name
pub const JOB_NAME_KEY: &str = "job_name";

/// Metadata key marking an output whose metadata has not landed yet
pub const STATE_KEY: &str = "blobseal-state";

/// Value of [`STATE_KEY`] between the content write and the metadata patch
pub const METADATA_PENDING: &str = "metadata-pending";

/// Process exit code of a successful run
pub const EXIT_SUCCESS: i32 = 1;

/// Process exit code of a failed run
pub const EXIT_FAILURE: i32 = -1;

/// Exit code for a stage result
pub fn exit_code<T>(result: &Result<T, StageError>) -> i32 {
    match result {
        Ok(_) => EXIT_SUCCESS,
        Err(_) => EXIT_FAILURE,
    }
}
