//! Object storage for blobseal
//!
//! [`ObjectStore`] is the capability the stages use to read and write whole
//! objects and to replace their user metadata under a metageneration
//! precondition. Two backends implement it:
//!
//! - [`GcsObjectStore`]: Cloud Storage JSON API over `reqwest`
//! - [`LocalObjectStore`]: a directory tree with JSON metadata sidecars
//!
//! [`naming`] builds the `data/<YYYYMMDD>/<base>.<suffix>` object names.

pub mod gcs;
pub mod local;
pub mod naming;
pub mod traits;

pub use gcs::GcsObjectStore;
pub use local::LocalObjectStore;
pub use naming::{object_base, object_name, work_file};
pub use traits::{Metadata, ObjectInfo, ObjectStore, StorageError, StorageResult};
