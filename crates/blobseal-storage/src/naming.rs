//! Object naming
//!
//! Objects land under `data/<run date>/<base>.<suffix>`. The base is the
//! source's final path segment up to its first `.`, so `Orders.2024.csv`
//! becomes `Orders`. The run date is fixed by the caller once per run.

use crate::traits::{StorageError, StorageResult};

/// Prefix shared by every object this system writes
pub const DATA_PREFIX: &str = "data";

/// Final path segment of `source` up to its first `.`
///
/// Accepts local paths and object names alike. Fails when nothing is left.
pub fn object_base(source: &str) -> StorageResult<&str> {
    let file_name = source.rsplit(['/', '\\']).next().unwrap_or(source);
    let base = file_name.split('.').next().unwrap_or(file_name);

    if base.is_empty() {
        return Err(StorageError::InvalidName(format!(
            "cannot derive an object base name from {:?}",
            source
        )));
    }
    Ok(base)
}

/// `data/<run_date>/<base>.<suffix>`
pub fn object_name(run_date: &str, source: &str, suffix: &str) -> StorageResult<String> {
    if run_date.len() != 8 || !run_date.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StorageError::InvalidName(format!(
            "run date {:?} is not YYYYMMDD",
            run_date
        )));
    }

    let base = object_base(source)?;
    Ok(format!("{}/{}/{}.{}", DATA_PREFIX, run_date, base, suffix))
}

/// Lower-cased base name, used as the `work_file` log label
pub fn work_file(source: &str) -> StorageResult<String> {
    object_base(source).map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_base() {
        assert_eq!(object_base("orders.csv").unwrap(), "orders");
        assert_eq!(object_base("/tmp/in/Orders.2024.csv").unwrap(), "Orders");
        assert_eq!(object_base("data/20240315/orders.encrypted").unwrap(), "orders");
        assert_eq!(object_base("C:\\in\\report.txt").unwrap(), "report");
        assert_eq!(object_base("README").unwrap(), "README");
    }

    #[test]
    fn test_object_base_rejects_empty() {
        assert!(object_base("").is_err());
        assert!(object_base(".hidden").is_err());
        assert!(object_base("dir/").is_err());
    }

    #[test]
    fn test_object_name() {
        assert_eq!(
            object_name("20240315", "orders.csv", "encrypted").unwrap(),
            "data/20240315/orders.encrypted"
        );
        assert_eq!(
            object_name("20240316", "data/20240315/orders.encrypted", "txt").unwrap(),
            "data/20240316/orders.txt"
        );
    }

    #[test]
    fn test_object_name_keeps_case() {
        assert_eq!(
            object_name("20240315", "/tmp/Orders.csv", "encrypted").unwrap(),
            "data/20240315/Orders.encrypted"
        );
    }

    #[test]
    fn test_object_name_rejects_bad_run_date() {
        assert!(object_name("2024-03-15", "orders.csv", "txt").is_err());
        assert!(object_name("", "orders.csv", "txt").is_err());
    }

    #[test]
    fn test_work_file() {
        assert_eq!(work_file("/tmp/Orders.2024.csv").unwrap(), "orders");
        assert_eq!(work_file("data/20240315/SALES.encrypted").unwrap(), "sales");
    }
}
