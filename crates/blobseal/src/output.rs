//! Terminal output utilities
//!
//! Stdout is reserved for checkpoint events, the final status line and a
//! generated key; everything else goes to stderr.

use console::style;
use std::io::Write;

/// Final status line of a successful run
pub const COMPLETED: &str = "Process completed successfully";

/// Final status line of a failed run
pub const FAILED: &str = "Process failed";

/// Print a status line on stdout
pub fn status(msg: &str) {
    write_status(&mut std::io::stdout().lock(), msg);
}

/// Write a status line to `out`; a closed stream is not an error
pub fn write_status(out: &mut impl Write, msg: &str) {
    let _ = writeln!(out, "{}", msg);
}

/// Print a success message
pub fn success(msg: &str) {
    eprintln!("{} {}", style("✓").green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    eprintln!("  {}: {}", style(key).dim(), value);
}
