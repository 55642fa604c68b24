//! File naming, rooted at the database directory:
//!
//! ```text
//! <dbname>/CURRENT            ASCII number of the active manifest
//! <dbname>/MANIFEST-<n>       encoded version snapshot
//! <dbname>/<n>.ldb            table file
//! <dbname>-<n>.dbtmp          transient, only for the CURRENT swap
//! ```

use std::path::{Path, PathBuf};

pub(crate) fn table_file_name(name: &Path, number: u64) -> PathBuf {
    name.join(format!("{number:06}.ldb"))
}

pub(crate) fn descriptor_file_name(name: &Path, number: u64) -> PathBuf {
    name.join(format!("MANIFEST-{number:06}"))
}

pub(crate) fn current_file_name(name: &Path) -> PathBuf {
    name.join("CURRENT")
}

pub(crate) fn temp_file_name(name: &Path, number: u64) -> PathBuf {
    let mut s = name.as_os_str().to_os_string();
    s.push(format!("-{number:06}.dbtmp"));
    PathBuf::from(s)
}
