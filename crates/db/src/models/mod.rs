//! Row types for every table, one module per table.
//!
//! Enum-like columns are stored as `TEXT`; converting a row into its core
//! record parses them and reports unknown values as corrupt data.

pub mod completed_event;
pub mod event;
pub mod profile;
pub mod task;

use habitquest_core::store::StoreError;

/// Parse a `TEXT` column into a core enum.
pub(crate) fn parse_column<T: std::str::FromStr>(
    column: &'static str,
    value: &str,
) -> Result<T, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("{column} has unexpected value '{value}'")))
}
