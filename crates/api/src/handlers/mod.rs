pub mod events;
pub mod profile;
pub mod settlement;
pub mod tasks;

use habitquest_core::error::CoreError;
use habitquest_core::types::RecordId;

use crate::error::AppError;

/// Parse a client-supplied id, reporting malformed values as invalid input.
pub(crate) fn parse_id(field: &str, raw: &str) -> Result<RecordId, AppError> {
    raw.trim().parse().map_err(|_| {
        AppError::Core(CoreError::InvalidInput(format!(
            "{field} must be a UUID, got '{raw}'"
        )))
    })
}
