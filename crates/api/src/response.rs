//! Shared response envelope types for API handlers.
//!
//! Resource endpoints answer `{ "data": ... }`. The settlement endpoint keeps
//! its own flat shape.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
