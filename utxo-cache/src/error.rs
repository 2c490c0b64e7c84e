//! Internal error types.
//!
//! Nothing here is exposed on the registry's public API (see `SPEC_FULL.md` §7: the data
//! plane has no recoverable errors at the boundary). Handle resolution is still modeled as a
//! typed `Result` internally, in keeping with how the rest of this codebase handles failure,
//! and collapsed to the spec's silent no-op / `-1` contract at each public method.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum HandleError {
    #[error("handle {0} out of range 0..256")]
    OutOfRange(i32),
    #[error("handle {0} has no cache assigned")]
    Empty(i32),
}
