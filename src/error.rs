use thiserror::Error;

use crate::core::CoreError;
use crate::store::StoreError;

/// Crate-level convenience error.
///
/// Not a "god error": it is a thin wrapper over the component errors.
/// Business-rule violations never travel this path; they are returned as
/// error-string arrays inside responses.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
