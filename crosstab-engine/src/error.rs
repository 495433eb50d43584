//! Engine error types.

use thiserror::Error;

/// Errors surfaced by the engine. Generation itself never fails: bad
/// data groups as blank and broken measures resolve to 0 with a logged
/// warning. Only asking the dataset cache for data it does not hold is
/// a hard error, since there is nothing sensible to render instead.
#[derive(Debug, Error)]
pub enum PivotError {
    #[error("no cached dataset under id '{0}'")]
    NoCachedData(String),
}
