use thiserror::Error;

/// Failure modes for [`super::IndexedOrderBook`] construction and updates.
#[derive(Error, Clone, Copy, PartialEq, Eq, Debug)]
pub enum BookError {
    #[error("tick size must be a positive integer number of raw units")]
    InvalidTickSize,
    /// A `DELTA` or `SNAPSHOT` level's price does not fall on the tick
    /// grid within `max_levels` of the base. Fatal — the caller must
    /// surface this, never silently drop the update.
    #[error("book update price falls outside the configured tick grid")]
    PriceOutsideGrid,
}
