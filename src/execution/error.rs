use crate::ids::OrderId;
use thiserror::Error;

/// Failure modes for [`super::SimulatedExecutor`] submission paths. A
/// reject never surfaces as one of these — a reject is a terminal
/// `OrderEvent{status: Rejected}`, not an `Err`. This type covers
/// programmer-visible misuse only (duplicate ids, unknown symbols).
#[derive(Error, Clone, Copy, PartialEq, Eq, Debug)]
#[non_exhaustive]
pub enum ExecutionError {
    #[error("order id {0} already exists")]
    DuplicateOrderId(OrderId),
    #[error("order id {0} not found")]
    OrderNotFound(OrderId),
}
