use async_trait::async_trait;

use crate::models::{Order, OrderId, OrderPage, PageRequest, RepositoryResult};

pub use self::postgres_repository::PostgresOrderRepository;
pub use self::redis_repository::RedisOrderRepository;

mod postgres_repository;
mod redis_repository;

/// Trait defining the interface for order data access operations. Both the
/// key-value and the relational backend satisfy it with identical external
/// semantics; nothing above this seam branches on the active store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist a new order and its line items as one atomic unit. Fails with
    /// `Conflict` if an order with the same id already exists.
    async fn insert(&self, order: &Order) -> RepositoryResult<()>;

    /// Fetch an order with exactly the line items it was created with, all
    /// timestamps in UTC. Fails with `NotFound`.
    async fn find_by_id(&self, id: OrderId) -> RepositoryResult<Order>;

    /// Overwrite the mutable fields (the status timestamps) of an existing
    /// order. Fails with `NotFound`; never creates a record.
    async fn update(&self, order: &Order) -> RepositoryResult<()>;

    /// Remove an order and all of its line items atomically. Fails with
    /// `NotFound`.
    async fn delete_by_id(&self, id: OrderId) -> RepositoryResult<()>;

    /// Return one bounded page of orders plus a continuation cursor. A cursor
    /// of 0 signals completion; callers must keep scanning on any non-zero
    /// cursor even when a page comes back empty.
    async fn find_all(&self, page: PageRequest) -> RepositoryResult<OrderPage>;
}
