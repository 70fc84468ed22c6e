use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ExistenceCheck, SetOptions};
use tracing::{info, instrument, warn};

use crate::models::{Order, OrderId, OrderPage, PageRequest, RepositoryError, RepositoryResult};

use super::OrderRepository;

/// Index set holding the keys of all live orders, used only for enumeration.
const INDEX_KEY: &str = "orders";

/// Redis implementation of the OrderRepository trait. Each order is stored
/// denormalized as one JSON blob (line items embedded) under `order:<id>`,
/// with membership tracked in the `orders` index set. Blob and index are kept
/// consistent with MULTI/EXEC pipelines.
pub struct RedisOrderRepository {
    // Cheap cloneable handle over one multiplexed connection; safe for
    // concurrent in-flight calls.
    connection: MultiplexedConnection,
}

fn order_key(id: OrderId) -> String {
    format!("order:{id}")
}

impl RedisOrderRepository {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }

    /// Serialize an order into its stored blob form.
    fn encode(order: &Order) -> RepositoryResult<String> {
        Ok(serde_json::to_string(order)?)
    }

    /// Decode a stored blob. An undecodable payload is a corrupt record and
    /// aborts the read.
    fn decode(blob: &str) -> RepositoryResult<Order> {
        Ok(serde_json::from_str(blob)?)
    }
}

#[async_trait]
impl OrderRepository for RedisOrderRepository {
    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    async fn insert(&self, order: &Order) -> RepositoryResult<()> {
        let key = order_key(order.order_id);
        let data = Self::encode(order)?;
        let mut conn = self.connection.clone();

        // SETNX and SADD submitted as one MULTI/EXEC batch. On a duplicate id
        // the SETNX leaves the existing blob untouched and the SADD is a
        // no-op, because the key was already a member of the index set.
        let (created, _added): (bool, i64) = redis::pipe()
            .atomic()
            .set_nx(&key, &data)
            .sadd(INDEX_KEY, &key)
            .query_async(&mut conn)
            .await?;

        if !created {
            warn!("Insert rejected, order already exists");
            return Err(RepositoryError::Conflict { id: order.order_id });
        }

        info!("Order inserted");
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn find_by_id(&self, id: OrderId) -> RepositoryResult<Order> {
        let mut conn = self.connection.clone();

        let blob: Option<String> = conn.get(order_key(id)).await?;
        let blob = blob.ok_or(RepositoryError::NotFound { id })?;

        Self::decode(&blob)
    }

    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    async fn update(&self, order: &Order) -> RepositoryResult<()> {
        let key = order_key(order.order_id);
        let data = Self::encode(order)?;
        let mut conn = self.connection.clone();

        // SET XX updates only existing records and replies Nil otherwise.
        let written: Option<String> = conn
            .set_options(
                &key,
                &data,
                SetOptions::default().conditional_set(ExistenceCheck::XX),
            )
            .await?;

        if written.is_none() {
            return Err(RepositoryError::NotFound { id: order.order_id });
        }

        info!("Order updated");
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn delete_by_id(&self, id: OrderId) -> RepositoryResult<()> {
        let key = order_key(id);
        let mut conn = self.connection.clone();

        // DEL and SREM happen-or-neither. A DEL count of 0 means the blob was
        // already absent; the paired SREM removed nothing because an absent
        // blob is never indexed.
        let (deleted, _removed): (i64, i64) = redis::pipe()
            .atomic()
            .del(&key)
            .srem(INDEX_KEY, &key)
            .query_async(&mut conn)
            .await?;

        if deleted == 0 {
            return Err(RepositoryError::NotFound { id });
        }

        info!("Order deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(cursor = %page.cursor, size = %page.size))]
    async fn find_all(&self, page: PageRequest) -> RepositoryResult<OrderPage> {
        let mut conn = self.connection.clone();

        let (cursor, keys): (u64, Vec<String>) = redis::cmd("SSCAN")
            .arg(INDEX_KEY)
            .arg(page.cursor)
            .arg("COUNT")
            .arg(page.size)
            .query_async(&mut conn)
            .await?;

        // An empty scan batch still carries the store's cursor: non-zero
        // means "more to scan", so callers keep going until it reaches 0.
        if keys.is_empty() {
            return Ok(OrderPage {
                orders: Vec::new(),
                cursor,
            });
        }

        let blobs: Vec<Option<String>> = conn.mget(&keys).await?;

        let mut orders = Vec::with_capacity(blobs.len());
        for (key, blob) in keys.iter().zip(blobs) {
            // An indexed key without a blob means blob and index have come
            // apart; abort the whole read rather than return a partial page.
            let blob = blob.ok_or_else(|| RepositoryError::Corrupt {
                message: format!("index entry {key} has no stored order"),
            })?;
            orders.push(Self::decode(&blob)?);
        }

        info!("Found {} orders", orders.len());
        Ok(OrderPage { orders, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LineItem;
    use chrono::{TimeZone, Utc};

    fn sample_order() -> Order {
        Order {
            order_id: 42,
            customer_id: "0af92773-2324-4788-8a07-eaf0a93b8b83".parse().unwrap(),
            line_items: vec![LineItem {
                item_id: "a0fbd434-fca0-40d5-92dc-6ab5a5bac947".parse().unwrap(),
                quantity: 5,
                price: 1999,
            }],
            created_at: Utc.with_ymd_and_hms(2025, 2, 25, 22, 2, 58).unwrap(),
            shipped_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_order_key_derivation() {
        assert_eq!(order_key(42), "order:42");
        assert_eq!(order_key(5195209675646023232), "order:5195209675646023232");
    }

    #[test]
    fn test_blob_round_trip() {
        let order = sample_order();
        let blob = RedisOrderRepository::encode(&order).unwrap();
        let decoded = RedisOrderRepository::decode(&blob).unwrap();

        assert_eq!(decoded, order);
    }

    #[test]
    fn test_blob_omits_absent_timestamps() {
        let blob = RedisOrderRepository::encode(&sample_order()).unwrap();

        assert!(blob.contains("\"created_at\""));
        assert!(!blob.contains("shipped_at"));
        assert!(!blob.contains("completed_at"));
    }

    #[test]
    fn test_corrupt_blob_is_rejected() {
        let result = RedisOrderRepository::decode("{\"order_id\":");
        match result {
            Err(RepositoryError::Corrupt { .. }) => {}
            other => panic!("Expected Corrupt error, got {other:?}"),
        }
    }
}
