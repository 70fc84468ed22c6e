use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{FromRow, Row};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    LineItem, Order, OrderId, OrderPage, PageRequest, RepositoryError, RepositoryResult,
};

use super::OrderRepository;

/// Postgres implementation of the OrderRepository trait. Orders are
/// normalized into two tables joined on the order id:
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS orders (
///     order_id     BIGINT PRIMARY KEY,
///     customer_id  UUID NOT NULL,
///     created_at   TIMESTAMPTZ NOT NULL,
///     shipped_at   TIMESTAMPTZ,
///     completed_at TIMESTAMPTZ
/// );
/// CREATE TABLE IF NOT EXISTS line_items (
///     item_id  UUID PRIMARY KEY,
///     order_id BIGINT NOT NULL REFERENCES orders (order_id),
///     quantity BIGINT NOT NULL,
///     price    BIGINT NOT NULL
/// );
/// ```
///
/// Multi-row writes run inside database transactions; a transaction dropped
/// on any error path (including cancellation) is rolled back by the pool.
pub struct PostgresOrderRepository {
    pool: PgPool,
}

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS orders (
    order_id     BIGINT PRIMARY KEY,
    customer_id  UUID NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL,
    shipped_at   TIMESTAMPTZ,
    completed_at TIMESTAMPTZ
);
CREATE TABLE IF NOT EXISTS line_items (
    item_id  UUID PRIMARY KEY,
    order_id BIGINT NOT NULL REFERENCES orders (order_id),
    quantity BIGINT NOT NULL,
    price    BIGINT NOT NULL
);";

/// One flat row of the paginated orders/line-items join. Line-item columns
/// are nullable because orders without items still produce one row.
#[derive(Debug, FromRow)]
struct JoinedRow {
    order_id: i64,
    customer_id: Uuid,
    created_at: DateTime<Utc>,
    shipped_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    item_id: Option<Uuid>,
    quantity: Option<i64>,
    price: Option<i64>,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the two order tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> RepositoryResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

fn to_count(value: i64, field: &str, id: OrderId) -> RepositoryResult<u32> {
    u32::try_from(value).map_err(|_| RepositoryError::Corrupt {
        message: format!("order {id}: {field} {value} outside the valid range"),
    })
}

fn line_item_from_row(row: &sqlx::postgres::PgRow, id: OrderId) -> RepositoryResult<LineItem> {
    Ok(LineItem {
        item_id: row.try_get("item_id")?,
        quantity: to_count(row.try_get("quantity")?, "quantity", id)?,
        price: to_count(row.try_get("price")?, "price", id)?,
    })
}

/// Fold the flat join rows back into orders. Rows arrive ordered by order id;
/// a change of id marks an order boundary.
fn fold_rows(rows: Vec<JoinedRow>) -> RepositoryResult<Vec<Order>> {
    let mut orders: Vec<Order> = Vec::new();

    for row in rows {
        if orders.last().map(|o| o.order_id) != Some(row.order_id) {
            orders.push(Order {
                order_id: row.order_id,
                customer_id: row.customer_id,
                line_items: Vec::new(),
                created_at: row.created_at,
                shipped_at: row.shipped_at,
                completed_at: row.completed_at,
            });
        }

        if let (Some(item_id), Some(order)) = (row.item_id, orders.last_mut()) {
            let (quantity, price) = match (row.quantity, row.price) {
                (Some(quantity), Some(price)) => (quantity, price),
                _ => {
                    return Err(RepositoryError::Corrupt {
                        message: format!("line item {item_id} is missing quantity or price"),
                    })
                }
            };

            order.line_items.push(LineItem {
                item_id,
                quantity: to_count(quantity, "quantity", order.order_id)?,
                price: to_count(price, "price", order.order_id)?,
            });
        }
    }

    Ok(orders)
}

/// Continuation cursor for a fetched page. A short page is the last one; a
/// full page hands out the highest id seen so the next call resumes after it.
fn next_cursor(orders: &[Order], size: u32) -> u64 {
    if (orders.len() as u64) < u64::from(size) {
        0
    } else {
        orders.last().map_or(0, |o| o.order_id as u64)
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    async fn insert(&self, order: &Order) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO orders (order_id, customer_id, created_at, shipped_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(order.order_id)
        .bind(order.customer_id)
        .bind(order.created_at)
        .bind(order.shipped_at)
        .bind(order.completed_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            if let sqlx::Error::Database(ref db_err) = err {
                if db_err.is_unique_violation() {
                    warn!("Insert rejected, order already exists");
                    return Err(RepositoryError::Conflict { id: order.order_id });
                }
            }
            return Err(err.into());
        }

        for item in &order.line_items {
            sqlx::query(
                "INSERT INTO line_items (item_id, order_id, quantity, price) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(item.item_id)
            .bind(order.order_id)
            .bind(i64::from(item.quantity))
            .bind(i64::from(item.price))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|err| RepositoryError::TransactionFailed {
                message: err.to_string(),
            })?;

        info!("Order inserted with {} line items", order.line_items.len());
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn find_by_id(&self, id: OrderId) -> RepositoryResult<Order> {
        // Line items are a one-to-many relation, not embedded, so fetching
        // one order takes two round trips.
        let item_rows = sqlx::query(
            "SELECT item_id, quantity, price FROM line_items WHERE order_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut line_items = Vec::with_capacity(item_rows.len());
        for row in &item_rows {
            line_items.push(line_item_from_row(row, id)?);
        }

        let order_row = sqlx::query(
            "SELECT customer_id, created_at, shipped_at, completed_at \
             FROM orders WHERE order_id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound { id },
            other => other.into(),
        })?;

        Ok(Order {
            order_id: id,
            customer_id: order_row.try_get("customer_id")?,
            line_items,
            created_at: order_row.try_get("created_at")?,
            shipped_at: order_row.try_get("shipped_at")?,
            completed_at: order_row.try_get("completed_at")?,
        })
    }

    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    async fn update(&self, order: &Order) -> RepositoryResult<()> {
        // Only the status timestamps are mutable; identity, line items and
        // created_at stay whatever they were at insert.
        let result = sqlx::query(
            "UPDATE orders SET shipped_at = $2, completed_at = $3 WHERE order_id = $1",
        )
        .bind(order.order_id)
        .bind(order.shipped_at)
        .bind(order.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { id: order.order_id });
        }

        info!("Order updated");
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn delete_by_id(&self, id: OrderId) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        // Child rows first to respect the foreign key.
        sqlx::query("DELETE FROM line_items WHERE order_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM orders WHERE order_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back the line-item delete.
            return Err(RepositoryError::NotFound { id });
        }

        tx.commit()
            .await
            .map_err(|err| RepositoryError::TransactionFailed {
                message: err.to_string(),
            })?;

        info!("Order deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(cursor = %page.cursor, size = %page.size))]
    async fn find_all(&self, page: PageRequest) -> RepositoryResult<OrderPage> {
        // Keyset pagination: the cursor is the last order id of the previous
        // page, so pages stay stable under concurrent mutation. A cursor past
        // the id domain simply yields the terminal empty page.
        let after = i64::try_from(page.cursor).unwrap_or(i64::MAX);

        let rows: Vec<JoinedRow> = sqlx::query_as(
            "SELECT o.order_id, o.customer_id, o.created_at, o.shipped_at, o.completed_at, \
                    li.item_id, li.quantity, li.price \
             FROM (SELECT * FROM orders WHERE order_id > $1 ORDER BY order_id LIMIT $2) o \
             LEFT JOIN line_items li ON li.order_id = o.order_id \
             ORDER BY o.order_id",
        )
        .bind(after)
        .bind(i64::from(page.size))
        .fetch_all(&self.pool)
        .await?;

        let orders = fold_rows(rows)?;
        let cursor = next_cursor(&orders, page.size);

        info!("Found {} orders", orders.len());
        Ok(OrderPage { orders, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(order_id: i64, item: Option<(&str, i64, i64)>) -> JoinedRow {
        JoinedRow {
            order_id,
            customer_id: "0af92773-2324-4788-8a07-eaf0a93b8b83".parse().unwrap(),
            created_at: Utc.with_ymd_and_hms(2025, 2, 25, 22, 2, 58).unwrap(),
            shipped_at: None,
            completed_at: None,
            item_id: item.map(|(id, _, _)| id.parse().unwrap()),
            quantity: item.map(|(_, q, _)| q),
            price: item.map(|(_, _, p)| p),
        }
    }

    #[test]
    fn test_fold_groups_consecutive_rows_by_order_id() {
        let rows = vec![
            row(1, Some(("a0fbd434-fca0-40d5-92dc-6ab5a5bac947", 5, 1999))),
            row(1, Some(("3d5d6e4e-d404-4e9a-82ff-f8ae9af479e0", 3, 2000))),
            row(2, Some(("b7764a22-143a-4fe7-bd1d-cc1d0e701d41", 2, 3))),
        ];

        let orders = fold_rows(rows).unwrap();

        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].order_id, 1);
        assert_eq!(orders[0].line_items.len(), 2);
        assert_eq!(orders[0].line_items[1].quantity, 3);
        assert_eq!(orders[1].order_id, 2);
        assert_eq!(orders[1].line_items.len(), 1);
        assert_eq!(orders[1].line_items[0].price, 3);
    }

    #[test]
    fn test_fold_keeps_orders_without_line_items() {
        let rows = vec![
            row(7, None),
            row(9, Some(("a0fbd434-fca0-40d5-92dc-6ab5a5bac947", 1, 100))),
        ];

        let orders = fold_rows(rows).unwrap();

        assert_eq!(orders.len(), 2);
        assert!(orders[0].line_items.is_empty());
        assert_eq!(orders[1].line_items.len(), 1);
    }

    #[test]
    fn test_fold_of_no_rows_is_empty() {
        assert!(fold_rows(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_fold_rejects_inconsistent_line_item_row() {
        let mut bad = row(1, Some(("a0fbd434-fca0-40d5-92dc-6ab5a5bac947", 5, 1999)));
        bad.price = None;

        match fold_rows(vec![bad]) {
            Err(RepositoryError::Corrupt { .. }) => {}
            other => panic!("Expected Corrupt error, got {other:?}"),
        }
    }

    #[test]
    fn test_fold_rejects_out_of_range_quantity() {
        let rows = vec![row(
            1,
            Some(("a0fbd434-fca0-40d5-92dc-6ab5a5bac947", -1, 1999)),
        )];

        match fold_rows(rows) {
            Err(RepositoryError::Corrupt { .. }) => {}
            other => panic!("Expected Corrupt error, got {other:?}"),
        }
    }

    fn orders_with_ids(ids: &[i64]) -> Vec<Order> {
        fold_rows(ids.iter().map(|&id| row(id, None)).collect()).unwrap()
    }

    #[test]
    fn test_next_cursor_of_full_page_is_last_order_id() {
        let orders = orders_with_ids(&[3, 8, 21]);

        assert_eq!(next_cursor(&orders, 3), 21);
    }

    #[test]
    fn test_next_cursor_of_short_page_is_terminal() {
        let orders = orders_with_ids(&[3, 8]);

        assert_eq!(next_cursor(&orders, 3), 0);
    }

    #[test]
    fn test_next_cursor_of_empty_result_is_terminal() {
        assert_eq!(next_cursor(&[], 3), 0);
    }
}
