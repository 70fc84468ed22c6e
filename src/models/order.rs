use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order identifier. Randomly generated at creation, unique, immutable.
pub type OrderId = i64;

/// Core order model. Line items are set at creation and only ever removed
/// together with the order itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub customer_id: Uuid,
    pub line_items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A single line of an order. Price is in minor currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_id: Uuid,
    pub quantity: u32,
    pub price: u32,
}

/// Request model for creating a new order
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

/// Request model for advancing an order's status
#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatusUpdate {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Shipped,
    Completed,
}

/// A bounded page request. `cursor` is the opaque continuation token from a
/// previous page, 0 for the first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub size: u32,
    pub cursor: u64,
}

/// One page of orders. A cursor of 0 means enumeration is complete; any other
/// value must be passed back to continue, even when `orders` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub cursor: u64,
}

impl Order {
    /// Create a new Order with a generated ID and a UTC creation timestamp.
    /// Status timestamps start absent.
    pub fn new(request: CreateOrderRequest) -> Self {
        Self {
            order_id: rand::thread_rng().gen_range(1..=OrderId::MAX),
            customer_id: request.customer_id,
            line_items: request.line_items,
            created_at: Utc::now(),
            shipped_at: None,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

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
    fn test_serialized_shape_omits_absent_timestamps() {
        let order = sample_order();
        let json = serde_json::to_value(&order).unwrap();

        assert_eq!(json["order_id"], 42);
        assert_eq!(json["customer_id"], "0af92773-2324-4788-8a07-eaf0a93b8b83");
        assert_eq!(json["line_items"][0]["quantity"], 5);
        assert_eq!(json["line_items"][0]["price"], 1999);
        assert_eq!(json["created_at"], "2025-02-25T22:02:58Z");
        assert!(json.get("shipped_at").is_none());
        assert!(json.get("completed_at").is_none());
    }

    #[test]
    fn test_round_trip_preserves_optional_timestamps() {
        let mut order = sample_order();
        order.shipped_at = Some(Utc.with_ymd_and_hms(2025, 2, 26, 8, 0, 0).unwrap());

        let json = serde_json::to_string(&order).unwrap();
        let decoded: Order = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, order);
        assert!(decoded.completed_at.is_none());
    }

    #[test]
    fn test_new_order_has_no_status_timestamps() {
        let order = Order::new(CreateOrderRequest {
            customer_id: Uuid::new_v4(),
            line_items: vec![],
        });

        assert!(order.order_id > 0);
        assert!(order.shipped_at.is_none());
        assert!(order.completed_at.is_none());
    }

    #[test]
    fn test_create_request_defaults_line_items() {
        let request: CreateOrderRequest = serde_json::from_str(
            r#"{"customer_id":"0af92773-2324-4788-8a07-eaf0a93b8b83"}"#,
        )
        .unwrap();

        assert!(request.line_items.is_empty());
    }

    #[test]
    fn test_status_parses_lowercase() {
        let update: OrderStatusUpdate =
            serde_json::from_str(r#"{"status":"shipped"}"#).unwrap();
        assert_eq!(update.status, OrderStatus::Shipped);

        let bad = serde_json::from_str::<OrderStatusUpdate>(r#"{"status":"paid"}"#);
        assert!(bad.is_err());
    }
}
