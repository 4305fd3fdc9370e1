use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub user_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_session_id: Option<String>,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum OrderStatus {
    Created,
    Paid,
}

impl Order {
    pub fn new(user_id: Uuid, amount: f64, currency: String, now: DateTime<Utc>) -> Self {
        Self {
            id: order_id_for(user_id, now),
            user_id,
            amount,
            currency,
            status: OrderStatus::Created,
            payment_session_id: None,
            reference_id: None,
            created_at: now,
            paid_at: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == OrderStatus::Paid
    }
}

/// Gateway order id: `order_<unix-millis>_<user-id>`.
pub fn order_id_for(user_id: Uuid, now: DateTime<Utc>) -> String {
    format!("order_{}_{}", now.timestamp_millis(), user_id)
}
