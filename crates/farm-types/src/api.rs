use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{OrderStatus, Role};

// -- Users --

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: Role,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub avatar: Option<String>,
}

// -- Products --

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub category: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub discount: i64,
    pub image: Option<String>,
    pub seller_id: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub quantity: Option<i64>,
    pub discount: Option<i64>,
    pub image: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub category: Option<String>,
}

// -- Orders --

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub seller_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub total_price: f64,
    #[serde(default)]
    pub status: OrderStatus,
    pub discount_code: Option<String>,
    #[serde(default)]
    pub discount_amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
    pub customer_id: Option<String>,
    pub seller_id: Option<String>,
}

// -- Cart --

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddToCartRequest {
    pub user_id: String,
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartItemRequest {
    pub quantity: i64,
}

// -- Chat --

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    /// Return only the most recent `limit` messages, still oldest first.
    pub limit: Option<u32>,
}

// -- Discount codes --

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateDiscountCodeRequest {
    pub code: String,
    pub discount: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

// -- Misc --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

fn default_true() -> bool {
    true
}

fn default_quantity() -> i64 {
    1
}
