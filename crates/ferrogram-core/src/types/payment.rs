//! Payment queries.

use serde::{Deserialize, Serialize};

use super::message::User;

/// A shipping address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddress {
    /// Two-letter ISO 3166-1 alpha-2 country code.
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub street_line1: String,
    #[serde(default)]
    pub street_line2: String,
    #[serde(default)]
    pub post_code: String,
}

/// Order information entered by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<ShippingAddress>,
}

/// An incoming shipping query; only for invoices with flexible price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingQuery {
    pub id: String,
    #[serde(default)]
    pub from: User,
    /// Bot-specified invoice payload.
    #[serde(default)]
    pub invoice_payload: String,
    #[serde(default)]
    pub shipping_address: ShippingAddress,
}

/// An incoming pre-checkout query with full checkout information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreCheckoutQuery {
    pub id: String,
    #[serde(default)]
    pub from: User,
    /// ISO 4217 currency code, or `XTR` for Telegram Stars.
    #[serde(default)]
    pub currency: String,
    /// Total price in the smallest units of the currency.
    #[serde(default)]
    pub total_amount: i64,
    #[serde(default)]
    pub invoice_payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_option_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_info: Option<OrderInfo>,
}

/// A user purchased paid media with a bot-specified payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaidMediaPurchased {
    #[serde(default)]
    pub from: User,
    #[serde(default)]
    pub paid_media_payload: String,
}
