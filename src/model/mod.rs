//! Entity types held in the four collections, the whole-database
//! import/export schema, and invoice arithmetic.
//!
//! Field names serialize in camelCase where the application's historical
//! export files use it, so an export produced here round-trips with data
//! written by earlier versions of the tool.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access level attached to a [`User`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Team,
}

/// An application operator, keyed by email in the `users` collection.
///
/// The password is stored and compared in plain text; that is the format
/// every existing store already contains, and changing it here would
/// invalidate them all.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

/// A customer record. Ids are assigned by the caller at creation time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
}

/// Billing state of an [`Invoice`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Final,
}

/// A stored invoice.
///
/// `customer_id` is a soft reference: nothing checks that the customer
/// exists, and consumers render a dangling reference as "unknown".
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub customer_id: String,
    pub total: f64,
    pub created_at: DateTime<Utc>,
    pub status: InvoiceStatus,
}

/// A named permission set.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub permissions: Vec<String>,
}

/// A single line item on an invoice being drafted.
///
/// Line items live on the editing surface; only the computed total is kept
/// on the stored [`Invoice`] record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub id: String,
    pub image_url: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub weight: f64,
    pub link: String,
}

/// Sum of quantity × unit price across `items`.
pub fn subtotal(items: &[InvoiceItem]) -> f64 {
    items
        .iter()
        .map(|item| f64::from(item.quantity) * item.unit_price)
        .sum()
}

/// Invoice total: subtotal, plus a percentage fee on the subtotal, plus flat
/// transport and customs charges.
pub fn invoice_total(items: &[InvoiceItem], fees_percent: f64, transport_and_customs: f64) -> f64 {
    let sub = subtotal(items);
    sub + sub * (fees_percent / 100.0) + transport_and_customs
}

/// Total piece count across `items`.
pub fn total_quantity(items: &[InvoiceItem]) -> u32 {
    items.iter().map(|item| item.quantity).sum()
}

/// Millisecond-clock entity id, the application's historical format.
/// Uniqueness is best-effort only.
pub fn time_based_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .to_string()
}

/// The whole-database import/export document.
///
/// Exactly four top-level fields; a field is `null` when its collection was
/// never initialized. Import rejects anything that does not match this
/// shape, unknown fields included.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExportPayload {
    pub users: Option<HashMap<String, User>>,
    pub customers: Option<Vec<Customer>>,
    pub invoices: Option<Vec<Invoice>>,
    pub roles: Option<Vec<Role>>,
}
