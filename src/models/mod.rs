use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Roles a storefront account can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Customer,
}

/// Represents a storefront account. `email` is stored lowercase and backed
/// by a unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// MongoDB document ID.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: String,
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog entry. Soft-deleted through `is_active`; the document itself is
/// never removed so order snapshots keep resolving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// MongoDB document ID.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    #[serde(default)]
    pub description: String,
    pub stock: i64,
    pub bestseller: bool,
    #[serde(default)]
    pub image: String,
    /// Computed view over the reviews collection, refreshed after every
    /// review mutation.
    pub rating: f64,
    pub reviews: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
