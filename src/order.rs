use actix_web::{web, HttpRequest, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{error, info};
use mongodb::bson::{doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::{authed_user, require_admin};
use crate::models::Role;
use crate::payment::PaymentKind;
use crate::response::{self, paginate};

/// Order lifecycle. Every transition goes through [`apply_transition`];
/// there is no unvalidated update path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<OrderStatus> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// The transition table. Cancellation is legal from any non-terminal
    /// state; `delivered` and `cancelled` admit nothing.
    pub fn allowed_next(self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Confirmed, OrderStatus::Cancelled],
            OrderStatus::Confirmed => &[OrderStatus::Processing, OrderStatus::Cancelled],
            OrderStatus::Processing => &[OrderStatus::Shipped, OrderStatus::Cancelled],
            OrderStatus::Shipped => &[OrderStatus::Delivered, OrderStatus::Cancelled],
            OrderStatus::Delivered | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    /// Timeline description used when the caller supplies none.
    pub fn default_note(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Order placed and awaiting confirmation",
            OrderStatus::Confirmed => "Order confirmed by the store",
            OrderStatus::Processing => "Order is being prepared",
            OrderStatus::Shipped => "Order handed to the courier",
            OrderStatus::Delivered => "Order delivered to the customer",
            OrderStatus::Cancelled => "Order cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub status: OrderStatus,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub status: OrderStatus,
    pub timeline: Vec<TrackingEvent>,
}

/// A line item frozen at checkout time. Later product edits or soft deletes
/// never touch it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub order_id: String,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub customer_info: CustomerInfo,
    pub payment_method: PaymentKind,
    pub total_amount: f64,
    pub status: OrderStatus,
    pub tracking_info: TrackingInfo,
    pub can_review: bool,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItem>,
    pub customer_info: CustomerInfo,
    pub payment_method: PaymentKind,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// Field bounds for the contact/address snapshot taken at checkout.
pub fn validate_customer_info(info: &CustomerInfo) -> Option<&'static str> {
    let name = info.name.trim();
    if name.len() < 2 || name.len() > 100 {
        return Some("Customer name must be between 2 and 100 characters");
    }
    if !crate::auth::valid_email(&info.email) {
        return Some("Invalid customer email address");
    }
    let phone = info.phone.trim();
    if phone.len() < 10
        || phone.len() > 20
        || !phone
            .chars()
            .all(|c| c.is_ascii_digit() || c == '+' || c == '-' || c == ' ')
    {
        return Some("Invalid customer phone number");
    }
    let address = &info.address;
    if address.street.trim().len() < 5 || address.street.len() > 200 {
        return Some("Street must be between 5 and 200 characters");
    }
    if address.city.trim().len() < 2 || address.city.len() > 50 {
        return Some("City must be between 2 and 50 characters");
    }
    if address.province.trim().len() < 2 || address.province.len() > 50 {
        return Some("Province must be between 2 and 50 characters");
    }
    if address.postal_code.trim().len() < 5 || address.postal_code.len() > 10 {
        return Some("Postal code must be between 5 and 10 characters");
    }
    None
}

pub fn order_total(items: &[OrderItem]) -> f64 {
    items
        .iter()
        .map(|item| item.price * f64::from(item.quantity))
        .sum()
}

/// The single authoritative transition operation: validates against the
/// table, appends the timeline entry, flips `can_review` on delivery.
pub fn apply_transition(
    order: &mut Order,
    next: OrderStatus,
    description: Option<String>,
    at: DateTime<Utc>,
) -> Result<(), String> {
    if !order.status.can_transition_to(next) {
        return Err(format!(
            "Cannot transition order from '{}' to '{}'",
            order.status.as_str(),
            next.as_str()
        ));
    }

    order.status = next;
    order.tracking_info.status = next;
    order.tracking_info.timeline.push(TrackingEvent {
        status: next,
        description: description.unwrap_or_else(|| next.default_note().to_string()),
        timestamp: at,
    });
    order.can_review = next == OrderStatus::Delivered;
    order.updated_at = at;
    Ok(())
}

async fn fetch_orders(
    data: &AppState,
    filter: mongodb::bson::Document,
) -> Result<Vec<Order>, mongodb::error::Error> {
    let orders = data.mongodb.db.collection::<Order>("orders");
    let mut cursor = orders.find(filter).await?;
    let mut result = Vec::new();
    while let Some(order) = cursor.next().await {
        result.push(order?);
    }
    Ok(result)
}

async fn persist(data: &AppState, order: &Order) -> Result<(), mongodb::error::Error> {
    let orders = data.mongodb.db.collection::<Order>("orders");
    orders
        .replace_one(doc! { "order_id": &order.order_id }, order)
        .await?;
    Ok(())
}

/// POST /api/orders (checkout)
pub async fn create_order(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateOrderRequest>,
) -> impl Responder {
    let current = match authed_user(&req) {
        Some(user) => user,
        None => return response::unauthorized("Authentication required"),
    };

    if payload.items.is_empty() {
        return response::bad_request("Order must contain at least one item");
    }
    for item in &payload.items {
        if item.quantity < 1 {
            return response::bad_request("Item quantity must be at least 1");
        }
        if item.price <= 0.0 {
            return response::bad_request("Item price must be positive");
        }
    }
    if let Some(msg) = validate_customer_info(&payload.customer_info) {
        return response::bad_request(msg);
    }
    if payload.notes.as_ref().is_some_and(|n| n.len() > 500) {
        return response::bad_request("Notes must be at most 500 characters");
    }

    let now = Utc::now();
    let order = Order {
        id: None,
        order_id: Uuid::new_v4().to_string(),
        user_id: current.id.clone(),
        items: payload.items.clone(),
        customer_info: payload.customer_info.clone(),
        payment_method: payload.payment_method,
        total_amount: order_total(&payload.items),
        status: OrderStatus::Pending,
        tracking_info: TrackingInfo {
            status: OrderStatus::Pending,
            timeline: vec![TrackingEvent {
                status: OrderStatus::Pending,
                description: OrderStatus::Pending.default_note().to_string(),
                timestamp: now,
            }],
        },
        can_review: false,
        notes: payload.notes.clone().unwrap_or_default(),
        created_at: now,
        updated_at: now,
    };

    let orders = data.mongodb.db.collection::<Order>("orders");
    match orders.insert_one(&order).await {
        Ok(_) => {
            info!("Order created: {}", order.order_id);
            response::created(order, "Order created successfully")
        }
        Err(e) => {
            error!("Error inserting order: {}", e);
            response::internal("Failed to create order")
        }
    }
}

/// GET /api/orders/user
pub async fn get_user_orders(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current = match authed_user(&req) {
        Some(user) => user,
        None => return response::unauthorized("Authentication required"),
    };

    match fetch_orders(&data, doc! { "user_id": &current.id }).await {
        Ok(mut orders) => {
            orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            response::ok(orders, "Orders retrieved successfully")
        }
        Err(e) => {
            error!("Error fetching user orders: {}", e);
            response::internal("Failed to retrieve orders")
        }
    }
}

/// GET /api/orders/{id}
pub async fn get_order(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let orders = data.mongodb.db.collection::<Order>("orders");
    match orders.find_one(doc! { "order_id": path.into_inner() }).await {
        Ok(Some(order)) => response::ok(order, "Order retrieved successfully"),
        Ok(None) => response::not_found("Order not found"),
        Err(e) => {
            error!("Error fetching order: {}", e);
            response::internal("Failed to retrieve order")
        }
    }
}

/// GET /api/orders (admin), newest first.
pub async fn get_all_orders(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<OrderListQuery>,
) -> impl Responder {
    if let Err(resp) = require_admin(&req) {
        return resp;
    }

    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(20);

    match fetch_orders(&data, doc! {}).await {
        Ok(mut orders) => {
            orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let (orders, pagination) = paginate(orders, page, limit);
            response::ok(
                json!({ "orders": orders, "pagination": pagination }),
                "Orders retrieved successfully",
            )
        }
        Err(e) => {
            error!("Error fetching orders: {}", e);
            response::internal("Failed to retrieve orders")
        }
    }
}

/// PUT /api/orders/{id}/status (admin)
pub async fn update_order_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateStatusRequest>,
) -> impl Responder {
    if let Err(resp) = require_admin(&req) {
        return resp;
    }

    let next = match OrderStatus::parse(&payload.status) {
        Some(status) => status,
        None => return response::bad_request("Invalid order status"),
    };

    let order_id = path.into_inner();
    let orders = data.mongodb.db.collection::<Order>("orders");
    let mut order = match orders.find_one(doc! { "order_id": &order_id }).await {
        Ok(Some(order)) => order,
        Ok(None) => return response::not_found("Order not found"),
        Err(e) => {
            error!("Error fetching order: {}", e);
            return response::internal("Failed to update order status");
        }
    };

    if let Err(msg) = apply_transition(&mut order, next, payload.description.clone(), Utc::now()) {
        return response::conflict(&msg);
    }

    match persist(&data, &order).await {
        Ok(_) => {
            info!("Order {} moved to {}", order.order_id, next.as_str());
            response::ok(order, "Order status updated successfully")
        }
        Err(e) => {
            error!("Error updating order: {}", e);
            response::internal("Failed to update order status")
        }
    }
}

/// DELETE /api/orders/{id}. Cancel is a status value, not a removal; the
/// owner or an admin may cancel from any non-terminal state.
pub async fn cancel_order(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let current = match authed_user(&req) {
        Some(user) => user,
        None => return response::unauthorized("Authentication required"),
    };

    let order_id = path.into_inner();
    let orders = data.mongodb.db.collection::<Order>("orders");
    let mut order = match orders.find_one(doc! { "order_id": &order_id }).await {
        Ok(Some(order)) => order,
        Ok(None) => return response::not_found("Order not found"),
        Err(e) => {
            error!("Error fetching order: {}", e);
            return response::internal("Failed to cancel order");
        }
    };

    if order.user_id != current.id && current.role != Role::Admin {
        return response::forbidden("Cannot cancel another user's order");
    }

    if let Err(msg) = apply_transition(&mut order, OrderStatus::Cancelled, None, Utc::now()) {
        return response::conflict(&msg);
    }

    match persist(&data, &order).await {
        Ok(_) => {
            info!("Order cancelled: {}", order.order_id);
            response::ok(order, "Order cancelled successfully")
        }
        Err(e) => {
            error!("Error cancelling order: {}", e);
            response::internal("Failed to cancel order")
        }
    }
}

/// GET /api/orders/status/{status} (admin)
pub async fn get_orders_by_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    if let Err(resp) = require_admin(&req) {
        return resp;
    }

    let status = match OrderStatus::parse(&path.into_inner()) {
        Some(status) => status,
        None => return response::bad_request("Invalid order status"),
    };

    match fetch_orders(&data, doc! { "status": status.as_str() }).await {
        Ok(mut orders) => {
            orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            response::ok(
                orders,
                &format!("Orders with status '{}' retrieved successfully", status.as_str()),
            )
        }
        Err(e) => {
            error!("Error fetching orders by status: {}", e);
            response::internal("Failed to retrieve orders by status")
        }
    }
}

/// GET /api/orders/stats/overview (admin). Revenue excludes cancelled orders.
pub async fn get_order_stats(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    if let Err(resp) = require_admin(&req) {
        return resp;
    }

    let orders = match fetch_orders(&data, doc! {}).await {
        Ok(orders) => orders,
        Err(e) => {
            error!("Error fetching order stats: {}", e);
            return response::internal("Failed to retrieve order statistics");
        }
    };

    let mut stats = serde_json::Map::new();
    stats.insert("total".to_string(), json!(orders.len()));
    for status in OrderStatus::ALL {
        let count = orders.iter().filter(|o| o.status == status).count();
        stats.insert(status.as_str().to_string(), json!(count));
    }
    let total_revenue: f64 = orders
        .iter()
        .filter(|o| o.status != OrderStatus::Cancelled)
        .map(|o| o.total_amount)
        .sum();
    stats.insert("total_revenue".to_string(), json!(total_revenue));

    response::ok(stats, "Order statistics retrieved successfully")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        let now = Utc::now();
        Order {
            id: None,
            order_id: "o-1".to_string(),
            user_id: "u-1".to_string(),
            items: vec![
                OrderItem {
                    id: "a".to_string(),
                    name: "Dog Food".to_string(),
                    price: 10000.0,
                    quantity: 2,
                    image: None,
                },
                OrderItem {
                    id: "b".to_string(),
                    name: "Cat Toy".to_string(),
                    price: 5000.0,
                    quantity: 1,
                    image: None,
                },
            ],
            customer_info: CustomerInfo {
                name: "Jo".to_string(),
                email: "jo@example.com".to_string(),
                phone: "081234567890".to_string(),
                address: Address {
                    street: "Jl. Kenanga 1".to_string(),
                    city: "Bandung".to_string(),
                    province: "Jawa Barat".to_string(),
                    postal_code: "40111".to_string(),
                },
            },
            payment_method: PaymentKind::Cod,
            total_amount: 25000.0,
            status: OrderStatus::Pending,
            tracking_info: TrackingInfo {
                status: OrderStatus::Pending,
                timeline: vec![TrackingEvent {
                    status: OrderStatus::Pending,
                    description: OrderStatus::Pending.default_note().to_string(),
                    timestamp: now,
                }],
            },
            can_review: false,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn total_is_sum_of_price_times_quantity() {
        let order = sample_order();
        assert_eq!(order_total(&order.items), 25000.0);
    }

    #[test]
    fn full_lifecycle_produces_five_timeline_entries() {
        let mut order = sample_order();
        for next in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            apply_transition(&mut order, next, None, Utc::now()).unwrap();
        }
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.tracking_info.timeline.len(), 5);
        assert!(order.can_review);
    }

    #[test]
    fn skipping_states_is_rejected() {
        let mut order = sample_order();
        let err = apply_transition(&mut order, OrderStatus::Shipped, None, Utc::now());
        assert!(err.is_err());
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.tracking_info.timeline.len(), 1);
    }

    #[test]
    fn terminal_states_admit_no_transition() {
        let mut order = sample_order();
        for next in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            apply_transition(&mut order, next, None, Utc::now()).unwrap();
        }
        assert!(apply_transition(&mut order, OrderStatus::Pending, None, Utc::now()).is_err());

        let mut cancelled = sample_order();
        apply_transition(&mut cancelled, OrderStatus::Cancelled, None, Utc::now()).unwrap();
        for next in OrderStatus::ALL {
            assert!(apply_transition(&mut cancelled, next, None, Utc::now()).is_err());
        }
    }

    #[test]
    fn cancellation_is_legal_from_every_non_terminal_state() {
        for reachable in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
        ] {
            assert!(reachable.can_transition_to(OrderStatus::Cancelled));
        }
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn can_review_flips_only_on_delivery() {
        let mut order = sample_order();
        apply_transition(&mut order, OrderStatus::Confirmed, None, Utc::now()).unwrap();
        assert!(!order.can_review);
        apply_transition(&mut order, OrderStatus::Processing, None, Utc::now()).unwrap();
        apply_transition(&mut order, OrderStatus::Shipped, None, Utc::now()).unwrap();
        apply_transition(&mut order, OrderStatus::Delivered, None, Utc::now()).unwrap();
        assert!(order.can_review);
    }

    #[test]
    fn custom_description_overrides_default_note() {
        let mut order = sample_order();
        apply_transition(
            &mut order,
            OrderStatus::Confirmed,
            Some("Confirmed by ops".to_string()),
            Utc::now(),
        )
        .unwrap();
        let last = order.tracking_info.timeline.last().unwrap();
        assert_eq!(last.description, "Confirmed by ops");

        apply_transition(&mut order, OrderStatus::Processing, None, Utc::now()).unwrap();
        let last = order.tracking_info.timeline.last().unwrap();
        assert_eq!(last.description, OrderStatus::Processing.default_note());
    }

    #[test]
    fn customer_snapshot_validation_accepts_the_usual_checkout() {
        let info = sample_order().customer_info;
        assert_eq!(validate_customer_info(&info), None);
    }

    #[test]
    fn customer_snapshot_validation_rejects_bad_fields() {
        let good = sample_order().customer_info;

        let mut info = good.clone();
        info.name = "J".to_string();
        assert!(validate_customer_info(&info).is_some());

        let mut info = good.clone();
        info.email = "not-an-email".to_string();
        assert!(validate_customer_info(&info).is_some());

        let mut info = good.clone();
        info.phone = "12345".to_string();
        assert!(validate_customer_info(&info).is_some());

        let mut info = good.clone();
        info.phone = "0812-ABCD-5678".to_string();
        assert!(validate_customer_info(&info).is_some());

        let mut info = good.clone();
        info.address.street = "Jl.".to_string();
        assert!(validate_customer_info(&info).is_some());

        let mut info = good.clone();
        info.address.postal_code = "401".to_string();
        assert!(validate_customer_info(&info).is_some());
    }

    #[test]
    fn customer_phone_allows_separators() {
        let mut info = sample_order().customer_info;
        info.phone = "+62 812-3456-7890".to_string();
        assert_eq!(validate_customer_info(&info), None);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in OrderStatus::ALL {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("refunded"), None);
    }
}
