use actix_web::{web, Responder};
use chrono::{DateTime, Utc};
use log::error;
use mongodb::bson::{doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::Product;
use crate::response;

/// A line in a cart. Name/price/image/category are a point-in-time snapshot
/// of the product at add time, not a live join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub item_id: String,
    pub product_id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub category: String,
}

/// One cart document per user. Deleted outright when the last line goes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub cart_id: String,
    pub user_id: String,
    pub items: Vec<CartItem>,
    pub total_amount: f64,
    pub total_items: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub user_id: String,
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub user_id: String,
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct RemoveFromCartRequest {
    pub user_id: String,
    pub product_id: String,
}

/// Totals are always recomputed from the full line list, never adjusted
/// incrementally, so they cannot drift from the lines.
pub fn recompute_totals(cart: &mut Cart) {
    cart.total_amount = cart
        .items
        .iter()
        .map(|item| item.price * f64::from(item.quantity))
        .sum();
    cart.total_items = cart.items.iter().map(|item| item.quantity).sum();
    cart.updated_at = Utc::now();
}

/// Merge-by-product-id: an existing line gains quantity, otherwise the
/// snapshot line is appended.
pub fn merge_line(items: &mut Vec<CartItem>, line: CartItem) {
    match items.iter_mut().find(|i| i.product_id == line.product_id) {
        Some(existing) => existing.quantity += line.quantity,
        None => items.push(line),
    }
}

pub fn snapshot_line(product: &Product, quantity: u32) -> CartItem {
    CartItem {
        item_id: Uuid::new_v4().to_string(),
        product_id: product.product_id.clone(),
        name: product.name.clone(),
        price: product.price,
        quantity,
        image: product.image.clone(),
        category: product.category.clone(),
    }
}

fn empty_cart_json(user_id: &str) -> serde_json::Value {
    json!({
        "user_id": user_id,
        "items": [],
        "total_amount": 0,
        "total_items": 0,
    })
}

async fn find_cart(
    data: &AppState,
    user_id: &str,
) -> Result<Option<Cart>, mongodb::error::Error> {
    let carts = data.mongodb.db.collection::<Cart>("carts");
    carts.find_one(doc! { "user_id": user_id }).await
}

/// POST /api/cart/add
pub async fn add_to_cart(
    data: web::Data<AppState>,
    payload: web::Json<AddToCartRequest>,
) -> impl Responder {
    if payload.quantity < 1 {
        return response::bad_request("Quantity must be at least 1");
    }

    let products = data.mongodb.db.collection::<Product>("products");
    let product = match products
        .find_one(doc! { "product_id": &payload.product_id, "is_active": true })
        .await
    {
        Ok(Some(product)) => product,
        Ok(None) => return response::not_found("Product not found"),
        Err(e) => {
            error!("Error fetching product: {}", e);
            return response::internal("Failed to add to cart");
        }
    };

    let carts = data.mongodb.db.collection::<Cart>("carts");
    match find_cart(&data, &payload.user_id).await {
        Ok(Some(mut cart)) => {
            merge_line(&mut cart.items, snapshot_line(&product, payload.quantity));
            recompute_totals(&mut cart);
            match carts
                .replace_one(doc! { "cart_id": &cart.cart_id }, &cart)
                .await
            {
                Ok(_) => response::ok(cart, "Item added to cart"),
                Err(e) => {
                    error!("Error updating cart: {}", e);
                    response::internal("Failed to add to cart")
                }
            }
        }
        Ok(None) => {
            let now = Utc::now();
            let mut cart = Cart {
                id: None,
                cart_id: Uuid::new_v4().to_string(),
                user_id: payload.user_id.clone(),
                items: vec![snapshot_line(&product, payload.quantity)],
                total_amount: 0.0,
                total_items: 0,
                created_at: now,
                updated_at: now,
            };
            recompute_totals(&mut cart);
            match carts.insert_one(&cart).await {
                Ok(_) => response::ok(cart, "Item added to cart"),
                Err(e) => {
                    error!("Error creating cart: {}", e);
                    response::internal("Failed to add to cart")
                }
            }
        }
        Err(e) => {
            error!("Error fetching cart: {}", e);
            response::internal("Failed to add to cart")
        }
    }
}

/// GET /api/cart/{user_id}. A missing cart is an empty cart, never an error.
pub async fn get_cart(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let user_id = path.into_inner();
    match find_cart(&data, &user_id).await {
        Ok(Some(cart)) => response::ok(cart, "Cart retrieved successfully"),
        Ok(None) => response::ok(empty_cart_json(&user_id), "Cart is empty"),
        Err(e) => {
            error!("Error fetching cart: {}", e);
            response::internal("Failed to retrieve cart")
        }
    }
}

/// PUT /api/cart/update
pub async fn update_cart_item(
    data: web::Data<AppState>,
    payload: web::Json<UpdateCartRequest>,
) -> impl Responder {
    if payload.quantity < 1 {
        return response::bad_request("Quantity must be at least 1");
    }

    let mut cart = match find_cart(&data, &payload.user_id).await {
        Ok(Some(cart)) => cart,
        Ok(None) => return response::not_found("Cart not found"),
        Err(e) => {
            error!("Error fetching cart: {}", e);
            return response::internal("Failed to update cart");
        }
    };

    match cart
        .items
        .iter_mut()
        .find(|i| i.product_id == payload.product_id)
    {
        Some(item) => item.quantity = payload.quantity,
        None => return response::not_found("Item not found in cart"),
    }
    recompute_totals(&mut cart);

    let carts = data.mongodb.db.collection::<Cart>("carts");
    match carts
        .replace_one(doc! { "cart_id": &cart.cart_id }, &cart)
        .await
    {
        Ok(_) => response::ok(cart, "Cart updated successfully"),
        Err(e) => {
            error!("Error updating cart: {}", e);
            response::internal("Failed to update cart")
        }
    }
}

/// DELETE /api/cart/remove. Dropping the last line deletes the document.
pub async fn remove_from_cart(
    data: web::Data<AppState>,
    payload: web::Json<RemoveFromCartRequest>,
) -> impl Responder {
    let mut cart = match find_cart(&data, &payload.user_id).await {
        Ok(Some(cart)) => cart,
        Ok(None) => return response::not_found("Cart not found"),
        Err(e) => {
            error!("Error fetching cart: {}", e);
            return response::internal("Failed to remove from cart");
        }
    };

    let before = cart.items.len();
    cart.items.retain(|i| i.product_id != payload.product_id);
    if cart.items.len() == before {
        return response::not_found("Item not found in cart");
    }

    let carts = data.mongodb.db.collection::<Cart>("carts");
    if cart.items.is_empty() {
        return match carts.delete_one(doc! { "cart_id": &cart.cart_id }).await {
            Ok(_) => response::ok(empty_cart_json(&payload.user_id), "Item removed from cart"),
            Err(e) => {
                error!("Error deleting cart: {}", e);
                response::internal("Failed to remove from cart")
            }
        };
    }

    recompute_totals(&mut cart);
    match carts
        .replace_one(doc! { "cart_id": &cart.cart_id }, &cart)
        .await
    {
        Ok(_) => response::ok(cart, "Item removed from cart"),
        Err(e) => {
            error!("Error updating cart: {}", e);
            response::internal("Failed to remove from cart")
        }
    }
}

/// DELETE /api/cart/clear/{user_id}
pub async fn clear_cart(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let carts = data.mongodb.db.collection::<Cart>("carts");
    match carts.delete_one(doc! { "user_id": path.into_inner() }).await {
        Ok(_) => response::message("Cart cleared"),
        Err(e) => {
            error!("Error clearing cart: {}", e);
            response::internal("Failed to clear cart")
        }
    }
}

/// GET /api/cart/stats/{user_id}
pub async fn get_cart_stats(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match find_cart(&data, &path.into_inner()).await {
        Ok(Some(cart)) => response::ok(
            json!({
                "total_items": cart.total_items,
                "total_amount": cart.total_amount,
                "item_count": cart.items.len(),
            }),
            "Cart stats retrieved successfully",
        ),
        Ok(None) => response::ok(
            json!({ "total_items": 0, "total_amount": 0, "item_count": 0 }),
            "Cart stats retrieved successfully",
        ),
        Err(e) => {
            error!("Error fetching cart stats: {}", e);
            response::internal("Failed to retrieve cart stats")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: &str, price: f64, quantity: u32) -> CartItem {
        CartItem {
            item_id: Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            name: product_id.to_string(),
            price,
            quantity,
            image: String::new(),
            category: String::new(),
        }
    }

    fn cart_with(items: Vec<CartItem>) -> Cart {
        let now = Utc::now();
        let mut cart = Cart {
            id: None,
            cart_id: "c-1".to_string(),
            user_id: "u-1".to_string(),
            items,
            total_amount: 0.0,
            total_items: 0,
            created_at: now,
            updated_at: now,
        };
        recompute_totals(&mut cart);
        cart
    }

    #[test]
    fn merge_increments_existing_line() {
        let mut items = vec![line("a", 10000.0, 2)];
        merge_line(&mut items, line("a", 10000.0, 3));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 5);
    }

    #[test]
    fn merge_appends_new_line() {
        let mut items = vec![line("a", 10000.0, 2)];
        merge_line(&mut items, line("b", 5000.0, 1));
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn totals_equal_sums_over_lines() {
        let cart = cart_with(vec![line("a", 10000.0, 2), line("b", 5000.0, 1)]);
        assert_eq!(cart.total_amount, 25000.0);
        assert_eq!(cart.total_items, 3);
    }

    #[test]
    fn totals_stay_consistent_across_mutations() {
        let mut cart = cart_with(vec![line("a", 10000.0, 2), line("b", 5000.0, 1)]);

        merge_line(&mut cart.items, line("a", 10000.0, 1));
        cart.items
            .iter_mut()
            .find(|i| i.product_id == "b")
            .unwrap()
            .quantity = 4;
        cart.items.retain(|i| i.product_id != "a");
        recompute_totals(&mut cart);

        let expected_amount: f64 = cart
            .items
            .iter()
            .map(|i| i.price * f64::from(i.quantity))
            .sum();
        let expected_items: u32 = cart.items.iter().map(|i| i.quantity).sum();
        assert_eq!(cart.total_amount, expected_amount);
        assert_eq!(cart.total_items, expected_items);
        assert_eq!(cart.total_amount, 20000.0);
        assert_eq!(cart.total_items, 4);
    }

    #[test]
    fn removing_every_line_empties_the_cart() {
        let mut cart = cart_with(vec![line("a", 10000.0, 2)]);
        cart.items.retain(|i| i.product_id != "a");
        recompute_totals(&mut cart);
        assert!(cart.items.is_empty());
        assert_eq!(cart.total_amount, 0.0);
        assert_eq!(cart.total_items, 0);
    }
}
