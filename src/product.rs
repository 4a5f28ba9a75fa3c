use actix_web::{web, HttpRequest, Responder};
use chrono::Utc;
use futures_util::StreamExt;
use log::{error, info};
use mongodb::bson::doc;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::Product;
use crate::response::{self, paginate};

/// Listing query. Equality filters go into the MongoDB query; price range,
/// substring search, sorting and pagination happen in memory, which is fine
/// at catalog scale and deliberately not built to scale past it.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub search: Option<String>,
    pub bestseller: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub category: String,
    pub price: f64,
    pub description: Option<String>,
    pub stock: Option<i64>,
    pub bestseller: Option<bool>,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub stock: Option<i64>,
    pub bestseller: Option<bool>,
    pub image: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct BestsellerQuery {
    pub limit: Option<usize>,
}

const SORT_FIELDS: &[&str] = &["name", "price", "rating", "reviews", "created_at"];

/// Price range and case-insensitive substring search over name/category.
/// Soft-deleted products are dropped here as well as in the store query.
pub fn filter_in_memory(products: Vec<Product>, query: &ProductQuery) -> Vec<Product> {
    products
        .into_iter()
        .filter(|p| p.is_active)
        .filter(|p| query.min_price.map_or(true, |min| p.price >= min))
        .filter(|p| query.max_price.map_or(true, |max| p.price <= max))
        .filter(|p| match &query.search {
            Some(term) => {
                let term = term.to_lowercase();
                p.name.to_lowercase().contains(&term)
                    || p.category.to_lowercase().contains(&term)
            }
            None => true,
        })
        .collect()
}

pub fn sort_in_memory(products: &mut [Product], sort_by: &str, descending: bool) {
    match sort_by {
        "name" => products.sort_by(|a, b| a.name.cmp(&b.name)),
        "price" => products.sort_by(|a, b| a.price.total_cmp(&b.price)),
        "rating" => products.sort_by(|a, b| a.rating.total_cmp(&b.rating)),
        "reviews" => products.sort_by(|a, b| a.reviews.cmp(&b.reviews)),
        _ => products.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
    }
    if descending {
        products.reverse();
    }
}

async fn fetch_products(
    data: &AppState,
    filter: mongodb::bson::Document,
) -> Result<Vec<Product>, mongodb::error::Error> {
    let collection = data.mongodb.db.collection::<Product>("products");
    let mut cursor = collection.find(filter).await?;
    let mut products = Vec::new();
    while let Some(result) = cursor.next().await {
        products.push(result?);
    }
    Ok(products)
}

/// GET /api/products
pub async fn list_products(
    data: web::Data<AppState>,
    query: web::Query<ProductQuery>,
) -> impl Responder {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(12).min(50);
    let sort_by = query.sort_by.as_deref().unwrap_or("created_at");
    if !SORT_FIELDS.contains(&sort_by) {
        return response::bad_request("Invalid sort field");
    }
    let descending = query.sort_order.as_deref().unwrap_or("desc") != "asc";

    let mut filter = doc! { "is_active": true };
    if let Some(category) = &query.category {
        filter.insert("category", category);
    }
    if let Some(bestseller) = query.bestseller {
        filter.insert("bestseller", bestseller);
    }

    let products = match fetch_products(&data, filter).await {
        Ok(products) => products,
        Err(e) => {
            error!("Error fetching products: {}", e);
            return response::internal("Failed to retrieve products");
        }
    };

    let mut products = filter_in_memory(products, &query);
    sort_in_memory(&mut products, sort_by, descending);
    let (products, pagination) = paginate(products, page, limit);

    response::ok(
        serde_json::json!({ "products": products, "pagination": pagination }),
        "Products retrieved successfully",
    )
}

/// GET /api/products/{id}
pub async fn get_product(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let collection = data.mongodb.db.collection::<Product>("products");
    match collection
        .find_one(doc! { "product_id": path.into_inner() })
        .await
    {
        Ok(Some(product)) => response::ok(product, "Product retrieved successfully"),
        Ok(None) => response::not_found("Product not found"),
        Err(e) => {
            error!("Error fetching product: {}", e);
            response::internal("Failed to retrieve product")
        }
    }
}

fn validate_product_fields(name: &str, category: &str, price: f64, description: &str) -> Option<&'static str> {
    if name.trim().len() < 2 || name.len() > 100 {
        return Some("Name must be between 2 and 100 characters");
    }
    if category.trim().len() < 2 || category.len() > 50 {
        return Some("Category must be between 2 and 50 characters");
    }
    if price <= 0.0 {
        return Some("Price must be positive");
    }
    if description.len() > 1000 {
        return Some("Description must be at most 1000 characters");
    }
    None
}

/// POST /api/products (admin)
pub async fn create_product(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateProductRequest>,
) -> impl Responder {
    if let Err(resp) = crate::auth::require_admin(&req) {
        return resp;
    }

    let description = payload.description.clone().unwrap_or_default();
    if let Some(msg) =
        validate_product_fields(&payload.name, &payload.category, payload.price, &description)
    {
        return response::bad_request(msg);
    }
    let stock = payload.stock.unwrap_or(0);
    if stock < 0 {
        return response::bad_request("Stock cannot be negative");
    }

    let now = Utc::now();
    let product = Product {
        id: None,
        product_id: Uuid::new_v4().to_string(),
        name: payload.name.trim().to_string(),
        category: payload.category.trim().to_string(),
        price: payload.price,
        description,
        stock,
        bestseller: payload.bestseller.unwrap_or(false),
        image: payload.image.clone().unwrap_or_default(),
        rating: 0.0,
        reviews: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    let collection = data.mongodb.db.collection::<Product>("products");
    match collection.insert_one(&product).await {
        Ok(_) => {
            info!("Product created: {}", product.product_id);
            response::created(product, "Product created successfully")
        }
        Err(e) => {
            error!("Error inserting product: {}", e);
            response::internal("Failed to create product")
        }
    }
}

/// PUT /api/products/{id} (admin)
pub async fn update_product(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateProductRequest>,
) -> impl Responder {
    if let Err(resp) = crate::auth::require_admin(&req) {
        return resp;
    }

    let product_id = path.into_inner();
    let collection = data.mongodb.db.collection::<Product>("products");
    let mut product = match collection.find_one(doc! { "product_id": &product_id }).await {
        Ok(Some(product)) => product,
        Ok(None) => return response::not_found("Product not found"),
        Err(e) => {
            error!("Error fetching product: {}", e);
            return response::internal("Failed to update product");
        }
    };

    if let Some(name) = &payload.name {
        product.name = name.trim().to_string();
    }
    if let Some(category) = &payload.category {
        product.category = category.trim().to_string();
    }
    if let Some(price) = payload.price {
        product.price = price;
    }
    if let Some(description) = &payload.description {
        product.description = description.clone();
    }
    if let Some(stock) = payload.stock {
        if stock < 0 {
            return response::bad_request("Stock cannot be negative");
        }
        product.stock = stock;
    }
    if let Some(bestseller) = payload.bestseller {
        product.bestseller = bestseller;
    }
    if let Some(image) = &payload.image {
        product.image = image.clone();
    }
    if let Some(is_active) = payload.is_active {
        product.is_active = is_active;
    }

    if let Some(msg) = validate_product_fields(
        &product.name,
        &product.category,
        product.price,
        &product.description,
    ) {
        return response::bad_request(msg);
    }
    product.updated_at = Utc::now();

    match collection
        .replace_one(doc! { "product_id": &product_id }, &product)
        .await
    {
        Ok(_) => response::ok(product, "Product updated successfully"),
        Err(e) => {
            error!("Error updating product: {}", e);
            response::internal("Failed to update product")
        }
    }
}

/// DELETE /api/products/{id} (admin). Soft delete: existing order snapshots
/// keep their point-in-time name and price.
pub async fn delete_product(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    if let Err(resp) = crate::auth::require_admin(&req) {
        return resp;
    }

    let product_id = path.into_inner();
    let collection = data.mongodb.db.collection::<Product>("products");
    let update = doc! { "$set": { "is_active": false } };
    match collection
        .update_one(doc! { "product_id": &product_id }, update)
        .await
    {
        Ok(result) if result.matched_count == 0 => response::not_found("Product not found"),
        Ok(_) => {
            info!("Product soft-deleted: {}", product_id);
            response::message("Product deleted successfully")
        }
        Err(e) => {
            error!("Error deleting product: {}", e);
            response::internal("Failed to delete product")
        }
    }
}

/// GET /api/products/categories
pub async fn get_categories(data: web::Data<AppState>) -> impl Responder {
    let products = match fetch_products(&data, doc! { "is_active": true }).await {
        Ok(products) => products,
        Err(e) => {
            error!("Error fetching categories: {}", e);
            return response::internal("Failed to retrieve categories");
        }
    };

    let mut categories: Vec<String> = products
        .into_iter()
        .map(|p| p.category)
        .filter(|c| !c.is_empty())
        .collect();
    categories.sort();
    categories.dedup();

    response::ok(categories, "Categories retrieved successfully")
}

/// GET /api/products/bestsellers
pub async fn get_bestsellers(
    data: web::Data<AppState>,
    query: web::Query<BestsellerQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(6);
    let filter = doc! { "is_active": true, "bestseller": true };
    let mut products = match fetch_products(&data, filter).await {
        Ok(products) => products,
        Err(e) => {
            error!("Error fetching bestsellers: {}", e);
            return response::internal("Failed to retrieve bestsellers");
        }
    };

    products.sort_by(|a, b| b.reviews.cmp(&a.reviews));
    products.truncate(limit);

    response::ok(products, "Bestsellers retrieved successfully")
}

/// The remaining stock after selling `quantity` units, or `None` when the
/// sale would take stock negative.
pub fn decrement_stock(stock: i64, quantity: i64) -> Option<i64> {
    let remaining = stock - quantity;
    (remaining >= 0).then_some(remaining)
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub quantity: i64,
}

/// PUT /api/products/{id}/stock (admin). Decrements stock, refusing to go
/// negative.
pub async fn update_stock(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<AdjustStockRequest>,
) -> impl Responder {
    if let Err(resp) = crate::auth::require_admin(&req) {
        return resp;
    }

    let product_id = path.into_inner();
    let collection = data.mongodb.db.collection::<Product>("products");
    let mut product = match collection.find_one(doc! { "product_id": &product_id }).await {
        Ok(Some(product)) => product,
        Ok(None) => return response::not_found("Product not found"),
        Err(e) => {
            error!("Error fetching product: {}", e);
            return response::internal("Failed to update stock");
        }
    };

    product.stock = match decrement_stock(product.stock, payload.quantity) {
        Some(remaining) => remaining,
        None => return response::bad_request("Insufficient stock"),
    };
    product.updated_at = Utc::now();

    match collection
        .replace_one(doc! { "product_id": &product_id }, &product)
        .await
    {
        Ok(_) => response::ok(product, "Stock updated successfully"),
        Err(e) => {
            error!("Error updating stock: {}", e);
            response::internal("Failed to update stock")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, category: &str, price: f64, rating: f64, reviews: i64) -> Product {
        let now = Utc::now();
        Product {
            id: None,
            product_id: name.to_lowercase(),
            name: name.to_string(),
            category: category.to_string(),
            price,
            description: String::new(),
            stock: 10,
            bestseller: false,
            image: String::new(),
            rating,
            reviews,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample() -> Vec<Product> {
        vec![
            product("Dog Leash", "Accessories", 45000.0, 4.5, 12),
            product("Cat Food", "Food", 90000.0, 4.0, 30),
            product("Bird Cage", "Housing", 250000.0, 3.5, 4),
            product("Dog Food", "Food", 120000.0, 4.8, 22),
        ]
    }

    #[test]
    fn price_range_filter() {
        let query = ProductQuery {
            min_price: Some(50000.0),
            max_price: Some(150000.0),
            ..Default::default()
        };
        let names: Vec<String> = filter_in_memory(sample(), &query)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Cat Food", "Dog Food"]);
    }

    #[test]
    fn search_matches_name_and_category_case_insensitively() {
        let query = ProductQuery {
            search: Some("food".to_string()),
            ..Default::default()
        };
        assert_eq!(filter_in_memory(sample(), &query).len(), 3);

        let query = ProductQuery {
            search: Some("DOG".to_string()),
            ..Default::default()
        };
        assert_eq!(filter_in_memory(sample(), &query).len(), 2);
    }

    #[test]
    fn sorting_by_price_and_reviews() {
        let mut products = sample();
        sort_in_memory(&mut products, "price", false);
        assert_eq!(products[0].name, "Dog Leash");
        assert_eq!(products[3].name, "Bird Cage");

        sort_in_memory(&mut products, "reviews", true);
        assert_eq!(products[0].name, "Cat Food");
    }

    #[test]
    fn soft_deleted_product_leaves_listings_but_not_order_snapshots() {
        let mut products = sample();
        let snapshot = crate::order::OrderItem {
            id: products[0].product_id.clone(),
            name: products[0].name.clone(),
            price: products[0].price,
            quantity: 1,
            image: None,
        };
        products[0].is_active = false;

        let listed = filter_in_memory(products, &ProductQuery::default());
        assert_eq!(listed.len(), 3);
        assert!(listed.iter().all(|p| p.name != "Dog Leash"));

        // The point-in-time snapshot in an order is untouched.
        assert_eq!(snapshot.name, "Dog Leash");
        assert_eq!(snapshot.price, 45000.0);
    }

    #[test]
    fn stock_never_goes_negative() {
        assert_eq!(decrement_stock(10, 3), Some(7));
        assert_eq!(decrement_stock(3, 3), Some(0));
        assert_eq!(decrement_stock(2, 3), None);
    }

    #[test]
    fn field_validation_rejects_bad_input() {
        assert!(validate_product_fields("X", "Food", 10.0, "").is_some());
        assert!(validate_product_fields("Dog Food", "F", 10.0, "").is_some());
        assert!(validate_product_fields("Dog Food", "Food", 0.0, "").is_some());
        assert!(validate_product_fields("Dog Food", "Food", 10.0, "").is_none());
    }
}
