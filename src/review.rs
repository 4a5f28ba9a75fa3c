use actix_web::{web, HttpRequest, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{error, info, warn};
use mongodb::bson::{doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::{authed_user, AuthUser};
use crate::models::Product;
use crate::order::{Order, OrderStatus};
use crate::response;

/// One review per (user, order) pair, enforced by the unique index created
/// in `db.rs` rather than by the read-then-insert check alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub review_id: String,
    pub user_id: String,
    pub user_name: String,
    pub product_id: String,
    pub order_id: String,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub product_id: String,
    pub order_id: String,
    pub rating: i32,
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ReviewStats {
    pub average_rating: f64,
    pub total_reviews: usize,
}

/// Average rating rounded to one decimal place.
pub fn compute_stats(ratings: &[i32]) -> ReviewStats {
    if ratings.is_empty() {
        return ReviewStats {
            average_rating: 0.0,
            total_reviews: 0,
        };
    }
    let sum: i32 = ratings.iter().sum();
    let average = f64::from(sum) / ratings.len() as f64;
    ReviewStats {
        average_rating: (average * 10.0).round() / 10.0,
        total_reviews: ratings.len(),
    }
}

async fn fetch_reviews(
    data: &AppState,
    filter: mongodb::bson::Document,
) -> Result<Vec<Review>, mongodb::error::Error> {
    let reviews = data.mongodb.db.collection::<Review>("reviews");
    let mut cursor = reviews.find(filter).await?;
    let mut result = Vec::new();
    while let Some(review) = cursor.next().await {
        result.push(review?);
    }
    Ok(result)
}

/// The eligibility gate: the order exists, belongs to the caller, has been
/// delivered, and carries no review yet. The final word on "no review yet"
/// belongs to the unique index at insert time.
pub async fn can_user_review_order(
    data: &AppState,
    user: &AuthUser,
    order_id: &str,
) -> Result<bool, mongodb::error::Error> {
    let orders = data.mongodb.db.collection::<Order>("orders");
    let order = match orders
        .find_one(doc! { "order_id": order_id, "user_id": &user.id })
        .await?
    {
        Some(order) => order,
        None => return Ok(false),
    };

    if order.status != OrderStatus::Delivered {
        return Ok(false);
    }

    let reviews = data.mongodb.db.collection::<Review>("reviews");
    let existing = reviews
        .count_documents(doc! { "user_id": &user.id, "order_id": order_id })
        .await?;
    Ok(existing == 0)
}

/// Recomputes the product's denormalized rating/review counters from the
/// reviews collection. Called after every review mutation.
async fn refresh_product_stats(data: &AppState, product_id: &str) {
    let ratings = match fetch_reviews(data, doc! { "product_id": product_id }).await {
        Ok(reviews) => reviews.into_iter().map(|r| r.rating).collect::<Vec<i32>>(),
        Err(e) => {
            warn!("Could not load reviews for {}: {}", product_id, e);
            return;
        }
    };
    let stats = compute_stats(&ratings);

    let products = data.mongodb.db.collection::<Product>("products");
    let update = doc! { "$set": {
        "rating": stats.average_rating,
        "reviews": stats.total_reviews as i64,
    }};
    if let Err(e) = products
        .update_one(doc! { "product_id": product_id }, update)
        .await
    {
        warn!("Could not refresh stats for {}: {}", product_id, e);
    }
}

/// POST /api/reviews
pub async fn create_review(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateReviewRequest>,
) -> impl Responder {
    let current = match authed_user(&req) {
        Some(user) => user,
        None => return response::unauthorized("Authentication required"),
    };

    if !(1..=5).contains(&payload.rating) {
        return response::bad_request("Rating must be between 1 and 5");
    }
    if payload.comment.len() > 1000 {
        return response::bad_request("Comment must be at most 1000 characters");
    }

    match can_user_review_order(&data, &current, &payload.order_id).await {
        Ok(true) => {}
        Ok(false) => return response::bad_request("Order is not eligible for review"),
        Err(e) => {
            error!("Error checking review eligibility: {}", e);
            return response::internal("Failed to create review");
        }
    }

    let now = Utc::now();
    let review = Review {
        id: None,
        review_id: Uuid::new_v4().to_string(),
        user_id: current.id.clone(),
        user_name: current.name.clone(),
        product_id: payload.product_id.clone(),
        order_id: payload.order_id.clone(),
        rating: payload.rating,
        comment: payload.comment.clone(),
        created_at: now,
        updated_at: now,
    };

    let reviews = data.mongodb.db.collection::<Review>("reviews");
    match reviews.insert_one(&review).await {
        Ok(_) => {
            info!("Review created: {}", review.review_id);
            refresh_product_stats(&data, &review.product_id).await;
            response::created(review, "Review created successfully")
        }
        // Two tabs racing the eligibility check: the index lets one through.
        Err(e) if crate::db::is_duplicate_key(&e) => {
            response::conflict("You have already reviewed this order")
        }
        Err(e) => {
            error!("Error inserting review: {}", e);
            response::internal("Failed to create review")
        }
    }
}

/// GET /api/reviews/product/{product_id}, newest first.
pub async fn get_product_reviews(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ReviewListQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(10);
    let offset = query.offset.unwrap_or(0);

    match fetch_reviews(&data, doc! { "product_id": path.into_inner() }).await {
        Ok(mut reviews) => {
            reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let page: Vec<Review> = reviews.into_iter().skip(offset).take(limit).collect();
            response::ok(page, "Reviews retrieved successfully")
        }
        Err(e) => {
            error!("Error fetching reviews: {}", e);
            response::internal("Failed to retrieve reviews")
        }
    }
}

/// GET /api/reviews/product/{product_id}/stats
pub async fn get_product_review_stats(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    match fetch_reviews(&data, doc! { "product_id": path.into_inner() }).await {
        Ok(reviews) => {
            let ratings: Vec<i32> = reviews.iter().map(|r| r.rating).collect();
            response::ok(compute_stats(&ratings), "Review stats retrieved successfully")
        }
        Err(e) => {
            error!("Error fetching review stats: {}", e);
            response::internal("Failed to retrieve review stats")
        }
    }
}

/// GET /api/reviews/user
pub async fn get_user_reviews(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current = match authed_user(&req) {
        Some(user) => user,
        None => return response::unauthorized("Authentication required"),
    };

    match fetch_reviews(&data, doc! { "user_id": &current.id }).await {
        Ok(mut reviews) => {
            reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            response::ok(reviews, "Reviews retrieved successfully")
        }
        Err(e) => {
            error!("Error fetching user reviews: {}", e);
            response::internal("Failed to retrieve reviews")
        }
    }
}

/// PUT /api/reviews/{review_id}
pub async fn update_review(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateReviewRequest>,
) -> impl Responder {
    let current = match authed_user(&req) {
        Some(user) => user,
        None => return response::unauthorized("Authentication required"),
    };

    let review_id = path.into_inner();
    let reviews = data.mongodb.db.collection::<Review>("reviews");
    let mut review = match reviews.find_one(doc! { "review_id": &review_id }).await {
        Ok(Some(review)) => review,
        Ok(None) => return response::not_found("Review not found"),
        Err(e) => {
            error!("Error fetching review: {}", e);
            return response::internal("Failed to update review");
        }
    };

    if review.user_id != current.id {
        return response::forbidden("Cannot update another user's review");
    }

    if let Some(rating) = payload.rating {
        if !(1..=5).contains(&rating) {
            return response::bad_request("Rating must be between 1 and 5");
        }
        review.rating = rating;
    }
    if let Some(comment) = &payload.comment {
        if comment.len() > 1000 {
            return response::bad_request("Comment must be at most 1000 characters");
        }
        review.comment = comment.clone();
    }
    review.updated_at = Utc::now();

    match reviews
        .replace_one(doc! { "review_id": &review_id }, &review)
        .await
    {
        Ok(_) => {
            refresh_product_stats(&data, &review.product_id).await;
            response::ok(review, "Review updated successfully")
        }
        Err(e) => {
            error!("Error updating review: {}", e);
            response::internal("Failed to update review")
        }
    }
}

/// DELETE /api/reviews/{review_id}
pub async fn delete_review(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let current = match authed_user(&req) {
        Some(user) => user,
        None => return response::unauthorized("Authentication required"),
    };

    let review_id = path.into_inner();
    let reviews = data.mongodb.db.collection::<Review>("reviews");
    let review = match reviews.find_one(doc! { "review_id": &review_id }).await {
        Ok(Some(review)) => review,
        Ok(None) => return response::not_found("Review not found"),
        Err(e) => {
            error!("Error fetching review: {}", e);
            return response::internal("Failed to delete review");
        }
    };

    if review.user_id != current.id {
        return response::forbidden("Cannot delete another user's review");
    }

    match reviews.delete_one(doc! { "review_id": &review_id }).await {
        Ok(_) => {
            refresh_product_stats(&data, &review.product_id).await;
            response::message("Review deleted successfully")
        }
        Err(e) => {
            error!("Error deleting review: {}", e);
            response::internal("Failed to delete review")
        }
    }
}

/// GET /api/reviews/can-review/{order_id}
pub async fn can_review(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let current = match authed_user(&req) {
        Some(user) => user,
        None => return response::unauthorized("Authentication required"),
    };

    match can_user_review_order(&data, &current, &path.into_inner()).await {
        Ok(eligible) => response::ok(
            json!({ "can_review": eligible }),
            "Review eligibility retrieved successfully",
        ),
        Err(e) => {
            error!("Error checking review eligibility: {}", e);
            response::internal("Failed to check review eligibility")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_of_no_reviews_are_zero() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.average_rating, 0.0);
        assert_eq!(stats.total_reviews, 0);
    }

    #[test]
    fn average_rounds_to_one_decimal() {
        let stats = compute_stats(&[5, 4, 4]);
        assert_eq!(stats.average_rating, 4.3);
        assert_eq!(stats.total_reviews, 3);

        let stats = compute_stats(&[3, 4]);
        assert_eq!(stats.average_rating, 3.5);
    }

    #[test]
    fn single_rating_is_its_own_average() {
        let stats = compute_stats(&[2]);
        assert_eq!(stats.average_rating, 2.0);
        assert_eq!(stats.total_reviews, 1);
    }
}
