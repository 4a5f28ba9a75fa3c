//! JSON response envelope shared by every route:
//! `{ "success": bool, "data"?, "message", "error"? }`.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;
use serde_json::json;

pub fn ok<T: Serialize>(data: T, message: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "data": data, "message": message }))
}

pub fn created<T: Serialize>(data: T, message: &str) -> HttpResponse {
    HttpResponse::Created().json(json!({ "success": true, "data": data, "message": message }))
}

/// Success with no payload.
pub fn message(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "message": message }))
}

pub fn error(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(json!({ "success": false, "message": message }))
}

pub fn bad_request(message: &str) -> HttpResponse {
    error(StatusCode::BAD_REQUEST, message)
}

pub fn unauthorized(message: &str) -> HttpResponse {
    error(StatusCode::UNAUTHORIZED, message)
}

pub fn forbidden(message: &str) -> HttpResponse {
    error(StatusCode::FORBIDDEN, message)
}

pub fn not_found(message: &str) -> HttpResponse {
    error(StatusCode::NOT_FOUND, message)
}

pub fn conflict(message: &str) -> HttpResponse {
    error(StatusCode::CONFLICT, message)
}

pub fn internal(message: &str) -> HttpResponse {
    error(StatusCode::INTERNAL_SERVER_ERROR, message)
}

/// Pagination block returned next to any paginated listing.
#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// In-memory pagination over an already-filtered result set.
pub fn paginate<T>(items: Vec<T>, page: usize, limit: usize) -> (Vec<T>, Pagination) {
    let page = page.max(1);
    let limit = limit.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(limit);
    let paged: Vec<T> = items
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();
    (
        paged,
        Pagination {
            page,
            limit,
            total,
            total_pages,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginate_splits_pages() {
        let items: Vec<i32> = (1..=25).collect();
        let (page2, meta) = paginate(items, 2, 10);
        assert_eq!(page2, (11..=20).collect::<Vec<i32>>());
        assert_eq!(meta.total, 25);
        assert_eq!(meta.total_pages, 3);
    }

    #[test]
    fn paginate_past_the_end_is_empty() {
        let items: Vec<i32> = (1..=5).collect();
        let (page, meta) = paginate(items, 4, 5);
        assert!(page.is_empty());
        assert_eq!(meta.total_pages, 1);
    }

    #[test]
    fn paginate_clamps_zero_page_and_limit() {
        let items: Vec<i32> = (1..=3).collect();
        let (page, meta) = paginate(items, 0, 0);
        assert_eq!(page, vec![1]);
        assert_eq!(meta.page, 1);
        assert_eq!(meta.limit, 1);
    }
}
