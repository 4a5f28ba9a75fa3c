// src/main.rs

mod app_state;
mod auth;
mod cart;
mod config;
mod db;
mod models;
mod order;
mod payment;
mod product;
mod response;
mod review;
mod upload;

use std::env;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpServer,
};
use env_logger::Env;
use futures::future::{ok, Ready};
use log::info;

use crate::app_state::AppState;
use crate::auth::{get_profile, login, register, update_profile, validate_token, AuthUser};
use crate::cart::{
    add_to_cart, clear_cart, get_cart, get_cart_stats, remove_from_cart, update_cart_item,
};
use crate::order::{
    cancel_order, create_order, get_all_orders, get_order, get_order_stats, get_orders_by_status,
    get_user_orders, update_order_status,
};
use crate::payment::{list_methods, process_payment};
use crate::product::{
    create_product, delete_product, get_bestsellers, get_categories, get_product, list_products,
    update_product, update_stock,
};
use crate::review::{
    can_review, create_review, delete_review, get_product_review_stats, get_product_reviews,
    get_user_reviews, update_review,
};
use crate::upload::{delete_image, upload_image};

#[derive(Debug)]
pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware { service })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Extract "Bearer <token>" from the Authorization header if present.
        // A missing header passes through; handlers that need an identity
        // reject the request themselves.
        if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
            if let Ok(auth_str) = auth_header.to_str() {
                if auth_str.starts_with("Bearer ") {
                    let token = auth_str.trim_start_matches("Bearer ").trim().to_string();
                    match verify_token(&token) {
                        Ok(user) => {
                            req.extensions_mut().insert(user);
                        }
                        Err(_) => {
                            let (req_parts, _payload) = req.into_parts();
                            let resp = response::unauthorized("Invalid or expired token")
                                .map_into_boxed_body();
                            let srv_resp = ServiceResponse::new(req_parts, resp);
                            return Box::pin(async move { Ok(srv_resp) });
                        }
                    }
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

fn verify_token(token: &str) -> Result<AuthUser, String> {
    let secret = env::var("JWT_SECRET").unwrap_or_default();
    match auth::validate_jwt(token, &secret) {
        Ok(claims) => Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
            name: claims.name,
            role: claims.role,
        }),
        Err(e) => Err(format!("Token decode error: {}", e)),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env();
    let mongodb = Arc::new(db::MongoDB::init(&config.mongo_uri, &config.database_name).await);
    mongodb
        .ensure_indexes()
        .await
        .expect("Failed to create database indexes");
    std::fs::create_dir_all(&config.upload_dir)?;

    let frontend_origin = config.frontend_origin.clone();
    let bind_addr = config.bind_addr.clone();

    info!("Server running at http://{}", bind_addr);
    info!("Allowed CORS origin: {}", frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication)
            .app_data(web::Data::new(AppState {
                mongodb: mongodb.clone(),
                config: config.clone(),
            }))
            .service(
                web::scope("/api")
                    .service(
                        web::scope("/auth")
                            .route("/register", web::post().to(register))
                            .route("/login", web::post().to(login))
                            .route("/profile", web::get().to(get_profile))
                            .route("/profile", web::put().to(update_profile))
                            .route("/validate", web::get().to(validate_token)),
                    )
                    // PRODUCTS (fixed paths before the `{id}` catch-all)
                    .service(
                        web::scope("/products")
                            .route("/categories", web::get().to(get_categories))
                            .route("/bestsellers", web::get().to(get_bestsellers))
                            .route("", web::get().to(list_products))
                            .route("", web::post().to(create_product))
                            .route("/{id}", web::get().to(get_product))
                            .route("/{id}", web::put().to(update_product))
                            .route("/{id}", web::delete().to(delete_product))
                            .route("/{id}/stock", web::put().to(update_stock)),
                    )
                    .service(
                        web::scope("/cart")
                            .route("/add", web::post().to(add_to_cart))
                            .route("/update", web::put().to(update_cart_item))
                            .route("/remove", web::delete().to(remove_from_cart))
                            .route("/clear/{user_id}", web::delete().to(clear_cart))
                            .route("/stats/{user_id}", web::get().to(get_cart_stats))
                            .route("/{user_id}", web::get().to(get_cart)),
                    )
                    .service(
                        web::scope("/orders")
                            .route("/user", web::get().to(get_user_orders))
                            .route("/stats/overview", web::get().to(get_order_stats))
                            .route("/status/{status}", web::get().to(get_orders_by_status))
                            .route("", web::post().to(create_order))
                            .route("", web::get().to(get_all_orders))
                            .route("/{id}", web::get().to(get_order))
                            .route("/{id}/status", web::put().to(update_order_status))
                            .route("/{id}", web::delete().to(cancel_order)),
                    )
                    .service(
                        web::scope("/reviews")
                            .route("/product/{product_id}", web::get().to(get_product_reviews))
                            .route(
                                "/product/{product_id}/stats",
                                web::get().to(get_product_review_stats),
                            )
                            .route("/user", web::get().to(get_user_reviews))
                            .route("/can-review/{order_id}", web::get().to(can_review))
                            .route("", web::post().to(create_review))
                            .route("/{review_id}", web::put().to(update_review))
                            .route("/{review_id}", web::delete().to(delete_review)),
                    )
                    .service(
                        web::scope("/payments")
                            .route("/methods", web::get().to(list_methods))
                            .route("/process", web::post().to(process_payment)),
                    )
                    .service(
                        web::scope("/upload")
                            .route("/image", web::post().to(upload_image))
                            .route("/image/{filename}", web::delete().to(delete_image)),
                    ),
            )
    })
    .bind(bind_addr)?
    .run()
    .await
}
