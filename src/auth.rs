use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::error;
use mongodb::bson::doc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::{Role, User};
use crate::response;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

/// Authenticated identity extracted from a verified bearer token by the
/// middleware in `main.rs` and stashed in request extensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// Public view of a user, never carries the password hash.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        UserProfile {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterInfo {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginInfo {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub password: Option<String>,
}

// JWT Creation
pub fn create_jwt(user: &User, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = Utc::now() + Duration::days(7);
    let claims = Claims {
        sub: user.user_id.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role,
        exp: expiration.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

// JWT Validation
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// The identity the auth middleware attached to this request, if any.
pub fn authed_user(req: &HttpRequest) -> Option<AuthUser> {
    req.extensions().get::<AuthUser>().cloned()
}

pub fn require_admin(req: &HttpRequest) -> Result<AuthUser, HttpResponse> {
    match authed_user(req) {
        Some(user) if user.role == Role::Admin => Ok(user),
        Some(_) => Err(response::forbidden("Admin access required")),
        None => Err(response::unauthorized("Authentication required")),
    }
}

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .map(|re| re.is_match(email))
        .unwrap_or(false)
}

// Register Endpoint
pub async fn register(
    data: web::Data<AppState>,
    info: web::Json<RegisterInfo>,
) -> impl Responder {
    if info.name.trim().len() < 2 {
        return response::bad_request("Name must be at least 2 characters");
    }
    if !valid_email(&info.email) {
        return response::bad_request("Invalid email address");
    }
    if info.password.len() < 6 {
        return response::bad_request("Password must be at least 6 characters");
    }

    let email = info.email.trim().to_lowercase();
    let users = data.mongodb.db.collection::<User>("users");

    match users.find_one(doc! { "email": &email }).await {
        Ok(Some(_)) => return response::conflict("Email already exists"),
        Ok(None) => {}
        Err(e) => {
            error!("Error checking existing user: {}", e);
            return response::internal("Registration failed");
        }
    }

    let hashed_password = match hash(&info.password, DEFAULT_COST) {
        Ok(h) => h,
        Err(e) => {
            error!("Error hashing password: {}", e);
            return response::internal("Registration failed");
        }
    };

    let now = Utc::now();
    let new_user = User {
        id: None,
        user_id: Uuid::new_v4().to_string(),
        email,
        password: hashed_password,
        name: info.name.trim().to_string(),
        role: Role::Customer,
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    match users.insert_one(&new_user).await {
        Ok(_) => response::created(UserProfile::from(&new_user), "User registered successfully"),
        // The unique index on email catches the concurrent double-submit.
        Err(e) if crate::db::is_duplicate_key(&e) => response::conflict("Email already exists"),
        Err(e) => {
            error!("Error inserting user: {}", e);
            response::internal("Registration failed")
        }
    }
}

// Login Endpoint
pub async fn login(data: web::Data<AppState>, info: web::Json<LoginInfo>) -> impl Responder {
    let email = info.email.trim().to_lowercase();
    let users = data.mongodb.db.collection::<User>("users");

    let user = match users.find_one(doc! { "email": &email }).await {
        Ok(Some(user)) => user,
        Ok(None) => return response::unauthorized("Invalid email or password"),
        Err(e) => {
            error!("Error fetching user: {}", e);
            return response::internal("Login failed");
        }
    };

    if !user.is_active {
        return response::forbidden("Account is deactivated");
    }

    if !verify(&info.password, &user.password).unwrap_or(false) {
        return response::unauthorized("Invalid email or password");
    }

    let token = match create_jwt(&user, &data.config.jwt_secret) {
        Ok(token) => token,
        Err(e) => {
            error!("Error signing token: {}", e);
            return response::internal("Login failed");
        }
    };

    response::ok(
        serde_json::json!({ "token": token, "user": UserProfile::from(&user) }),
        "Login successful",
    )
}

// Current user's profile
pub async fn get_profile(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current = match authed_user(&req) {
        Some(user) => user,
        None => return response::unauthorized("Authentication required"),
    };

    let users = data.mongodb.db.collection::<User>("users");
    match users.find_one(doc! { "user_id": &current.id }).await {
        Ok(Some(user)) => response::ok(UserProfile::from(&user), "Profile retrieved successfully"),
        Ok(None) => response::not_found("User not found"),
        Err(e) => {
            error!("Error fetching profile: {}", e);
            response::internal("Failed to retrieve profile")
        }
    }
}

pub async fn update_profile(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<UpdateProfileRequest>,
) -> impl Responder {
    let current = match authed_user(&req) {
        Some(user) => user,
        None => return response::unauthorized("Authentication required"),
    };

    let users = data.mongodb.db.collection::<User>("users");
    let mut user = match users.find_one(doc! { "user_id": &current.id }).await {
        Ok(Some(user)) => user,
        Ok(None) => return response::not_found("User not found"),
        Err(e) => {
            error!("Error fetching user: {}", e);
            return response::internal("Failed to update profile");
        }
    };

    if let Some(name) = &payload.name {
        if name.trim().len() < 2 {
            return response::bad_request("Name must be at least 2 characters");
        }
        user.name = name.trim().to_string();
    }
    if let Some(password) = &payload.password {
        if password.len() < 6 {
            return response::bad_request("Password must be at least 6 characters");
        }
        user.password = match hash(password, DEFAULT_COST) {
            Ok(h) => h,
            Err(e) => {
                error!("Error hashing password: {}", e);
                return response::internal("Failed to update profile");
            }
        };
    }
    user.updated_at = Utc::now();

    match users
        .replace_one(doc! { "user_id": &current.id }, &user)
        .await
    {
        Ok(_) => response::ok(UserProfile::from(&user), "Profile updated successfully"),
        Err(e) => {
            error!("Error updating profile: {}", e);
            response::internal("Failed to update profile")
        }
    }
}

/// Token sanity check for the frontend; the middleware already verified it.
pub async fn validate_token(req: HttpRequest) -> impl Responder {
    match authed_user(&req) {
        Some(user) => response::ok(user, "Token is valid"),
        None => response::unauthorized("Invalid or expired token"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        let now = Utc::now();
        User {
            id: None,
            user_id: "u-1".to_string(),
            email: "jo@example.com".to_string(),
            password: String::new(),
            name: "Jo".to_string(),
            role: Role::Customer,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn jwt_round_trip_preserves_claims() {
        let token = create_jwt(&test_user(), "test-secret").unwrap();
        let claims = validate_jwt(&token, "test-secret").unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.email, "jo@example.com");
        assert_eq!(claims.role, Role::Customer);
    }

    #[test]
    fn jwt_rejects_wrong_secret() {
        let token = create_jwt(&test_user(), "test-secret").unwrap();
        assert!(validate_jwt(&token, "other-secret").is_err());
    }

    #[test]
    fn email_validation() {
        assert!(valid_email("a@b.co"));
        assert!(valid_email("first.last@shop.example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("a@b"));
        assert!(!valid_email("a b@c.de"));
    }

    #[test]
    fn bcrypt_verify_matches_only_original_password() {
        let hashed = bcrypt::hash("hunter22", 4).unwrap();
        assert!(verify("hunter22", &hashed).unwrap());
        assert!(!verify("hunter23", &hashed).unwrap());
    }
}
