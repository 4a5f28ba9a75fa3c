use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, Responder};
use futures_util::TryStreamExt;
use log::{error, info};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::require_admin;
use crate::response;

const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

fn extension_for(filename: Option<&str>, content_type: Option<&str>) -> String {
    if let Some(name) = filename {
        if let Some((_, ext)) = name.rsplit_once('.') {
            if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                return ext.to_lowercase();
            }
        }
    }
    match content_type {
        Some("image/png") => "png".to_string(),
        Some("image/webp") => "webp".to_string(),
        Some("image/gif") => "gif".to_string(),
        _ => "jpg".to_string(),
    }
}

fn safe_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
}

/// POST /api/upload/image (admin, multipart). Stores the file locally under
/// a fresh UUID name; the external image host of the original storefront is
/// a non-goal.
pub async fn upload_image(
    req: HttpRequest,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> impl Responder {
    if let Err(resp) = require_admin(&req) {
        return resp;
    }

    let mut field = match payload.try_next().await {
        Ok(Some(field)) => field,
        Ok(None) => return response::bad_request("No file provided"),
        Err(e) => {
            error!("Error reading multipart payload: {}", e);
            return response::bad_request("Malformed multipart payload");
        }
    };

    let content_type = field.content_type().map(|m| m.essence_str().to_string());
    if !content_type
        .as_deref()
        .map(|ct| ct.starts_with("image/"))
        .unwrap_or(false)
    {
        return response::bad_request("Only image uploads are accepted");
    }

    let original_name = field
        .content_disposition()
        .and_then(|cd| cd.get_filename())
        .map(|name| name.to_string());
    let filename = format!(
        "{}.{}",
        Uuid::new_v4(),
        extension_for(original_name.as_deref(), content_type.as_deref())
    );
    let path = std::path::Path::new(&data.config.upload_dir).join(&filename);

    let mut file = match tokio::fs::File::create(&path).await {
        Ok(file) => file,
        Err(e) => {
            error!("Error creating upload file: {}", e);
            return response::internal("Failed to store image");
        }
    };

    let mut written = 0usize;
    loop {
        match field.try_next().await {
            Ok(Some(chunk)) => {
                written += chunk.len();
                if written > MAX_IMAGE_BYTES {
                    drop(file);
                    let _ = tokio::fs::remove_file(&path).await;
                    return response::bad_request("Image exceeds the 5 MB limit");
                }
                if let Err(e) = file.write_all(&chunk).await {
                    error!("Error writing upload chunk: {}", e);
                    let _ = tokio::fs::remove_file(&path).await;
                    return response::internal("Failed to store image");
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("Error streaming upload: {}", e);
                let _ = tokio::fs::remove_file(&path).await;
                return response::internal("Failed to store image");
            }
        }
    }

    info!("Image stored: {} ({} bytes)", filename, written);
    response::created(
        json!({ "filename": filename, "url": format!("/uploads/{}", filename) }),
        "Image uploaded successfully",
    )
}

/// DELETE /api/upload/image/{filename} (admin)
pub async fn delete_image(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    if let Err(resp) = require_admin(&req) {
        return resp;
    }

    let filename = path.into_inner();
    if !safe_filename(&filename) {
        return response::bad_request("Invalid filename");
    }

    let target = std::path::Path::new(&data.config.upload_dir).join(&filename);
    match tokio::fs::remove_file(&target).await {
        Ok(_) => response::message("Image deleted successfully"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            response::not_found("Image not found")
        }
        Err(e) => {
            error!("Error deleting image: {}", e);
            response::internal("Failed to delete image")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_prefers_the_original_filename() {
        assert_eq!(extension_for(Some("cat.PNG"), Some("image/png")), "png");
        assert_eq!(extension_for(Some("dog.jpeg"), None), "jpeg");
    }

    #[test]
    fn extension_falls_back_to_content_type() {
        assert_eq!(extension_for(None, Some("image/webp")), "webp");
        assert_eq!(extension_for(Some("noext"), Some("image/gif")), "gif");
        assert_eq!(extension_for(None, None), "jpg");
    }

    #[test]
    fn traversal_attempts_are_rejected() {
        assert!(safe_filename("a1b2c3.png"));
        assert!(!safe_filename("../etc/passwd"));
        assert!(!safe_filename("a/b.png"));
        assert!(!safe_filename(""));
    }
}
