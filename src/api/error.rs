use std::io::Cursor;

use rocket::http::{ContentType, Status};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    EncodingError(image::ImageError),
}

impl From<image::ImageError> for ApiError {
    fn from(error: image::ImageError) -> Self {
        ApiError::EncodingError(error)
    }
}

impl<'r> rocket::response::Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        let (status, body) = match self {
            ApiError::NotFound(username) => (
                Status::NotFound,
                json!({
                    "error": "Not found",
                    "message": format!("No image for player '{}'", username)
                }),
            ),
            ApiError::BadRequest(message) => (
                Status::BadRequest,
                json!({
                    "error": "Bad request",
                    "message": message
                }),
            ),
            ApiError::EncodingError(error) => {
                log::error!("Failed to encode image: {}", error);
                (
                    Status::InternalServerError,
                    json!({
                        "error": "Image encoding error",
                        "message": error.to_string()
                    }),
                )
            }
        };

        let body = body.to_string();
        rocket::Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}
