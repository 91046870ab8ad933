use std::io::Cursor;
use std::sync::Arc;

use rocket::http::{ContentType, Header, Status};
use rocket::{request::Request, response::{self, Response, Responder}};
use rocket::State;

use skinservice::images::scale;
use skinservice::{Image, SkinRepository};

use crate::api::ApiError;

/// Largest width or height a caller may scale to.
const MAX_DIMENSION: u32 = 1024;

#[derive(FromForm)]
pub struct SkinQuery {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fallback: Option<bool>,
}

#[derive(FromForm)]
pub struct ScaleQuery {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[get("/skin/<username>?<query..>")]
pub async fn get_skin(
    username: &str,
    query: SkinQuery,
    repository: &State<Arc<SkinRepository>>,
) -> Result<PngResponse, ApiError> {
    let skin = repository
        .get_skin(username, query.fallback.unwrap_or(true))
        .await
        .ok_or_else(|| ApiError::NotFound(username.to_string()))?;

    PngResponse::render(&skin, query.width, query.height, repository.cache_expiry().as_secs())
}

#[get("/cape/<username>?<query..>")]
pub async fn get_cape(
    username: &str,
    query: ScaleQuery,
    repository: &State<Arc<SkinRepository>>,
) -> Result<PngResponse, ApiError> {
    let cape = repository
        .get_cape(username)
        .await
        .ok_or_else(|| ApiError::NotFound(username.to_string()))?;

    PngResponse::render(&cape, query.width, query.height, repository.cache_expiry().as_secs())
}

#[delete("/skin/<username>")]
pub fn invalidate_skin(username: &str, repository: &State<Arc<SkinRepository>>) -> Status {
    repository.invalidate_skin(username);
    Status::NoContent
}

#[delete("/cape/<username>")]
pub fn invalidate_cape(username: &str, repository: &State<Arc<SkinRepository>>) -> Status {
    repository.invalidate_cape(username);
    Status::NoContent
}

// Responder for PNG data
pub struct PngResponse {
    pub data: Vec<u8>,
    pub max_age: u64,
}

impl PngResponse {
    fn render(
        img: &Image,
        width: Option<u32>,
        height: Option<u32>,
        max_age: u64,
    ) -> Result<Self, ApiError> {
        let data = match (width, height) {
            (None, None) => img.to_png()?,
            (Some(w), Some(h)) => {
                if w == 0 || h == 0 || w > MAX_DIMENSION || h > MAX_DIMENSION {
                    return Err(ApiError::BadRequest(format!(
                        "width and height must be between 1 and {}",
                        MAX_DIMENSION
                    )));
                }
                scale(img, w, h).to_png()?
            }
            _ => {
                return Err(ApiError::BadRequest(
                    "width and height must be given together".to_string(),
                ))
            }
        };

        Ok(Self { data, max_age })
    }
}

impl<'r> Responder<'r, 'static> for PngResponse {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let etag = format!("\"{:x}\"", md5::compute(&self.data));
        let cache_control = format!("public, max-age={}", self.max_age);
        // Check If-None-Match header
        if let Some(if_none_match) = req.headers().get_one("If-None-Match") {
            if if_none_match == etag {
                return Response::build()
                    .status(Status::NotModified)
                    .header(Header::new("ETag", etag))
                    .header(Header::new("Cache-Control", cache_control))
                    .ok();
            }
        }
        Response::build()
            .header(ContentType::PNG)
            .header(Header::new("Cache-Control", cache_control))
            .header(Header::new("ETag", etag))
            .sized_body(self.data.len(), Cursor::new(self.data))
            .ok()
    }
}
