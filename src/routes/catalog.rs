//! Reference Data Endpoints
//!
//! Static sports and cities/areas catalogs.

use axum::{extract::Path, Json};
use serde::Serialize;

use crate::error::ApiError;
use crate::types::catalog::{self, Area, Sport};
use crate::types::ApiResponse;

#[derive(Debug, Serialize)]
pub struct CitySummary {
    pub id: &'static str,
    pub name: &'static str,
    pub country: &'static str,
}

/// GET /catalog/sports
pub async fn sports() -> Json<ApiResponse<&'static [Sport]>> {
    Json(ApiResponse::success(catalog::SPORTS))
}

/// GET /catalog/cities
pub async fn cities() -> Json<ApiResponse<Vec<CitySummary>>> {
    let cities = catalog::CITIES
        .iter()
        .map(|city| CitySummary {
            id: city.id,
            name: city.name,
            country: city.country,
        })
        .collect();
    Json(ApiResponse::success(cities))
}

/// GET /catalog/cities/:city/areas
pub async fn areas(Path(city): Path<String>) -> Result<Json<ApiResponse<&'static [Area]>>, ApiError> {
    let city = catalog::city_by_id(&city).ok_or_else(|| ApiError::NotFound("City".to_string()))?;
    Ok(Json(ApiResponse::success(city.areas)))
}
