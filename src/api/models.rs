use axum::{Json, body::Body, http::StatusCode, response::{IntoResponse, Response}};
use serde::{Deserialize, Serialize};

use shop_list::list::{Item, ListView};

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
    pub completed: bool,
    pub summary: String,
}

impl From<&Item> for ItemResponse {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            quantity: item.quantity,
            category: item.category.clone(),
            notes: item.notes.clone(),
            completed: item.is_completed(),
            summary: item.summary.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListViewResponse {
    pub list_id: String,
    pub title: String,
    pub active: Vec<ItemResponse>,
    pub completed: Vec<ItemResponse>,
    pub pending_writes: usize,
}

impl ListViewResponse {
    pub fn new(list_id: &str, title: &str, view: &ListView, pending_writes: usize) -> Self {
        Self {
            list_id: list_id.to_string(),
            title: title.to_string(),
            active: view.active.iter().map(ItemResponse::from).collect(),
            completed: view.completed.iter().map(ItemResponse::from).collect(),
            pending_writes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    /// Free text in the summary grammar, e.g. `Eggs (12) [Dairy] // large`
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: Option<i64>,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub category: Option<String>,
    pub completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }

    pub fn internal(e: impl std::fmt::Display) -> Response<Body> {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(Self::new(e.to_string()))).into_response()
    }

    pub fn not_found(message: impl Into<String>) -> Response<Body> {
        (StatusCode::NOT_FOUND, Json(Self::new(message))).into_response()
    }

    pub fn bad_request(message: impl Into<String>) -> Response<Body> {
        (StatusCode::BAD_REQUEST, Json(Self::new(message))).into_response()
    }
}
