use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use shop_list::list::codec;

use super::ApiState;
use super::models::{
    CreateItemRequest, ErrorResponse, ItemResponse, ListViewResponse, SuggestQuery,
    UpdateItemRequest,
};

fn view_response(state: &ApiState) -> ListViewResponse {
    let list = &state.list;
    ListViewResponse::new(
        &list.options().list_id,
        state.card.display_title(),
        &list.view(),
        list.pending_writes(),
    )
}

pub async fn get_card(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.card)
}

pub async fn list_items(State(state): State<ApiState>) -> impl IntoResponse {
    (StatusCode::OK, Json(view_response(&state))).into_response()
}

pub async fn create_item(
    State(state): State<ApiState>,
    Json(req): Json<CreateItemRequest>,
) -> impl IntoResponse {
    let input = codec::parse_input(&req.text, &state.list.options().codec);
    if input.name.is_empty() {
        return ErrorResponse::bad_request("Item name must not be empty");
    }

    state.list.add_or_bump(&req.text).await;

    match state.list.find(&input.name) {
        Some(item) => (StatusCode::CREATED, Json(ItemResponse::from(&item))).into_response(),
        None => ErrorResponse::internal(format!("Store did not accept '{}'", input.name)),
    }
}

pub async fn update_item(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> impl IntoResponse {
    let list = &state.list;
    let Some(item) = list.get(&id) else {
        return ErrorResponse::not_found("Item not found");
    };

    if let Some(name) = &req.name
        && name.trim().is_empty()
    {
        return ErrorResponse::bad_request("Item name must not be empty");
    }
    if req.category.is_some() && !list.options().codec.categories {
        return ErrorResponse::bad_request("Categories are disabled for this list");
    }

    if let Some(quantity) = req.quantity {
        list.set_quantity(&id, quantity);
    }
    if let Some(name) = &req.name {
        list.rename(&id, name).await;
    }
    if let Some(notes) = &req.notes {
        list.set_notes(&id, notes).await;
    }
    if let Some(category) = &req.category {
        list.set_category(&id, category).await;
    }
    if let Some(completed) = req.completed
        && completed != item.is_completed()
    {
        list.toggle_complete(&id).await;
    }

    match list.get(&id) {
        Some(item) => (StatusCode::OK, Json(ItemResponse::from(&item))).into_response(),
        None => ErrorResponse::not_found("Item was removed while updating"),
    }
}

pub async fn delete_item(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.list.get(&id).is_none() {
        return ErrorResponse::not_found("Item not found");
    }
    state.list.remove(&id).await;
    StatusCode::NO_CONTENT.into_response()
}

pub async fn clear_completed(State(state): State<ApiState>) -> impl IntoResponse {
    state.list.clear_completed().await;
    (StatusCode::OK, Json(view_response(&state))).into_response()
}

pub async fn suggest(
    State(state): State<ApiState>,
    Query(query): Query<SuggestQuery>,
) -> impl IntoResponse {
    let suggestions: Vec<ItemResponse> = state
        .list
        .suggest(&query.q)
        .iter()
        .map(ItemResponse::from)
        .collect();
    (StatusCode::OK, Json(suggestions)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::response::Response;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use shop_list::config::CardConfig;
    use shop_list::engine::{ListOptions, ShoppingList};
    use shop_list::list::ItemStatus;
    use shop_list::store::MemoryStore;
    use std::sync::Arc;

    const LIST: &str = "todo.shopping";

    async fn api_state(seed: &[(&str, ItemStatus)]) -> (ApiState, Vec<String>) {
        let store = Arc::new(MemoryStore::new());
        let ids = seed
            .iter()
            .map(|(summary, status)| store.insert(LIST, summary, *status))
            .collect();
        let list = ShoppingList::new(store, ListOptions::new(LIST));
        list.fetch_all().await;
        let card = CardConfig {
            list_id: LIST.to_string(),
            ..CardConfig::default()
        };
        (ApiState { list, card }, ids)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_list_items_splits_active_and_completed() {
        let (state, _) = api_state(&[
            ("Milk (2)", ItemStatus::NeedsAction),
            ("Eggs", ItemStatus::Completed),
        ])
        .await;

        let response = list_items(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["title"], "Shopping List");
        assert_eq!(body["active"][0]["name"], "Milk");
        assert_eq!(body["active"][0]["quantity"], 2);
        assert_eq!(body["completed"][0]["name"], "Eggs");
    }

    #[tokio::test]
    async fn test_create_item_rejects_empty_name() {
        let (state, _) = api_state(&[]).await;
        let req = CreateItemRequest {
            text: "  (3) ".to_string(),
        };

        let response = create_item(State(state), Json(req)).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_item_returns_created_item() {
        let (state, _) = api_state(&[]).await;
        let req = CreateItemRequest {
            text: "Bread [Bakery]".to_string(),
        };

        let response = create_item(State(state), Json(req)).await.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert_eq!(body["name"], "Bread");
        assert_eq!(body["category"], "Bakery");
        assert_eq!(body["summary"], "Bread [Bakery]");
    }

    #[tokio::test]
    async fn test_update_unknown_item_is_not_found() {
        let (state, _) = api_state(&[]).await;
        let response = update_item(
            State(state),
            Path("missing".to_string()),
            Json(UpdateItemRequest::default()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_item_applies_fields() {
        let (state, ids) = api_state(&[("Cheese", ItemStatus::NeedsAction)]).await;
        let req = UpdateItemRequest {
            quantity: Some(3),
            category: Some("Dairy".to_string()),
            completed: Some(true),
            ..UpdateItemRequest::default()
        };

        let response = update_item(State(state.clone()), Path(ids[0].clone()), Json(req))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["quantity"], 3);
        assert_eq!(body["category"], "Dairy");
        assert_eq!(body["completed"], true);
        state.list.flush().await;
    }

    #[tokio::test]
    async fn test_delete_item() {
        let (state, ids) = api_state(&[("Milk", ItemStatus::NeedsAction)]).await;

        let response = delete_item(State(state.clone()), Path(ids[0].clone()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.list.snapshot().is_empty());

        let again = delete_item(State(state), Path(ids[0].clone()))
            .await
            .into_response();
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_suggest_returns_ranked_items() {
        let (state, _) = api_state(&[
            ("Bananas", ItemStatus::NeedsAction),
            ("Apples", ItemStatus::Completed),
        ])
        .await;

        let response = suggest(
            State(state),
            Query(SuggestQuery {
                q: "app".to_string(),
            }),
        )
        .await
        .into_response();

        let body = body_json(response).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["name"], "Apples");
    }
}
