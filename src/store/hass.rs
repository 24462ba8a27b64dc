//! Home Assistant `todo` entity backend.
//!
//! Talks to the REST API's service endpoints: `todo.get_items` (with
//! `return_response`), `todo.add_item`, `todo.update_item` and
//! `todo.remove_item`. The list id is the todo entity id, e.g.
//! `todo.shopping_list`. Out-of-band edits are detected by polling.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ChangeStream, ItemPatch, ItemStore, RemoteItem};
use crate::list::ItemStatus;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct HassStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct HassTodoItem {
    uid: String,
    summary: String,
    status: ItemStatus,
    #[serde(default)]
    description: Option<String>,
}

impl From<HassTodoItem> for RemoteItem {
    fn from(item: HassTodoItem) -> Self {
        Self {
            id: item.uid,
            summary: item.summary,
            status: item.status,
            description: item.description,
        }
    }
}

impl HassStore {
    pub fn new(base_url: &str, token: &str, poll_interval: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("shop-list")
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            poll_interval: if poll_interval.is_zero() {
                DEFAULT_POLL_INTERVAL
            } else {
                poll_interval
            },
        })
    }

    fn service_url(&self, service: &str, return_response: bool) -> String {
        let mut url = format!("{}/api/services/todo/{}", self.base_url, service);
        if return_response {
            url.push_str("?return_response");
        }
        url
    }

    async fn call_service(&self, service: &str, body: Value, return_response: bool) -> Result<Value> {
        let url = self.service_url(service, return_response);
        debug!(service = %service, "Calling Home Assistant service");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Request to todo.{} failed", service))?;

        let status = response.status();
        if !status.is_success() {
            bail!(
                "todo.{} returned HTTP {} {}",
                service,
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            );
        }

        if return_response {
            Ok(response.json().await?)
        } else {
            Ok(Value::Null)
        }
    }
}

fn get_items_body(entity_id: &str) -> Value {
    json!({ "entity_id": entity_id })
}

fn add_item_body(entity_id: &str, summary: &str, description: Option<&str>) -> Value {
    let mut body = json!({ "entity_id": entity_id, "item": summary });
    if let Some(description) = description.filter(|d| !d.is_empty()) {
        body["description"] = json!(description);
    }
    body
}

fn update_item_body(entity_id: &str, id: &str, patch: &ItemPatch) -> Value {
    let mut body = json!({ "entity_id": entity_id, "item": id });
    if let Some(summary) = &patch.summary {
        body["rename"] = json!(summary);
    }
    if let Some(status) = patch.status {
        body["status"] = json!(status);
    }
    if let Some(description) = &patch.description {
        body["description"] = json!(description);
    }
    body
}

fn remove_item_body(entity_id: &str, ids: &[String]) -> Value {
    json!({ "entity_id": entity_id, "item": ids })
}

/// Pull `service_response.<entity>.items` out of a `get_items` response.
fn parse_items_response(response: &Value, entity_id: &str) -> Result<Vec<RemoteItem>> {
    let items = response
        .get("service_response")
        .and_then(|r| r.get(entity_id))
        .and_then(|e| e.get("items"))
        .ok_or_else(|| anyhow!("No items for {} in service response", entity_id))?;

    let items: Vec<HassTodoItem> = serde_json::from_value(items.clone())
        .context("Unexpected todo item shape in service response")?;
    Ok(items.into_iter().map(RemoteItem::from).collect())
}

#[async_trait]
impl ItemStore for HassStore {
    async fn list(&self, list_id: &str) -> Result<Vec<RemoteItem>> {
        let response = self
            .call_service("get_items", get_items_body(list_id), true)
            .await?;
        parse_items_response(&response, list_id)
    }

    async fn add(&self, list_id: &str, summary: &str, description: Option<&str>) -> Result<()> {
        self.call_service("add_item", add_item_body(list_id, summary, description), false)
            .await?;
        Ok(())
    }

    async fn update(&self, list_id: &str, id: &str, patch: ItemPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        self.call_service("update_item", update_item_body(list_id, id, &patch), false)
            .await?;
        Ok(())
    }

    async fn remove(&self, list_id: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.call_service("remove_item", remove_item_body(list_id, ids), false)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, list_id: &str) -> Result<ChangeStream> {
        let store = self.clone();
        let list_id = list_id.to_string();
        let last = self.list(&list_id).await.ok();

        let changes = stream::unfold((store, list_id, last), |(store, list_id, mut last)| async move {
            loop {
                tokio::time::sleep(store.poll_interval).await;
                match store.list(&list_id).await {
                    Ok(items) => {
                        if last.as_ref() != Some(&items) {
                            last = Some(items);
                            return Some(((), (store, list_id, last)));
                        }
                    }
                    Err(e) => warn!(list_id = %list_id, error = %e, "Polling todo entity failed"),
                }
            }
        });
        Ok(changes.boxed())
    }
}
