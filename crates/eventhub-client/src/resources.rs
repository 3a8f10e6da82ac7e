//! Typed access to the admin collections.
//!
//! Each collection (`/api/events`, `/api/communities`, `/api/users`) is a
//! [`Resource`]; [`ResourceApi`] provides the list/get/create/update/delete
//! operations for it. Reads go through the response cache and every
//! mutation evicts the collection's cached responses.

use std::marker::PhantomData;
use std::path::Path;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::generation::RequestGeneration;
use crate::pagination::{ListQuery, Page};
use crate::roles::{Role, Section};
use crate::upload;

pub const SETTINGS_PATH: &str = "/api/settings";

/// A collection exposed by the admin API.
pub trait Resource: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection path, e.g. `/api/events`.
    const PATH: &'static str;
    /// Admin section that gates access to this collection.
    const SECTION: Section;
    /// Body field that carries an inline image, if the resource has one.
    const IMAGE_FIELD: Option<&'static str>;

    fn id(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub starts_at: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub ends_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resource for Event {
    const PATH: &'static str = "/api/events";
    const SECTION: Section = Section::Events;
    const IMAGE_FIELD: Option<&'static str> = Some("coverImage");

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resource for Community {
    const PATH: &'static str = "/api/communities";
    const SECTION: Section = Section::Communities;
    const IMAGE_FIELD: Option<&'static str> = Some("logo");

    fn id(&self) -> &str {
        &self.id
    }
}

/// An account as seen from user management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedUser {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resource for ManagedUser {
    const PATH: &'static str = "/api/users";
    const SECTION: Section = Section::Users;
    const IMAGE_FIELD: Option<&'static str> = Some("avatar");

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_email: Option<String>,
    #[serde(default)]
    pub maintenance_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_open: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// CRUD operations for one collection.
pub struct ResourceApi<T> {
    client: ApiClient,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ResourceApi<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Resource> ResourceApi<T> {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            _marker: PhantomData,
        }
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Page<T>, ApiError> {
        self.client.list(T::PATH, query).await?.into_typed()
    }

    pub async fn get(&self, id: &str) -> Result<T, ApiError> {
        let value = self.client.get_cached(&item_path(T::PATH, id), &[]).await?;
        decode_item(value)
    }

    pub async fn create(&self, body: &Value) -> Result<T, ApiError> {
        let value = self.client.request(Method::POST, T::PATH, Some(body)).await?;
        self.client.invalidate_cached(T::PATH);
        decode_item(value)
    }

    pub async fn update(&self, id: &str, body: &Value) -> Result<T, ApiError> {
        let value = self
            .client
            .request(Method::PUT, &item_path(T::PATH, id), Some(body))
            .await?;
        self.client.invalidate_cached(T::PATH);
        decode_item(value)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .request(Method::DELETE, &item_path(T::PATH, id), None)
            .await?;
        self.client.invalidate_cached(T::PATH);
        Ok(())
    }
}

/// Sets the resource's image field in `body` to the file at `path`.
pub fn attach_image<T: Resource>(
    body: &mut Value,
    path: &Path,
    max_bytes: u64,
) -> Result<(), ApiError> {
    let field = T::IMAGE_FIELD.ok_or_else(|| {
        ApiError::InvalidState(format!("{} has no image field", T::SECTION))
    })?;
    let Some(object) = body.as_object_mut() else {
        return Err(ApiError::InvalidState(
            "request body must be a JSON object".to_string(),
        ));
    };
    object.insert(
        field.to_string(),
        Value::String(upload::encode_data_url(path, max_bytes)?),
    );
    Ok(())
}

/// Platform-wide settings.
#[derive(Clone)]
pub struct SettingsApi {
    client: ApiClient,
}

impl SettingsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn get(&self) -> Result<PlatformSettings, ApiError> {
        let value = self.client.get_cached(SETTINGS_PATH, &[]).await?;
        decode_item(value)
    }

    /// Applies a partial update and returns the resulting settings.
    pub async fn update(&self, changes: &Value) -> Result<PlatformSettings, ApiError> {
        let value = self
            .client
            .request(Method::PUT, SETTINGS_PATH, Some(changes))
            .await?;
        self.client.invalidate_cached(SETTINGS_PATH);
        decode_item(value)
    }
}

/// A list view that only ever shows the response to its latest request.
pub struct ListController<T> {
    api: ResourceApi<T>,
    generation: RequestGeneration,
}

impl<T: Resource> ListController<T> {
    pub fn new(api: ResourceApi<T>) -> Self {
        Self {
            api,
            generation: RequestGeneration::new(),
        }
    }

    /// Loads a page. Returns `Ok(None)` when a later `load` superseded this one
    /// while it was in flight.
    pub async fn load(&self, query: &ListQuery) -> Result<Option<Page<T>>, ApiError> {
        let ticket = self.generation.begin();
        let page = self.api.list(query).await?;
        if !ticket.is_current() {
            tracing::debug!(ticket = ticket.id(), "discarding stale list response");
        }
        Ok(ticket.accept(page))
    }

    /// Makes every in-flight load resolve to `None`.
    pub fn cancel(&self) {
        self.generation.cancel_all();
    }
}

impl ApiClient {
    pub fn events(&self) -> ResourceApi<Event> {
        ResourceApi::new(self.clone())
    }

    pub fn communities(&self) -> ResourceApi<Community> {
        ResourceApi::new(self.clone())
    }

    pub fn users(&self) -> ResourceApi<ManagedUser> {
        ResourceApi::new(self.clone())
    }

    pub fn settings(&self) -> SettingsApi {
        SettingsApi::new(self.clone())
    }
}

/// Ids are percent-encoded as a single path segment (`a b` -> `a%20b`).
fn item_path(collection: &str, id: &str) -> String {
    format!("{collection}/{}", urlencoding::encode(id))
}

/// Single-item responses come either bare or wrapped in `{ "data": ... }`.
fn decode_item<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    let value = match value {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_path_encodes_id() {
        assert_eq!(item_path("/api/events", "42"), "/api/events/42");
        assert_eq!(item_path("/api/events", "a/b c"), "/api/events/a%2Fb%20c");
        assert_eq!(item_path("/api/events", "1+1"), "/api/events/1%2B1");
    }

    #[test]
    fn test_decode_item_accepts_bare_and_wrapped() {
        let bare: Community = decode_item(json!({ "id": "c1", "name": "Rustaceans" })).unwrap();
        let wrapped: Community =
            decode_item(json!({ "data": { "id": "c1", "name": "Rustaceans" } })).unwrap();
        assert_eq!(bare, wrapped);
        assert!(decode_item::<Community>(Value::Null).is_err());
    }

    #[test]
    fn test_event_dates_and_extra_fields() {
        let event: Event = serde_json::from_value(json!({
            "id": "e1",
            "title": "RustConf",
            "startsAt": "2026-09-01T09:00:00Z",
            "capacity": 300
        }))
        .unwrap();
        assert_eq!(event.starts_at.unwrap().year(), 2026);
        assert_eq!(event.ends_at, None);
        assert_eq!(event.extra["capacity"], 300);

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["startsAt"], "2026-09-01T09:00:00Z");
        assert!(back.get("endsAt").is_none());
    }

    #[test]
    fn test_attach_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        std::fs::write(&path, b"png").unwrap();

        let mut body = json!({ "name": "Rustaceans" });
        attach_image::<Community>(&mut body, &path, upload::DEFAULT_MAX_UPLOAD_BYTES).unwrap();
        assert_eq!(body["logo"], "data:image/png;base64,cG5n");

        let mut not_object = json!([1, 2]);
        assert!(
            attach_image::<Community>(&mut not_object, &path, upload::DEFAULT_MAX_UPLOAD_BYTES)
                .is_err()
        );
    }
}
