//! Notifications, search, document repository, metadata fields and health

use serde_json::Value;

use crate::client::{ApiClient, ListParams, RequestDescriptor, segment};
use crate::contracts::API_V1;
use crate::envelope::{ApiResponse, ListEnvelope};
use crate::models::{Folder, Notification, SearchResult};

const API: &str = "/api";

impl ApiClient {
    pub async fn list_notifications(
        &self,
        params: &ListParams,
    ) -> ApiResponse<ListEnvelope<Notification>> {
        self.send(RequestDescriptor::get(format!("{API}/notifications/")).params(params))
            .await
    }

    pub async fn create_notification(&self, notification: &Value) -> ApiResponse<Notification> {
        self.send(RequestDescriptor::post(format!("{API}/notifications/")).json(notification))
            .await
    }

    pub async fn mark_notification_read(&self, id: &str) -> ApiResponse<Value> {
        self.send(
            RequestDescriptor::put(format!("{API}/notifications/{}/", segment(id)))
                .json(&serde_json::json!({ "read": true })),
        )
        .await
    }

    /// Keyword search; `q` is merged with any extra filters in `params`.
    pub async fn search(
        &self,
        q: &str,
        params: &ListParams,
    ) -> ApiResponse<ListEnvelope<SearchResult>> {
        let params = params.clone().set("q", q);
        self.send(RequestDescriptor::get(format!("{API}/search/")).params(&params))
            .await
    }

    pub async fn semantic_search(&self, q: &str) -> ApiResponse<ListEnvelope<SearchResult>> {
        self.send(RequestDescriptor::get(format!("{API}/search/semantic/")).query("q", q))
            .await
    }

    pub async fn advanced_search(&self, criteria: &Value) -> ApiResponse<ListEnvelope<SearchResult>> {
        self.send(RequestDescriptor::post(format!("{API}/search/advanced/")).json(criteria))
            .await
    }

    pub async fn search_suggestions(&self, q: &str) -> ApiResponse<Value> {
        self.send(RequestDescriptor::get(format!("{API}/search/suggestions/")).query("q", q))
            .await
    }

    pub async fn list_documents(&self) -> ApiResponse<ListEnvelope<Value>> {
        self.send(RequestDescriptor::get(format!("{API}/documents/")))
            .await
    }

    pub async fn repository(&self) -> ApiResponse<Value> {
        self.send(RequestDescriptor::get(format!("{API}/repository/")))
            .await
    }

    pub async fn repository_folders(&self) -> ApiResponse<ListEnvelope<Folder>> {
        self.send(RequestDescriptor::get(format!("{API}/repository/folders/")))
            .await
    }

    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> ApiResponse<Folder> {
        self.send(
            RequestDescriptor::post(format!("{API}/repository/folders/"))
                .json(&serde_json::json!({ "name": name, "parent_id": parent_id })),
        )
        .await
    }

    pub async fn create_metadata_field(&self, field: &Value) -> ApiResponse<Value> {
        self.send(RequestDescriptor::post(format!("{API}/metadata/fields/")).json(field))
            .await
    }

    pub async fn metadata_fields(&self) -> ApiResponse<ListEnvelope<Value>> {
        self.send(RequestDescriptor::get(format!("{API}/metadata/fields/")))
            .await
    }

    pub async fn health(&self) -> ApiResponse<Value> {
        self.send(RequestDescriptor::get(format!("{API_V1}/health/")))
            .await
    }
}
