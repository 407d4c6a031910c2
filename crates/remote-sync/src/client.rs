//! HTTP client for the remote relational store.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use liftlog_core::sync::{RemoteChange, SyncEntity};

use crate::error::{RemoteSyncError, Result};
use crate::remote::RemoteStore;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Reqwest-backed [`RemoteStore`] speaking the remote's JSON row API.
pub struct RemoteApiClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    rows: Vec<RemoteChange>,
}

fn entity_table(entity: SyncEntity) -> &'static str {
    match entity {
        SyncEntity::MethodInstance => "method_instances",
        SyncEntity::WorkoutSession => "workout_sessions",
        SyncEntity::WorkoutTemplate => "workout_templates",
    }
}

impl RemoteApiClient {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(RemoteSyncError::invalid_request("empty base URL"));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url,
            access_token: access_token.into(),
        })
    }

    fn row_url(&self, entity: SyncEntity, entity_id: &str) -> String {
        format!("{}/v1/{}/{}", self.base_url, entity_table(entity), entity_id)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(RemoteSyncError::api(status.as_u16(), message))
    }
}

#[async_trait]
impl RemoteStore for RemoteApiClient {
    async fn upsert(
        &self,
        entity: SyncEntity,
        entity_id: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let response = self
            .http
            .put(self.row_url(entity, entity_id))
            .bearer_auth(&self.access_token)
            .json(payload)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, entity: SyncEntity, entity_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.row_url(entity, entity_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        // Deleting a row the remote never saw is a successful no-op.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn pull_since(
        &self,
        user_id: &str,
        entity: SyncEntity,
        since: Option<&str>,
    ) -> Result<Vec<RemoteChange>> {
        let url = format!("{}/v1/{}", self.base_url, entity_table(entity));
        let mut request = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&[("user_id", user_id)]);
        if let Some(since) = since {
            request = request.query(&[("updated_after", since)]);
        }

        let response = Self::check(request.send().await?).await?;
        let body: PullResponse = response.json().await?;
        Ok(body.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_tables_match_the_remote_schema() {
        assert_eq!(entity_table(SyncEntity::MethodInstance), "method_instances");
        assert_eq!(entity_table(SyncEntity::WorkoutSession), "workout_sessions");
        assert_eq!(entity_table(SyncEntity::WorkoutTemplate), "workout_templates");
    }

    #[test]
    fn rejects_an_empty_base_url() {
        assert!(RemoteApiClient::new("", "token").is_err());
    }
}
