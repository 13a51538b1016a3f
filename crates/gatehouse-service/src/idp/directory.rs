//! Read-only directory lookups against the IdP admin API.
//!
//! Directory data is display-only. Access decisions read roles and groups
//! from the verified token or session, never from here.

use crate::idp::credential::{AdminCredentialCache, CredentialError};
use crate::observability::metrics;
use async_trait::async_trait;
use common::secret::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

/// Subgroup nesting deeper than this is not walked.
pub const MAX_GROUP_DEPTH: usize = 8;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("admin API returned status {0}")]
    Status(u16),

    #[error("invalid admin API response: {0}")]
    InvalidBody(String),
}

/// Group as listed by the admin API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub sub_groups: Vec<GroupSummary>,
}

/// Direct member of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// One node of the organization tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupNode {
    pub id: String,
    pub name: String,
    pub path: String,
    pub sub_group_count: usize,
    pub members: Vec<Member>,
    pub sub_groups: Vec<GroupNode>,
}

impl GroupNode {
    /// Direct members of this node and every descendant.
    pub fn total_members(&self) -> usize {
        self.members.len()
            + self
                .sub_groups
                .iter()
                .map(GroupNode::total_members)
                .sum::<usize>()
    }
}

/// Organization directory.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Top-level groups with their members and nested subgroups.
    async fn group_hierarchy(&self) -> Result<Vec<GroupNode>, DirectoryError>;
}

/// Keycloak admin API directory.
pub struct KeycloakDirectory {
    admin_api_url: String,
    http_client: reqwest::Client,
    credentials: Arc<AdminCredentialCache>,
}

impl KeycloakDirectory {
    /// `admin_api_url` is `{server}/admin/realms/{realm}`.
    pub fn new(
        admin_api_url: String,
        http_client: reqwest::Client,
        credentials: Arc<AdminCredentialCache>,
    ) -> Self {
        Self {
            admin_api_url,
            http_client,
            credentials,
        }
    }

    async fn top_level_groups(&self) -> Result<Vec<GroupSummary>, DirectoryError> {
        self.get_json("/groups").await
    }

    async fn members(&self, group_id: &str) -> Result<Vec<Member>, DirectoryError> {
        self.get_json(&format!("/groups/{group_id}/members")).await
    }

    async fn subgroups(&self, group_id: &str) -> Result<Vec<GroupSummary>, DirectoryError> {
        let group: GroupSummary = self.get_json(&format!("/groups/{group_id}")).await?;
        Ok(group.sub_groups)
    }

    fn build_node<'a>(
        &'a self,
        group: &'a GroupSummary,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<GroupNode, DirectoryError>> + Send + 'a>> {
        Box::pin(async move {
            // a group whose member list fails still shows up, just empty
            let members = match self.members(&group.id).await {
                Ok(members) => members,
                Err(DirectoryError::Credential(e)) => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(target: "gatehouse.idp.directory", group = %group.name, error = %e, "Failed to list group members");
                    Vec::new()
                }
            };

            let mut sub_groups = Vec::new();
            if depth < MAX_GROUP_DEPTH {
                for child in self.subgroups(&group.id).await? {
                    sub_groups.push(self.build_node(&child, depth + 1).await?);
                }
            } else {
                tracing::warn!(target: "gatehouse.idp.directory", group = %group.name, "Group nesting too deep, not descending");
            }

            Ok(GroupNode {
                id: group.id.clone(),
                name: group.name.clone(),
                path: group.path.clone(),
                sub_group_count: sub_groups.len(),
                members,
                sub_groups,
            })
        })
    }

    /// GET an admin API resource. A 401 drops the cached credential so the
    /// next call acquires a fresh one.
    async fn get_json<T: DeserializeOwned>(&self, resource: &str) -> Result<T, DirectoryError> {
        let url = format!("{}{}", self.admin_api_url, resource);
        let token = self.credentials.get().await?;
        let start = Instant::now();

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                metrics::record_directory_call("error", start.elapsed());
                tracing::error!(target: "gatehouse.idp.directory", error = %e, "Admin API request failed");
                DirectoryError::Transport(e.to_string())
            })?;

        let status = response.status();
        metrics::record_directory_call(
            if status.is_success() { "success" } else { "error" },
            start.elapsed(),
        );

        if status.as_u16() == 401 {
            tracing::warn!(target: "gatehouse.idp.directory", "Admin credential rejected, invalidating");
            self.credentials.invalidate().await;
        }

        if !status.is_success() {
            tracing::error!(target: "gatehouse.idp.directory", status = %status, resource = %resource, "Admin API returned error");
            return Err(DirectoryError::Status(status.as_u16()));
        }

        response.json().await.map_err(|e| {
            tracing::error!(target: "gatehouse.idp.directory", error = %e, "Failed to parse admin API response");
            DirectoryError::InvalidBody(e.to_string())
        })
    }
}

#[async_trait]
impl DirectoryClient for KeycloakDirectory {
    #[instrument(skip_all, name = "gatehouse.idp.directory.hierarchy")]
    async fn group_hierarchy(&self) -> Result<Vec<GroupNode>, DirectoryError> {
        let top_level = self.top_level_groups().await?;
        let mut nodes = Vec::with_capacity(top_level.len());
        for group in &top_level {
            nodes.push(self.build_node(group, 1).await?);
        }
        Ok(nodes)
    }
}
