//! crates/lesson_planner_core/src/api/plans.rs
//!
//! Plan entities and the `/plans` endpoint mapping.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

use super::{decode_list, decode_or_default, segment, SaveResponse};
use crate::domain::{parse_timestamp, VersionList};
use crate::ports::{PortError, PortResult};
use crate::request::ApiClient;
use crate::store::{
    Consistency, GenerateParams, GenerativeApi, Resource, ResourceApi, SaveMode, VersionedApi,
};

const BASE: &str = "/plans";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plan_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub experience: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Plan {
    /// Wraps generated content into a plan ready to save. The server puts the
    /// plan id it allocated under `metadata.planId`.
    pub fn from_generated(title: &str, goal: &str, experience: &str, content: &Value) -> Self {
        let plan_id = content
            .pointer("/metadata/planId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            plan_id,
            title: title.to_string(),
            goal: goal.to_string(),
            experience: experience.to_string(),
            last_modified: Some(Utc::now().to_rfc3339()),
            status: "active".to_string(),
            content: Some(content.to_string()),
        }
    }
}

impl Resource for Plan {
    type Version = PlanVersion;

    const COLLECTION: &'static str = "plans";
    const ITEM: &'static str = "plan";
    const CONSISTENCY: Consistency = Consistency::TrustServer;

    fn key(&self) -> &str {
        &self.plan_id
    }

    fn display_order(a: &Self, b: &Self) -> Ordering {
        let stamp = |plan: &Self| plan.last_modified.as_deref().and_then(parse_timestamp);
        stamp(b).cmp(&stamp(a))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanVersion {
    pub plan_id: String,
    pub version: u32,
    pub content: String,
    pub title: String,
    pub goal: String,
    pub experience: String,
    pub timestamp: String,
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Clone, Default)]
pub struct PlanGenerateParams {
    pub title: String,
    pub goal: Option<String>,
    pub experience: Option<String>,
    /// Athlete profile, passed through as-is.
    pub profile: Option<Value>,
    pub existing_plan: Option<String>,
    pub user_chat: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanGenerateRequest {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_chat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
}

impl GenerateParams for PlanGenerateParams {
    type Request = PlanGenerateRequest;

    /// A new plan needs a goal and an experience level; revisions do not.
    fn validate(self) -> PortResult<PlanGenerateRequest> {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        if self.title.trim().is_empty() {
            return Err(PortError::Validation("Title is required".to_string()));
        }
        let existing_plan = present(self.existing_plan);
        let goal = present(self.goal);
        let experience = present(self.experience);
        if existing_plan.is_none() && (goal.is_none() || experience.is_none()) {
            return Err(PortError::Validation(
                "Goal and experience are required for new plans".to_string(),
            ));
        }

        Ok(PlanGenerateRequest {
            title: self.title,
            goal,
            experience,
            existing_plan,
            user_chat: present(self.user_chat),
            profile: self.profile,
        })
    }
}

pub struct PlanApi {
    client: Arc<ApiClient>,
}

impl PlanApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceApi for PlanApi {
    type Entity = Plan;

    async fn list(&self) -> PortResult<Vec<Plan>> {
        let value = self.client.get(&format!("{BASE}/list")).await?;
        decode_list(value, Plan::COLLECTION)
    }

    async fn save(&self, plan: &Plan, _mode: SaveMode) -> PortResult<SaveResponse<Plan>> {
        let value = self.client.post(&format!("{BASE}/save"), plan).await?;
        SaveResponse::decode(value, Plan::ITEM)
    }

    async fn remove(&self, plan_id: &str) -> PortResult<()> {
        self.client
            .delete(&format!("{BASE}/{}", segment(plan_id)))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VersionedApi for PlanApi {
    async fn versions(&self, plan_id: &str) -> PortResult<VersionList<PlanVersion>> {
        let value = self
            .client
            .get(&format!("{BASE}/versions/{}", segment(plan_id)))
            .await?;
        decode_or_default(value)
    }
}

#[async_trait]
impl GenerativeApi for PlanApi {
    type Params = PlanGenerateParams;

    async fn generate(&self, request: &PlanGenerateRequest) -> PortResult<Value> {
        self.client.post(&format!("{BASE}/create"), request).await
    }
}
