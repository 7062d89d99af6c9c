//! crates/lesson_planner_core/src/api/lessons.rs
//!
//! Lesson entities and the `/lessons` endpoint mapping.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

use super::profiles::Profile;
use super::{decode_list, decode_or_default, segment, SaveResponse};
use crate::domain::{parse_timestamp, VersionList};
use crate::ports::{PortError, PortResult};
use crate::request::ApiClient;
use crate::store::{
    Consistency, GenerateParams, GenerativeApi, Resource, ResourceApi, SaveMode, VersionedApi,
};

const BASE: &str = "/lessons";

//=========================================================================================
// Entities
//=========================================================================================

/// A lesson's summary plus its (JSON-encoded) content once loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    /// Server-assigned; empty until the first save returns.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lesson_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

impl Lesson {
    /// A new, unsaved lesson wrapping freshly generated content.
    pub fn draft(title: &str, grade: &str, subject: &str, content: &Value) -> Self {
        Self {
            title: title.to_string(),
            grade: grade.to_string(),
            subject: subject.to_string(),
            status: "draft".to_string(),
            content: Some(content.to_string()),
            ..Default::default()
        }
    }
}

impl Resource for Lesson {
    type Version = LessonVersion;

    const COLLECTION: &'static str = "lessons";
    const ITEM: &'static str = "lesson";
    const CONSISTENCY: Consistency = Consistency::Relist;

    fn key(&self) -> &str {
        &self.lesson_id
    }

    /// Most recently modified first; undated lessons sink to the bottom.
    fn display_order(a: &Self, b: &Self) -> Ordering {
        let stamp = |lesson: &Self| lesson.last_modified.as_deref().and_then(parse_timestamp);
        stamp(b).cmp(&stamp(a))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LessonVersion {
    pub lesson_id: String,
    pub version: u32,
    pub profile_version: Option<String>,
    pub profile_id: Option<String>,
    pub content: String,
    pub title: String,
    pub grade: String,
    pub subject: String,
    pub timestamp: String,
    pub email: String,
}

//=========================================================================================
// Generation
//=========================================================================================

/// The student profile fields sent along for personalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileContext {
    pub profile_name: String,
    pub demographics: String,
    pub general_background: String,
    pub math_ability: String,
    pub engagement: String,
    pub special_considerations: String,
}

impl From<&Profile> for ProfileContext {
    fn from(profile: &Profile) -> Self {
        Self {
            profile_name: profile.profile_name.clone(),
            demographics: profile.demographics.clone(),
            general_background: profile.general_background.clone(),
            math_ability: profile.math_ability.clone(),
            engagement: profile.engagement.clone(),
            special_considerations: profile.special_considerations.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LessonGenerateParams {
    pub topic: String,
    pub grade: Option<String>,
    pub subject: Option<String>,
    pub profile: Option<Profile>,
    /// The current lesson body when revising instead of creating.
    pub existing_plan: Option<String>,
    pub user_chat: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonGenerateRequest {
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_chat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileContext>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl GenerateParams for LessonGenerateParams {
    type Request = LessonGenerateRequest;

    /// Grade and subject are only required for new lessons; a revision
    /// carries them inside `existing_plan`.
    fn validate(self) -> PortResult<LessonGenerateRequest> {
        if self.topic.trim().is_empty() {
            return Err(PortError::Validation("Topic is required".to_string()));
        }
        let existing_plan = present(self.existing_plan);
        let (grade, subject) = if existing_plan.is_some() {
            (None, None)
        } else {
            match (present(self.grade), present(self.subject)) {
                (Some(grade), Some(subject)) => (Some(grade), Some(subject)),
                _ => {
                    return Err(PortError::Validation(
                        "Grade and subject are required for new lessons".to_string(),
                    ))
                }
            }
        };

        Ok(LessonGenerateRequest {
            topic: self.topic,
            grade,
            subject,
            existing_plan,
            user_chat: present(self.user_chat),
            profile: self.profile.as_ref().map(ProfileContext::from),
        })
    }
}

//=========================================================================================
// Endpoint Mapping
//=========================================================================================

pub struct LessonApi {
    client: Arc<ApiClient>,
}

impl LessonApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceApi for LessonApi {
    type Entity = Lesson;

    async fn list(&self) -> PortResult<Vec<Lesson>> {
        let value = self.client.get(&format!("{BASE}/list")).await?;
        decode_list(value, Lesson::COLLECTION)
    }

    async fn save(&self, lesson: &Lesson, _mode: SaveMode) -> PortResult<SaveResponse<Lesson>> {
        let value = self.client.post(&format!("{BASE}/save"), lesson).await?;
        SaveResponse::decode(value, Lesson::ITEM)
    }

    async fn remove(&self, lesson_id: &str) -> PortResult<()> {
        self.client
            .delete(&format!("{BASE}/{}", segment(lesson_id)))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VersionedApi for LessonApi {
    async fn versions(&self, lesson_id: &str) -> PortResult<VersionList<LessonVersion>> {
        let value = self
            .client
            .get(&format!("{BASE}/versions/{}", segment(lesson_id)))
            .await?;
        decode_or_default(value)
    }
}

#[async_trait]
impl GenerativeApi for LessonApi {
    type Params = LessonGenerateParams;

    async fn generate(&self, request: &LessonGenerateRequest) -> PortResult<Value> {
        self.client.post(&format!("{BASE}/create"), request).await
    }
}
