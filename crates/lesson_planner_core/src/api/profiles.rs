//! crates/lesson_planner_core/src/api/profiles.rs
//!
//! Student profiles. Profiles are keyed by their name, which is also the
//! path segment for updates and deletes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

use super::{decode_list, ensure_not_rejected, segment, SaveResponse};
use crate::ports::PortResult;
use crate::request::ApiClient;
use crate::store::{Consistency, Resource, ResourceApi, SaveMode};

const BASE: &str = "/profiles";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub profile_name: String,
    #[serde(default)]
    pub demographics: String,
    #[serde(default)]
    pub general_background: String,
    #[serde(default)]
    pub math_ability: String,
    #[serde(default)]
    pub engagement: String,
    #[serde(default)]
    pub special_considerations: String,
    #[serde(default)]
    pub active: bool,
}

impl Resource for Profile {
    // No version endpoint exists for profiles.
    type Version = Value;

    const COLLECTION: &'static str = "profiles";
    const ITEM: &'static str = "profile";
    const CONSISTENCY: Consistency = Consistency::Relist;

    fn key(&self) -> &str {
        &self.profile_name
    }

    /// Active profiles first, then alphabetical.
    fn display_order(a: &Self, b: &Self) -> Ordering {
        b.active
            .cmp(&a.active)
            .then_with(|| a.profile_name.cmp(&b.profile_name))
    }
}

/// The editable fields sent on update; the name travels in the path.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileUpdate<'a> {
    demographics: &'a str,
    general_background: &'a str,
    math_ability: &'a str,
    engagement: &'a str,
    special_considerations: &'a str,
    active: bool,
}

impl<'a> From<&'a Profile> for ProfileUpdate<'a> {
    fn from(profile: &'a Profile) -> Self {
        Self {
            demographics: &profile.demographics,
            general_background: &profile.general_background,
            math_ability: &profile.math_ability,
            engagement: &profile.engagement,
            special_considerations: &profile.special_considerations,
            active: profile.active,
        }
    }
}

pub struct ProfileApi {
    client: Arc<ApiClient>,
}

impl ProfileApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceApi for ProfileApi {
    type Entity = Profile;

    async fn list(&self) -> PortResult<Vec<Profile>> {
        let value = self.client.get(&format!("{BASE}/list")).await?;
        decode_list(value, Profile::COLLECTION)
    }

    async fn save(&self, profile: &Profile, mode: SaveMode) -> PortResult<SaveResponse<Profile>> {
        let value = match mode {
            SaveMode::Create => self.client.post(&format!("{BASE}/create"), profile).await?,
            SaveMode::Update => {
                let path = format!("{BASE}/{}", segment(&profile.profile_name));
                self.client.put(&path, &ProfileUpdate::from(profile)).await?
            }
        };
        ensure_not_rejected(&value)?;
        SaveResponse::decode(value, Profile::ITEM)
    }

    async fn remove(&self, profile_name: &str) -> PortResult<()> {
        let value = self
            .client
            .delete(&format!("{BASE}/{}", segment(profile_name)))
            .await?;
        ensure_not_rejected(&value)
    }
}
