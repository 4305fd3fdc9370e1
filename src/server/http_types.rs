use crate::domain::{Question, Screenshot, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

pub(super) const EXTENSION_VERSION: &str = "v0.0.1";

#[derive(Serialize, ToSchema)]
pub(super) struct HealthResponse {
    pub(super) status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) error: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct AnalyzeRequest {
    /// Data URL or bare base64 image.
    #[serde(default)]
    pub(super) screenshot: Option<String>,
    #[serde(default)]
    #[schema(example = "What does this error mean?")]
    pub(super) question: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub(super) screenshot_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct AnalyzeResponse {
    pub(super) answer: String,
    #[schema(example = "success")]
    pub(super) status: &'static str,
    pub(super) screenshot_id: Uuid,
    pub(super) question_id: Uuid,
    pub(super) free_trials_left: i32,
}

#[derive(Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct SaveScreenshotRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Image URL is required"))]
    pub(super) image_url: String,
}

#[derive(Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct AddQuestionRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Question is required"))]
    pub(super) question: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub(super) screenshot_id: Option<Uuid>,
}

/// Clients send `""` or `null` for "no screenshot yet"; both mean absent.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<Uuid>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(id) => Uuid::parse_str(id).map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize, Debug, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub(super) struct QuestionFilter {
    pub(super) screenshot_id: Option<Uuid>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub(super) struct VerifyParams {
    pub(super) order_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct ScreenshotResponse {
    pub(super) id: Uuid,
    pub(super) user_id: Uuid,
    pub(super) image_url: String,
    pub(super) created_at: DateTime<Utc>,
    pub(super) updated_at: DateTime<Utc>,
}

impl From<Screenshot> for ScreenshotResponse {
    fn from(s: Screenshot) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            image_url: s.image_url,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct QuestionResponse {
    pub(super) id: Uuid,
    pub(super) user_id: Uuid,
    pub(super) screenshot_id: Uuid,
    pub(super) question: String,
    pub(super) answer: Option<String>,
    pub(super) created_at: DateTime<Utc>,
    pub(super) updated_at: DateTime<Utc>,
}

impl From<Question> for QuestionResponse {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            user_id: q.user_id,
            screenshot_id: q.screenshot_id,
            question: q.question,
            answer: q.answer,
            created_at: q.created_at,
            updated_at: q.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct ProfileResponse {
    pub(super) id: Uuid,
    pub(super) name: Option<String>,
    pub(super) email: String,
    pub(super) image: Option<String>,
    #[schema(example = "free")]
    pub(super) plan: &'static str,
    #[schema(example = "Mar 2026")]
    pub(super) member_since: String,
    pub(super) extension_version: &'static str,
    pub(super) plan_status: &'static str,
    pub(super) free_trials_left: i32,
    pub(super) max_credits: i32,
}

impl From<&User> for ProfileResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            image: user.image.clone(),
            plan: user.plan(),
            member_since: user.created_at.format("%b %Y").to_string(),
            extension_version: EXTENSION_VERSION,
            plan_status: "active",
            free_trials_left: user.free_trials_left,
            max_credits: user.max_credits,
        }
    }
}

/// Session user as returned by `/api/auth/session`.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct SessionUser {
    pub(super) id: Uuid,
    pub(super) name: Option<String>,
    pub(super) email: String,
    pub(super) image: Option<String>,
    pub(super) tier: String,
    pub(super) free_trials_left: i32,
    pub(super) max_credits: i32,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            image: user.image.clone(),
            tier: user.tier.to_string(),
            free_trials_left: user.free_trials_left,
            max_credits: user.max_credits,
        }
    }
}
