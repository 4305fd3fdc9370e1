use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: Uuid,
    pub user_id: Uuid,
    pub screenshot_id: Uuid,
    pub question: String,
    pub answer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    pub fn new(user_id: Uuid, screenshot_id: Uuid, question: String, answer: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            screenshot_id,
            question,
            answer,
            created_at: now,
            updated_at: now,
        }
    }
}
