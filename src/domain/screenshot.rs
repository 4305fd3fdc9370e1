use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Screenshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub image_url: String,
    pub image_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Screenshot {
    pub fn new(user_id: Uuid, image_url: String) -> Self {
        let image_url = image_url.trim().to_string();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            image_hash: hash_image_reference(&image_url),
            image_url,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }
}

/// Lookup key for "same image, same owner" matching. Surrounding whitespace is
/// ignored, matching what image parsing accepts.
pub fn hash_image_reference(image_url: &str) -> String {
    let digest = Sha256::digest(image_url.trim().as_bytes());
    format!("sha256:{:x}", digest)
}
