use crate::PostStoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stored post. Keys this type does not know about are kept in `extra` and
/// written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Post {
    /// Copy with a site-relative `photo_url` turned into an absolute URL.
    pub fn with_absolute_photo_url(mut self, origin: &str) -> Self {
        if let Some(url) = self.photo_url.as_mut()
            && url.starts_with('/')
        {
            *url = format!("{}{}", origin.trim_end_matches('/'), url);
        }
        self
    }
}

/// Submitted post fields before validation. JSON `null` and absent keys both
/// count as missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPost {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// Trimmed, complete post fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidPost {
    pub title: String,
    pub description: String,
    pub location: String,
    pub phone: String,
    pub photo_url: Option<String>,
}

fn trimmed(value: &Option<String>) -> String {
    value.as_deref().unwrap_or_default().trim().to_string()
}

impl NewPost {
    pub fn validate(&self) -> Result<ValidPost, PostStoreError> {
        let post = ValidPost {
            title: trimmed(&self.title),
            description: trimmed(&self.description),
            location: trimmed(&self.location),
            phone: trimmed(&self.phone),
            photo_url: Some(trimmed(&self.photo_url)).filter(|url| !url.is_empty()),
        };

        let missing: Vec<&'static str> = [
            ("title", &post.title),
            ("description", &post.description),
            ("location", &post.location),
            ("phone", &post.phone),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(post)
        } else {
            Err(PostStoreError::MissingFields(missing))
        }
    }
}

impl ValidPost {
    pub(crate) fn into_post(self, id: u64, created_at: DateTime<Utc>) -> Post {
        Post {
            id,
            title: self.title,
            description: self.description,
            location: self.location,
            phone: self.phone,
            photo_url: self.photo_url,
            created_at: format_timestamp(created_at),
            extra: Map::new(),
        }
    }
}

/// UTC ISO-8601 with microseconds, e.g. `2025-03-01T09:12:44.120391Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}
