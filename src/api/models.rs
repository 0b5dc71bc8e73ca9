//! Storefront resource shapes.
//!
//! The cache stores raw JSON; these types are what the resource facade narrows
//! payloads into. Unknown fields are ignored and most fields default, since
//! list endpoints and detail endpoints return different projections.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::caching::ResourceKind;

/// A model served by one REST collection
pub trait ApiModel: DeserializeOwned + Send + 'static {
    const KIND: ResourceKind;

    fn id(&self) -> &str;

    /// Identifiers of other resources whose cached views this one feeds,
    /// named after the dependency-table placeholders (`tour_id`, `user_id`)
    fn references(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// Document identifier as the backend serializes it: the database `_id`, the
/// virtual `id`, or both side by side. `_id` wins when they disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentId {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    object_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

impl DocumentId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            object_id: None,
            id: Some(id.into()),
        }
    }

    /// Empty when the payload carried neither key
    pub fn as_str(&self) -> &str {
        self.object_id
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("")
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<&str> for DocumentId {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// A reference that is either a bare id or a populated document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    Id(String),
    Populated(ReferencedDoc),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencedDoc {
    #[serde(flatten)]
    pub id: DocumentId,

    #[serde(default)]
    pub name: Option<String>,
}

impl Reference {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Populated(doc) => doc.id.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    #[serde(flatten)]
    pub id: DocumentId,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub max_group_size: Option<u32>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub ratings_average: Option<f64>,
    #[serde(default)]
    pub ratings_quantity: Option<u32>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub image_cover: Option<String>,
    #[serde(default)]
    pub start_dates: Vec<DateTime<Utc>>,
}

impl ApiModel for Tour {
    const KIND: ResourceKind = ResourceKind::Tours;

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub id: DocumentId,
    pub name: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_role() -> String {
    "user".to_string()
}

fn default_active() -> bool {
    true
}

impl ApiModel for User {
    const KIND: ResourceKind = ResourceKind::Users;

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(flatten)]
    pub id: DocumentId,
    pub tour: Reference,
    pub user: Reference,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ApiModel for Booking {
    const KIND: ResourceKind = ResourceKind::Bookings;

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn references(&self) -> Vec<(&'static str, String)> {
        vec![
            ("tour_id", self.tour.id().to_string()),
            ("user_id", self.user.id().to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(flatten)]
    pub id: DocumentId,
    pub review: String,
    pub rating: f64,
    pub tour: Reference,
    pub user: Reference,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ApiModel for Review {
    const KIND: ResourceKind = ResourceKind::Reviews;

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn references(&self) -> Vec<(&'static str, String)> {
        vec![
            ("tour_id", self.tour.id().to_string()),
            ("user_id", self.user.id().to_string()),
        ]
    }
}

/// Admin dashboard aggregates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardStats {
    pub total_tours: u64,
    pub total_users: u64,
    pub total_bookings: u64,
    pub total_reviews: u64,
    pub total_revenue: f64,
    pub average_rating: Option<f64>,
}
