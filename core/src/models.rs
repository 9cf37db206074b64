/// Domain records for postings and user profiles
use crate::ids::{PostId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const AVATAR_BASE_URL: &str = "https://api.dicebear.com/7.x/avataaars/svg?seed=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PostType {
    #[default]
    Lost,
    Found,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Lost => "LOST",
            PostType::Found => "FOUND",
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOST" => Ok(PostType::Lost),
            "FOUND" => Ok(PostType::Found),
            other => Err(format!("unknown post type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Electronics,
    KeysCards,
    BagsWallets,
    Pets,
    Clothing,
    Personal,
    Sports,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Electronics,
        Category::KeysCards,
        Category::BagsWallets,
        Category::Pets,
        Category::Clothing,
        Category::Personal,
        Category::Sports,
        Category::Other,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Category::Electronics => "electronics",
            Category::KeysCards => "keys_cards",
            Category::BagsWallets => "bags_wallets",
            Category::Pets => "pets",
            Category::Clothing => "clothing",
            Category::Personal => "personal",
            Category::Sports => "sports",
            Category::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Electronics => "Electronics",
            Category::KeysCards => "Keys & Cards",
            Category::BagsWallets => "Bags & Wallets",
            Category::Pets => "Pets",
            Category::Clothing => "Clothing & Accessories",
            Category::Personal => "Personal Items",
            Category::Sports => "Sports & Gear",
            Category::Other => "Other",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.id() == wanted)
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
}

/// A lost or found item posting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub post_type: PostType,
    pub category: Category,
    pub image_url: Option<String>,
    pub location: Location,
    pub contact_info: Option<String>,
    pub user_id: UserId,
    /// Joined from the owner's profile when listing; not stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.user_id == user
    }
}

/// Caller-supplied fields of a new posting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub post_type: PostType,
    pub category: Category,
    #[serde(default)]
    pub image_url: Option<String>,
    pub location: Location,
    #[serde(default)]
    pub contact_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub avatar_url: String,
    pub joined_at: DateTime<Utc>,
}

/// Generated avatar for users who never uploaded one
pub fn default_avatar_url(seed: &str) -> String {
    format!("{}{}", AVATAR_BASE_URL, urlencoding::encode(seed))
}

/// Relative age of a timestamp, e.g. "3 hours ago"
pub fn time_ago(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    const UNITS: [(&str, i64); 6] = [
        ("year", 31_536_000),
        ("month", 2_592_000),
        ("week", 604_800),
        ("day", 86_400),
        ("hour", 3_600),
        ("minute", 60),
    ];

    let seconds = (now - then).num_seconds();
    for (unit, size) in UNITS {
        let n = seconds / size;
        if n >= 1 {
            return format!("{} {}{} ago", n, unit, if n > 1 { "s" } else { "" });
        }
    }
    "Just now".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_time_ago_buckets() {
        let now = Utc::now();
        assert_eq!(time_ago(now, now), "Just now");
        assert_eq!(time_ago(now, now - Duration::seconds(59)), "Just now");
        assert_eq!(time_ago(now, now - Duration::minutes(1)), "1 minute ago");
        assert_eq!(time_ago(now, now - Duration::hours(5)), "5 hours ago");
        assert_eq!(time_ago(now, now - Duration::days(8)), "1 week ago");
        assert_eq!(time_ago(now, now - Duration::days(800)), "2 years ago");
    }

    #[test]
    fn test_category_round_trip_ids() {
        for c in Category::ALL {
            assert_eq!(c.id().parse::<Category>().unwrap(), c);
        }
        assert_eq!(
            serde_json::to_string(&Category::KeysCards).unwrap(),
            "\"keys_cards\""
        );
        assert!("furniture".parse::<Category>().is_err());
    }

    #[test]
    fn test_post_type_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&PostType::Found).unwrap(), "\"FOUND\"");
        assert_eq!("lost".parse::<PostType>().unwrap(), PostType::Lost);
    }

    #[test]
    fn test_default_avatar_url_encodes_seed() {
        assert_eq!(
            default_avatar_url("Jane Doe"),
            "https://api.dicebear.com/7.x/avataaars/svg?seed=Jane%20Doe"
        );
    }
}
