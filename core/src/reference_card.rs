/// Rich posting previews embedded in message text
///
/// A card travels as an ordinary message whose content is the literal tag
/// followed by a JSON object. Anything that fails to parse is shown as text.
use crate::ids::PostId;
use crate::models::PostType;
use serde::{Deserialize, Serialize};

pub const REF_CARD_TAG: &str = "[REF_CARD]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceCard {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(rename = "type")]
    pub post_type: PostType,
    pub post_id: PostId,
}

impl ReferenceCard {
    /// Message content carrying this card
    pub fn encode(&self) -> String {
        // Plain struct of strings and ints: serialization cannot fail
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("{}{}", REF_CARD_TAG, json)
    }
}

/// How a message's content should be rendered
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text(String),
    Card(ReferenceCard),
}

impl MessageBody {
    pub fn parse(text: &str) -> Self {
        if let Some(payload) = text.strip_prefix(REF_CARD_TAG) {
            if let Ok(card) = serde_json::from_str::<ReferenceCard>(payload) {
                return MessageBody::Card(card);
            }
        }
        MessageBody::Text(text.to_string())
    }

    pub fn is_card(&self) -> bool {
        matches!(self, MessageBody::Card(_))
    }

    /// One-line rendering for thread lists and terminals
    pub fn preview(&self) -> String {
        match self {
            MessageBody::Text(t) => t.clone(),
            MessageBody::Card(card) => format!("[{}] {}", card.post_type, card.title),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_card_without_image() {
        let text = r#"[REF_CARD]{"title":"Lost Wallet","type":"LOST","postId":7}"#;
        let body = MessageBody::parse(text);
        assert_eq!(
            body,
            MessageBody::Card(ReferenceCard {
                title: "Lost Wallet".to_string(),
                image: None,
                post_type: PostType::Lost,
                post_id: PostId(7),
            })
        );
        assert_eq!(body.preview(), "[LOST] Lost Wallet");
    }

    #[test]
    fn test_malformed_card_degrades_to_text() {
        let raw = "[REF_CARD]{invalid json";
        assert_eq!(MessageBody::parse(raw), MessageBody::Text(raw.to_string()));
    }

    #[test]
    fn test_tag_must_be_a_prefix() {
        let raw = r#"see [REF_CARD]{"title":"x","type":"LOST","postId":1}"#;
        assert!(!MessageBody::parse(raw).is_card());
    }

    #[test]
    fn test_encode_is_parsed_back() {
        let card = ReferenceCard {
            title: "Blue umbrella".to_string(),
            image: Some("https://img.example/u.png".to_string()),
            post_type: PostType::Found,
            post_id: PostId(12),
        };
        let text = card.encode();
        assert!(text.starts_with(REF_CARD_TAG));
        assert!(text.contains("\"postId\":12"));
        assert_eq!(MessageBody::parse(&text), MessageBody::Card(card));
    }
}
