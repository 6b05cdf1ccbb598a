//! Slot display metadata.
//!
//! Each slot renders as an inline JSON document:
//!
//! ```text
//! data:application/json;utf8,{"name":"Cascade Leaderboard Slot #0",...}
//! ```

use crate::error::Result;
use crate::leaderboard::Slot;
use serde::{Deserialize, Serialize};

/// Prefix of rendered slot URIs.
pub const URI_PREFIX: &str = "data:application/json;utf8,";

/// Instance-wide presentation settings, replaced via governance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataStyle {
    /// Shown on every slot
    pub description: String,
    /// Optional link shown by viewers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    /// Hex background colour without `#`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

#[derive(Serialize)]
struct Attribute {
    trait_type: &'static str,
    value: String,
}

#[derive(Serialize)]
struct SlotDocument<'a> {
    name: String,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    background_color: Option<&'a str>,
    attributes: Vec<Attribute>,
}

/// Render a slot as a `data:` URI.
pub fn slot_uri(leaderboard_name: &str, slot: &Slot, style: &MetadataStyle) -> Result<String> {
    let doc = SlotDocument {
        name: format!("{} Slot #{}", leaderboard_name, slot.id),
        description: &style.description,
        external_url: style.external_url.as_deref(),
        background_color: style.background_color.as_deref(),
        attributes: vec![
            Attribute {
                trait_type: "Contribution",
                value: slot.contribution.to_string(),
            },
            Attribute {
                trait_type: "Owner",
                value: slot.owner.to_hex(),
            },
            Attribute {
                trait_type: "Recipient",
                value: slot.recipient.to_hex(),
            },
            Attribute {
                trait_type: "Reinvesting",
                value: slot.reinvest.to_string(),
            },
        ],
    };
    Ok(format!("{}{}", URI_PREFIX, serde_json::to_string(&doc)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_quorum::Address;

    #[test]
    fn renders_name_and_attributes() {
        let owner = Address::from_bytes([4u8; 32]);
        let slot = Slot {
            id: 3,
            owner,
            recipient: owner,
            contribution: 1_500,
            reinvest: true,
        };
        let style = MetadataStyle {
            description: "A leaderboard".into(),
            ..Default::default()
        };

        let uri = slot_uri("Cascade Leaderboard", &slot, &style).unwrap();
        let json: serde_json::Value = serde_json::from_str(uri.strip_prefix(URI_PREFIX).unwrap()).unwrap();

        assert_eq!(json["name"], "Cascade Leaderboard Slot #3");
        assert_eq!(json["description"], "A leaderboard");
        assert!(json.get("external_url").is_none());
        assert_eq!(json["attributes"][0]["value"], "1500");
        assert_eq!(json["attributes"][3]["value"], "true");
    }
}
