//! Presence payload construction.
//!
//! `build` is a pure mapping from a [`ConfigSnapshot`] and a session start
//! timestamp to the payload sent over IPC. The start timestamp is fixed per
//! connection, so repeated refreshes keep the client's elapsed-time counter
//! monotonic.

use serde::{Deserialize, Serialize};
use simplerpc_protocol as wire;

use crate::config::{
    ConfigSnapshot, ACTIVITY_TYPE, BUTTON2_LABEL, BUTTON2_URL, BUTTON_LABEL, BUTTON_URL, DETAILS,
    LARGE_IMAGE_KEY, LARGE_IMAGE_TEXT, SMALL_IMAGE_KEY, SMALL_IMAGE_TEXT, STATE,
};

pub const DEFAULT_DETAILS: &str = "No details set";
pub const DEFAULT_STATE: &str = "No state set";
pub const DEFAULT_ACTIVITY_TYPE: i64 = 0;

const BUTTON_KEYS: [(&str, &str); 2] = [(BUTTON_LABEL, BUTTON_URL), (BUTTON2_LABEL, BUTTON2_URL)];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPayload {
    pub details: String,
    pub state: String,
    pub start_timestamp: i64,
    pub large_image_key: Option<String>,
    pub large_image_text: Option<String>,
    pub small_image_key: Option<String>,
    pub small_image_text: Option<String>,
    #[serde(rename = "type")]
    pub activity_type: i64,
    pub buttons: Vec<Button>,
}

impl ActivityPayload {
    pub fn kind(&self) -> ActivityKind {
        ActivityKind::from_raw(self.activity_type)
    }

    /// Converts to the shape the desktop client expects on the wire.
    pub fn to_wire(&self) -> wire::Activity {
        let assets = wire::Assets {
            large_image: self.large_image_key.clone(),
            large_text: self.large_image_text.clone(),
            small_image: self.small_image_key.clone(),
            small_text: self.small_image_text.clone(),
        };

        wire::Activity {
            details: Some(self.details.clone()),
            state: Some(self.state.clone()),
            timestamps: Some(wire::Timestamps {
                start: Some(self.start_timestamp),
            }),
            assets: (!assets.is_empty()).then_some(assets),
            buttons: self
                .buttons
                .iter()
                .map(|b| wire::Button {
                    label: b.label.clone(),
                    url: b.url.clone(),
                })
                .collect(),
            kind: self.activity_type,
            instance: false,
        }
    }
}

/// Display labels for the known activity type enumerants.
///
/// The payload itself carries the raw integer; this never rejects a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Playing,
    Streaming,
    Listening,
    Watching,
    Custom,
    Competing,
}

impl ActivityKind {
    pub fn from_raw(value: i64) -> Self {
        match value {
            1 => ActivityKind::Streaming,
            2 => ActivityKind::Listening,
            3 => ActivityKind::Watching,
            4 => ActivityKind::Custom,
            5 => ActivityKind::Competing,
            _ => ActivityKind::Playing,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ActivityKind::Playing => "Playing",
            ActivityKind::Streaming => "Streaming",
            ActivityKind::Listening => "Listening to",
            ActivityKind::Watching => "Watching",
            ActivityKind::Custom => "Custom",
            ActivityKind::Competing => "Competing in",
        }
    }
}

/// Per-call replacements applied on top of a built payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityOverrides {
    pub details: Option<String>,
    pub state: Option<String>,
    pub large_image_key: Option<String>,
    pub large_image_text: Option<String>,
    pub small_image_key: Option<String>,
    pub small_image_text: Option<String>,
    pub activity_type: Option<i64>,
    pub buttons: Option<Vec<Button>>,
}

impl ActivityOverrides {
    pub fn is_empty(&self) -> bool {
        *self == ActivityOverrides::default()
    }

    pub fn apply(&self, mut payload: ActivityPayload) -> ActivityPayload {
        if let Some(details) = &self.details {
            payload.details = details.clone();
        }
        if let Some(state) = &self.state {
            payload.state = state.clone();
        }
        if let Some(key) = &self.large_image_key {
            payload.large_image_key = Some(key.clone());
        }
        if let Some(text) = &self.large_image_text {
            payload.large_image_text = Some(text.clone());
        }
        if let Some(key) = &self.small_image_key {
            payload.small_image_key = Some(key.clone());
        }
        if let Some(text) = &self.small_image_text {
            payload.small_image_text = Some(text.clone());
        }
        if let Some(kind) = self.activity_type {
            payload.activity_type = kind;
        }
        if let Some(buttons) = &self.buttons {
            payload.buttons = buttons
                .iter()
                .filter(|b| !b.label.trim().is_empty() && !b.url.trim().is_empty())
                .take(wire::MAX_BUTTONS)
                .cloned()
                .collect();
        }
        payload
    }
}

pub fn build(snapshot: &ConfigSnapshot, session_start: i64) -> ActivityPayload {
    let owned = |key: &str| snapshot.get(key).map(str::to_string);

    ActivityPayload {
        details: owned(DETAILS).unwrap_or_else(|| DEFAULT_DETAILS.to_string()),
        state: owned(STATE).unwrap_or_else(|| DEFAULT_STATE.to_string()),
        start_timestamp: session_start,
        large_image_key: owned(LARGE_IMAGE_KEY),
        large_image_text: owned(LARGE_IMAGE_TEXT),
        small_image_key: owned(SMALL_IMAGE_KEY),
        small_image_text: owned(SMALL_IMAGE_TEXT),
        activity_type: parse_activity_type(snapshot.get(ACTIVITY_TYPE)),
        buttons: build_buttons(snapshot),
    }
}

/// Reads the leading integer of the value, so `2.5` and `2abc` both give 2.
/// A value with no leading digits gives the default.
fn parse_activity_type(raw: Option<&str>) -> i64 {
    raw.and_then(|value| {
        let value = value.trim();
        let digits_start = usize::from(value.starts_with(['-', '+']));
        let end = value[digits_start..]
            .find(|c: char| !c.is_ascii_digit())
            .map_or(value.len(), |offset| digits_start + offset);
        value[..end].parse::<i64>().ok()
    })
    .unwrap_or(DEFAULT_ACTIVITY_TYPE)
}

/// A button is included only when both its label and URL are present.
fn build_buttons(snapshot: &ConfigSnapshot) -> Vec<Button> {
    BUTTON_KEYS
        .iter()
        .filter_map(|(label_key, url_key)| {
            let label = snapshot.get(label_key)?;
            let url = snapshot.get(url_key)?;
            Some(Button {
                label: label.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CLIENT_ID;

    #[test]
    fn end_to_end_snapshot() {
        let snapshot = ConfigSnapshot::from_pairs([
            (CLIENT_ID, "123"),
            (DETAILS, "D"),
            (STATE, "S"),
            (ACTIVITY_TYPE, "2"),
        ]);
        let payload = build(&snapshot, 1000);

        assert_eq!(payload.details, "D");
        assert_eq!(payload.state, "S");
        assert_eq!(payload.start_timestamp, 1000);
        assert_eq!(payload.activity_type, 2);
        assert!(payload.buttons.is_empty());
        assert!(payload.large_image_key.is_none());
    }

    #[test]
    fn start_timestamp_is_stable_across_rebuilds() {
        let snapshot = ConfigSnapshot::from_pairs([(CLIENT_ID, "123")]);
        let first = build(&snapshot, 42);
        for _ in 0..5 {
            assert_eq!(build(&snapshot, 42).start_timestamp, 42);
        }
        assert_eq!(first, build(&snapshot, 42));
    }

    #[test]
    fn partial_button_is_dropped() {
        let snapshot = ConfigSnapshot::from_pairs([(BUTTON_LABEL, "A")]);
        assert!(build(&snapshot, 0).buttons.is_empty());

        let snapshot = ConfigSnapshot::from_pairs([(BUTTON2_URL, "http://y")]);
        assert!(build(&snapshot, 0).buttons.is_empty());
    }

    #[test]
    fn complete_button_is_included() {
        let snapshot = ConfigSnapshot::from_pairs([(BUTTON_LABEL, "A"), (BUTTON_URL, "http://x")]);
        assert_eq!(
            build(&snapshot, 0).buttons,
            vec![Button {
                label: "A".into(),
                url: "http://x".into()
            }]
        );
    }

    #[test]
    fn second_button_survives_when_first_is_partial() {
        let snapshot = ConfigSnapshot::from_pairs([
            (BUTTON_URL, "http://x"),
            (BUTTON2_LABEL, "B"),
            (BUTTON2_URL, "http://y"),
        ]);
        let buttons = build(&snapshot, 0).buttons;
        assert_eq!(buttons.len(), 1);
        assert_eq!(buttons[0].label, "B");
    }

    #[test]
    fn defaults_apply_when_fields_absent() {
        let payload = build(&ConfigSnapshot::default(), 7);
        assert_eq!(payload.details, DEFAULT_DETAILS);
        assert_eq!(payload.state, DEFAULT_STATE);
        assert_eq!(payload.activity_type, 0);
    }

    #[test]
    fn activity_type_passes_through_unvalidated() {
        let unparsable = ConfigSnapshot::from_pairs([(ACTIVITY_TYPE, "watching")]);
        assert_eq!(build(&unparsable, 0).activity_type, 0);

        let reserved = ConfigSnapshot::from_pairs([(ACTIVITY_TYPE, "4")]);
        assert_eq!(build(&reserved, 0).activity_type, 4);

        let unknown = ConfigSnapshot::from_pairs([(ACTIVITY_TYPE, "17")]);
        let payload = build(&unknown, 0);
        assert_eq!(payload.activity_type, 17);
        assert_eq!(payload.kind(), ActivityKind::Playing);
    }

    #[test]
    fn activity_type_reads_leading_integer() {
        for (raw, expected) in [("2.5", 2), ("2abc", 2), (" 3 ", 3), ("+5", 5), ("-", 0), (".5", 0)] {
            let snapshot = ConfigSnapshot::from_pairs([(ACTIVITY_TYPE, raw)]);
            assert_eq!(build(&snapshot, 0).activity_type, expected, "input {:?}", raw);
        }
    }

    #[test]
    fn overrides_keep_button_rule() {
        let base = build(&ConfigSnapshot::default(), 5);
        let overrides = ActivityOverrides {
            state: Some("Overridden".into()),
            buttons: Some(vec![
                Button {
                    label: "".into(),
                    url: "http://x".into(),
                },
                Button {
                    label: "One".into(),
                    url: "http://1".into(),
                },
                Button {
                    label: "Two".into(),
                    url: "http://2".into(),
                },
                Button {
                    label: "Three".into(),
                    url: "http://3".into(),
                },
            ]),
            ..ActivityOverrides::default()
        };

        let payload = overrides.apply(base);
        assert_eq!(payload.state, "Overridden");
        assert_eq!(payload.start_timestamp, 5);
        let labels: Vec<_> = payload.buttons.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["One", "Two"]);
    }

    #[test]
    fn wire_shape_nests_assets_and_timestamps() {
        let snapshot = ConfigSnapshot::from_pairs([
            (LARGE_IMAGE_KEY, "logo"),
            (LARGE_IMAGE_TEXT, "Logo"),
            (BUTTON_LABEL, "A"),
            (BUTTON_URL, "http://x"),
        ]);
        let wire = build(&snapshot, 1000).to_wire();
        assert!(wire.validate().is_ok());

        let value = serde_json::to_value(&wire).unwrap();
        assert_eq!(value["timestamps"]["start"], 1000);
        assert_eq!(value["assets"]["large_image"], "logo");
        assert!(value["assets"].get("small_image").is_none());
        assert_eq!(value["buttons"][0]["url"], "http://x");
        assert_eq!(value["type"], 0);
    }
}
