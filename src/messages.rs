use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::debug;

/// Rectangular area inside the rendered page (typically an ad iframe) with an
/// associated click-through URL, reported by the page in screen coordinates.
/// Region lists are replaced wholesale on every update, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickRegion {
    pub id: String,
    #[serde(default)]
    pub src: String,
    #[serde(default)]
    pub click_url: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl ClickRegion {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.left + self.width && y >= self.top && y < self.top + self.height
    }

    /// A region only intercepts clicks when it is visible and carries a URL.
    pub fn is_clickable(&self) -> bool {
        self.visible && !self.click_url.is_empty()
    }
}

/// Messages the page posts to the host over the web-message channel.
/// Unrecognized `type` values parse to `None` and are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageMessage {
    Iframes {
        #[serde(default)]
        regions: Vec<ClickRegion>,
    },
    OpenUrl {
        url: String,
    },
    Ready,
    Log {
        #[serde(default)]
        level: String,
        message: String,
    },
    StateSave {
        key: String,
        value: Value,
    },
    StateLoad {
        key: String,
    },
    StateClear,
}

pub fn parse_page_message(raw: &str) -> Option<PageMessage> {
    match serde_json::from_str::<PageMessage>(raw) {
        Ok(msg) => Some(msg),
        Err(e) => {
            debug!("[RENDERER] Ignoring unrecognized page message ({e}): {raw}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iframe_update() {
        let raw = r#"{"type":"iframes","regions":[
            {"id":"ad1","src":"https://ads.example/a","click_url":"https://go.example",
             "left":10,"top":20,"width":300,"height":250}
        ]}"#;
        let Some(PageMessage::Iframes { regions }) = parse_page_message(raw) else {
            panic!("expected iframes message");
        };
        assert_eq!(regions.len(), 1);
        assert!(regions[0].visible);
        assert!(regions[0].is_clickable());
        assert!(regions[0].contains(10, 20));
        assert!(!regions[0].contains(310, 20));
    }

    #[test]
    fn empty_click_url_is_not_clickable() {
        let region = ClickRegion {
            id: "a".into(),
            src: String::new(),
            click_url: String::new(),
            left: 0,
            top: 0,
            width: 10,
            height: 10,
            visible: true,
        };
        assert!(!region.is_clickable());
    }

    #[test]
    fn unknown_type_is_ignored_not_fatal() {
        assert_eq!(parse_page_message(r#"{"type":"telemetry","x":1}"#), None);
        assert_eq!(parse_page_message("not json"), None);
    }

    #[test]
    fn parses_state_and_notification_messages() {
        assert_eq!(parse_page_message(r#"{"type":"ready"}"#), Some(PageMessage::Ready));
        assert!(matches!(
            parse_page_message(r#"{"type":"state_load","key":"volume"}"#),
            Some(PageMessage::StateLoad { .. })
        ));
        assert!(matches!(
            parse_page_message(r#"{"type":"log","message":"hello"}"#),
            Some(PageMessage::Log { .. })
        ));
        assert!(matches!(
            parse_page_message(r#"{"type":"open_url","url":"https://example.com"}"#),
            Some(PageMessage::OpenUrl { .. })
        ));
    }
}
