//! CDP wire messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A command sent to the browser.
#[derive(Debug, Serialize)]
pub struct CdpRequest {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Anything the browser sends: a command response (has `id`) or an event
/// (has `method`).
#[derive(Debug, Deserialize)]
pub struct CdpMessage {
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<CdpErrorResponse>,
    pub method: Option<String>,
    pub params: Option<Value>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CdpErrorResponse {
    pub code: i64,
    pub message: String,
}

/// An event fanned out to subscribers.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

impl CdpEvent {
    pub fn is_for(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }

    /// `params.requestId` for Network events.
    pub fn request_id(&self) -> Option<&str> {
        self.params.get("requestId").and_then(Value::as_str)
    }
}

/// Parameters of `Page.printToPDF`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintToPdfParams {
    pub landscape: bool,
    pub print_background: bool,
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub prefer_css_page_size: bool,
    pub transfer_mode: &'static str,
}

impl PrintToPdfParams {
    pub fn new(paper_width: f64, paper_height: f64, margin: f64, print_background: bool) -> Self {
        Self {
            landscape: false,
            print_background,
            paper_width,
            paper_height,
            margin_top: margin,
            margin_bottom: margin,
            margin_left: margin,
            margin_right: margin,
            prefer_css_page_size: false,
            transfer_mode: "ReturnAsStream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_empty_fields() {
        let req = CdpRequest {
            id: 7,
            method: "Page.enable".into(),
            params: None,
            session_id: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v, json!({"id": 7, "method": "Page.enable"}));
    }

    #[test]
    fn parses_response_and_event() {
        let resp: CdpMessage =
            serde_json::from_str(r#"{"id":3,"result":{"frameId":"F"},"sessionId":"S"}"#).unwrap();
        assert_eq!(resp.id, Some(3));
        assert!(resp.method.is_none());

        let ev: CdpMessage = serde_json::from_str(
            r#"{"method":"Network.loadingFinished","params":{"requestId":"R1"},"sessionId":"S"}"#,
        )
        .unwrap();
        assert!(ev.id.is_none());
        let event = CdpEvent {
            method: ev.method.unwrap(),
            params: ev.params.unwrap(),
            session_id: ev.session_id,
        };
        assert!(event.is_for("S"));
        assert_eq!(event.request_id(), Some("R1"));
    }

    #[test]
    fn print_params_are_camel_case_a4() {
        let p = PrintToPdfParams::new(8.27, 11.69, 0.4, true);
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["paperWidth"], 8.27);
        assert_eq!(v["marginLeft"], 0.4);
        assert_eq!(v["printBackground"], true);
        assert_eq!(v["transferMode"], "ReturnAsStream");
    }
}
