//! JSON payload shapes for the protocol exchanges (C7, spec §4.7).
//!
//! Follows the teacher's `payload::connection`/`payload::receiver` idiom:
//! `#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]` enums for
//! the request/response shapes, fields renamed to `camelCase` where the
//! wire uses it.

use std::collections::HashMap;

use serde_derive::{Deserialize, Serialize};

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Connect,
    Ping,
    Close,
    #[serde(rename_all = "camelCase")]
    GetAppAvailability { request_id: u32, app_id: Vec<String> },
}

#[derive(Deserialize, Debug)]
pub struct Pong {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Pong {
    pub fn is_pong(&self) -> bool {
        self.kind == "PONG"
    }
}

/// `Availability` is either of the two string values spec §4.7 names;
/// anything else fails to deserialize, which the caller treats as a
/// non-matching response rather than a crash.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    #[serde(rename = "APP_AVAILABLE")]
    Available,
    #[serde(rename = "APP_UNAVAILABLE")]
    Unavailable,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AppAvailabilityResponse {
    pub request_id: u32,
    pub response_type: String,
    pub availability: HashMap<String, Availability>,
}

impl AppAvailabilityResponse {
    pub fn is_available(&self, app_id: &str) -> bool {
        self.response_type == "GET_APP_AVAILABILITY"
            && self.availability.get(app_id) == Some(&Availability::Available)
    }

    /// `false` both when the app is reported unavailable and when the
    /// response doesn't even mention `app_id` — spec §4.7 "Success iff
    /// available" treats both as a negative result, not an error.
    pub fn contains(&self, app_id: &str) -> bool {
        self.availability.contains_key(app_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_request_serializes_to_bare_type_tag() {
        let json = serde_json::to_string(&Request::Connect).unwrap();
        assert_eq!(json, r#"{"type":"CONNECT"}"#);
    }

    #[test]
    fn ping_request_serializes_to_bare_type_tag() {
        let json = serde_json::to_string(&Request::Ping).unwrap();
        assert_eq!(json, r#"{"type":"PING"}"#);
    }

    #[test]
    fn get_app_availability_request_shape() {
        let req = Request::GetAppAvailability {
            request_id: 7,
            app_id: vec!["02834648".to_owned()],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"type":"GET_APP_AVAILABILITY","requestId":7,"appId":["02834648"]}"#
        );
    }

    #[test]
    fn pong_response_recognized() {
        let pong: Pong = serde_json::from_str(r#"{"type":"PONG"}"#).unwrap();
        assert!(pong.is_pong());
    }

    #[test]
    fn availability_response_reports_success_per_app() {
        let body = r#"{"requestId":7,"responseType":"GET_APP_AVAILABILITY","availability":{"02834648":"APP_AVAILABLE"}}"#;
        let resp: AppAvailabilityResponse = serde_json::from_str(body).unwrap();
        assert!(resp.is_available("02834648"));
    }

    #[test]
    fn availability_response_reports_failure_when_unavailable() {
        let body = r#"{"requestId":7,"responseType":"GET_APP_AVAILABILITY","availability":{"02834648":"APP_UNAVAILABLE"}}"#;
        let resp: AppAvailabilityResponse = serde_json::from_str(body).unwrap();
        assert!(!resp.is_available("02834648"));
        assert!(resp.contains("02834648"));
    }
}
