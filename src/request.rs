use crate::multipart::MultipartForm;
use crate::retry::RetryPolicy;
use crate::{Result, SyncError};
use http_types::Method;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Body of an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
    Multipart(MultipartForm),
}

impl Payload {
    /// Encoded body and its content type.
    pub fn encode(&self) -> Result<Option<(Vec<u8>, String)>> {
        Ok(match self {
            Payload::Empty => None,
            Payload::Form(fields) => Some((
                encode_form(fields).into_bytes(),
                "application/x-www-form-urlencoded".to_string(),
            )),
            Payload::Json(value) => Some((
                serde_json::to_vec(value)?,
                "application/json".to_string(),
            )),
            Payload::Multipart(form) => Some((form.encode(), form.content_type())),
        })
    }
}

/// Description of one outbound request.
///
/// Plain data, so the same request can be re-sent on retry and rebuilt for
/// each hop of a redirect chain.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub payload: Payload,
    pub timeout: Option<Duration>,
    /// Send and store session cookies
    pub with_cookies: bool,
    pub follow_redirects: bool,
    /// Overrides the session's default policy
    pub retry: Option<RetryPolicy>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            payload: Payload::Empty,
            timeout: None,
            with_cookies: true,
            follow_redirects: true,
            retry: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn form<K: Into<String>, V: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.payload = Payload::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.payload = Payload::Json(value);
        self
    }

    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.payload = Payload::Multipart(form);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Leave the cookie jar out of this request (third-party hosts).
    pub fn without_cookies(mut self) -> Self {
        self.with_cookies = false;
        self
    }

    pub fn no_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// URL with the query pairs appended.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, separator, encode_form(&self.query))
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn form_value(&self, name: &str) -> Option<&str> {
        match &self.payload {
            Payload::Form(fields) => fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

/// Fully read response after redirects were followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    /// URL of the last hop
    pub url: String,
    pub body: Vec<u8>,
}

impl PageResponse {
    pub fn new(status: u16, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            url: url.into(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            SyncError::Parse(format!("Invalid JSON from {}: {e}", self.url))
        })
    }

    /// Turn a non-2xx response into [`SyncError::Status`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SyncError::Status {
                status: self.status,
                url: self.url,
            })
        }
    }
}

fn encode_form(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_url_appends_encoded_query() {
        let spec = RequestSpec::get("https://ebird.org/media-upload/checklist/S1/policy")
            .query("fileName", "白头鹎_Y1.jpg")
            .query("contentType", "image/jpeg");

        assert_eq!(
            spec.full_url(),
            "https://ebird.org/media-upload/checklist/S1/policy?fileName=%E7%99%BD%E5%A4%B4%E9%B9%8E_Y1.jpg&contentType=image%2Fjpeg"
        );
    }

    #[test]
    fn test_full_url_extends_existing_query() {
        let spec = RequestSpec::get("https://ebird.org/checklist/S1?locale=zh_CN").query("a", "b");
        assert_eq!(spec.full_url(), "https://ebird.org/checklist/S1?locale=zh_CN&a=b");
    }

    #[test]
    fn test_form_payload_encoding() {
        let spec = RequestSpec::post("https://example.org")
            .form([("username", "a b"), ("_eventId", "submit")]);
        let (body, content_type) = spec.payload.encode().unwrap().unwrap();

        assert_eq!(String::from_utf8(body).unwrap(), "username=a%20b&_eventId=submit");
        assert_eq!(content_type, "application/x-www-form-urlencoded");
        assert_eq!(spec.form_value("_eventId"), Some("submit"));
    }

    #[test]
    fn test_error_for_status() {
        assert!(PageResponse::new(204, "u", "").error_for_status().is_ok());
        assert!(matches!(
            PageResponse::new(403, "u", "").error_for_status(),
            Err(SyncError::Status { status: 403, .. })
        ));
    }
}
