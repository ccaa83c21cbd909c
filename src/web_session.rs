use crate::request::{PageResponse, RequestSpec};
use crate::Result;
use async_trait::async_trait;

/// Cookie-carrying HTTP session that the scrapers and uploaders talk through.
///
/// [`HttpSession`](crate::HttpSession) is the real implementation. The trait
/// exists so that the session manager and the upload orchestrators can be
/// exercised against scripted responses.
///
/// # Mocking Support
///
/// When the `mock` feature is enabled, this crate provides `MockWebSession`
/// generated by the `mockall` library.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait(?Send)]
pub trait WebSession {
    /// Send a request, following redirects and applying the retry policy.
    async fn send(&self, request: RequestSpec) -> Result<PageResponse>;

    /// Current cookies as a `key=value; key=value` string.
    fn cookie_string(&self) -> String;

    /// Seed the cookie jar from a persisted cookie string.
    fn restore_cookies(&self, cookie_string: &str, domain: &str);
}
