use crate::headers;
use crate::request::{PageResponse, RequestSpec};
use crate::retry::{retry_operation, RetryPolicy};
use crate::session::CookieJar;
use crate::web_session::WebSession;
use crate::{Result, SyncError};
use async_trait::async_trait;
use http_client::{HttpClient, Request};
use http_types::{Method, Url};
use std::cell::RefCell;
use std::sync::{Mutex, MutexGuard};

const MAX_REDIRECTS: usize = 10;

/// HTTP session with a persistent cookie jar.
///
/// Wraps any [`HttpClient`] implementation. Redirects are followed by hand so
/// that cookies set on every hop land in the jar and the final URL is known.
/// Every request goes through the session's [`RetryPolicy`] unless the request
/// carries its own.
pub struct HttpSession {
    client: Box<dyn HttpClient>,
    cookies: Mutex<CookieJar>,
    retry: RetryPolicy,
    max_redirects: usize,
}

impl HttpSession {
    /// Create a new session with an empty jar and the default retry policy.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use ebird_sync::HttpSession;
    ///
    /// let http_client = http_client::native::NativeClient::new();
    /// let session = HttpSession::new(Box::new(http_client));
    /// ```
    pub fn new(client: Box<dyn HttpClient>) -> Self {
        Self {
            client,
            cookies: Mutex::new(CookieJar::new()),
            retry: RetryPolicy::default(),
            max_redirects: MAX_REDIRECTS,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Snapshot of the cookie jar.
    pub fn cookie_jar(&self) -> CookieJar {
        self.jar().clone()
    }

    fn jar(&self) -> MutexGuard<'_, CookieJar> {
        self.cookies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// One attempt: send the request and follow its redirect chain.
    async fn send_once(&self, spec: &RequestSpec) -> Result<PageResponse> {
        let mut url = Url::parse(&spec.full_url())
            .map_err(|e| SyncError::Request(format!("Invalid URL {}: {e}", spec.url)))?;
        let mut method = spec.method;
        let mut body = spec.payload.encode()?;

        for _ in 0..=self.max_redirects {
            let request = self.build_request(spec, method, &url, body.as_ref());
            log::debug!("{} {}", method, url);

            let pending = self.client.send(request);
            let sent = match spec.timeout {
                Some(limit) => tokio::time::timeout(limit, pending).await.map_err(|_| {
                    SyncError::Http(format!("Request to {url} timed out after {limit:?}"))
                })?,
                None => pending.await,
            };
            let mut response = sent.map_err(|e| SyncError::Http(e.to_string()))?;

            if spec.with_cookies {
                self.store_cookies(&url, &response);
            }

            let status = u16::from(response.status());
            let location = response
                .header("location")
                .map(|values| values.last().as_str().to_string());

            if spec.follow_redirects && is_redirect(status) {
                if let Some(location) = location {
                    let next = url.join(&location).map_err(|e| {
                        SyncError::Request(format!("Invalid redirect target {location}: {e}"))
                    })?;
                    log::debug!("Following {status} redirect to {next}");
                    if status != 307 && status != 308 {
                        method = Method::Get;
                        body = None;
                    }
                    url = next;
                    continue;
                }
            }

            let bytes = response
                .body_bytes()
                .await
                .map_err(|e| SyncError::Http(e.to_string()))?;
            return Ok(PageResponse::new(status, url.as_str(), bytes));
        }

        Err(SyncError::Request(format!(
            "Too many redirects starting from {}",
            spec.url
        )))
    }

    fn effective_policy<'a>(&'a self, spec: &'a RequestSpec) -> &'a RetryPolicy {
        spec.retry.as_ref().unwrap_or(&self.retry)
    }

    fn build_request(
        &self,
        spec: &RequestSpec,
        method: Method,
        url: &Url,
        body: Option<&(Vec<u8>, String)>,
    ) -> Request {
        let mut request = Request::new(method, url.clone());
        headers::add_common_headers(&mut request);

        if spec.with_cookies {
            let host = url.host_str().unwrap_or_default();
            let cookie_header = self.jar().header_for(host);
            headers::add_cookies(&mut request, cookie_header.as_deref());
        }

        headers::add_custom_headers(&mut request, &spec.headers);

        match body {
            Some((bytes, content_type)) => {
                headers::add_accept_header(&mut request, content_type == "application/json");
                let _ = request.insert_header("Content-Type", content_type.as_str());
                request.set_body(bytes.clone());
            }
            None => headers::add_accept_header(&mut request, false),
        }

        request
    }

    fn store_cookies(&self, url: &Url, response: &http_types::Response) {
        let Some(cookie_headers) = response.header("set-cookie") else {
            return;
        };
        let host = url.host_str().unwrap_or_default();
        let mut jar = self.jar();
        for cookie_header in cookie_headers {
            jar.store_set_cookie(host, cookie_header.as_str());
        }
    }
}

#[async_trait(?Send)]
impl WebSession for HttpSession {
    /// Retryable statuses are retried under the policy. Once the attempts run
    /// out, the last such page is returned as is and the caller decides what
    /// the status means.
    async fn send(&self, request: RequestSpec) -> Result<PageResponse> {
        let policy = self.effective_policy(&request).clone();
        let operation = format!("{} {}", request.method, request.url);
        let last_page: RefCell<Option<PageResponse>> = RefCell::new(None);

        let (spec, retryable, stash) = (&request, &policy.retryable_statuses, &last_page);
        let outcome = retry_operation(&policy, &operation, || async move {
            let page = self.send_once(spec).await?;
            if retryable.contains(&page.status) {
                let error = SyncError::Status {
                    status: page.status,
                    url: page.url.clone(),
                };
                *stash.borrow_mut() = Some(page);
                return Err(error);
            }
            Ok(page)
        })
        .await;

        match outcome {
            Ok(outcome) => Ok(outcome.result),
            Err(error @ SyncError::Status { .. }) => last_page.into_inner().ok_or(error),
            Err(error) => Err(error),
        }
    }

    fn cookie_string(&self) -> String {
        self.jar().to_cookie_string()
    }

    fn restore_cookies(&self, cookie_string: &str, domain: &str) {
        self.jar().load_cookie_string(cookie_string, domain);
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}
