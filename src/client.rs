use crate::config::{CredentialStore, Credentials, EBirdConfig};
use crate::http::HttpSession;
use crate::login::{contains_any, LoginManager};
use crate::parsing::ChecklistParser;
use crate::request::{PageResponse, RequestSpec};
use crate::session::SessionState;
use crate::types::{ChecklistDetail, ChecklistSummary};
use crate::web_session::WebSession;
use crate::{Result, SyncError};
use http_client::HttpClient;
use http_types::Url;
use scraper::Html;
use std::cell::Cell;

/// Session manager and scraper for eBird.
///
/// Owns one [`WebSession`], validates it lazily against the "My checklists"
/// page, and logs in through CAS when the session turns out to be stale.
/// Refreshed cookies are written back to the [`CredentialStore`] if one is
/// attached.
///
/// # Examples
///
/// ```rust,no_run
/// use ebird_sync::{CredentialStore, EBirdClient, EBirdConfig, Result};
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let store = CredentialStore::open("secrets.ini")?;
///     let http_client = http_client::native::NativeClient::new();
///     let client = EBirdClient::from_store(Box::new(http_client), store, EBirdConfig::default())?;
///
///     for checklist in client.fetch_checklist_history().await? {
///         println!("{} {}", checklist.id, checklist.location);
///     }
///     Ok(())
/// }
/// ```
pub struct EBirdClient {
    session: Box<dyn WebSession>,
    config: EBirdConfig,
    credentials: Credentials,
    store: Option<CredentialStore>,
    state: Cell<SessionState>,
    parser: ChecklistParser,
}

impl EBirdClient {
    /// Create a client over any [`WebSession`].
    ///
    /// Cached cookies from `credentials` are loaded into the session; the
    /// session starts out [`SessionState::Unknown`].
    pub fn new(session: Box<dyn WebSession>, config: EBirdConfig, credentials: Credentials) -> Self {
        if let Some(cookie_string) = credentials.cookie_string.as_deref() {
            session.restore_cookies(cookie_string, &config.cookie_domain());
        }
        Self {
            session,
            config,
            credentials,
            store: None,
            state: Cell::new(SessionState::Unknown),
            parser: ChecklistParser::new(),
        }
    }

    /// Build a client from the credential file, persisting refreshed cookies back to it.
    pub fn from_store(
        client: Box<dyn HttpClient>,
        store: CredentialStore,
        config: EBirdConfig,
    ) -> Result<Self> {
        let credentials = store.ebird_credentials()?;
        let session = HttpSession::new(client);
        Ok(Self::new(Box::new(session), config, credentials).with_store(store))
    }

    pub fn with_store(mut self, store: CredentialStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn session(&self) -> &dyn WebSession {
        self.session.as_ref()
    }

    pub fn config(&self) -> &EBirdConfig {
        &self.config
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Probe the session and log in again if it is stale.
    ///
    /// Returns the body of the probe page (the checklist listing), fetched
    /// again after a successful login.
    pub async fn validate_or_refresh(&self) -> Result<String> {
        Ok(self.validated_probe().await?.text())
    }

    async fn validated_probe(&self) -> Result<PageResponse> {
        if self.state.get() == SessionState::Failed {
            return Err(SyncError::Auth(
                "An earlier login attempt failed in this run".to_string(),
            ));
        }

        log::info!("Checking eBird session...");
        let probe = self.probe().await?;
        if !self.is_sign_in_page(&probe) {
            log::info!("Session still valid, reusing cached cookies");
            self.state.set(SessionState::Valid);
            return Ok(probe);
        }

        log::warn!("Session expired, logging in again...");
        self.state.set(SessionState::Invalid);
        self.refresh().await?;

        let probe = self.probe().await?;
        if self.is_sign_in_page(&probe) {
            self.state.set(SessionState::Failed);
            return Err(SyncError::Auth(
                "Still on the sign-in page after logging in".to_string(),
            ));
        }
        Ok(probe)
    }

    async fn probe(&self) -> Result<PageResponse> {
        self.session
            .send(RequestSpec::get(self.config.probe_url()))
            .await
    }

    /// Log in and persist the new cookies.
    async fn refresh(&self) -> Result<()> {
        let login = LoginManager::new(self.session.as_ref(), &self.config);
        if let Err(e) = login
            .login(&self.credentials.username, &self.credentials.password)
            .await
        {
            log::error!("CAS login failed: {e}");
            self.state.set(SessionState::Failed);
            return Err(e);
        }

        self.state.set(SessionState::Valid);
        self.persist_cookies();
        Ok(())
    }

    fn persist_cookies(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save_cookie_string(&self.session.cookie_string()) {
            log::warn!("Failed to save cookies (you'll need to log in again next time): {e}");
        }
    }

    /// A response is the sign-in page when it was redirected onto the CAS
    /// login form, or, failing that, when it carries a sign-in marker.
    pub fn is_sign_in_page(&self, response: &PageResponse) -> bool {
        let redirected_to_cas = Url::parse(&response.url)
            .map(|url| {
                url.host_str() == Some(self.config.cas_host().as_str())
                    && url.path().starts_with("/cassso/login")
            })
            .unwrap_or(false);

        redirected_to_cas || contains_any(&response.text(), &self.config.sign_in_markers)
    }

    /// Send a request that needs a logged-in session.
    ///
    /// The session is probed first if its state is unknown. If the response
    /// turns out to be the sign-in page anyway, the session is refreshed once
    /// and the request re-sent.
    pub async fn send_protected(&self, request: RequestSpec) -> Result<PageResponse> {
        if self.state.get() != SessionState::Valid {
            self.validate_or_refresh().await?;
        }

        let response = self.session.send(request.clone()).await?;
        if !self.is_sign_in_page(&response) {
            return Ok(response);
        }

        log::warn!("Session expired during {}, logging in again...", request.url);
        self.state.set(SessionState::Invalid);
        self.refresh().await?;

        let response = self.session.send(request).await?;
        if self.is_sign_in_page(&response) {
            self.state.set(SessionState::Failed);
            return Err(SyncError::Auth(format!(
                "Still redirected to sign-in for {}",
                response.url
            )));
        }
        Ok(response)
    }

    /// Scrape the "My checklists" page.
    ///
    /// The probe already fetches this page, so its body is reused. A non-200
    /// listing yields no checklists.
    pub async fn fetch_checklist_history(&self) -> Result<Vec<ChecklistSummary>> {
        let page = self.validated_probe().await?;
        if page.status != 200 {
            log::warn!("Checklist history returned status {}", page.status);
            return Ok(Vec::new());
        }
        self.parser
            .parse_checklist_history(&Html::parse_document(&page.text()))
    }

    /// Scrape a checklist detail page for observation ids and the media CSRF token.
    pub async fn fetch_checklist_detail(&self, checklist_id: &str) -> Result<ChecklistDetail> {
        log::info!("Parsing checklist {checklist_id}...");
        let url = format!("{}/checklist/{}", self.config.base_url, checklist_id);
        let page = self
            .send_protected(RequestSpec::get(url).query("locale", "zh_CN"))
            .await?
            .error_for_status()?;

        self.parser
            .parse_checklist_detail(&Html::parse_document(&page.text()))
    }

    /// Download the CSV export of a checklist.
    pub async fn download_checklist_csv(&self, checklist_id: &str) -> Result<String> {
        log::info!("Downloading checklist export {checklist_id}...");
        let url = format!("{}/ebird/checklist/download", self.config.base_url);
        let page = self
            .send_protected(RequestSpec::get(url).query("subID", checklist_id))
            .await?
            .error_for_status()?;
        Ok(page.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web_session::MockWebSession;
    use mockall::predicate::*;
    use mockall::Sequence;

    const LISTING: &str = r#"<li id="checklist-S1" class="ResultsStats--manageMyChecklists"><span class="Heading-main">1 Jan 2026</span></li>"#;
    const SIGN_IN: &str = "<h1>Sign in to your Cornell Lab Account</h1>";
    const LOGIN_FORM: &str = r#"<input name="execution" value="e1s1"/>"#;

    fn credentials(cookie: Option<&str>) -> Credentials {
        Credentials {
            username: "birder".to_string(),
            password: "secret".to_string(),
            cookie_string: cookie.map(str::to_string),
        }
    }

    fn is_probe(r: &RequestSpec) -> bool {
        r.url.contains("/mychecklists")
    }

    fn is_login_post(r: &RequestSpec) -> bool {
        r.method == http_types::Method::Post && r.url.ends_with("/cassso/login")
    }

    #[tokio::test]
    async fn test_valid_session_triggers_zero_logins() {
        let mut session = MockWebSession::new();
        session
            .expect_restore_cookies()
            .with(eq("EBIRD_SESSIONID=ABC"), eq("ebird.org"))
            .times(1)
            .return_const(());
        session
            .expect_send()
            .withf(is_probe)
            .times(1)
            .returning(|r| Ok(PageResponse::new(200, r.url, LISTING)));
        session.expect_send().withf(is_login_post).times(0);

        let client = EBirdClient::new(
            Box::new(session),
            EBirdConfig::default(),
            credentials(Some("EBIRD_SESSIONID=ABC")),
        );

        let body = client.validate_or_refresh().await.unwrap();
        assert!(body.contains("checklist-S1"));
        assert_eq!(client.state(), SessionState::Valid);
    }

    #[tokio::test]
    async fn test_sign_in_marker_triggers_exactly_one_login() {
        let mut session = MockWebSession::new();
        let mut seq = Sequence::new();

        session
            .expect_send()
            .withf(is_probe)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|r| Ok(PageResponse::new(200, r.url, SIGN_IN)));
        session
            .expect_send()
            .withf(|r| r.url.contains("/cassso/login?service="))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|r| Ok(PageResponse::new(200, r.url, LOGIN_FORM)));
        session
            .expect_send()
            .withf(is_login_post)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(PageResponse::new(200, "https://ebird.org/home", "Sign Out")));
        session
            .expect_send()
            .withf(is_probe)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|r| Ok(PageResponse::new(200, r.url, LISTING)));

        let client = EBirdClient::new(Box::new(session), EBirdConfig::default(), credentials(None));

        let checklists = client.fetch_checklist_history().await.unwrap();
        assert_eq!(checklists.len(), 1);
        assert_eq!(checklists[0].id, "S1");
        assert_eq!(client.state(), SessionState::Valid);
    }

    #[tokio::test]
    async fn test_redirect_to_cas_counts_as_expired() {
        let mut session = MockWebSession::new();
        session
            .expect_send()
            .withf(is_probe)
            .times(1)
            .returning(|_| {
                Ok(PageResponse::new(
                    200,
                    "https://secure.birds.cornell.edu/cassso/login?service=x",
                    "<html>no marker in this locale</html>",
                ))
            });
        session
            .expect_send()
            .withf(|r| r.url.contains("/cassso/login?service="))
            .times(1)
            .returning(|r| Ok(PageResponse::new(200, r.url, "<html>token gone</html>")));

        let client = EBirdClient::new(Box::new(session), EBirdConfig::default(), credentials(None));

        let result = client.validate_or_refresh().await;
        assert!(matches!(result, Err(SyncError::TokenNotFound)));
        assert_eq!(client.state(), SessionState::Failed);

        // Failed is terminal: no further requests are attempted.
        assert!(matches!(
            client.validate_or_refresh().await,
            Err(SyncError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_protected_request_retried_once_after_relogin() {
        let mut session = MockWebSession::new();
        let mut seq = Sequence::new();

        session
            .expect_send()
            .withf(is_probe)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|r| Ok(PageResponse::new(200, r.url, LISTING)));
        session
            .expect_send()
            .withf(|r| r.url.ends_with("/checklist/S9"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|r| Ok(PageResponse::new(200, r.url, SIGN_IN)));
        session
            .expect_send()
            .withf(|r| r.url.contains("/cassso/login?service="))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|r| Ok(PageResponse::new(200, r.url, LOGIN_FORM)));
        session
            .expect_send()
            .withf(is_login_post)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(PageResponse::new(200, "https://ebird.org/home", "退出")));
        session
            .expect_send()
            .withf(|r| r.url.ends_with("/checklist/S9"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|r| {
                Ok(PageResponse::new(
                    200,
                    r.url,
                    r#"<checklist-featured-media rating-csrf="t"></checklist-featured-media>"#,
                ))
            });
        session.expect_cookie_string().return_const(String::new());

        let client = EBirdClient::new(Box::new(session), EBirdConfig::default(), credentials(None));
        let detail = client.fetch_checklist_detail("S9").await.unwrap();

        assert_eq!(detail.csrf_token.as_deref(), Some("t"));
        assert!(detail.observations.is_empty());
    }
}
