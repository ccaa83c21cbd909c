use crate::config::EBirdConfig;
use crate::parsing::ChecklistParser;
use crate::request::RequestSpec;
use crate::retry::RetryPolicy;
use crate::web_session::WebSession;
use crate::{Result, SyncError};
use scraper::Html;

/// CAS login, separated from the session manager.
pub struct LoginManager<'a> {
    session: &'a dyn WebSession,
    config: &'a EBirdConfig,
    parser: ChecklistParser,
}

impl<'a> LoginManager<'a> {
    pub fn new(session: &'a dyn WebSession, config: &'a EBirdConfig) -> Self {
        Self {
            session,
            config,
            parser: ChecklistParser::new(),
        }
    }

    /// Authenticate against CAS using username and password.
    ///
    /// This method:
    /// 1. Fetches the CAS login page to extract the one-time `execution` token
    /// 2. Submits the login form with credentials and that token
    /// 3. Follows the redirect chain back to eBird, collecting cookies
    /// 4. Checks the final page for a sign-out marker
    ///
    /// Neither step is retried: a failed login is final for the current job.
    ///
    /// # Returns
    ///
    /// `Ok(())` on success, [`SyncError::TokenNotFound`] when the login page has
    /// no token, or [`SyncError::Auth`] when the marker is absent.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        log::info!("Logging in to eBird through CAS...");
        let login_page_url = self.config.cas_login_page_url();

        let page = self
            .session
            .send(RequestSpec::get(&login_page_url).retry(RetryPolicy::none()))
            .await?
            .error_for_status()?;
        let execution = self
            .parser
            .parse_execution_token(&Html::parse_document(&page.text()))?;

        let service = self.config.cas_service();
        let form = [
            ("service", service.as_str()),
            ("locale", self.config.locale.as_str()),
            ("username", username),
            ("password", password),
            ("rememberMe", "on"),
            ("execution", execution.as_str()),
            ("_eventId", "submit"),
        ];

        let response = self
            .session
            .send(
                RequestSpec::post(self.config.cas_login_url())
                    .form(form)
                    .header("Referer", &login_page_url)
                    .header("Origin", &self.config.cas_base_url)
                    .retry(RetryPolicy::none()),
            )
            .await?;

        log::debug!(
            "Login response status: {} (final URL {})",
            response.status,
            response.url
        );

        let html = response.text();
        if contains_any(&html, &self.config.signed_in_markers) {
            log::info!("CAS login successful");
            Ok(())
        } else {
            let message = self.parser.parse_login_error(&Html::parse_document(&html));
            Err(SyncError::Auth(message))
        }
    }
}

/// Whether `text` contains any of `markers`.
pub fn contains_any(text: &str, markers: &[String]) -> bool {
    markers.iter().any(|marker| text.contains(marker.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::PageResponse;
    use crate::web_session::MockWebSession;
    use mockall::Sequence;

    const LOGIN_PAGE: &str = r#"<form><input name="execution" value="e1s1"/></form>"#;

    #[tokio::test]
    async fn test_login_posts_credentials_with_execution_token() {
        let config = EBirdConfig::default();
        let mut session = MockWebSession::new();
        let mut seq = Sequence::new();

        session
            .expect_send()
            .withf(|r| r.url.contains("/cassso/login?service="))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|r| Ok(PageResponse::new(200, r.url, LOGIN_PAGE)));
        session
            .expect_send()
            .withf(|r| {
                r.form_value("execution") == Some("e1s1")
                    && r.form_value("username") == Some("birder")
                    && r.form_value("password") == Some("secret")
                    && r.form_value("rememberMe") == Some("on")
                    && r.form_value("_eventId") == Some("submit")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(PageResponse::new(200, "https://ebird.org/home", "<a>退出</a>")));

        LoginManager::new(&session, &config)
            .login("birder", "secret")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_login_without_marker_is_auth_error() {
        let config = EBirdConfig::default();
        let mut session = MockWebSession::new();
        session
            .expect_send()
            .times(2)
            .returning(|r| Ok(PageResponse::new(200, r.url, LOGIN_PAGE)));

        let result = LoginManager::new(&session, &config).login("birder", "wrong").await;
        assert!(matches!(result, Err(SyncError::Auth(_))));
    }

    #[tokio::test]
    async fn test_missing_execution_token_stops_before_post() {
        let config = EBirdConfig::default();
        let mut session = MockWebSession::new();
        session
            .expect_send()
            .times(1)
            .returning(|r| Ok(PageResponse::new(200, r.url, "<html>maintenance</html>")));

        let result = LoginManager::new(&session, &config).login("birder", "secret").await;
        assert!(matches!(result, Err(SyncError::TokenNotFound)));
    }
}
