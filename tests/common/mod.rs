#![allow(dead_code)]
use async_trait::async_trait;
use http_client::{Error, HttpClient, Request, Response};
use http_types::StatusCode;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One request as seen by [`ScriptedClient`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub cookie: Option<String>,
    pub body: String,
}

/// Canned response handed out in order.
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Canned {
    pub fn ok(body: &str) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            ..Self::ok(body)
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self::status(302, "").header("Location", location)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<Canned>,
    requests: Vec<RecordedRequest>,
}

/// `HttpClient` that replays a fixed list of responses and records every request.
///
/// Clones share the same script, so a test can keep one handle while the
/// session owns another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedClient {
    script: Arc<Mutex<Script>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Canned>) -> Self {
        let client = Self::default();
        client.script.lock().unwrap().responses = responses.into();
        client
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().responses.len()
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn send(&self, mut req: Request) -> Result<Response, Error> {
        let body = req.body_string().await.unwrap_or_default();
        let recorded = RecordedRequest {
            method: req.method().to_string(),
            url: req.url().to_string(),
            cookie: req.header("Cookie").map(|v| v.last().as_str().to_string()),
            body,
        };

        let mut script = self.script.lock().unwrap();
        script.requests.push(recorded.clone());
        let Some(canned) = script.responses.pop_front() else {
            return Err(Error::from_str(
                StatusCode::InternalServerError,
                format!("No scripted response for {} {}", recorded.method, recorded.url),
            ));
        };

        let status = StatusCode::try_from(canned.status).unwrap();
        let mut response = Response::new(status);
        for (name, value) in &canned.headers {
            response.append_header(name.as_str(), value.as_str());
        }
        response.set_body(canned.body);
        Ok(response)
    }
}

/// Write a credential file into `dir`.
pub fn write_secrets(dir: &Path, cookie_string: &str) -> PathBuf {
    let path = dir.join("secrets.ini");
    fs::write(
        &path,
        format!(
            "[ebird]\nusername = birder@example.org\npassword = hunter2\ncookie_string = {cookie_string}\n\n[birdreport]\ntoken = BR-TOKEN\nmember_id = 31349\n"
        ),
    )
    .unwrap();
    path
}

pub const SIGN_IN_PAGE: &str =
    "<html><h1>Sign in to your Cornell Lab Account</h1><form></form></html>";

pub const LOGIN_FORM: &str = r#"<html><form id="credentials">
<input type="hidden" name="execution" value="e1s1-token"/>
</form></html>"#;

pub const LISTING: &str = r#"<html><a href="/logout">Sign Out</a><ol>
<li id="checklist-S302929842" class="ResultsStats ResultsStats--manageMyChecklists">
  <span class="Heading-main">22 二月 2026</span><span class="Heading-sub">3:44 下午</span>
  <div class="ResultsStats-details-location">虞山国家森林公园</div>
  <div class="ResultsStats-details-county">Suzhou</div>
  <div class="ResultsStats-details-stateCountry">Jiangsu</div>
  <div class="ResultsStats-details-stateCountry">China</div>
</li>
<li id="checklist-S301000001" class="ResultsStats ResultsStats--manageMyChecklists">
  <span class="Heading-main">3 一月 2026</span><span class="Heading-sub">7:05 上午</span>
  <div class="ResultsStats-details-location">Kuala Selangor</div>
  <div class="ResultsStats-details-stateCountry">Selangor</div>
  <div class="ResultsStats-details-stateCountry">Malaysia</div>
</li>
</ol></html>"#;

pub const CAS_LOGIN_REDIRECT: &str = "https://secure.birds.cornell.edu/cassso/login?service=https%3A%2F%2Febird.org%2Flogin%2Fcas%3Fportal%3Debird";

/// Responses for an expired session: probe bounced to CAS, login, re-probe.
pub fn expired_session_script() -> Vec<Canned> {
    vec![
        Canned::redirect(CAS_LOGIN_REDIRECT),
        Canned::ok(SIGN_IN_PAGE),
        Canned::ok(LOGIN_FORM).header("Set-Cookie", "JSESSIONID=cas-1; Path=/cassso; Secure"),
        Canned::redirect("https://ebird.org/login/cas?portal=ebird&ticket=ST-1"),
        Canned::redirect("https://ebird.org/home")
            .header("Set-Cookie", "EBIRD_SESSIONID=NEW; Path=/; HttpOnly")
            .header("Set-Cookie", "I18N_LANGUAGE=zh_CN; Path=/"),
        Canned::ok("<html><a>Sign Out</a></html>"),
        Canned::ok(LISTING),
    ]
}
