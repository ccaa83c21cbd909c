//! Credential store and endpoint configuration.
//!
//! Credentials live in an INI file (`secrets.ini` by default):
//!
//! ```ini
//! [ebird]
//! username = someone@example.org
//! password = hunter2
//! cookie_string = EBIRD_SESSIONID=0123; I18N_LANGUAGE=zh_CN
//!
//! [birdreport]
//! token = 0123456789ABCDEF
//! member_id = 31349
//! ```
//!
//! Only `cookie_string` is ever written back; every other key is preserved.

use crate::{Result, SyncError};
use ini::Ini;
use std::path::{Path, PathBuf};

const EBIRD_SECTION: &str = "ebird";
const BIRDREPORT_SECTION: &str = "birdreport";
const DEFAULT_FILE_NAME: &str = "secrets.ini";

/// eBird account credentials plus the cached session cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// `key=value; key=value` cookie string from the last successful login
    pub cookie_string: Option<String>,
}

/// BirdReport API credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BirdReportCredentials {
    pub token: String,
    pub member_id: i64,
}

/// Reads and updates the INI credential file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Open the credential file at `path`.
    ///
    /// A missing file is a configuration error; nothing can run without it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(SyncError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        Ok(Self { path })
    }

    /// `secrets.ini` in the working directory if present, otherwise
    /// `<config dir>/ebird-sync/secrets.ini`.
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from(DEFAULT_FILE_NAME);
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .map(|dir| dir.join("ebird-sync").join(DEFAULT_FILE_NAME))
            .unwrap_or(local)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Ini> {
        Ini::load_from_file(&self.path).map_err(|e| {
            SyncError::Config(format!("Failed to read {}: {e}", self.path.display()))
        })
    }

    fn required(conf: &Ini, section: &str, key: &str) -> Result<String> {
        conf.section(Some(section))
            .and_then(|s| s.get(key))
            .map(|v| v.trim().to_string())
            .ok_or_else(|| SyncError::Config(format!("Missing [{section}] {key}")))
    }

    /// Load the `[ebird]` section.
    pub fn ebird_credentials(&self) -> Result<Credentials> {
        let conf = self.load()?;
        let cookie_string = conf
            .section(Some(EBIRD_SECTION))
            .and_then(|s| s.get("cookie_string"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(Credentials {
            username: Self::required(&conf, EBIRD_SECTION, "username")?,
            password: Self::required(&conf, EBIRD_SECTION, "password")?,
            cookie_string,
        })
    }

    /// Load the `[birdreport]` section.
    pub fn birdreport_credentials(&self) -> Result<BirdReportCredentials> {
        let conf = self.load()?;
        let member_id = Self::required(&conf, BIRDREPORT_SECTION, "member_id")?;
        let member_id = member_id.parse::<i64>().map_err(|e| {
            SyncError::Config(format!("[birdreport] member_id is not a number: {e}"))
        })?;

        Ok(BirdReportCredentials {
            token: Self::required(&conf, BIRDREPORT_SECTION, "token")?,
            member_id,
        })
    }

    /// Replace `[ebird] cookie_string`, leaving every other key untouched.
    pub fn save_cookie_string(&self, cookie_string: &str) -> Result<()> {
        let mut conf = self.load()?;
        conf.with_section(Some(EBIRD_SECTION))
            .set("cookie_string", cookie_string);
        conf.write_to_file(&self.path)?;

        log::info!("Cookie string saved to {}", self.path.display());
        Ok(())
    }
}

/// Locations and page markers for eBird and its CAS login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EBirdConfig {
    /// e.g. `https://ebird.org`
    pub base_url: String,
    /// e.g. `https://secure.birds.cornell.edu`
    pub cas_base_url: String,
    pub locale: String,
    /// Logged-in-only page used to probe the session
    pub probe_path: String,
    /// Text shown on the CAS sign-in page
    pub sign_in_markers: Vec<String>,
    /// Text shown only to signed-in users
    pub signed_in_markers: Vec<String>,
}

impl Default for EBirdConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ebird.org".to_string(),
            cas_base_url: "https://secure.birds.cornell.edu".to_string(),
            locale: "zh-cn".to_string(),
            probe_path: "/mychecklists?year=&m=&d=&sharedFilter=all&currentRow=1&rowsPerPage=308"
                .to_string(),
            sign_in_markers: vec![
                "Sign in to your Cornell Lab Account".to_string(),
                "登录您的".to_string(),
            ],
            signed_in_markers: vec!["Sign Out".to_string(), "退出".to_string()],
        }
    }
}

impl EBirdConfig {
    /// Point both eBird and CAS at one test server.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            cas_base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn probe_url(&self) -> String {
        format!("{}{}", self.base_url, self.probe_path)
    }

    /// CAS `service` parameter: where CAS sends the ticket back to.
    pub fn cas_service(&self) -> String {
        format!("{}/login/cas?portal=ebird", self.base_url)
    }

    /// Form action of the CAS login page.
    pub fn cas_login_url(&self) -> String {
        format!("{}/cassso/login", self.cas_base_url)
    }

    /// CAS login page, carrying the service and locale parameters.
    pub fn cas_login_page_url(&self) -> String {
        format!(
            "{}?service={}&locale={}",
            self.cas_login_url(),
            urlencoding::encode(&self.cas_service()),
            self.locale
        )
    }

    /// Host the cached cookies are scoped to.
    pub fn cookie_domain(&self) -> String {
        host_of(&self.base_url)
    }

    pub fn cas_host(&self) -> String {
        host_of(&self.cas_base_url)
    }
}

/// BirdReport REST API location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BirdReportConfig {
    pub api_base_url: String,
    pub referer: String,
}

impl Default for BirdReportConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.birdreport.cn".to_string(),
            referer: "https://www.birdreport.cn/".to_string(),
        }
    }
}

impl BirdReportConfig {
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }
}

fn host_of(url: &str) -> String {
    http_types::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default()
}
