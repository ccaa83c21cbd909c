/// Lifecycle of the eBird session held by [`EBirdClient`](crate::EBirdClient).
///
/// There is no explicit "expired" state: expiry is only noticed when a
/// protected page comes back as the CAS sign-in page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Cookies have not been checked yet
    Unknown,
    /// A probe just succeeded
    Valid,
    /// The last probe landed on the sign-in page
    Invalid,
    /// Login was attempted and failed; terminal for this process
    Failed,
}

/// One cookie, scoped to the host that set it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub domain: String,
    pub name: String,
    pub value: String,
}

/// Minimal cookie jar shared by every request of an [`HttpSession`](crate::HttpSession).
///
/// Cookies are keyed by (domain, name). A cookie is sent to a host when the
/// host equals its domain or is a subdomain of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<StoredCookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a jar from a persisted `key=value; key=value` string.
    ///
    /// Every cookie is scoped to `domain`; items without `=` are ignored.
    pub fn from_cookie_string(cookie_string: &str, domain: &str) -> Self {
        let mut jar = Self::new();
        jar.load_cookie_string(cookie_string, domain);
        jar
    }

    pub fn load_cookie_string(&mut self, cookie_string: &str, domain: &str) {
        for item in cookie_string.split(';') {
            if let Some((name, value)) = item.trim().split_once('=') {
                if !name.is_empty() {
                    self.set(domain, name, value);
                }
            }
        }
    }

    /// Insert or replace a cookie.
    pub fn set(&mut self, domain: &str, name: &str, value: &str) {
        let domain = domain.trim_start_matches('.').to_ascii_lowercase();
        self.cookies
            .retain(|c| !(c.domain == domain && c.name == name));
        self.cookies.push(StoredCookie {
            domain,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    /// Apply one `Set-Cookie` header received from `host`.
    ///
    /// Only the `Domain` and `Max-Age`/`Expires` deletion attributes are
    /// honoured; paths and flags are ignored.
    pub fn store_set_cookie(&mut self, host: &str, header: &str) {
        let mut parts = header.split(';');
        let Some((name, value)) = parts.next().and_then(|p| p.trim().split_once('=')) else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }

        let mut domain = host.to_ascii_lowercase();
        let mut delete = false;
        for attribute in parts {
            let (key, attr_value) = attribute
                .trim()
                .split_once('=')
                .unwrap_or((attribute.trim(), ""));
            match key.to_ascii_lowercase().as_str() {
                "domain" if !attr_value.is_empty() => {
                    domain = attr_value.trim_start_matches('.').to_ascii_lowercase();
                }
                "max-age" => delete = attr_value.trim().starts_with('-') || attr_value.trim() == "0",
                "expires" => delete = delete || attr_value.contains("1970"),
                _ => {}
            }
        }

        if delete {
            self.cookies
                .retain(|c| !(c.domain == domain && c.name == name));
        } else {
            self.set(&domain, name, value.trim());
        }
    }

    /// `Cookie` header value for a request to `host`.
    pub fn header_for(&self, host: &str) -> Option<String> {
        let host = host.to_ascii_lowercase();
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| domain_matches(&host, &c.domain))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Flatten the jar into `key=value; key=value`.
    ///
    /// When two domains hold a cookie of the same name, the most recently set wins.
    pub fn to_cookie_string(&self) -> String {
        let mut seen: Vec<&str> = Vec::new();
        let mut pairs: Vec<String> = Vec::new();
        for cookie in self.cookies.iter().rev() {
            if seen.contains(&cookie.name.as_str()) {
                continue;
            }
            seen.push(&cookie.name);
            pairs.push(format!("{}={}", cookie.name, cookie.value));
        }
        pairs.reverse();
        pairs.join("; ")
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rev()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}
