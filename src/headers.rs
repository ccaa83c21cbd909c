use http_client::Request;

/// Desktop Chrome user agent sent with every request
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Add common browser headers to a request
pub fn add_common_headers(request: &mut Request) {
    let _ = request.insert_header("User-Agent", USER_AGENT);
    let _ = request.insert_header("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8");
}

/// Default `Accept` header unless the caller supplied one
pub fn add_accept_header(request: &mut Request, is_json: bool) {
    if request.header("Accept").is_some() {
        return;
    }
    if is_json {
        let _ = request.insert_header("Accept", "application/json, text/plain, */*");
    } else {
        let _ = request.insert_header("Accept", ACCEPT_HTML);
    }
}

/// Add cookies to a request if there are any for its host
pub fn add_cookies(request: &mut Request, cookie_header: Option<&str>) {
    if let Some(cookies) = cookie_header {
        let _ = request.insert_header("Cookie", cookies);
    }
}

/// Add caller-supplied headers, replacing defaults of the same name
pub fn add_custom_headers(request: &mut Request, headers: &[(String, String)]) {
    for (name, value) in headers {
        let _ = request.insert_header(name.as_str(), value.as_str());
    }
}
