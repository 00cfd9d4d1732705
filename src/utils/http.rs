use rand::Rng;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, CACHE_CONTROL, COOKIE, PRAGMA, REFERER,
    USER_AGENT,
};

pub fn random_useragent(random_value: bool) -> String {
    let name = option_env!("CARGO_PKG_NAME").unwrap_or("proxy-pool");
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("0.0.0");

    let mut rv = String::new();
    if random_value {
        let mut rng = rand::thread_rng();
        rv.push('/');
        rv.push_str(rng.gen_range(1000..9999).to_string().as_str())
    }

    format!("{}/{}{}", name, version, rv)
}

pub fn get_headers(random_value: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(&random_useragent(random_value)) {
        headers.insert(USER_AGENT, ua);
    }
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(COOKIE, HeaderValue::from_static("cookie=ok"));
    headers.insert(REFERER, HeaderValue::from_static("https://google.com/"));
    headers
}
