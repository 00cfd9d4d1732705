use std::{collections::HashMap, convert::Infallible, net::SocketAddr, sync::Arc};

use anyhow::Context;
use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::Http,
    service::service_fn,
    Body, Method, Request, Response, StatusCode,
};
use tokio::net::TcpListener;

use crate::{
    error_context,
    pool::{PoolError, PoolQuery},
    proxy::NickType,
};

#[derive(Clone)]
pub struct ApiState {
    pub pool: PoolQuery,
    /// Cap on returned proxies, 0 for none.
    pub max_count: usize,
}

#[derive(Debug)]
pub struct Server {
    pub addr: SocketAddr,
}

impl Server {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub async fn start(&self, state: ApiState) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .context(error_context!())?;
        log::info!("Listening on http://{}", self.addr);

        let state = Arc::new(state);
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::error!("Accept error: {}", e);
                    continue;
                }
            };
            log::debug!("Accepted connection from {}", addr);

            let state = Arc::clone(&state);
            tokio::task::spawn(async move {
                let service = service_fn(move |request| handle_request(Arc::clone(&state), request));
                if let Err(err) = Http::new()
                    .http1_only(true)
                    .serve_connection(stream, service)
                    .await
                {
                    log::error!("Connection error: {}", err);
                }
            });
        }
    }
}

pub async fn handle_request(
    state: Arc<ApiState>,
    request: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if request.method() != Method::GET {
        return Ok(json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"));
    }

    let params = query_params(&request);
    let response = match request.uri().path() {
        "/random" => random(&state, &params).await,
        "/proxies" => proxies(&state, &params).await,
        "/disable_domain" => disable_domain(&state, &params).await,
        _ => json_error(StatusCode::NOT_FOUND, "Not found"),
    };
    log::debug!(
        "{} {} -> {}",
        request.method(),
        request.uri(),
        response.status()
    );
    Ok(response)
}

/// Query string as a map. Empty values are kept; `protocol=` still selects https.
fn query_params(request: &Request<Body>) -> HashMap<String, String> {
    let query = request.uri().query().unwrap_or("");
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Parameters where an empty value means "not given".
fn non_empty<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

fn nick_type_param(params: &HashMap<String, String>) -> Result<NickType, PoolError> {
    let Some(raw) = non_empty(params, "nick_type") else {
        return Ok(NickType::Elite);
    };
    raw.parse::<i8>()
        .ok()
        .and_then(|code| NickType::try_from(code).ok())
        .ok_or_else(|| PoolError::InvalidParameter {
            name: "nick_type",
            value: raw.to_string(),
        })
}

async fn random(state: &ApiState, params: &HashMap<String, String>) -> Response<Body> {
    let protocol = params.get("protocol").map(String::as_str);
    let domain = non_empty(params, "domain");

    let result = match nick_type_param(params) {
        Ok(nick_type) => {
            state
                .pool
                .random_proxy(protocol, domain, state.max_count, nick_type)
                .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(proxy) => {
            let body = match protocol {
                Some(protocol) if !protocol.is_empty() => proxy.as_url(protocol),
                _ => proxy.as_text(),
            };
            text(StatusCode::OK, body)
        }
        Err(e) => pool_error(e),
    }
}

async fn proxies(state: &ApiState, params: &HashMap<String, String>) -> Response<Body> {
    let protocol = params.get("protocol").map(String::as_str);
    let domain = non_empty(params, "domain");

    let result = match nick_type_param(params) {
        Ok(nick_type) => {
            state
                .pool
                .get_proxies(protocol, domain, state.max_count, nick_type)
                .await
        }
        Err(e) => Err(e),
    };

    match result.map(|proxies| serde_json::to_string(&proxies)) {
        Ok(Ok(body)) => respond(StatusCode::OK, "application/json", body),
        Ok(Err(e)) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        Err(e) => pool_error(e),
    }
}

async fn disable_domain(state: &ApiState, params: &HashMap<String, String>) -> Response<Body> {
    let ip = non_empty(params, "ip");
    let domain = non_empty(params, "domain");

    match state.pool.disable_domain(ip, domain).await {
        Ok(_) => text(
            StatusCode::OK,
            format!(
                "Domain [{}] disabled for IP [{}]",
                domain.unwrap_or_default(),
                ip.unwrap_or_default()
            ),
        ),
        Err(e) => pool_error(e),
    }
}

fn pool_error(error: PoolError) -> Response<Body> {
    match error {
        PoolError::EmptyResult => json_error(StatusCode::NOT_FOUND, &error.to_string()),
        PoolError::MissingParameter(_) => text(StatusCode::BAD_REQUEST, error.to_string()),
        PoolError::InvalidParameter { .. } => json_error(StatusCode::BAD_REQUEST, &error.to_string()),
        PoolError::Store(e) => {
            log::error!("store failure while serving request: {}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

fn text(status: StatusCode, body: String) -> Response<Body> {
    respond(status, "text/plain; charset=utf-8", body)
}

fn json_error(status: StatusCode, message: &str) -> Response<Body> {
    let body = serde_json::json!({ "error": message }).to_string();
    respond(status, "application/json", body)
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
