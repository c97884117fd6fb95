use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode};
use scraper::Html;
use time::OffsetDateTime;
use tokio::time::sleep;
use url::Url;

use crate::config::{
    DelayWindow, RequestOverrides, RetryPolicy, SessionConfig, cookie_header, cookie_map,
    header_map, merge_cookies, merge_headers, parse_cookie_header,
};
use crate::error::{ConfigError, FetchError};
use crate::html;
use crate::retry::retry_with_backoff;
use crate::stats::RequestStats;

const FALLBACK_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

// -------------------------
// Request / Response Types
// -------------------------

#[derive(Debug, Clone)]
pub enum Body {
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    /// Absolute, or relative to the session's base URL.
    pub url: String,
    pub overrides: RequestOverrides,
    pub params: Vec<(String, String)>,
    pub body: Option<Body>,
    /// Falls back to the session timeout when unset.
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            overrides: RequestOverrides::default(),
            params: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn overrides(mut self, overrides: RequestOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(Body::Form(fields));
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Some(Body::Json(value));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A successful answer, body already read.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Page {
    pub fn document(&self) -> Html {
        html::parse(&self.body)
    }
}

// -------------------------
// Session
// -------------------------

/// Per-run scraping context: one HTTP client, the site defaults and the
/// request counters. Every fetch goes through here.
pub struct Session {
    client: reqwest::Client,
    /// Cookies set by the server during this run.
    jar: Arc<Jar>,
    site_name: String,
    base_url: Option<Url>,
    headers: HeaderMap,
    cookies: BTreeMap<String, String>,
    delay: DelayWindow,
    retry: RetryPolicy,
    timeout: Duration,
    request_count: u64,
    last_query: Option<OffsetDateTime>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        config.delay.validate()?;
        config.retry.validate()?;

        let base_url = config
            .base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw.trim_end_matches('/')).map_err(|source| ConfigError::BaseUrl {
                    url: raw.to_string(),
                    source,
                })
            })
            .transpose()?;

        let mut headers = header_map(&config.default_headers)?;
        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, HeaderValue::from_static(FALLBACK_UA));
            headers.insert(
                ACCEPT,
                HeaderValue::from_static(
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
                ),
            );
            headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        }
        let cookies = cookie_map(&config.default_cookies)?;

        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .redirect(reqwest::redirect::Policy::limited(8))
            .build()
            .map_err(ConfigError::Client)?;

        log::info!(
            "Initialized scraper for {} with base URL: {}",
            config.site_name,
            base_url.as_ref().map(Url::as_str).unwrap_or("-")
        );

        Ok(Self {
            client,
            jar,
            site_name: config.site_name,
            base_url,
            headers,
            cookies,
            delay: config.delay,
            retry: config.retry,
            timeout: config.timeout,
            request_count: 0,
            last_query: None,
        })
    }

    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Resolves `url` against the base URL unless it already carries an
    /// http(s) scheme.
    pub fn absolute_url(&self, url: &str) -> Result<Url, FetchError> {
        let invalid = |source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        };
        if url.starts_with("http://") || url.starts_with("https://") {
            return Url::parse(url).map_err(invalid);
        }
        match &self.base_url {
            Some(base) => base.join(url).map_err(invalid),
            None => Url::parse(url).map_err(invalid),
        }
    }

    pub async fn get(&mut self, url: &str) -> Result<Page, FetchError> {
        self.send(FetchRequest::get(url)).await
    }

    /// Throttles, counts the request once, then retries the single attempt
    /// according to the session's policy.
    pub async fn send(&mut self, request: FetchRequest) -> Result<Page, FetchError> {
        let url = self.absolute_url(&request.url)?;

        if let Some(pause) = self.delay.sample() {
            log::info!("Sleeping for {:.2} seconds", pause.as_secs_f64());
            sleep(pause).await;
        }
        self.request_count += 1;
        self.last_query = Some(OffsetDateTime::now_utc());

        let mut headers = merge_headers(&self.headers, request.overrides.headers());
        // site defaults < server-set cookies < per-call overrides
        let mut cookies = self.cookies.clone();
        if let Some(stored) = self.jar.cookies(&url) {
            cookies.extend(parse_cookie_header(&stored));
        }
        let cookies = merge_cookies(&cookies, request.overrides.cookies());
        if let Some(cookie) = cookie_header(&cookies) {
            headers.insert(COOKIE, cookie);
        }

        let target = Target {
            client: &self.client,
            request: &request,
            url: &url,
            headers: &headers,
            timeout: request.timeout.unwrap_or(self.timeout),
            number: self.request_count,
        };
        let policy = self.retry;

        retry_with_backoff(&policy, |attempt| target.attempt(attempt))
            .await
            .map_err(|last| {
                log::error!(
                    "Giving up on {url} after {} attempts: {last}",
                    policy.max_attempts
                );
                FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: policy.max_attempts,
                    last: Box::new(last),
                }
            })
    }

    pub fn stats(&self) -> RequestStats {
        RequestStats {
            total_requests: self.request_count,
            site_name: self.site_name.clone(),
            base_url: self.base_url.as_ref().map(|u| u.to_string()),
            last_query: self.last_query,
        }
    }
}

/// Everything a single attempt needs, borrowed from the session.
struct Target<'a> {
    client: &'a reqwest::Client,
    request: &'a FetchRequest,
    url: &'a Url,
    headers: &'a HeaderMap,
    timeout: Duration,
    number: u64,
}

impl Target<'_> {
    async fn attempt(&self, attempt: u32) -> Result<Page, FetchError> {
        log::debug!(
            "Making {} request to {} (attempt {attempt})",
            self.request.method,
            self.url
        );

        let started = Instant::now();
        let mut builder = self
            .client
            .request(self.request.method.clone(), self.url.clone())
            .headers(self.headers.clone())
            .timeout(self.timeout);
        if !self.request.params.is_empty() {
            builder = builder.query(&self.request.params);
        }
        builder = match &self.request.body {
            Some(Body::Form(fields)) => builder.form(fields),
            Some(Body::Json(value)) => builder.json(value),
            None => builder,
        };

        let transport = |source| FetchError::Transport {
            url: self.url.to_string(),
            source,
        };
        let result: Result<Page, FetchError> = async {
            let rsp = builder.send().await.map_err(transport)?;
            // Capture these BEFORE .text() (which consumes the response)
            let status = rsp.status();
            let final_url = rsp.url().clone();
            let headers = rsp.headers().clone();
            let body = rsp.text().await.map_err(transport)?;

            log::info!(
                "Request #{} to {} completed in {:.2}s - Status: {} - Size: {} bytes",
                self.number,
                self.url,
                started.elapsed().as_secs_f64(),
                status.as_u16(),
                body.len()
            );

            if !status.is_success() {
                return Err(FetchError::Status {
                    url: self.url.to_string(),
                    status,
                });
            }
            Ok(Page {
                url: final_url,
                status,
                headers,
                body,
            })
        }
        .await;

        if let Err(e) = &result {
            log::error!("Request failed (attempt {attempt}): {e}");
        }
        result
    }
}

/// Decodes the query string of `url` into `key -> values`.
pub fn query_params(url: &Url) -> BTreeMap<String, Vec<String>> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (k, v) in url.query_pairs() {
        params.entry(k.into_owned()).or_default().push(v.into_owned());
    }
    params
}
