use std::collections::BTreeMap;
use std::time::Duration;

use rand::{Rng, rng};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::ConfigError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);

/// Longest accepted pre-request pause, in seconds.
pub const MAX_DELAY_SECS: f64 = 3600.0;
/// Upper bound on a single backoff pause, whatever the attempt number.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);
pub const MAX_ATTEMPTS: u32 = 20;
const MAX_BACKOFF: f64 = 10.0;

/// Base settings of a [`crate::Session`]. Raw strings here are checked once by
/// `Session::new`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub site_name: String,
    pub base_url: Option<String>,
    pub default_headers: Vec<(String, String)>,
    pub default_cookies: Vec<(String, String)>,
    pub delay: DelayWindow,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            site_name: "scraper".to_string(),
            base_url: None,
            default_headers: Vec::new(),
            default_cookies: Vec::new(),
            delay: DelayWindow::default(),
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Uniform random pause, in seconds, taken before every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayWindow {
    pub min: f64,
    pub max: f64,
}

impl DelayWindow {
    pub const DISABLED: DelayWindow = DelayWindow { min: 0.0, max: 0.0 };

    pub fn new(min: f64, max: f64) -> Result<Self, ConfigError> {
        let window = Self { min, max };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = |secs: f64| secs.is_finite() && (0.0..=MAX_DELAY_SECS).contains(&secs);
        if !in_range(self.min) || !in_range(self.max) || self.max < self.min {
            return Err(ConfigError::DelayWindow {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// `None` when the window is closed (`max == 0`).
    pub fn sample(&self) -> Option<Duration> {
        if self.max <= 0.0 {
            return None;
        }
        let secs = if self.max > self.min {
            rng().random_range(self.min..=self.max)
        } else {
            self.max
        };
        Some(Duration::from_secs_f64(secs))
    }
}

impl Default for DelayWindow {
    fn default() -> Self {
        Self { min: 1.0, max: 3.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: f64,
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS {
            return Err(ConfigError::Retry(format!(
                "attempts must be within 1..={MAX_ATTEMPTS}, got {}",
                self.max_attempts
            )));
        }
        if !self.backoff.is_finite() || !(1.0..=MAX_BACKOFF).contains(&self.backoff) {
            return Err(ConfigError::Retry(format!(
                "backoff multiplier must be within 1..={MAX_BACKOFF}, got {}",
                self.backoff
            )));
        }
        if self.base_delay > MAX_RETRY_DELAY {
            return Err(ConfigError::Retry(format!(
                "base delay {:?} exceeds {MAX_RETRY_DELAY:?}",
                self.base_delay
            )));
        }
        Ok(())
    }

    /// Pause taken after the `failed_attempt`-th (1-based) failure, capped at
    /// [`MAX_RETRY_DELAY`].
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff.powi(exp);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff: 2.0,
        }
    }
}

/// Per-call headers and cookies, laid over the session defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOverrides {
    headers: HeaderMap,
    cookies: BTreeMap<String, String>,
}

impl RequestOverrides {
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, ConfigError> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn cookie(mut self, name: &str, value: &str) -> Result<Self, ConfigError> {
        check_cookie(name, value)?;
        self.cookies.insert(name.to_string(), value.to_string());
        Ok(self)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }
}

pub(crate) fn parse_header(
    name: &str,
    value: &str,
) -> Result<(HeaderName, HeaderValue), ConfigError> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::Header {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    let header_value = HeaderValue::from_str(value).map_err(|e| ConfigError::Header {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok((header_name, header_value))
}

pub(crate) fn header_map(pairs: &[(String, String)]) -> Result<HeaderMap, ConfigError> {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        let (name, value) = parse_header(name, value)?;
        map.insert(name, value);
    }
    Ok(map)
}

pub(crate) fn check_cookie(name: &str, value: &str) -> Result<(), ConfigError> {
    let bad_name = name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | '=' | ','));
    if bad_name {
        return Err(ConfigError::Cookie {
            name: name.to_string(),
            reason: "name must be a non-empty token".into(),
        });
    }
    if value.chars().any(|c| c.is_control() || c == ';') {
        return Err(ConfigError::Cookie {
            name: name.to_string(),
            reason: "value contains a control character or ';'".into(),
        });
    }
    Ok(())
}

pub(crate) fn cookie_map(
    pairs: &[(String, String)],
) -> Result<BTreeMap<String, String>, ConfigError> {
    pairs
        .iter()
        .map(|(name, value)| {
            check_cookie(name, value)?;
            Ok::<_, ConfigError>((name.clone(), value.clone()))
        })
        .collect()
}

/// Overrides win on collision; header names compare case-insensitively.
pub(crate) fn merge_headers(base: &HeaderMap, overrides: &HeaderMap) -> HeaderMap {
    let mut merged = base.clone();
    for (name, value) in overrides {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

pub(crate) fn merge_cookies(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Splits a `Cookie` request header (`"a=1; b=2"`) back into pairs.
pub(crate) fn parse_cookie_header(header: &HeaderValue) -> BTreeMap<String, String> {
    let Ok(raw) = header.to_str() else {
        return BTreeMap::new();
    };
    raw.split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

pub(crate) fn cookie_header(cookies: &BTreeMap<String, String>) -> Option<HeaderValue> {
    if cookies.is_empty() {
        return None;
    }
    let joined = cookies
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ");
    HeaderValue::from_str(&joined).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::USER_AGENT;

    #[test]
    fn override_wins_case_insensitively() {
        let base = header_map(&[
            ("User-Agent".into(), "base".into()),
            ("Accept".into(), "text/html".into()),
        ])
        .unwrap();
        let overrides = RequestOverrides::default()
            .header("user-agent", "override")
            .unwrap();

        let merged = merge_headers(&base, overrides.headers());
        assert_eq!(merged.get(USER_AGENT).unwrap(), "override");
        assert_eq!(merged.get("accept").unwrap(), "text/html");
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn cookies_merge_and_render() {
        let base = cookie_map(&[("a".into(), "1".into()), ("b".into(), "2".into())]).unwrap();
        let overrides = RequestOverrides::default().cookie("b", "3").unwrap();

        let merged = merge_cookies(&base, overrides.cookies());
        assert_eq!(cookie_header(&merged).unwrap(), "a=1; b=3");
        assert!(cookie_header(&BTreeMap::new()).is_none());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(RequestOverrides::default().header("bad header", "x").is_err());
        assert!(RequestOverrides::default().cookie("", "x").is_err());
        assert!(RequestOverrides::default().cookie("a", "x;y").is_err());
        assert!(DelayWindow::new(3.0, 1.0).is_err());
        assert!(DelayWindow::new(-1.0, 1.0).is_err());
        assert!(DelayWindow::new(0.0, 1e300).is_err());
        for policy in [
            RetryPolicy {
                max_attempts: 0,
                ..RetryPolicy::default()
            },
            RetryPolicy {
                max_attempts: u32::MAX,
                ..RetryPolicy::default()
            },
            RetryPolicy {
                backoff: 1e200,
                ..RetryPolicy::default()
            },
            RetryPolicy {
                base_delay: Duration::from_secs(86_400),
                ..RetryPolicy::default()
            },
        ] {
            assert!(policy.validate().is_err(), "{policy:?}");
        }
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: MAX_ATTEMPTS,
            base_delay: MAX_RETRY_DELAY,
            backoff: MAX_BACKOFF,
        };
        policy.validate().unwrap();
        assert_eq!(policy.delay_after(MAX_ATTEMPTS), MAX_RETRY_DELAY);
        assert_eq!(policy.delay_after(u32::MAX), MAX_RETRY_DELAY);

        let window = DelayWindow::new(MAX_DELAY_SECS, MAX_DELAY_SECS).unwrap();
        assert_eq!(window.sample(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn cookie_header_round_trips_into_pairs() {
        let header = HeaderValue::from_static("sid=xyz; theme=dark;  empty=");
        let pairs = parse_cookie_header(&header);
        assert_eq!(pairs["sid"], "xyz");
        assert_eq!(pairs["theme"], "dark");
        assert_eq!(pairs["empty"], "");
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn delay_window_sampling() {
        assert_eq!(DelayWindow::DISABLED.sample(), None);
        let window = DelayWindow::new(1.0, 3.0).unwrap();
        for _ in 0..50 {
            let d = window.sample().unwrap();
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(3));
        }
    }
}
