use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::latency::LatencyStats;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::types::RawLadderEntry;

/// Retry-After assumed when a 429 carries no usable header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Paginated ladder provider. Returns up to `limit` entries starting at `offset`;
/// an empty page means the ladder has no more entries.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, league: &str, offset: usize, limit: usize) -> Result<Vec<RawLadderEntry>>;

    /// Pages requested since startup, when the source counts them.
    fn fetch_count(&self) -> u64 {
        0
    }
}

/// Page source backed by the public ladder HTTP endpoint.
pub struct HttpPageSource {
    client: reqwest::Client,
    ladder_api_url: String,
    latency: Arc<LatencyStats>,
    fetches: AtomicU64,
}

impl HttpPageSource {
    pub fn new(cfg: &Config, latency: Arc<LatencyStats>) -> Result<Self> {
        Ok(Self {
            client: build_client(cfg)?,
            ladder_api_url: cfg.ladder_api_url.clone(),
            latency,
            fetches: AtomicU64::new(0),
        })
    }

    fn page_url(&self, league: &str, offset: usize, limit: usize) -> Result<Url> {
        let mut url = Url::parse(&self.ladder_api_url)
            .map_err(|e| AppError::Config(format!("LADDER_API_URL is not a valid URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Config("LADDER_API_URL cannot take a path".to_string()))?
            .pop_if_empty()
            .push(league);
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        Ok(url)
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, league: &str, offset: usize, limit: usize) -> Result<Vec<RawLadderEntry>> {
        let url = self.page_url(league, offset, limit)?;
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        let resp = self.client.get(url).send().await;
        self.latency.record(started.elapsed());
        let resp = resp?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            warn!(league, offset, retry_after_secs, "[PAGE] rate limited");
            return Err(AppError::RateLimited { retry_after_secs });
        }

        let body = resp.text().await?;
        if !status.is_success() {
            let detail = error_message(&body).unwrap_or_else(|| truncate(&body, 200));
            return Err(AppError::PageSource(format!("HTTP {status}: {detail}")));
        }

        let entries = parse_ladder_body(&body)?;
        debug!(league, offset, limit, received = entries.len(), "[PAGE] fetched");
        Ok(entries)
    }

    fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LadderBody {
    Page { entries: Vec<RawLadderEntry> },
    Failure {
        error: serde_json::Value,
        #[serde(default)]
        message: Option<String>,
    },
    Bare(Vec<RawLadderEntry>),
}

/// Parse a ladder response. Accepts `{entries: [...]}`, a bare array, or an error body.
pub fn parse_ladder_body(body: &str) -> Result<Vec<RawLadderEntry>> {
    match serde_json::from_str::<LadderBody>(body) {
        Ok(LadderBody::Page { entries }) | Ok(LadderBody::Bare(entries)) => Ok(entries),
        Ok(LadderBody::Failure { error, message }) => Err(AppError::PageSource(
            describe_error(&error, message.as_deref()),
        )),
        Err(_) => {
            // Re-parse strictly so the caller sees the real serde error.
            let value: serde_json::Value = serde_json::from_str(body)?;
            Err(AppError::PageSource(format!(
                "unexpected ladder body: {}",
                truncate(&value.to_string(), 200)
            )))
        }
    }
}

fn error_message(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = v.get("error")?;
    Some(describe_error(error, v.get("message").and_then(|m| m.as_str())))
}

/// Both `{error: {code, message}}` and `{error: "...", message: "..."}` occur in the wild.
fn describe_error(error: &serde_json::Value, message: Option<&str>) -> String {
    let inner = error.get("message").and_then(|m| m.as_str());
    match (error.as_str(), inner.or(message)) {
        (Some(e), Some(m)) => format!("{e}: {m}"),
        (Some(e), None) => e.to_string(),
        (None, Some(m)) => m.to_string(),
        (None, None) => error.to_string(),
    }
}

/// Fetch the public league ids, sorted, with "Standard" first when present.
pub async fn fetch_leagues(cfg: &Config) -> Result<Vec<String>> {
    let client = build_client(cfg)?;
    let url = format!("{}?type=main&realm=pc", cfg.leagues_api_url);

    let resp: serde_json::Value = client.get(&url).send().await?.error_for_status()?.json().await?;

    // Some deployments wrap the list as {"result": [...]}.
    let items = match resp.as_array().or_else(|| resp.get("result").and_then(|r| r.as_array())) {
        Some(a) => a.clone(),
        None => {
            return Err(AppError::PageSource(
                "league list response was not an array".to_string(),
            ))
        }
    };

    Ok(order_leagues(
        items
            .iter()
            .filter_map(|l| l.get("id").and_then(|id| id.as_str()))
            .map(|s| s.to_string())
            .collect(),
    ))
}

fn order_leagues(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids.dedup();
    if let Some(pos) = ids.iter().position(|id| id == "Standard") {
        let standard = ids.remove(pos);
        ids.insert(0, standard);
    }
    ids
}

fn build_client(cfg: &Config) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .user_agent(cfg.user_agent())
        .build()?)
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entries_body() {
        let body = r#"{"total":2,"entries":[
            {"rank":1,"dead":false,"retired":false,"character":{"id":"x","name":"Alpha","level":100,"class":"Necromancer","experience":4250334444},"account":{"name":"acct"}},
            {"rank":2,"dead":true,"character":{"name":"Beta","level":98,"class":"Slayer","experience":3900000000}}
        ]}"#;
        let entries = parse_ladder_body(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].character.class, "Necromancer");
        assert_eq!(entries[0].account.as_ref().map(|a| a.name.as_str()), Some("acct"));
        assert!(entries[1].dead);
        assert!(!entries[1].retired);
    }

    #[test]
    fn parses_bare_list_and_empty_page() {
        let bare = r#"[{"character":{"name":"A","level":1,"class":"Witch"}}]"#;
        assert_eq!(parse_ladder_body(bare).unwrap().len(), 1);
        assert!(parse_ladder_body(r#"{"entries":[]}"#).unwrap().is_empty());
    }

    #[test]
    fn nested_error_body_is_page_source_error() {
        let body = r#"{"error":{"code":1,"message":"Resource not found"}}"#;
        match parse_ladder_body(body) {
            Err(AppError::PageSource(msg)) => assert_eq!(msg, "Resource not found"),
            other => panic!("expected PageSource error, got {other:?}"),
        }
    }

    #[test]
    fn flat_error_body_is_page_source_error() {
        let body = r#"{"error":"upstream","message":"timed out"}"#;
        match parse_ladder_body(body) {
            Err(AppError::PageSource(msg)) => assert_eq!(msg, "upstream: timed out"),
            other => panic!("expected PageSource error, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_ladder_body("not json").is_err());
        assert!(parse_ladder_body(r#"{"totally":"unrelated"}"#).is_err());
    }

    #[test]
    fn standard_league_sorted_first() {
        let ids = vec!["Settlers".to_string(), "Hardcore".to_string(), "Standard".to_string()];
        assert_eq!(order_leagues(ids), vec!["Standard", "Hardcore", "Settlers"]);
    }

    #[test]
    fn page_url_encodes_league() {
        let mut cfg = Config::for_tests();
        cfg.ladder_api_url = "https://example.invalid/api/ladders".to_string();
        let source = HttpPageSource::new(&cfg, Arc::new(LatencyStats::new())).unwrap();
        let url = source.page_url("Hardcore Settlers", 400, 200).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.invalid/api/ladders/Hardcore%20Settlers?limit=200&offset=400"
        );
    }
}
