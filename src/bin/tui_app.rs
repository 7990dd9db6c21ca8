use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror routes.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct RaceRowResponse {
    pub name: String,
    pub level: u32,
    pub category: String,
    pub global_rank: u32,
    pub rank: u32,
    pub experience: u64,
    pub experience_gap: i64,
    pub rate_per_hour: Option<f64>,
    pub deceased: bool,
    pub retired: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RaceTableResponse {
    pub dimension: String,
    pub ahead: Option<RaceRowResponse>,
    pub me: RaceRowResponse,
    pub behind: Option<RaceRowResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct TrackingViewResponse {
    pub league: String,
    pub global: RaceTableResponse,
    pub category: RaceTableResponse,
    pub refreshed_at: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct StatusResponse {
    pub id: u64,
    pub league: String,
    pub state: serde_json::Value,
    pub tracked: Option<String>,
    pub auto_refresh: bool,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

/// Which race tables are on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Both,
    Global,
    Category,
}

impl ViewMode {
    pub fn next(self) -> Self {
        match self {
            ViewMode::Both => ViewMode::Global,
            ViewMode::Global => ViewMode::Category,
            ViewMode::Category => ViewMode::Both,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ViewMode::Both => "both",
            ViewMode::Global => "global",
            ViewMode::Category => "category",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub view: Option<TrackingViewResponse>,
    pub session: Option<StatusResponse>,
    pub mode: ViewMode,
    /// One-line notice shown in the header (e.g. no view yet).
    pub notice: Option<String>,
    pub base_url: String,
    pub session_id: u64,
}

impl AppState {
    pub fn new(base_url: String, session_id: u64) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            view: None,
            session: None,
            mode: ViewMode::Both,
            notice: None,
            base_url,
            session_id,
        }
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/sessions/{}/{}", self.base_url, self.session_id, path)
    }

    /// Ask the server for a fresh window, then reload.
    pub async fn force_refresh(&mut self, client: &reqwest::Client) {
        match client.post(self.session_url("refresh")).send().await {
            Ok(resp) if resp.status().is_success() => self.notice = None,
            Ok(resp) => {
                let code = resp.status();
                let body = resp.text().await.unwrap_or_default();
                self.notice = Some(format!("refresh failed ({code}): {}", truncate(&body, 60)));
            }
            Err(e) => self.status = ConnectionStatus::Error(format!("{e}")),
        }
        self.refresh(client).await;
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let (view_res, status_res) = tokio::join!(
            client.get(self.session_url("tracking")).send(),
            client.get(self.session_url("status")).send(),
        );

        let status_resp = match status_res {
            Ok(r) => r,
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };
        if status_resp.status() == reqwest::StatusCode::NOT_FOUND {
            self.status = ConnectionStatus::Error(format!("session {} not found", self.session_id));
            return;
        }
        match status_resp.json::<StatusResponse>().await {
            Ok(s) => self.session = Some(s),
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("parse error: {e}"));
                return;
            }
        }

        match view_res {
            Ok(r) if r.status() == reqwest::StatusCode::NOT_FOUND => {
                self.notice = Some("no tracking view yet, press r to refresh".to_string());
            }
            Ok(r) => match r.json::<TrackingViewResponse>().await {
                Ok(v) => {
                    self.view = Some(v);
                    self.notice = None;
                }
                Err(e) => {
                    self.status = ConnectionStatus::Error(format!("parse error: {e}"));
                    return;
                }
            },
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        }

        self.status = ConnectionStatus::Connected;
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// 1234567 -> "1,234,567".
pub fn format_experience(xp: u64) -> String {
    let digits = xp.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn format_gap(gap: i64) -> String {
    match gap {
        0 => "—".to_string(),
        g if g > 0 => format!("+{}", format_experience(g as u64)),
        g => format!("-{}", format_experience(g.unsigned_abs())),
    }
}

pub fn format_rate(rate: Option<f64>) -> String {
    match rate {
        None => "—".to_string(),
        Some(r) if r <= 0.0 => "idle".to_string(),
        Some(r) if r >= 1_000_000.0 => format!("{:.1}M/h", r / 1_000_000.0),
        Some(r) if r >= 1_000.0 => format!("{:.1}k/h", r / 1_000.0),
        Some(r) => format!("{r:.0}/h"),
    }
}

/// Short label for a `ScanState` as serialized by the server.
pub fn describe_state(state: &serde_json::Value) -> String {
    let tag = state.get("state").and_then(|s| s.as_str()).unwrap_or("unknown");
    match tag {
        "scanning" => format!(
            "{} ({} scanned)",
            state.get("operation").and_then(|o| o.as_str()).unwrap_or("scan"),
            state.get("scanned").and_then(|s| s.as_u64()).unwrap_or(0)
        ),
        "failed" => format!(
            "failed: {}",
            state.get("message").and_then(|m| m.as_str()).unwrap_or("")
        ),
        "self_missing" => "not in live window".to_string(),
        other => other.replace('_', " "),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max.saturating_sub(1)) {
        Some((idx, _)) if s.chars().count() > max => format!("{}…", &s[..idx]),
        _ => s.to_string(),
    }
}
