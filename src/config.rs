use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::pending::{DEFAULT_MAX_AGE_SECS, FailedRecordPolicy};

const APP_DIR: &str = "tracker_terminal";
const DEFAULT_EVENT_TYPES: &str = "pass,shot,foul,tackle,interception,cross,yellow_card";

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub match_id: String,
    pub tracker_id: String,
    pub assigned_event_types: Vec<String>,
    pub default_event_type: String,
    pub max_pending_secs: f64,
    pub expire_tick: Duration,
    pub failed_record: FailedRecordPolicy,
    pub roster_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub demo_feed: bool,
    pub backend: Option<BackendConfig>,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunk_size: usize,
    pub upload_attempts: u32,
    pub retry_base: Duration,
    pub max_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 8 * 1024 * 1024,
            upload_attempts: 3,
            retry_base: Duration::from_millis(500),
            max_concurrency: 4,
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        let assigned_event_types = match env::var("TRACKER_EVENT_TYPES") {
            Ok(raw) => parse_list(&raw),
            Err(_) => parse_list(DEFAULT_EVENT_TYPES),
        };
        let default_event_type = env::var("TRACKER_DEFAULT_EVENT_TYPE")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "pass".to_string());
        let max_pending_secs = env::var("TRACKER_MAX_PENDING_SECS")
            .ok()
            .and_then(|val| val.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_MAX_AGE_SECS)
            .clamp(5.0, 600.0);
        let expire_tick = env::var("TRACKER_EXPIRE_TICK_SECS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(3)
            .clamp(1, 60);
        let failed_record = env::var("TRACKER_FAILED_RECORD")
            .ok()
            .and_then(|val| FailedRecordPolicy::parse(&val))
            .unwrap_or_default();

        Self {
            match_id: env_or("TRACKER_MATCH_ID", "local-match"),
            tracker_id: env_or("TRACKER_ID", "local-tracker"),
            assigned_event_types,
            default_event_type,
            max_pending_secs,
            expire_tick: Duration::from_secs(expire_tick),
            failed_record,
            roster_path: opt_path_env("TRACKER_ROSTER_PATH"),
            db_path: opt_path_env("TRACKER_DB_PATH").or_else(default_db_path),
            demo_feed: env_flag("TRACKER_DEMO", true),
            backend: BackendConfig::from_env(),
        }
    }
}

impl BackendConfig {
    pub fn from_env() -> Option<Self> {
        let url = env::var("BACKEND_URL").ok()?;
        let url = url.trim().trim_end_matches('/').to_string();
        if url.is_empty() {
            return None;
        }
        let key = env::var("BACKEND_KEY").unwrap_or_default();
        Some(Self { url, key })
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let chunk_mb = env::var("VIDEO_CHUNK_MB")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(defaults.chunk_size / (1024 * 1024))
            .clamp(1, 512);
        let upload_attempts = env::var("VIDEO_UPLOAD_ATTEMPTS")
            .ok()
            .and_then(|val| val.parse::<u32>().ok())
            .unwrap_or(defaults.upload_attempts)
            .clamp(1, 10);
        let retry_base_ms = env::var("VIDEO_RETRY_BASE_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(500)
            .min(30_000);
        let max_concurrency = env::var("VIDEO_MAX_CONCURRENCY")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(defaults.max_concurrency)
            .clamp(1, 32);
        Self {
            chunk_size: chunk_mb * 1024 * 1024,
            upload_attempts,
            retry_base: Duration::from_millis(retry_base_ms),
            max_concurrency,
        }
    }
}

/// Splits a comma/semicolon/space separated list, dropping blanks and
/// repeats while keeping first-seen order.
pub fn parse_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split([',', ';', ' ']) {
        let item = part.trim().to_ascii_lowercase();
        if item.is_empty() || out.contains(&item) {
            continue;
        }
        out.push(item);
    }
    out
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(APP_DIR));
        }
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join("events.sqlite"))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn opt_path_env(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}
