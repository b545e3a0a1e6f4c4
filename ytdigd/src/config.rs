use std::path::{Path, PathBuf};

use anyhow::Context;
use time::Duration;
use ytdig_core::{DEFAULT_BASE_URL, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, Session, SessionUser};

use crate::sync::staleness::{DEFAULT_REFRESH_WINDOW, StalenessPolicy};
use crate::sync::store::default_db_path;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub db_path: PathBuf,
    pub api_base: String,
    pub refresh_window: Duration,
    pub page_size: u32,
    pub max_pages: usize,
}

impl SyncConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        Self::from_vars(|name| std::env::var(name).ok(), &home)
    }

    fn from_vars<F>(var: F, home: &Path) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = match var("YTDIG_DB_PATH").filter(|value| !value.trim().is_empty()) {
            Some(value) => expand_with_home(&value, home),
            None => default_db_path().context("no default database location")?,
        };
        let api_base = var("YTDIG_API_BASE")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let window_secs = read_u64(
            &var,
            "YTDIG_REFRESH_WINDOW_SECS",
            DEFAULT_REFRESH_WINDOW.whole_seconds().unsigned_abs(),
        );
        let page_size = read_u64(&var, "YTDIG_PAGE_SIZE", u64::from(DEFAULT_PAGE_SIZE))
            .min(u64::from(DEFAULT_PAGE_SIZE)) as u32;
        let max_pages = read_u64(&var, "YTDIG_MAX_PAGES", DEFAULT_MAX_PAGES as u64);

        Ok(Self {
            db_path,
            api_base,
            refresh_window: Duration::seconds(i64::try_from(window_secs).unwrap_or(i64::MAX)),
            page_size,
            max_pages: usize::try_from(max_pages).unwrap_or(usize::MAX),
        })
    }

    pub fn policy(&self) -> StalenessPolicy {
        StalenessPolicy::new(self.refresh_window)
    }
}

/// Session handed to the CLI through the environment. `None` when either
/// the access token or the user id is missing.
pub fn session_from_env() -> Option<Session> {
    session_from_vars(|name| std::env::var(name).ok())
}

fn session_from_vars<F>(var: F) -> Option<Session>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| var(name).filter(|value| !value.trim().is_empty());
    let access_token = non_empty("YTDIG_ACCESS_TOKEN")?;
    let user = SessionUser {
        id: non_empty("YTDIG_USER_ID")?,
        name: non_empty("YTDIG_USER_NAME"),
        email: non_empty("YTDIG_USER_EMAIL"),
        image: non_empty("YTDIG_USER_IMAGE"),
    };
    let session = Session::new(user, access_token);
    Some(match non_empty("YTDIG_CHANNEL_ID") {
        Some(channel_id) => session.with_channel_id(channel_id),
        None => session,
    })
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u64<F>(var: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
