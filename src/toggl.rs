use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use reqwest::{header::CONTENT_TYPE, Client};
use serde::Deserialize;

#[cfg(test)]
use mockall::automock;

use crate::time_entry::TimeEntry;

/// Toggl APIの既定のURL。
pub const DEFAULT_API_URL: &str = "https://api.track.toggl.com/api/v9";

/// Toggl APIのレスポンスをデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
struct TogglTimeEntry {
    description: Option<String>,
    start: DateTime<Utc>,
    duration: i64,
}

/// time entryを取得するためのリポジトリ。
#[cfg_attr(test, automock)]
pub trait TogglRepository {
    /// 指定された期間のタイムエントリーを取得する。
    ///
    /// # Arguments
    ///
    /// * `start_at` - 取得するタイムエントリーの開始日時
    /// * `end_at` - 取得するタイムエントリーの終了日時
    async fn read_time_entries(
        &self,
        start_at: &DateTime<Utc>,
        end_at: &DateTime<Utc>,
    ) -> Result<Vec<TimeEntry>>;
}

/// Toggl APIと通信するためのクライアント。
///
/// # Examples
///
/// ```ignore
/// let client = TogglClient::new(DEFAULT_API_URL, &api_token);
/// let time_entries = client.read_time_entries(&start_at, &end_at).await.unwrap();
/// ```
pub struct TogglClient {
    client: Client,
    api_url: String,
    api_token: String,
}

impl TogglClient {
    /// 新しい`TogglClient`を返す。
    pub fn new(api_url: &str, api_token: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }
}

impl TogglRepository for TogglClient {
    /// 計測中のentryは`duration`が負になるため除外する。
    async fn read_time_entries(
        &self,
        start_at: &DateTime<Utc>,
        end_at: &DateTime<Utc>,
    ) -> Result<Vec<TimeEntry>> {
        let toggl_time_entries = self
            .client
            .get(format!("{}/me/time_entries", self.api_url))
            .basic_auth(&self.api_token, Some("api_token"))
            .header(CONTENT_TYPE, "application/json")
            .query(&[
                ("start_date", start_at.to_rfc3339()),
                ("end_date", end_at.to_rfc3339()),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to send request to Toggl API at {}", self.api_url))?
            .error_for_status()
            .context("Request returned an error status")?
            .json::<Vec<TogglTimeEntry>>()
            .await
            .context("Failed to deserialize response")?;
        info!("length of time entries: {}", toggl_time_entries.len());

        let time_entries = toggl_time_entries
            .into_iter()
            .filter(|entry| {
                if entry.duration < 0 {
                    warn!("Skipping running time entry started at {}", entry.start);
                    return false;
                }
                true
            })
            .map(|entry| TimeEntry {
                description: entry.description.unwrap_or_default(),
                start: entry.start,
                duration: entry.duration,
            })
            .collect();

        Ok(time_entries)
    }
}
