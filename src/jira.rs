use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use reqwest::{header::AUTHORIZATION, Client, Method, Url};
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use crate::{
    oauth::{OAuthSigner, Token},
    worklog::WorklogEntry,
};

/// worklog作成APIのリクエストボディ。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorklogRequest<'a> {
    time_spent: &'a str,
    started: String,
    comment: &'a str,
}

/// worklogを登録するためのリポジトリ。
#[cfg_attr(test, automock)]
pub trait WorklogRepository {
    /// worklogを1件登録する。
    async fn add_worklog(&self, entry: &WorklogEntry) -> Result<()>;
}

/// Jira REST APIと通信するためのクライアント。
///
/// リクエストはすべてアクセストークンを使ってOAuth1で署名する。
pub struct JiraClient {
    client: Client,
    server: String,
    signer: OAuthSigner,
    token: Token,
}

impl JiraClient {
    /// 新しい`JiraClient`を返す。
    ///
    /// # Arguments
    ///
    /// * `server` - JiraのURL
    /// * `signer` - リクエストに署名するための`OAuthSigner`
    /// * `token` - アクセストークン
    pub fn new(server: &str, signer: OAuthSigner, token: Token) -> Self {
        Self {
            client: Client::new(),
            server: server.trim_end_matches('/').to_string(),
            signer,
            token,
        }
    }
}

impl JiraClient {
    /// 課題のworklog作成APIのURLを返す。
    ///
    /// 課題キーは1つのパスセグメントとしてエンコードする。
    fn worklog_url(&self, ticket: &str) -> Result<Url> {
        if matches!(ticket, "" | "." | "..") {
            bail!("Invalid issue key: '{}'", ticket);
        }
        let mut url = Url::parse(&self.server)
            .with_context(|| format!("Invalid Jira URL: {}", self.server))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Jira URL cannot have a path: {}", self.server))?
            .pop_if_empty()
            .extend(["rest", "api", "2", "issue", ticket, "worklog"]);

        Ok(url)
    }
}

impl WorklogRepository for JiraClient {
    async fn add_worklog(&self, entry: &WorklogEntry) -> Result<()> {
        let url = self.worklog_url(&entry.ticket)?;
        let header = self
            .signer
            .authorization_header(&Method::POST, &url, Some(&self.token), &[]);
        let body = WorklogRequest {
            time_spent: &entry.duration,
            started: format_started(&entry.date),
            comment: &entry.message,
        };

        self.client
            .post(url.clone())
            .header(AUTHORIZATION, header)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to Jira API at {}", url))?
            .error_for_status()
            .with_context(|| format!("Failed to add worklog to {}", entry.ticket))?;
        info!("Added {} to {}", entry.duration, entry.ticket);

        Ok(())
    }
}

/// Jiraが受け付ける`2024-01-01T09:00:00.000+0000`形式に変換する。
fn format_started(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S%.3f%z").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;
    use rstest::rstest;

    use super::{format_started, JiraClient, WorklogRepository};
    use crate::{
        oauth::{OAuthSigner, Token, TEST_KEY},
        worklog::WorklogEntry,
    };

    fn client(server: &str) -> JiraClient {
        JiraClient::new(
            server,
            OAuthSigner::new("toggl2jira", TEST_KEY.clone()),
            Token {
                key: "access".to_string(),
                secret: "access-secret".to_string(),
            },
        )
    }

    fn worklog() -> WorklogEntry {
        WorklogEntry {
            date: Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap(),
            ticket: "ENG-123".to_string(),
            duration: "1h 15m".to_string(),
            alias: String::new(),
            message: "review PR".to_string(),
        }
    }

    #[test]
    fn test_format_started() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap();

        assert_eq!(format_started(&date), "2024-01-01T09:30:00.000+0000");
    }

    #[tokio::test]
    async fn test_add_worklog() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/api/2/issue/ENG-123/worklog")
            .match_header(
                "authorization",
                Matcher::AllOf(vec![
                    Matcher::Regex("^OAuth ".to_string()),
                    Matcher::Regex("oauth_token=\"access\"".to_string()),
                    Matcher::Regex("oauth_signature=\"".to_string()),
                ]),
            )
            .match_body(Matcher::Json(serde_json::json!({
                "timeSpent": "1h 15m",
                "started": "2024-01-01T09:30:00.000+0000",
                "comment": "review PR",
            })))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        client(&server.url()).add_worklog(&worklog()).await.unwrap();

        mock.assert_async().await;
    }

    #[rstest]
    #[case::plain("https://jira.example.com", "ENG-123", "/rest/api/2/issue/ENG-123/worklog")]
    #[case::context_path(
        "https://example.com/jira",
        "ENG-123",
        "/jira/rest/api/2/issue/ENG-123/worklog"
    )]
    #[case::slashes(
        "https://jira.example.com",
        "../../X",
        "/rest/api/2/issue/..%2F..%2FX/worklog"
    )]
    #[case::query_and_fragment(
        "https://jira.example.com",
        "A?B#C",
        "/rest/api/2/issue/A%3FB%23C/worklog"
    )]
    fn test_worklog_url(#[case] server: &str, #[case] ticket: &str, #[case] expected: &str) {
        let url = client(server).worklog_url(ticket).unwrap();

        assert_eq!(url.path(), expected);
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[rstest]
    #[case::empty("")]
    #[case::dot(".")]
    #[case::dot_dot("..")]
    fn test_worklog_url_rejects_dot_segments(#[case] ticket: &str) {
        assert!(client("https://jira.example.com").worklog_url(ticket).is_err());
    }

    /// 課題キーに含まれる`/`で別のエンドポイントに送られないことを確認する。
    #[tokio::test]
    async fn test_add_worklog_ticket_with_slashes() {
        let mut server = mockito::Server::new_async().await;
        let escaped = server
            .mock("POST", "/rest/api/2/issue/..%2F..%2FX/worklog")
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;
        let traversed = server
            .mock("POST", "/rest/api/X/worklog")
            .with_status(201)
            .expect(0)
            .create_async()
            .await;
        let entry = WorklogEntry {
            ticket: "../../X".to_string(),
            ..worklog()
        };

        client(&server.url()).add_worklog(&entry).await.unwrap();

        escaped.assert_async().await;
        traversed.assert_async().await;
    }

    #[tokio::test]
    async fn test_add_worklog_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/rest/api/2/issue/ENG-123/worklog")
            .with_status(404)
            .create_async()
            .await;

        let result = client(&server.url()).add_worklog(&worklog()).await;

        assert!(result.is_err());
    }
}
