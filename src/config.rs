use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::toggl;

/// OAuthのコンシューマーキーの既定値。
const DEFAULT_CONSUMER_KEY: &str = "toggl2jira";
/// 認可後のリダイレクト先の既定値。
const DEFAULT_CALLBACK_URI: &str = "http://127.0.0.1/oauth-callback";

/// 実行に必要な接続先と認証情報。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub toggl_api_token: String,
    pub toggl_api_url: String,
    pub jira_server: String,
    pub jira_consumer_key: String,
    pub jira_private_key_file: PathBuf,
    pub jira_callback_uri: String,
    pub session_file: PathBuf,
}

impl Config {
    /// 環境変数とホームディレクトリ以下のファイルから設定を読み込む。
    pub fn from_env() -> Result<Self> {
        let home = dirs::home_dir().context("Failed to find home directory")?;
        Self::from_lookup(|name| env::var(name).ok(), &home)
    }

    /// 名前から値を引く関数を使って設定を読み込む。
    ///
    /// # Arguments
    ///
    /// * `lookup` - 設定名から値を返す関数。未設定の場合は`None`を返す
    /// * `home` - 既定のファイルパスの基準になるディレクトリ
    pub fn from_lookup<F>(lookup: F, home: &Path) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let toggl_api_token = match lookup("TOGGL_API_TOKEN") {
            Some(token) => token.trim().to_string(),
            None => read_api_key(&home.join(".toggl").join("api_key"))?,
        };
        let jira_server = lookup("JIRA_SERVER").context("JIRA_SERVER must be set")?;

        Ok(Self {
            toggl_api_token,
            toggl_api_url: lookup("TOGGL_API_URL")
                .unwrap_or_else(|| toggl::DEFAULT_API_URL.to_string()),
            jira_server,
            jira_consumer_key: lookup("JIRA_CONSUMER_KEY")
                .unwrap_or_else(|| DEFAULT_CONSUMER_KEY.to_string()),
            jira_private_key_file: lookup("JIRA_PRIVATE_KEY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join(".toggl2jira.pem")),
            jira_callback_uri: lookup("JIRA_OAUTH_CALLBACK")
                .unwrap_or_else(|| DEFAULT_CALLBACK_URI.to_string()),
            session_file: lookup("TOGGL2JIRA_SESSION")
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join(".toggl2jira.session")),
        })
    }
}

/// Toggl APIキーをファイルから読み込む。
fn read_api_key(path: &Path) -> Result<String> {
    let key = fs::read_to_string(path).with_context(|| {
        format!(
            "TOGGL_API_TOKEN must be set or the key must be stored in {}",
            path.display()
        )
    })?;
    Ok(key.trim().to_string())
}
