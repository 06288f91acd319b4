use std::{
    fs::{self, File},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufRead;

use crate::{
    console,
    oauth::{OAuthSigner, Token},
};

/// セッションファイルに保存するアクセストークン。
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    oauth_token: String,
    oauth_token_secret: String,
}

/// アクセストークンをローカルファイルに保存して再利用する。
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// 保存されたアクセストークンを読み込む。
    ///
    /// ファイルが存在しない場合は`None`を返す。それ以外の読み込みエラーはログに出力した上で`None`を返す。
    pub fn load(&self) -> Option<Token> {
        match self.read() {
            Ok(token) => Some(token),
            Err(err)
                if err
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io| io.kind() == ErrorKind::NotFound) =>
            {
                None
            }
            Err(err) => {
                error!("Failed to load session from {}: {:?}", self.path.display(), err);
                None
            }
        }
    }

    fn read(&self) -> Result<Token> {
        let content = fs::read_to_string(&self.path)?;
        let record: SessionRecord = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", self.path.display()))?;

        Ok(Token {
            key: record.oauth_token,
            secret: record.oauth_token_secret,
        })
    }

    /// アクセストークンを保存する。既存のファイルは上書きする。
    pub fn save(&self, token: &Token) -> Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create session file: {}", self.path.display()))?;
        let record = SessionRecord {
            oauth_token: token.key.clone(),
            oauth_token_secret: token.secret.clone(),
        };
        serde_json::to_writer(&file, &record)
            .with_context(|| format!("Failed to write session file: {}", self.path.display()))?;
        info!("Session saved to {}", self.path.display());

        Ok(())
    }
}

/// JiraのOAuth1認可フローを行う。
pub struct Authorizer<'a> {
    client: Client,
    server: String,
    callback_uri: String,
    signer: &'a OAuthSigner,
}

impl<'a> Authorizer<'a> {
    /// 新しい`Authorizer`を返す。
    ///
    /// # Arguments
    ///
    /// * `server` - JiraのURL
    /// * `callback_uri` - 認可後にブラウザがリダイレクトされるURL
    /// * `signer` - リクエストに署名するための`OAuthSigner`
    pub fn new(server: &str, callback_uri: &str, signer: &'a OAuthSigner) -> Self {
        Self {
            client: Client::new(),
            server: server.trim_end_matches('/').to_string(),
            callback_uri: callback_uri.to_string(),
            signer,
        }
    }

    /// 操作者にブラウザで認可してもらい、アクセストークンを取得する。
    ///
    /// 認可URLを表示し、リダイレクト先のURLを`reader`から読み込む。
    pub async fn authorize<R: AsyncBufRead + Unpin>(&self, reader: &mut R) -> Result<Token> {
        let request_token = self
            .fetch_request_token()
            .await
            .context("Failed to fetch request token")?;

        println!("Please visit the following URL to log in:");
        println!("{}", self.authorization_url(&request_token)?);
        let callback = console::prompt(
            reader,
            "Paste the resulting url and press Enter to continue: ",
        )
        .await?;
        let verifier = verifier_from_callback(&callback)?;

        self.fetch_access_token(&request_token, &verifier)
            .await
            .context("Failed to fetch access token")
    }

    /// リクエストトークンを取得する。
    pub async fn fetch_request_token(&self) -> Result<Token> {
        let url = self.endpoint("request-token")?;
        let header = self.signer.authorization_header(
            &Method::POST,
            &url,
            None,
            &[("oauth_callback", self.callback_uri.as_str())],
        );
        self.post_for_token(url, header).await
    }

    /// 操作者がブラウザで開く認可URLを返す。
    pub fn authorization_url(&self, request_token: &Token) -> Result<Url> {
        let mut url = self.endpoint("authorize")?;
        url.query_pairs_mut()
            .append_pair("oauth_token", &request_token.key);
        Ok(url)
    }

    /// verifierとリクエストトークンをアクセストークンに交換する。
    pub async fn fetch_access_token(&self, request_token: &Token, verifier: &str) -> Result<Token> {
        let url = self.endpoint("access-token")?;
        let header = self.signer.authorization_header(
            &Method::POST,
            &url,
            Some(request_token),
            &[("oauth_verifier", verifier)],
        );
        self.post_for_token(url, header).await
    }

    fn endpoint(&self, name: &str) -> Result<Url> {
        let url = format!("{}/plugins/servlet/oauth/{}", self.server, name);
        Url::parse(&url).with_context(|| format!("Invalid Jira URL: {}", url))
    }

    async fn post_for_token(&self, url: Url, header: String) -> Result<Token> {
        let body = self
            .client
            .post(url.clone())
            .header(reqwest::header::AUTHORIZATION, header)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?
            .error_for_status()
            .context("Request returned an error status")?
            .text()
            .await
            .context("Failed to read response")?;

        parse_token_response(&body)
    }
}

/// `oauth_token=...&oauth_token_secret=...`形式のレスポンスからトークンを取り出す。
fn parse_token_response(body: &str) -> Result<Token> {
    let mut key = None;
    let mut secret = None;
    for (name, value) in url::form_urlencoded::parse(body.trim().as_bytes()) {
        match &*name {
            "oauth_token" => key = Some(value.into_owned()),
            "oauth_token_secret" => secret = Some(value.into_owned()),
            _ => {}
        }
    }

    match (key, secret) {
        (Some(key), Some(secret)) => Ok(Token { key, secret }),
        _ => Err(anyhow!("Unexpected token response: {}", body)),
    }
}

/// リダイレクト先のURLから`oauth_verifier`を取り出す。
fn verifier_from_callback(callback: &str) -> Result<String> {
    let url = Url::parse(callback.trim())
        .with_context(|| format!("Failed to parse callback url: {}", callback))?;
    url.query_pairs()
        .find(|(name, _)| name == "oauth_verifier")
        .map(|(_, value)| value.into_owned())
        .with_context(|| format!("No oauth_verifier in callback url: {}", callback))
}
