use std::{fs, path::Path};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::{Method, Url};
use rsa::{
    pkcs1::DecodeRsaPrivateKey,
    pkcs1v15::SigningKey,
    pkcs8::DecodePrivateKey,
    signature::{SignatureEncoding, Signer},
    RsaPrivateKey,
};
use sha1::Sha1;

use crate::datetime;

/// RFC 3986の非予約文字以外をエンコードする。
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

/// OAuth1のアクセストークン。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub key: String,
    pub secret: String,
}

/// RSA-SHA1でOAuth1のリクエストに署名する。
///
/// # Examples
///
/// ```ignore
/// let signer = OAuthSigner::from_pem_file("toggl2jira", &key_path)?;
/// let header = signer.authorization_header(&Method::GET, &url, Some(&token), &[]);
/// ```
pub struct OAuthSigner {
    consumer_key: String,
    signing_key: SigningKey<Sha1>,
}

impl OAuthSigner {
    pub fn new(consumer_key: &str, private_key: RsaPrivateKey) -> Self {
        Self {
            consumer_key: consumer_key.to_string(),
            signing_key: SigningKey::<Sha1>::new(private_key),
        }
    }

    /// PEM形式の秘密鍵ファイルから新しい`OAuthSigner`を返す。
    ///
    /// PKCS#8とPKCS#1のどちらの形式も受け付ける。
    pub fn from_pem_file(consumer_key: &str, path: &Path) -> Result<Self> {
        let pem = fs::read_to_string(path)
            .with_context(|| format!("Failed to read private key: {}", path.display()))?;
        let private_key = RsaPrivateKey::from_pkcs8_pem(&pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
            .with_context(|| format!("Failed to parse private key: {}", path.display()))?;

        Ok(Self::new(consumer_key, private_key))
    }

    /// リクエストに付与する`Authorization`ヘッダーの値を作成する。
    ///
    /// # Arguments
    ///
    /// * `method` - HTTPメソッド
    /// * `url` - リクエスト先。クエリパラメーターも署名対象になる
    /// * `token` - リクエストトークンまたはアクセストークン
    /// * `extra` - `oauth_callback`や`oauth_verifier`など追加のoauthパラメーター
    pub fn authorization_header(
        &self,
        method: &Method,
        url: &Url,
        token: Option<&Token>,
        extra: &[(&str, &str)],
    ) -> String {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let timestamp = datetime::now().timestamp().to_string();

        let mut oauth_params: Vec<(String, String)> = vec![
            ("oauth_consumer_key".to_string(), self.consumer_key.clone()),
            ("oauth_nonce".to_string(), nonce),
            ("oauth_signature_method".to_string(), "RSA-SHA1".to_string()),
            ("oauth_timestamp".to_string(), timestamp),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];
        if let Some(token) = token {
            oauth_params.push(("oauth_token".to_string(), token.key.clone()));
        }
        oauth_params.extend(
            extra
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        );

        let base = signature_base_string(method, url, &oauth_params);
        let signature = STANDARD.encode(self.signing_key.sign(base.as_bytes()).to_bytes());
        oauth_params.push(("oauth_signature".to_string(), signature));

        let fields = oauth_params
            .iter()
            .map(|(key, value)| format!("{}=\"{}\"", encode(key), encode(value)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {}", fields)
    }
}

/// 署名対象の文字列を作成する。
///
/// クエリパラメーターとoauthパラメーターをエンコードしてから並べ替えて連結する。
fn signature_base_string(method: &Method, url: &Url, oauth_params: &[(String, String)]) -> String {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| (encode(&key), encode(&value)))
        .chain(
            oauth_params
                .iter()
                .map(|(key, value)| (encode(key), encode(value))),
        )
        .collect();
    params.sort();
    let normalized = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");

    let mut base_url = url.clone();
    base_url.set_query(None);
    base_url.set_fragment(None);

    format!(
        "{}&{}&{}",
        method.as_str().to_uppercase(),
        encode(base_url.as_str()),
        encode(&normalized)
    )
}

/// `Authorization`ヘッダーの値からパラメーターを取り出す。テスト用。
#[cfg(test)]
pub fn parse_authorization_header(header: &str) -> Vec<(String, String)> {
    use percent_encoding::percent_decode_str;

    header
        .trim_start_matches("OAuth ")
        .split(", ")
        .filter_map(|field| field.split_once('='))
        .map(|(key, value)| {
            let value = percent_decode_str(value.trim_matches('"'))
                .decode_utf8_lossy()
                .to_string();
            (key.to_string(), value)
        })
        .collect()
}

/// テスト用に生成したRSA鍵。生成に時間がかかるため共有する。
#[cfg(test)]
pub static TEST_KEY: once_cell::sync::Lazy<RsaPrivateKey> = once_cell::sync::Lazy::new(|| {
    RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
});
