// src/services/client.rs

//! Upstream auction statistics site client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use encoding_rs::Encoding;
use rand::Rng;
use regex::Regex;
use reqwest::cookie::Jar;
use reqwest::Response;
use sha2::{Digest, Sha256};
use url::Url;
use url::form_urlencoded::byte_serialize;

use crate::error::{AppError, Result};
use crate::models::{CrawlerConfig, LeafKey, RegionLevel, SearchSummary};
use crate::services::RetryPolicy;

const STATISTICS_PATH: &str = "bubwon/kyung_statistics/statistics_detail.asp";
const BID_LIST_PATH: &str = "bubwon/kyung_statistics/stat_example.asp";
const INDEX_PATH: &str = "index.asp";
const LOGIN_PATH: &str = "login/loginok.asps";
const LOGOUT_PATH: &str = "login/logoutok.asp";

/// Environment variable holding the login id.
pub const LOGIN_ID_VAR: &str = "AUCTION_LOGIN_ID";
/// Environment variable holding the login password.
pub const LOGIN_PW_VAR: &str = "AUCTION_LOGIN_PW";

type Params = Vec<(&'static str, String)>;

/// Pages the traversal needs from the upstream site.
///
/// Every method returns the decoded HTML; parsing is left to the caller.
#[async_trait]
pub trait AuctionSource: Send + Sync {
    async fn login(&self) -> Result<()>;

    async fn logout(&self) -> Result<()>;

    /// Page carrying the dropdown for `level`, given the selections above it.
    async fn fetch_options_page(&self, level: RegionLevel, parents: &[String]) -> Result<String>;

    async fn fetch_statistics_page(&self, leaf: &LeafKey) -> Result<String>;

    async fn fetch_bid_page(&self, leaf: &LeafKey, summary: &SearchSummary) -> Result<String>;
}

/// Site login credentials.
#[derive(Clone)]
pub struct Credentials {
    login_id: String,
    login_pw: String,
}

impl Credentials {
    pub fn new(login_id: impl Into<String>, login_pw: impl Into<String>) -> Self {
        Self {
            login_id: login_id.into(),
            login_pw: login_pw.into(),
        }
    }

    /// Read credentials from `AUCTION_LOGIN_ID` / `AUCTION_LOGIN_PW`.
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .map_err(|_| AppError::config(format!("{name} is not set")))
        };
        Ok(Self::new(read(LOGIN_ID_VAR)?, read(LOGIN_PW_VAR)?))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login_id", &self.login_id)
            .field("login_pw", &"***")
            .finish()
    }
}

/// HTTP client for the auction statistics site.
///
/// Keeps the login session in a cookie jar, decodes responses with the
/// configured charset and waits `request_delay_ms` after every page.
pub struct AuctionClient {
    http: reqwest::Client,
    jar: Arc<Jar>,
    base_url: Url,
    charset: String,
    encoding: &'static Encoding,
    request_delay: Duration,
    retry: RetryPolicy,
    credentials: Credentials,
}

impl AuctionClient {
    pub fn new(config: &CrawlerConfig, credentials: Credentials) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        Ok(Self {
            http,
            jar,
            base_url: Url::parse(&config.base_url)?,
            charset: config.charset.clone(),
            encoding: query_encoding(&config.charset)?,
            request_delay: Duration::from_millis(config.request_delay_ms),
            retry: RetryPolicy::from_config(&config.retry),
            credentials,
        })
    }

    async fn get_page(&self, label: &str, path: &str, params: &[(&str, String)]) -> Result<String> {
        let mut url = self.base_url.join(path)?;
        let query = encode_query(params, self.encoding);
        url.set_query((!query.is_empty()).then_some(query.as_str()));

        let response = self.retry.run(label, || self.send_get(&url)).await?;
        self.handle_text_response(response).await
    }

    async fn send_get(&self, url: &Url) -> Result<Response> {
        Ok(self.http.get(url.clone()).send().await?)
    }

    async fn send_form(&self, url: &Url, form: &[(&str, String)]) -> Result<Response> {
        Ok(self.http.post(url.clone()).form(form).send().await?)
    }

    /// Accept an HTML page; a JSON body is how the site reports failures.
    async fn handle_text_response(&self, response: Response) -> Result<String> {
        let response = response.error_for_status()?;
        let status = response.status().as_u16();
        tokio::time::sleep(self.request_delay).await;

        let text = response.text_with_charset(&self.charset).await?;
        if serde_json::from_str::<serde_json::Value>(&text).is_ok() {
            return Err(AppError::Response {
                status,
                message: text,
            });
        }
        Ok(text)
    }

    async fn fetch_chk_id(&self) -> Result<String> {
        let page = self
            .get_page("index", INDEX_PATH, &[("PC_Use", String::new())])
            .await?;
        parse_chk_id(&page)
    }
}

#[async_trait]
impl AuctionSource for AuctionClient {
    async fn login(&self) -> Result<()> {
        let chk_id = self.fetch_chk_id().await?;
        self.jar
            .add_cookie_str(&format!("chkCookie={chk_id}"), &self.base_url);

        let (click_x, click_y) = submit_click();
        let form = [
            ("sid", chk_id.clone()),
            (
                "userid",
                credential_digest(&self.credentials.login_id, &chk_id),
            ),
            (
                "password",
                credential_digest(&self.credentials.login_pw, &chk_id),
            ),
            ("submitimg.x", click_x.to_string()),
            ("submitimg.y", click_y.to_string()),
        ];

        let url = self.base_url.join(LOGIN_PATH)?;
        let response = self
            .retry
            .run("login", || self.send_form(&url, &form))
            .await?;
        self.handle_text_response(response).await?;

        log::info!("Logged in as {}", self.credentials.login_id);
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.get_page("logout", LOGOUT_PATH, &[]).await?;
        log::info!("Logged out");
        Ok(())
    }

    async fn fetch_options_page(&self, level: RegionLevel, parents: &[String]) -> Result<String> {
        let params = options_params(level, parents)?;
        self.get_page(level.as_str(), STATISTICS_PATH, &params).await
    }

    async fn fetch_statistics_page(&self, leaf: &LeafKey) -> Result<String> {
        self.get_page("statistics", STATISTICS_PATH, &statistics_params(leaf))
            .await
    }

    async fn fetch_bid_page(&self, leaf: &LeafKey, summary: &SearchSummary) -> Result<String> {
        self.get_page("bid list", BID_LIST_PATH, &bid_params(leaf, summary))
            .await
    }
}

/// Query for the page offering the `level` dropdown.
///
/// Usage categories do not depend on the region, and subtypes only on the
/// category, so those requests leave the region fields blank.
fn options_params(level: RegionLevel, parents: &[String]) -> Result<Params> {
    if parents.len() != level.depth() {
        return Err(AppError::validation(format!(
            "{level} needs {} parent selections, got {}",
            level.depth(),
            parents.len()
        )));
    }

    let mut params: Params = vec![("url_from", "bubwon".to_string())];
    match level {
        RegionLevel::Sido | RegionLevel::UsageCategory => {}
        RegionLevel::Gugun => {
            params.push(("addr_do", parents[0].clone()));
            params.push(("yong_set", String::new()));
            params.push(("yong_desc", String::new()));
        }
        RegionLevel::Dong => {
            params.push(("addr_do", parents[0].clone()));
            params.push(("addr_si", parents[1].clone()));
            params.push(("yong_set", String::new()));
            params.push(("yong_desc", String::new()));
        }
        RegionLevel::UsageSubtype => {
            for key in ["addr_do", "addr_si", "addr_dong", "sbunji", "ebunji"] {
                params.push((key, String::new()));
            }
            params.push(("yong_set", parents[3].clone()));
            params.push(("yong_desc", String::new()));
        }
    }
    Ok(params)
}

fn leaf_params(leaf: &LeafKey) -> Params {
    vec![
        ("url_from", "bubwon".to_string()),
        ("addr_do", leaf.sido.clone()),
        ("addr_si", leaf.gugun.clone()),
        ("addr_dong", leaf.dong.clone()),
        ("sbunji", String::new()),
        ("ebunji", String::new()),
        ("yong_set", leaf.usage_category.clone()),
        ("yong_desc", leaf.usage_subtype.clone()),
    ]
}

fn statistics_params(leaf: &LeafKey) -> Params {
    let mut params = vec![("SearchYN", "Y".to_string())];
    params.extend(leaf_params(leaf));
    params
}

fn bid_params(leaf: &LeafKey, summary: &SearchSummary) -> Params {
    let mut params = leaf_params(leaf);
    params.extend([
        ("mode", "pop".to_string()),
        ("order", "kmday_last desc".to_string()),
        ("term1", summary.term1.clone()),
        ("term2", summary.term2.clone()),
        ("Category", summary.category.clone()),
        ("scale", "dong".to_string()),
    ]);
    params
}

/// Encoding the site expects query values in, looked up by charset label.
fn query_encoding(charset: &str) -> Result<&'static Encoding> {
    Encoding::for_label(charset.trim().as_bytes())
        .ok_or_else(|| AppError::config(format!("unknown charset '{charset}'")))
}

/// Form-encode `params`, with values in `encoding` before percent-encoding.
fn encode_query(params: &[(&str, String)], encoding: &'static Encoding) -> String {
    params
        .iter()
        .map(|(key, value)| {
            let (bytes, _, _) = encoding.encode(value);
            format!(
                "{}={}",
                byte_serialize(key.as_bytes()).collect::<String>(),
                byte_serialize(&bytes).collect::<String>()
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Click position on the login image button, as a browser would send it.
fn submit_click() -> (u32, u32) {
    let mut rng = rand::thread_rng();
    (rng.gen_range(15..=20), rng.gen_range(15..=20))
}

/// Extract the `chkID` script variable of the index page.
fn parse_chk_id(html: &str) -> Result<String> {
    let re = Regex::new(r#"var\s+chkID\s*=\s*['"]([^'"]*)['"]"#)?;
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::parse("chkID not found on the index page"))
}

/// Digest of a credential salted with the session's `chkID`.
fn credential_digest(secret: &str, chk_id: &str) -> String {
    hex::encode(Sha256::digest(format!("{secret}{chk_id}").as_bytes()))
}
