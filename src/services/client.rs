// src/services/client.rs

//! Authenticated session against the site.

use async_trait::async_trait;
use scraper::Html;
use serde_json::Value;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ClientConfig, Credentials};
use crate::services::Session;
use crate::services::difi;
use crate::services::selectors::{self, parse_selector};
use crate::utils::http::{create_client, fetch_text};
use crate::utils::resolve_url;

const LOGIN_PATH: &str = "/users/login";

/// Hidden fields the login form must echo back.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct LoginTokens {
    pub validate_token: String,
    pub validate_key: String,
}

/// HTTP session holding the cookie jar and per-session caches.
pub struct DevArtClient {
    config: ClientConfig,
    credentials: Credentials,
    http: reqwest::Client,
    logged_in: bool,
    inbox_id: Option<String>,
}

impl DevArtClient {
    pub fn new(config: &ClientConfig, credentials: Credentials) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            credentials,
            http: create_client(config)?,
            logged_in: false,
            inbox_id: None,
        })
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Absolute URL for a site path; absolute URLs pass through.
    pub(crate) fn url(&self, path: &str) -> String {
        match Url::parse(&self.config.base_url) {
            Ok(base) => resolve_url(&base, path),
            Err(_) => format!("{}{}", self.config.base_url.trim_end_matches('/'), path),
        }
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Run a batch of DiFi calls and return each call's content.
    pub(crate) async fn difi(&self, calls: &[String]) -> Result<Vec<Value>> {
        let url = self.url(difi::DIFI_PATH);
        let context = calls.first().map(|c| difi::method_name(c)).unwrap_or("DiFi");
        log::debug!("DiFi request: {}", calls.join(" | "));

        let response = self
            .http
            .post(&url)
            .query(&difi::query_params(calls))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::upstream(context, format!("HTTP {status}")));
        }
        let body = response.text().await?;
        difi::parse_response(&body, calls)
    }

    /// Run a single DiFi call.
    pub(crate) async fn difi_one(&self, call: String) -> Result<Value> {
        let calls = [call];
        let mut contents = self.difi(&calls).await?;
        contents
            .pop()
            .ok_or_else(|| AppError::parse(difi::method_name(&calls[0]), "empty DiFi response"))
    }

    /// Message center inbox folder id, looked up once per session.
    pub(crate) async fn inbox_id(&mut self) -> Result<String> {
        if let Some(id) = &self.inbox_id {
            return Ok(id.clone());
        }
        let content = self
            .difi_one("MessageCenter;get_folders".to_string())
            .await?;
        let id = super::parse_inbox_id(&content)?;
        log::debug!("Message center inbox folder: {}", id);
        self.inbox_id = Some(id.clone());
        Ok(id)
    }
}

#[async_trait]
impl Session for DevArtClient {
    async fn login(&mut self) -> Result<()> {
        // New cookie jar per login
        self.http = create_client(&self.config)?;
        self.logged_in = false;
        self.inbox_id = None;

        let login_url = self.url(LOGIN_PATH);
        let page = fetch_text(&self.http, &login_url).await?;
        let tokens = parse_login_form(&page)?;

        let remember = "1".to_string();
        let form = [
            ("username", &self.credentials.username),
            ("password", &self.credentials.password),
            ("validate_token", &tokens.validate_token),
            ("validate_key", &tokens.validate_key),
            ("remember_me", &remember),
        ];
        let response = self.http.post(&login_url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::upstream(LOGIN_PATH, format!("HTTP {status}")));
        }
        let body = response.text().await?;
        if has_login_form(&body)? {
            return Err(AppError::authentication(format!(
                "deviantART rejected the credentials for '{}'",
                self.credentials.username
            )));
        }

        log::info!("Logged in as {}", self.credentials.username);
        self.logged_in = true;
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    fn invalidate(&mut self) {
        if self.logged_in {
            log::debug!("Session invalidated");
        }
        self.logged_in = false;
        self.inbox_id = None;
    }
}

/// Extract the hidden validation fields from the login page.
pub(crate) fn parse_login_form(html: &str) -> Result<LoginTokens> {
    let document = Html::parse_document(html);
    let form_sel = parse_selector(selectors::LOGIN_FORM)?;
    let token_sel = parse_selector(selectors::LOGIN_TOKEN)?;
    let key_sel = parse_selector(selectors::LOGIN_KEY)?;

    let form = document
        .select(&form_sel)
        .next()
        .ok_or_else(|| AppError::authentication("Unable to find the login form"))?;

    let value_of = |sel: &scraper::Selector, name: &str| {
        form.select(sel)
            .next()
            .and_then(|input| input.value().attr("value"))
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::authentication(format!("Login form has no '{name}' field"))
            })
    };

    Ok(LoginTokens {
        validate_token: value_of(&token_sel, "validate_token")?,
        validate_key: value_of(&key_sel, "validate_key")?,
    })
}

fn has_login_form(html: &str) -> Result<bool> {
    let document = Html::parse_document(html);
    let form_sel = parse_selector(selectors::LOGIN_FORM)?;
    Ok(document.select(&form_sel).next().is_some())
}
