use std::{sync::OnceLock, time::Duration};

use indoc::formatdoc;
use miette::{miette, Context, IntoDiagnostic};
use regex::Regex;
use reqwest::blocking::Client;
use tracing::debug;

use crate::result::{bail, Result};

/// Source of access tokens for token-protected provider tags.
pub trait Tokenizer {
    /// Get a token giving access to the media of `tag`.
    ///
    /// Return `Ok(None)` if the provider says the tag needs no token.
    fn token(&self, tag: &str) -> Result<Option<String>>;
}

/// Interface for the [vid.ly](https://vid.ly) security token API
#[derive(Debug)]
pub struct Vidly {
    client: Client,
    api_url: String,
    user_id: String,
    user_key: String,
    lifetime: Duration,
}

impl Vidly {
    pub fn new(
        api_url: &str,
        user_id: &str,
        user_key: &str,
        lifetime: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .into_diagnostic()
            .wrap_err("Could not build HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.to_owned(),
            user_id: user_id.to_owned(),
            user_key: user_key.to_owned(),
            lifetime,
        })
    }
}

impl Tokenizer for Vidly {
    fn token(&self, tag: &str) -> Result<Option<String>> {
        let query = formatdoc! {r#"
            <?xml version="1.0"?>
            <Query>
              <Action>GetSecurityToken</Action>
              <UserID>{user_id}</UserID>
              <UserKey>{user_key}</UserKey>
              <MediaShortLink>{tag}</MediaShortLink>
              <ExpirationTimeSeconds>{seconds}</ExpirationTimeSeconds>
            </Query>"#,
            user_id = self.user_id,
            user_key = self.user_key,
            seconds = self.lifetime.as_secs(),
        };

        debug!("Requesting a token for tag {tag}");
        let response = self
            .client
            .post(&self.api_url)
            .form(&[("xml", query)])
            .send()
            .and_then(|res| res.text())
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not request a token for tag {tag}"))?;

        parse_token_response(&response)
    }
}

/// Used when no provider credentials are configured: every token request fails.
#[derive(Debug)]
pub struct NoCredentials;

impl Tokenizer for NoCredentials {
    fn token(&self, _tag: &str) -> Result<Option<String>> {
        bail("Provider credentials are not configured, cannot request a token")
    }
}

/// Extract the token from the XML answer of a `GetSecurityToken` query.
fn parse_token_response(xml: &str) -> Result<Option<String>> {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    static MESSAGE_RE: OnceLock<Regex> = OnceLock::new();

    let token_re = TOKEN_RE.get_or_init(|| Regex::new(r"<Token>\s*([^<\s]+)\s*</Token>").unwrap());
    if let Some(cap) = token_re.captures(xml) {
        return Ok(Some(cap[1].to_owned()));
    }

    let message_re = MESSAGE_RE.get_or_init(|| Regex::new(r"<Message>([^<]*)</Message>").unwrap());
    let message = message_re
        .captures(xml)
        .map_or("", |cap| cap.get(1).map_or("", |m| m.as_str()));

    if message.to_lowercase().contains("no need for a token") {
        Ok(None)
    } else {
        Err(miette!("No token in the provider answer: {message}").into())
    }
}
