use std::{io::Read, time::Duration};

use miette::{miette, Context, IntoDiagnostic};
use reqwest::{
    blocking::Client,
    header::LOCATION,
    redirect,
};

use crate::result::Result;

/// What a metadata-only request told us about a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadResponse {
    pub status: u16,
    /// The `Location` header, if any
    pub location: Option<String>,
}

/// A response body being downloaded.
pub struct Body {
    /// The declared `Content-Length`, if any
    pub content_length: Option<u64>,
    pub reader: Box<dyn Read>,
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Body")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// The HTTP operations the pipelines need.
pub trait HttpClient {
    /// Send a `HEAD` request without following redirects.
    fn head(&self, url: &str) -> Result<HeadResponse>;

    /// Send a `GET` request, following redirects. Non-2xx answers are errors.
    fn get(&self, url: &str) -> Result<Body>;
}

/// Blocking [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct Http {
    head_client: Client,
    get_client: Client,
}

impl Http {
    /// `timeout` bounds the `HEAD` checks. Downloads have no time limit.
    pub fn new(timeout: Duration) -> Result<Self> {
        let head_client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .build()
            .into_diagnostic()
            .wrap_err("Could not build HTTP client")?;

        let get_client = Client::builder()
            .connect_timeout(timeout)
            .timeout(None::<Duration>)
            .build()
            .into_diagnostic()
            .wrap_err("Could not build HTTP client")?;

        Ok(Self {
            head_client,
            get_client,
        })
    }
}

impl HttpClient for Http {
    fn head(&self, url: &str) -> Result<HeadResponse> {
        let res = self
            .head_client
            .head(url)
            .send()
            .into_diagnostic()
            .wrap_err_with(|| format!("HEAD {url} failed"))?;

        let location = res
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Ok(HeadResponse {
            status: res.status().as_u16(),
            location,
        })
    }

    fn get(&self, url: &str) -> Result<Body> {
        let res = self
            .get_client
            .get(url)
            .send()
            .into_diagnostic()
            .wrap_err_with(|| format!("GET {url} failed"))?;

        if !res.status().is_success() {
            return Err(miette!("GET {url} answered with status {}", res.status()).into());
        }

        let content_length = res.content_length();

        Ok(Body {
            content_length,
            reader: Box::new(res),
        })
    }
}
