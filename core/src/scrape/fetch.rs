//! Blocking HTTP seam used by the scraping proxy.

use std::fmt::Debug;
use std::time::Duration;

use anyhow::Context;

use super::Result;

/// Status and body of a completed request. Non-success statuses are returned, not raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests with a per-request user agent and `Accept` header.
pub trait HttpFetch: Send + Sync + Debug {
    fn get(&self, url: &str, user_agent: &str, accept: Option<&str>) -> Result<HttpResponse>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetch {
    client: reqwest::blocking::Client,
}

impl ReqwestFetch {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }
}

impl HttpFetch for ReqwestFetch {
    fn get(&self, url: &str, user_agent: &str, accept: Option<&str>) -> Result<HttpResponse> {
        let mut request = self.client.get(url).header(reqwest::header::USER_AGENT, user_agent);
        if let Some(accept) = accept {
            request = request.header(reqwest::header::ACCEPT, accept);
        }
        let response = request.send().with_context(|| format!("requesting {url}"))?;
        let status = response.status().as_u16();
        let body = response.text().with_context(|| format!("reading body of {url}"))?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range_is_2xx() {
        let ok = HttpResponse { status: 204, body: String::new() };
        let moved = HttpResponse { status: 301, ..ok.clone() };
        assert!(ok.is_success());
        assert!(!moved.is_success());
    }

    #[test]
    fn client_builds_with_timeout() -> Result<()> {
        ReqwestFetch::new(Duration::from_secs(5))?;
        Ok(())
    }
}
