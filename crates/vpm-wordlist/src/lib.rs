//! Word-list adapter (random channel names).
//!
//! Talks to a random-word service that answers
//! `GET <endpoint>?words=N&type=capitalized` with a JSON array of strings.

use std::time::Duration;

use async_trait::async_trait;

use vpm_core::{errors::Error, ports::WordSource, Result};

#[derive(Clone, Debug)]
pub struct WordListClient {
    endpoint: String,
    http: reqwest::Client,
}

impl WordListClient {
    /// `timeout` bounds the whole request; the name supplier applies its own
    /// deadline on top.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("word list client build error: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }
}

#[async_trait]
impl WordSource for WordListClient {
    async fn fetch_words(&self, count: usize) -> Result<Vec<String>> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("words", count.to_string()), ("type", "capitalized".to_string())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("word list request: {e}"))
                } else {
                    Error::External(format!("word list request error: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "word list fetch failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("word list json error: {e}")))?;

        parse_words(&v)
    }
}

/// Accept a JSON array of strings; non-string entries are skipped.
pub fn parse_words(v: &serde_json::Value) -> Result<Vec<String>> {
    let Some(items) = v.as_array() else {
        return Err(Error::External(
            "word list response is not an array".to_string(),
        ));
    };

    Ok(items
        .iter()
        .filter_map(|w| w.as_str())
        .map(str::to_string)
        .collect())
}
