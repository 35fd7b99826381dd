// Thin reqwest client for the external player-statistics store.

use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct EndGameRequest<'a> {
    nickname: &'a str,
    winner: bool,
    total_rounds: u32,
}

#[derive(Debug)]
pub enum StatsError {
    /// The service answered with a non-success status.
    Rejected(StatusCode),
    /// The service could not be reached or returned garbage.
    Unavailable,
}

/// Write-through stats sink: one POST per player per completed match.
#[derive(Clone)]
pub struct StatsClient {
    http: reqwest::Client,
    base_url: String,
}

impl StatsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub async fn record_result(
        &self,
        nickname: &str,
        winner: bool,
        total_rounds: u32,
    ) -> Result<(), StatsError> {
        let url = format!("{}/end_game", self.base_url);
        let response = self
            .http
            .post(url)
            .json(&EndGameRequest {
                nickname,
                winner,
                total_rounds,
            })
            .send()
            .await
            .map_err(|_| StatsError::Unavailable)?;

        if response.status().is_success() {
            return Ok(());
        }
        Err(StatsError::Rejected(response.status()))
    }
}
