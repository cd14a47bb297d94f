// src/fetch/http.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{Fetch, Query, QueryKind};
use crate::ingest::{sdmx, xlsx, Payload};

/// Live fetcher over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("absscraper/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }

    async fn get_bytes(&self, query: &Query) -> Result<Vec<u8>> {
        debug!(url = %query.url, "GET");
        let mut req = self.client.get(query.url.clone());
        if query.kind == QueryKind::SdmxCsv {
            req = req.header(reqwest::header::ACCEPT, "application/vnd.sdmx.data+csv");
        }
        let bytes = req
            .send()
            .await
            .with_context(|| format!("GET {} failed", query.url))?
            .error_for_status()
            .with_context(|| format!("Non-success status {}", query.url))?
            .bytes()
            .await
            .with_context(|| format!("Reading body from {}", query.url))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, query: &Query) -> Result<Payload> {
        let body = self.get_bytes(query).await?;
        match &query.kind {
            QueryKind::SdmxCsv => Ok(Payload::Table(sdmx::parse_csv(&body)?)),
            QueryKind::Workbook { sheet } => {
                // calamine is synchronous; keep it off the reactor
                let sheet = sheet.clone();
                let raw = tokio::task::spawn_blocking(move || xlsx::read_sheet(&body, &sheet))
                    .await
                    .context("workbook reader panicked")??;
                Ok(Payload::Sheet(raw))
            }
        }
    }
}
