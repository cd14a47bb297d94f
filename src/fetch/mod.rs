// src/fetch/mod.rs
//! Payload retrieval: the `Fetch` seam, its HTTP implementation, retries
//! and a bounded fan-out over many queries.

pub mod http;
pub mod retry;

pub use http::HttpFetcher;
pub use retry::{fetch_with_retry, Backoff, RetryPolicy, Sleeper, TokioSleeper};

use async_trait::async_trait;
use futures::{stream::FuturesUnordered, StreamExt};
use tracing::{info, instrument, warn};
use url::Url;

use crate::error::PipelineError;
use crate::ingest::Payload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    SdmxCsv,
    Workbook { sheet: String },
}

/// One remote request.
#[derive(Debug, Clone)]
pub struct Query {
    /// `<dataset>/<version>[/<key>]`, used in logs and errors.
    pub name: String,
    pub url: Url,
    pub kind: QueryKind,
    pub required: bool,
}

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, query: &Query) -> anyhow::Result<Payload>;
}

/// Run all queries with at most `concurrency` in flight, each under the
/// retry policy. Results come back in the order the queries were given.
/// Nothing fails here: each query carries its own outcome.
#[instrument(level = "info", skip_all, fields(queries = queries.len(), concurrency = concurrency))]
pub async fn gather(
    fetcher: &dyn Fetch,
    queries: Vec<Query>,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    concurrency: usize,
) -> Vec<(Query, Result<Payload, PipelineError>)> {
    let concurrency = concurrency.max(1);
    let mut tasks = FuturesUnordered::new();
    let mut results = Vec::with_capacity(queries.len());

    for (idx, query) in queries.into_iter().enumerate() {
        tasks.push(async move {
            let outcome = fetch_with_retry(fetcher, &query, policy, sleeper).await;
            (idx, query, outcome)
        });

        // throttle concurrency
        if tasks.len() >= concurrency {
            if let Some(done) = tasks.next().await {
                results.push(done);
            }
        }
    }

    // drain remaining tasks
    while let Some(done) = tasks.next().await {
        results.push(done);
    }

    results.sort_by_key(|(idx, _, _)| *idx);
    let failed = results.iter().filter(|(_, _, r)| r.is_err()).count();
    if failed > 0 {
        warn!(failed, total = results.len(), "some queries failed");
    } else {
        info!(total = results.len(), "all queries fetched");
    }
    results.into_iter().map(|(_, q, r)| (q, r)).collect()
}
