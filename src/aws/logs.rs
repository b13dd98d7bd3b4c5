use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::types::QueryStatus as SdkQueryStatus;
use aws_sdk_cloudwatchlogs::Client;

use super::provider_error;
use crate::backend::{LogQueryService, QueryPoll, QueryStatus, ResultRow};
use crate::error::ProviderError;
use crate::schedule::TimeRange;

/// Most rows a single Logs Insights query may return.
const QUERY_LIMIT: i32 = 10_000;

pub struct CloudWatchLogsQuery {
    client: Client,
}

impl CloudWatchLogsQuery {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn status(status: Option<&SdkQueryStatus>) -> QueryStatus {
    match status {
        Some(SdkQueryStatus::Scheduled) => QueryStatus::Scheduled,
        Some(SdkQueryStatus::Running) => QueryStatus::Running,
        Some(SdkQueryStatus::Complete) => QueryStatus::Complete,
        Some(SdkQueryStatus::Failed) => QueryStatus::Failed,
        Some(SdkQueryStatus::Cancelled) => QueryStatus::Cancelled,
        Some(SdkQueryStatus::Timeout) => QueryStatus::Timeout,
        _ => QueryStatus::Unknown,
    }
}

#[async_trait]
impl LogQueryService for CloudWatchLogsQuery {
    async fn start_query(
        &self,
        log_group: &str,
        bounds: &TimeRange,
        query: &str,
    ) -> Result<String, ProviderError> {
        // Query times are inclusive whole seconds; stop one second short so
        // adjacent units do not share a boundary second.
        let start = bounds.start.timestamp();
        let end = (bounds.end.timestamp() - 1).max(start);

        let resp = self
            .client
            .start_query()
            .log_group_name(log_group)
            .start_time(start)
            .end_time(end)
            .query_string(query)
            .limit(QUERY_LIMIT)
            .send()
            .await
            .map_err(|e| provider_error("StartQuery", e))?;

        resp.query_id()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::malformed("StartQuery", "no query id in response"))
    }

    fn row_limit(&self) -> Option<usize> {
        Some(QUERY_LIMIT as usize)
    }

    async fn poll_query(&self, query_id: &str) -> Result<QueryPoll, ProviderError> {
        let resp = self
            .client
            .get_query_results()
            .query_id(query_id)
            .send()
            .await
            .map_err(|e| provider_error("GetQueryResults", e))?;

        let rows: Vec<ResultRow> = resp
            .results()
            .iter()
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|f| Some((f.field()?.to_string(), f.value()?.to_string())))
                    .collect()
            })
            .collect();

        Ok(QueryPoll {
            status: status(resp.status()),
            rows,
        })
    }

    async fn stop_query(&self, query_id: &str) -> Result<(), ProviderError> {
        self.client
            .stop_query()
            .query_id(query_id)
            .send()
            .await
            .map_err(|e| provider_error("StopQuery", e))?;
        Ok(())
    }
}
