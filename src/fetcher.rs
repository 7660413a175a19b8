//! Report download: translate a report definition into the API's request
//! shape and classify the response
//!
//! Authentication and transport details belong to the vendor; this module's
//! job is the narrow translation layer plus the success / rate-limited /
//! permanent-failure classification the orchestrator's retry policy needs.

use crate::config::ApiConfig;
use crate::error::{Error, FetchError, Result};
use crate::types::{AccountId, DateRange, ReportDefinition};
use async_trait::async_trait;
use futures::TryStreamExt;
use std::io;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::io::StreamReader;

/// A fetched report body, consumed line by line
///
/// Wraps the transport's byte stream so large reports are never fully decoded
/// in memory; the mapper reads rows incrementally.
pub struct ReportPayload {
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
}

impl ReportPayload {
    /// Wrap a streaming byte source
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = std::result::Result<bytes::Bytes, io::Error>>
            + Send
            + Unpin
            + 'static,
    {
        Self {
            reader: Box::new(BufReader::new(StreamReader::new(stream))),
        }
    }

    /// Wrap an in-memory body (stub fetchers, tests)
    pub fn from_string(body: impl Into<String>) -> Self {
        Self {
            reader: Box::new(io::Cursor::new(body.into().into_bytes())),
        }
    }

    /// Consume the payload as an async line iterator
    pub fn lines(self) -> tokio::io::Lines<Box<dyn AsyncBufRead + Send + Unpin>> {
        use tokio::io::AsyncBufReadExt;
        self.reader.lines()
    }
}

impl std::fmt::Debug for ReportPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportPayload").finish_non_exhaustive()
    }
}

/// Downloads one report for one account
///
/// The orchestrator depends on this trait, not on the HTTP client, so tests
/// and alternative transports plug in without touching batch logic.
#[async_trait]
pub trait ReportFetcher: Send + Sync {
    /// Request the report described by `definition` for `account_id`
    async fn fetch(
        &self,
        account_id: AccountId,
        definition: &ReportDefinition,
    ) -> std::result::Result<ReportPayload, FetchError>;
}

/// HTTP report fetcher for the advertising API's report download endpoint
pub struct HttpReportFetcher {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
    manager_account_id: Option<i64>,
}

impl HttpReportFetcher {
    /// Build a fetcher from the API configuration
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(api.request_timeout())
            .build()
            .map_err(Error::Network)?;
        Ok(Self {
            client,
            endpoint: api.endpoint.clone(),
            auth_token: api.auth_token.clone(),
            manager_account_id: api.manager_account_id,
        })
    }

    /// The form fields the report endpoint expects for one definition
    fn request_form(
        account_id: AccountId,
        definition: &ReportDefinition,
    ) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("clientCustomerId", account_id.to_string()),
            ("reportType", definition.report_type.as_str().to_string()),
            ("format", "CSV".to_string()),
            ("dateRangeType", definition.date_range.type_str().to_string()),
            ("fields", definition.columns.join(",")),
        ];
        if let DateRange::Custom { start, end } = definition.date_range {
            form.push(("startDate", start.format("%Y%m%d").to_string()));
            form.push(("endDate", end.format("%Y%m%d").to_string()));
        }
        form
    }
}

#[async_trait]
impl ReportFetcher for HttpReportFetcher {
    async fn fetch(
        &self,
        account_id: AccountId,
        definition: &ReportDefinition,
    ) -> std::result::Result<ReportPayload, FetchError> {
        let form = Self::request_form(account_id, definition);

        let mut request = self.client.post(&self.endpoint).form(&form);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        if let Some(manager) = self.manager_account_id {
            request = request.header("managerCustomerId", manager.to_string());
        }

        tracing::debug!(
            account = %account_id,
            report_type = %definition.report_type,
            date_range = definition.date_range.type_str(),
            "Requesting report download"
        );

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(FetchError::RateLimited { retry_after_secs });
        }
        if status.is_server_error() {
            return Err(FetchError::Transient(format!(
                "report endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            // 4xx: bad account, no permission, malformed definition
            return Err(FetchError::Permanent(format!(
                "report endpoint returned {status} for account {account_id}"
            )));
        }

        let stream = response.bytes_stream().map_err(io::Error::other);
        Ok(ReportPayload::from_stream(Box::pin(stream)))
    }
}

/// Transport-level errors: timeouts and connection failures retry, the rest
/// (request construction, redirect loops) do not
fn classify_transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() || e.is_connect() {
        FetchError::Transient(e.to_string())
    } else {
        FetchError::Permanent(e.to_string())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ReportSchema;
    use crate::types::{RelativeRange, ReportType};
    use chrono::NaiveDate;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_config(endpoint: String) -> ApiConfig {
        ApiConfig {
            endpoint,
            auth_token: Some("test-token".to_string()),
            manager_account_id: Some(999),
            request_timeout_secs: 5,
        }
    }

    fn keyword_definition() -> ReportDefinition {
        ReportSchema::for_type(ReportType::KeywordPerformanceReport)
            .definition(crate::types::DateRange::Custom {
                start: NaiveDate::from_ymd_opt(2013, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2013, 1, 31).unwrap(),
            })
    }

    #[test]
    fn custom_range_includes_compact_dates_in_form() {
        let form = HttpReportFetcher::request_form(AccountId(123), &keyword_definition());
        let get = |k: &str| {
            form.iter()
                .find(|(name, _)| *name == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("clientCustomerId"), Some("123"));
        assert_eq!(get("reportType"), Some("KEYWORDS_PERFORMANCE_REPORT"));
        assert_eq!(get("dateRangeType"), Some("CUSTOM_DATE"));
        assert_eq!(get("startDate"), Some("20130101"));
        assert_eq!(get("endDate"), Some("20130131"));
        assert!(get("fields").unwrap().contains("KeywordMatchType"));
    }

    #[test]
    fn relative_range_omits_explicit_dates() {
        let definition = ReportSchema::for_type(ReportType::AccountPerformanceReport)
            .definition(crate::types::DateRange::Relative(RelativeRange::Last7Days));
        let form = HttpReportFetcher::request_form(AccountId(1), &definition);
        assert!(form.iter().any(|(k, v)| *k == "dateRangeType" && v == "LAST_7_DAYS"));
        assert!(!form.iter().any(|(k, _)| *k == "startDate"));
    }

    #[tokio::test]
    async fn successful_response_streams_body_lines() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("clientCustomerId=123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("CampaignId,Id\n1,2\n"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpReportFetcher::new(&api_config(server.uri())).unwrap();
        let payload = fetcher
            .fetch(AccountId(123), &keyword_definition())
            .await
            .unwrap();

        let mut lines = payload.lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("CampaignId,Id"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("1,2"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited_with_hint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "17"))
            .mount(&server)
            .await;

        let fetcher = HttpReportFetcher::new(&api_config(server.uri())).unwrap();
        let err = fetcher
            .fetch(AccountId(1), &keyword_definition())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::RateLimited {
                retry_after_secs: Some(17)
            }
        ));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = HttpReportFetcher::new(&api_config(server.uri())).unwrap();
        let err = fetcher
            .fetch(AccountId(1), &keyword_definition())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transient(_)));
    }

    #[tokio::test]
    async fn forbidden_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let fetcher = HttpReportFetcher::new(&api_config(server.uri())).unwrap();
        let err = fetcher
            .fetch(AccountId(1), &keyword_definition())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Permanent(_)));
    }

    #[tokio::test]
    async fn from_string_payload_yields_lines() {
        let payload = ReportPayload::from_string("a,b\n1,2\n");
        let mut lines = payload.lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("a,b"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("1,2"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }
}
