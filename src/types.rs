//! Core types for ads-report-dl

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for an advertiser account under the manager account
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Create a new AccountId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for AccountId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<AccountId> for i64 {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AccountId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for AccountId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for AccountId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for AccountId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Report type — a named category of tabular performance data
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReportType {
    /// Account-level performance (impressions, clicks, cost per day)
    #[serde(rename = "ACCOUNT_PERFORMANCE_REPORT")]
    AccountPerformanceReport,
    /// Campaign-level performance
    #[serde(rename = "CAMPAIGN_PERFORMANCE_REPORT")]
    CampaignPerformanceReport,
    /// Keyword-level performance
    #[serde(rename = "KEYWORDS_PERFORMANCE_REPORT")]
    KeywordPerformanceReport,
    /// Campaign negative keywords (structural, not dated)
    #[serde(rename = "CAMPAIGN_NEGATIVE_KEYWORDS_PERFORMANCE_REPORT")]
    CampaignNegativeKeywordsReport,
}

impl ReportType {
    /// The wire name used in report download requests and in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::AccountPerformanceReport => "ACCOUNT_PERFORMANCE_REPORT",
            ReportType::CampaignPerformanceReport => "CAMPAIGN_PERFORMANCE_REPORT",
            ReportType::KeywordPerformanceReport => "KEYWORDS_PERFORMANCE_REPORT",
            ReportType::CampaignNegativeKeywordsReport => {
                "CAMPAIGN_NEGATIVE_KEYWORDS_PERFORMANCE_REPORT"
            }
        }
    }

    /// All report types the tool knows how to map
    pub fn all() -> &'static [ReportType] {
        &[
            ReportType::AccountPerformanceReport,
            ReportType::CampaignPerformanceReport,
            ReportType::KeywordPerformanceReport,
            ReportType::CampaignNegativeKeywordsReport,
        ]
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportType::all()
            .iter()
            .copied()
            .find(|rt| rt.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown report type '{s}'"))
    }
}

/// Named relative date range, resolved against the current day at run time
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelativeRange {
    /// The day before the run
    Yesterday,
    /// The 7 days ending yesterday
    #[serde(rename = "LAST_7_DAYS")]
    Last7Days,
    /// The 14 days ending yesterday
    #[serde(rename = "LAST_14_DAYS")]
    Last14Days,
    /// The 30 days ending yesterday
    #[serde(rename = "LAST_30_DAYS")]
    Last30Days,
    /// The previous full calendar month
    LastMonth,
    /// The current calendar month up to yesterday
    ThisMonth,
}

impl RelativeRange {
    /// The wire name used in report download requests
    pub fn as_str(&self) -> &'static str {
        match self {
            RelativeRange::Yesterday => "YESTERDAY",
            RelativeRange::Last7Days => "LAST_7_DAYS",
            RelativeRange::Last14Days => "LAST_14_DAYS",
            RelativeRange::Last30Days => "LAST_30_DAYS",
            RelativeRange::LastMonth => "LAST_MONTH",
            RelativeRange::ThisMonth => "THIS_MONTH",
        }
    }
}

impl std::str::FromStr for RelativeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: &[RelativeRange] = &[
            RelativeRange::Yesterday,
            RelativeRange::Last7Days,
            RelativeRange::Last14Days,
            RelativeRange::Last30Days,
            RelativeRange::LastMonth,
            RelativeRange::ThisMonth,
        ];
        ALL.iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown date range '{s}'"))
    }
}

/// Date-range mode for a report run: an explicit start/end pair or a named
/// relative range
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateRange {
    /// Explicit inclusive start and end dates
    Custom {
        /// First day covered by the report
        start: NaiveDate,
        /// Last day covered by the report
        end: NaiveDate,
    },
    /// Named relative range resolved at run time
    Relative(RelativeRange),
}

impl DateRange {
    /// The wire name of the date-range mode
    pub fn type_str(&self) -> &'static str {
        match self {
            DateRange::Custom { .. } => "CUSTOM_DATE",
            DateRange::Relative(r) => r.as_str(),
        }
    }

    /// Resolve to concrete inclusive (start, end) dates, relative to `today`
    pub fn resolve(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match *self {
            DateRange::Custom { start, end } => (start, end),
            DateRange::Relative(r) => {
                let yesterday = today - Duration::days(1);
                match r {
                    RelativeRange::Yesterday => (yesterday, yesterday),
                    RelativeRange::Last7Days => (today - Duration::days(7), yesterday),
                    RelativeRange::Last14Days => (today - Duration::days(14), yesterday),
                    RelativeRange::Last30Days => (today - Duration::days(30), yesterday),
                    RelativeRange::LastMonth => {
                        let first_of_this = today.with_day(1).unwrap_or(today);
                        let last_of_prev = first_of_this - Duration::days(1);
                        let first_of_prev = last_of_prev.with_day(1).unwrap_or(last_of_prev);
                        (first_of_prev, last_of_prev)
                    }
                    RelativeRange::ThisMonth => {
                        let first = today.with_day(1).unwrap_or(today);
                        (first, yesterday.max(first))
                    }
                }
            }
        }
    }

    /// Human-readable label for logs and export file names
    pub fn label(&self, today: NaiveDate) -> String {
        let (start, end) = self.resolve(today);
        format!("{start}..{end}")
    }
}

/// A fully specified report request: type, date range, and the ordered list of
/// column names to ask the API for. Immutable once built; created per run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportDefinition {
    /// The report category
    pub report_type: ReportType,
    /// The date-range mode for this run
    pub date_range: DateRange,
    /// Ordered column names requested from the API
    pub columns: Vec<&'static str>,
}

/// One unit of work: download, map, and persist one report for one account
#[derive(Clone, Debug)]
pub struct AccountTask {
    /// The account to download for
    pub account_id: AccountId,
    /// The report to download
    pub definition: ReportDefinition,
}

/// A single typed field value produced by the row mapper
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// 64-bit integer (identifiers, counts)
    Long(i64),
    /// Free or enumerated text (e.g. a match type like "Broad")
    Text(String),
    /// Monetary amount in micro-units (1_000_000 micros = 1 unit of currency)
    Money(i64),
    /// Calendar date without time
    Date(NaiveDate),
    /// Boolean flag parsed from a fixed yes/no vocabulary
    Flag(bool),
}

impl FieldValue {
    /// The inner i64 for `Long` values
    pub fn as_long(&self) -> Option<i64> {
        match self {
            FieldValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// The inner text for `Text` values
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// The inner flag for `Flag` values
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(v) => Some(*v),
            _ => None,
        }
    }

    /// Monetary amount converted from micros to whole currency units
    pub fn as_money_units(&self) -> Option<f64> {
        match self {
            FieldValue::Money(micros) => Some(*micros as f64 / 1_000_000.0),
            _ => None,
        }
    }

    /// The inner date for `Date` values
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(v) => Some(*v),
            _ => None,
        }
    }
}

/// A typed record mapped from one report row
///
/// Keyed by the natural key (account id, report type, dimension key, day);
/// persisting the same key twice overwrites, never duplicates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportEntity {
    /// The account this row belongs to
    pub account_id: AccountId,
    /// The report category this row came from
    pub report_type: ReportType,
    /// Joined key-column values identifying the primary dimension
    /// (e.g. "campaign_id:keyword_id")
    pub dimension_key: String,
    /// The calendar day for dated reports; `None` for structural reports
    pub day: Option<NaiveDate>,
    /// Mapped property values, keyed by schema property name
    pub fields: BTreeMap<String, FieldValue>,
}

impl ReportEntity {
    /// Look up a mapped field by schema property name
    pub fn get(&self, property: &str) -> Option<&FieldValue> {
        self.fields.get(property)
    }
}

/// Outcome of one account task
#[derive(Clone, Debug)]
pub enum TaskResult {
    /// The report was fetched, mapped, and persisted
    Success {
        /// Entities written (upserted) for this task
        rows_persisted: u64,
        /// Rows dropped by the skip-and-continue policy
        rows_skipped: u64,
    },
    /// The task failed after exhausting its retry budget
    Failed {
        /// Display form of the final error
        error: String,
    },
}

/// One account task's recorded outcome
#[derive(Clone, Debug)]
pub struct TaskOutcome {
    /// The account the task ran for
    pub account_id: AccountId,
    /// The report type the task downloaded
    pub report_type: ReportType,
    /// Success or failure
    pub result: TaskResult,
}

impl TaskOutcome {
    /// True when the task completed successfully
    pub fn is_success(&self) -> bool {
        matches!(self.result, TaskResult::Success { .. })
    }
}

/// Aggregate of all task outcomes for one run
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Tasks that completed successfully
    pub succeeded: usize,
    /// Tasks that failed permanently or exhausted retries
    pub failed: usize,
    /// Tasks never started because the run was cancelled
    pub cancelled: usize,
    /// Total entities upserted across all tasks
    pub rows_persisted: u64,
    /// Total rows dropped by the skip-and-continue policy
    pub rows_skipped: u64,
    /// Per-task outcomes in completion order
    pub outcomes: Vec<TaskOutcome>,
}

impl RunSummary {
    /// Record one task outcome
    pub fn record(&mut self, outcome: TaskOutcome) {
        match &outcome.result {
            TaskResult::Success {
                rows_persisted,
                rows_skipped,
            } => {
                self.succeeded += 1;
                self.rows_persisted += rows_persisted;
                self.rows_skipped += rows_skipped;
            }
            TaskResult::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Tasks that actually ran (completed or failed)
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Fraction of run tasks that failed; 0.0 when nothing ran
    pub fn failure_rate(&self) -> f64 {
        if self.completed() == 0 {
            0.0
        } else {
            self.failed as f64 / self.completed() as f64
        }
    }

    /// True when the run as a whole should be reported as failed
    pub fn exceeds_threshold(&self, threshold: f64) -> bool {
        self.failed > 0 && self.failure_rate() > threshold
    }
}

/// What to do when a single row of an otherwise-healthy report fails to map
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorPolicy {
    /// Log and drop the bad row, keep processing the report
    #[default]
    SkipRow,
    /// Fail the whole account task on the first bad row
    AbortReport,
}
