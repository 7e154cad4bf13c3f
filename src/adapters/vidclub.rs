use crate::adapters::http::{handle_api_response, HttpRetry};
use crate::domain::model::{add_ingestion_metadata, Frame, IfEmpty};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{parse_date, DATE_FORMAT};
use chrono::{Days, NaiveDate, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

pub const SOURCE_NAME: &str = "VidClub";
/// Data in the API starts on this day.
pub const OLDEST_DATE: &str = "2022-03-22";
pub const DEFAULT_ITEMS_PER_PAGE: usize = 100;
pub const DEFAULT_DAYS_INTERVAL: u32 = 30;
const MAX_PAGES: usize = 10_000;

#[derive(Clone, Serialize, Deserialize)]
pub struct VidClubCredentials {
    pub url: String,
    pub token: String,
}

impl std::fmt::Debug for VidClubCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VidClubCredentials")
            .field("url", &self.url)
            .field("token", &"***")
            .finish()
    }
}

impl VidClubCredentials {
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() || self.token.trim().is_empty() {
            return Err(EtlError::credential(
                "'url' and 'token' credentials are required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VidClubSource {
    Jobs,
    Product,
    Company,
    Survey,
}

impl VidClubSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            VidClubSource::Jobs => "jobs",
            VidClubSource::Product => "product",
            VidClubSource::Company => "company",
            VidClubSource::Survey => "survey",
        }
    }

    pub fn is_date_filtered(&self) -> bool {
        !matches!(self, VidClubSource::Survey)
    }
}

impl FromStr for VidClubSource {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jobs" => Ok(VidClubSource::Jobs),
            "product" => Ok(VidClubSource::Product),
            "company" => Ok(VidClubSource::Company),
            "survey" => Ok(VidClubSource::Survey),
            _ => Err(EtlError::validation(
                "The source has to be: jobs, product, company or survey",
            )),
        }
    }
}

impl std::fmt::Display for VidClubSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one extraction.
#[derive(Debug, Clone)]
pub struct VidClubQuery {
    pub source: VidClubSource,
    pub from_date: String,
    /// Defaults to today (UTC).
    pub to_date: Option<String>,
    pub items_per_page: usize,
    pub days_interval: u32,
    pub cols_to_drop: Vec<String>,
    pub if_empty: IfEmpty,
}

impl VidClubQuery {
    pub fn new(source: VidClubSource) -> Self {
        Self {
            source,
            from_date: OLDEST_DATE.to_string(),
            to_date: None,
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
            days_interval: DEFAULT_DAYS_INTERVAL,
            cols_to_drop: Vec::new(),
            if_empty: IfEmpty::Warn,
        }
    }
}

/// Validated `[from, to]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn parse(from_date: &str, to_date: Option<&str>) -> Result<Self> {
        let from = parse_date("from_date", from_date)?;
        let oldest = parse_date("oldest_date", OLDEST_DATE)?;
        if from < oldest {
            return Err(EtlError::validation(format!(
                "from_date cannot be earlier than {}",
                OLDEST_DATE
            )));
        }

        let to = match to_date {
            Some(value) if !value.trim().is_empty() => parse_date("to_date", value)?,
            _ => Utc::now().date_naive(),
        };
        if to < from {
            return Err(EtlError::validation(
                "to_date cannot be earlier than from_date",
            ));
        }

        Ok(Self { from, to })
    }

    /// Consecutive, non-overlapping windows of at most `days` days covering
    /// the range.
    pub fn windows(&self, days: u32) -> Vec<DateRange> {
        let span = u64::from(days.max(1) - 1);
        let mut windows = Vec::new();
        let mut start = self.from;
        while start <= self.to {
            let end = start
                .checked_add_days(Days::new(span))
                .map_or(self.to, |d| d.min(self.to));
            windows.push(DateRange { from: start, to: end });
            match end.checked_add_days(Days::new(1)) {
                Some(next) => start = next,
                None => break,
            }
        }
        windows
    }
}

/// Client for the Vid Club data lake API.
#[derive(Clone)]
pub struct VidClub {
    client: Client,
    credentials: VidClubCredentials,
    retry: HttpRetry,
}

impl VidClub {
    pub fn new(client: Client, credentials: VidClubCredentials) -> Result<Self> {
        credentials.validate()?;
        Ok(Self {
            client,
            credentials,
            retry: HttpRetry::default(),
        })
    }

    pub fn with_retry(mut self, retry: HttpRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn build_query(
        &self,
        source: VidClubSource,
        from_date: &str,
        to_date: &str,
        items_per_page: usize,
    ) -> String {
        let base = if self.credentials.url.ends_with('/') {
            self.credentials.url.clone()
        } else {
            format!("{}/", self.credentials.url)
        };

        if source.is_date_filtered() {
            format!(
                "{}{}?from={}&to={}&limit={}",
                base, source, from_date, to_date, items_per_page
            )
        } else {
            format!("{}{}?language=en&type=question", base, source)
        }
    }

    /// Fetches every page of one query. Pages are requested while a page
    /// comes back full (`items_per_page` rows).
    pub async fn get_response(
        &self,
        source: VidClubSource,
        from_date: &str,
        to_date: Option<&str>,
        items_per_page: usize,
    ) -> Result<Frame> {
        if items_per_page == 0 {
            return Err(EtlError::validation("items_per_page must be at least 1"));
        }
        let range = DateRange::parse(from_date, to_date)?;
        let first_url = self.build_query(
            source,
            &range.from.format(DATE_FORMAT).to_string(),
            &range.to.format(DATE_FORMAT).to_string(),
            items_per_page,
        );

        let mut frame = Frame::new();
        for page in 1..=MAX_PAGES {
            let url = format!("{}&page={}", first_url, page);
            tracing::debug!("📡 {}: requesting {}", SOURCE_NAME, url);

            let request = self
                .client
                .get(&url)
                .bearer_auth(&self.credentials.token)
                .header(CONTENT_TYPE, "application/json");
            let body: Value = handle_api_response(request, &self.retry)
                .await?
                .json()
                .await?;

            match body {
                Value::Object(mut obj) if obj.contains_key("data") => {
                    let page_frame = page_rows(obj.remove("data").unwrap_or(Value::Null));
                    let rows = page_frame.len();
                    frame.extend(page_frame);
                    if rows != items_per_page {
                        break;
                    }
                }
                Value::Array(items) => {
                    frame.extend(Frame::from_json_rows(items));
                    break;
                }
                Value::Object(obj) => {
                    frame.extend(Frame::from_json_rows([Value::Object(obj)]));
                    break;
                }
                _ => break,
            }

            if page == MAX_PAGES {
                tracing::warn!(
                    "⚠️ {}: stopped after {} pages for {}",
                    SOURCE_NAME,
                    MAX_PAGES,
                    source
                );
            }
        }

        tracing::info!(
            "📥 {}: fetched {} rows from '{}' ({} to {})",
            SOURCE_NAME,
            frame.len(),
            source,
            range.from,
            range.to
        );
        Ok(frame)
    }

    /// Full extraction: splits the date range into windows, concatenates
    /// the results, drops unwanted columns and tags rows with ingestion
    /// metadata.
    pub async fn to_frame(&self, query: &VidClubQuery) -> Result<Frame> {
        if query.days_interval == 0 {
            return Err(EtlError::validation("days_interval must be at least 1"));
        }
        let range = DateRange::parse(&query.from_date, query.to_date.as_deref())?;

        let windows = if query.source.is_date_filtered() {
            range.windows(query.days_interval)
        } else {
            vec![range]
        };

        let mut frame = Frame::new();
        for window in &windows {
            let from = window.from.format(DATE_FORMAT).to_string();
            let to = window.to.format(DATE_FORMAT).to_string();
            let part = self
                .get_response(query.source, &from, Some(&to), query.items_per_page)
                .await?;
            frame.extend(part);
        }

        if !query.cols_to_drop.is_empty() {
            let missing = frame.drop_columns(&query.cols_to_drop);
            if !missing.is_empty() && !frame.is_empty() {
                tracing::warn!(
                    "⚠️ {}: columns not present, nothing dropped: {}",
                    SOURCE_NAME,
                    missing.join(", ")
                );
            }
        }

        if frame.is_empty() {
            query
                .if_empty
                .handle(&format!("{} '{}'", SOURCE_NAME, query.source))?;
            return Ok(Frame::new());
        }

        add_ingestion_metadata(&mut frame, SOURCE_NAME, Utc::now());
        Ok(frame)
    }
}

/// Rows of one page. The product endpoint returns an object keyed by id
/// instead of an array; each inner object is one row.
fn page_rows(data: Value) -> Frame {
    match data {
        Value::Array(items) => Frame::from_json_rows(items),
        Value::Object(obj) if !obj.is_empty() && obj.values().all(Value::is_object) => {
            Frame::from_json_rows(obj.into_iter().map(|(_, v)| v))
        }
        Value::Object(obj) if obj.is_empty() => Frame::new(),
        Value::Object(obj) => Frame::from_json_rows([Value::Object(obj)]),
        Value::Null => Frame::new(),
        other => Frame::from_json_rows([other]),
    }
}
