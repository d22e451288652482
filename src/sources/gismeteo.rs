//! Tabular-diary source: gismeteo.ru weather diary.
//!
//! The diary serves one HTML table per city and month. Each day's row
//! carries two temperature cells (morning and evening observations); the
//! daily value reported by this reader is their arithmetic mean.
//!
//! City resolution uses an embedded `NAME CODE` table; a numeric city
//! argument is taken as the code directly.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use reqwest::Client as HttpClient;
use tracing::{info, warn};

use crate::error::{ImportError, ParseError};
use crate::model::TemperatureRecord;
use crate::sources::TemperatureReader;

const BASE_URL: &str = "https://www.gismeteo.ru";

/// Embedded city-to-code table, one `NAME CODE` pair per line.
const CITY_CODES: &str = include_str!("gismeteo_cities.txt");

pub struct GisMeteoReader {
    http_client: HttpClient,
    base_url: String,
}

impl GisMeteoReader {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    /// Creates a reader against a non-default base URL. Used by tests to
    /// point the reader at a local mock server.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url: base_url.into(),
        }
    }

    async fn get_page(&self, path: &str) -> Result<String, ImportError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|err| ImportError::fetch(&url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImportError::fetch(&url, format!("status {status}")));
        }

        response
            .text()
            .await
            .map_err(|err| ImportError::fetch(&url, err))
    }
}

impl Default for GisMeteoReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TemperatureReader for GisMeteoReader {
    async fn read_temperatures(
        &self,
        city: &str,
        _utc_offset: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TemperatureRecord>, ImportError> {
        let city_code = resolve_city(city)?;

        let mut records = Vec::new();
        let mut month_pages: HashMap<(i32, u32), String> = HashMap::new();

        let mut date = from;
        while date < to {
            info!("reading temperature for {date}");

            let key = (date.year(), date.month());
            if !month_pages.contains_key(&key) {
                let page = self
                    .get_page(&format!("/diary/{}/{}/{}", city_code, key.0, key.1))
                    .await?;
                month_pages.insert(key, page);
            }
            // Just inserted above when absent.
            let page = &month_pages[&key];

            match find_day_temperature(date.day(), page)? {
                Some(temperature) => records.push(TemperatureRecord { date, temperature }),
                None => warn!("temperature cells for {date} could not be parsed, skipping"),
            }

            date = date + Duration::days(1);
        }

        Ok(records)
    }
}

/// Maps a city argument to a diary location code.
///
/// A numeric argument is the code itself; anything else is looked up in
/// the embedded table after uppercase normalization. Zero matches and
/// multiple matches are both resolution failures.
fn resolve_city(city: &str) -> Result<i64, ImportError> {
    if let Ok(code) = city.parse::<i64>() {
        return Ok(code);
    }

    let normalized = city.to_uppercase();
    let codes = parse_city_codes(CITY_CODES);

    match codes.get(&normalized).map(Vec::as_slice) {
        None | Some([]) => Err(ImportError::resolution(format!(
            "no city code found for '{city}'"
        ))),
        Some([code]) => Ok(*code),
        Some(_) => Err(ImportError::resolution(format!(
            "multiple city codes found for '{city}', pass the site's numeric code instead"
        ))),
    }
}

/// Parses `NAME CODE` lines into an uppercase-name lookup.
fn parse_city_codes(raw: &str) -> HashMap<String, Vec<i64>> {
    let pattern = Regex::new(r"^(?P<name>.+)\s(?P<code>[0-9]+)$").expect("hardcoded pattern");

    let mut result: HashMap<String, Vec<i64>> = HashMap::new();
    for line in raw.lines() {
        let Some(captures) = pattern.captures(line.trim()) else {
            continue;
        };
        let Ok(code) = captures["code"].parse::<i64>() else {
            continue;
        };
        let name = captures["name"].trim().to_uppercase();
        result.entry(name).or_default().push(code);
    }
    result
}

/// Locates the diary row for a day-of-month and averages its two
/// temperature cells.
///
/// A row that cannot be located at all is a hard parse failure; cells
/// that are present but not numeric make the day unavailable (`None`),
/// which callers treat as a soft per-day skip.
fn find_day_temperature(day: u32, page: &str) -> Result<Option<f64>, ParseError> {
    let pattern = Regex::new(&format!(
        r"<td\sclass=first>{day}</td>[\w\s]+<td\sclass=.+>(.+)</td>\s+<td>.+</td>\s+<td>.+\s.+\s.+\s+<td\sclass=.+>(.+)</td>"
    ))
    .expect("hardcoded pattern");

    let captures = pattern
        .captures(page)
        .ok_or_else(|| ParseError::pattern_miss(format!("diary row for day {day}")))?;

    let first = parse_cell(&captures[1]);
    let second = parse_cell(&captures[2]);

    match (first, second) {
        (Some(a), Some(b)) => Ok(Some((a + b) / 2.0)),
        _ => Ok(None),
    }
}

/// Parses one temperature cell, tolerating a `,` decimal separator.
fn parse_cell(text: &str) -> Option<f64> {
    text.trim().replace(',', ".").parse::<f64>().ok()
}
