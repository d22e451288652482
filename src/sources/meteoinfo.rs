//! Timestamped-JSON-API source: meteoinfo.ru hourly observation archive.
//!
//! The archive answers POST requests with a five-element JSON array:
//! `[locality, data label, available timestamps, requested data, city
//! options]`. Reading a city takes three steps: resolve the city id from
//! the options list, enumerate the available UTC timestamps, then fetch
//! each timestamp that falls inside the window. The per-timestamp samples
//! are collapsed into daily means.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use reqwest::Client as HttpClient;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ImportError, ParseError};
use crate::model::{aggregate_daily, TemperatureRecord, TemperatureSample};
use crate::sources::TemperatureReader;

const BASE_URL: &str = "https://meteoinfo.ru";

const ARCHIVE_PATH: &str = "/hmc-output/observ/obs_arch.php";

const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M";

pub struct MeteoInfoReader {
    http_client: HttpClient,
    base_url: String,
}

impl MeteoInfoReader {
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

    /// Issues one archive POST and returns the five-element response
    /// array. `data_id` of `"0"` asks for the timestamp list only.
    async fn post(&self, city_id: &str, data_id: &str) -> Result<Vec<Value>, ImportError> {
        let url = format!("{}{}", self.base_url, ARCHIVE_PATH);
        let params = [
            ("lang", "ru-RU"),
            ("id_city", city_id),
            ("dt", data_id),
            ("has_db", "1"),
            ("dop", "42"),
        ];

        let response = self
            .http_client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|err| ImportError::fetch(&url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImportError::fetch(&url, format!("status {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|err| ImportError::fetch(&url, err))?;

        let array: Vec<Value> = serde_json::from_str(&body).map_err(|err| {
            ImportError::Parse(ParseError::UnexpectedStructure(format!(
                "archive response is not a JSON array: {err}"
            )))
        })?;

        if array.len() < 5 {
            return Err(ImportError::Parse(ParseError::UnexpectedStructure(
                format!("archive response has {} elements, expected 5", array.len()),
            )));
        }

        Ok(array)
    }

    async fn resolve_city(&self, city: &str) -> Result<String, ImportError> {
        let array = self.post("0", "0").await?;
        let options = parse_options(&element_text(&array[4]));

        let wanted = city.to_uppercase();
        options
            .into_iter()
            .find(|(_, name)| name.to_uppercase().contains(&wanted))
            .map(|(url_part, _)| url_part)
            .ok_or_else(|| ImportError::resolution(format!("city '{city}' not found on the site")))
    }
}

impl Default for MeteoInfoReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TemperatureReader for MeteoInfoReader {
    async fn read_temperatures(
        &self,
        city: &str,
        utc_offset: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TemperatureRecord>, ImportError> {
        let city_id = self.resolve_city(city).await?;
        info!("resolved city id '{city_id}'");

        let array = self.post(&city_id, "0").await?;
        let timestamps = parse_timestamps(&element_text(&array[2]));
        info!("site lists {} timestamps", timestamps.len());

        let mut samples = Vec::new();

        for (utc_time, data_id) in &timestamps {
            // Site timestamps are UTC; the territory offset converts them
            // to the local calendar before the window check.
            let local_time = *utc_time + Duration::hours(utc_offset);
            let local_date = local_time.date();
            if local_date < from || local_date >= to {
                continue;
            }

            let response = self.post(&city_id, data_id).await?;

            let echoed = strip_brackets(&element_text(&response[1]));
            if echoed != *data_id {
                warn!("no data for {local_time}: got data id '{echoed}', expected '{data_id}'");
                continue;
            }

            match extract_temperature(&element_text(&response[3]))? {
                Some(value) => {
                    info!("got temperature for {local_time} ({value})");
                    samples.push(TemperatureSample {
                        time: local_time,
                        value,
                    });
                }
                None => warn!("temperature for {local_time} could not be parsed, skipping"),
            }
        }

        Ok(aggregate_daily(samples))
    }
}

/// Flattens one response element to text. Elements arrive either as a
/// plain string, or as a single-element array wrapping the string.
fn element_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(element_text).collect::<Vec<_>>().join(""),
        other => other.to_string(),
    }
}

fn strip_brackets(text: &str) -> String {
    text.replace(['[', ']'], "").trim().to_string()
}

/// Parses `<option value="...">name</option>` tags into
/// `(value, visible text)` pairs.
fn parse_options(raw: &str) -> Vec<(String, String)> {
    let fragment = Html::parse_fragment(raw);
    let selector = Selector::parse("option").expect("hardcoded selector");

    fragment
        .select(&selector)
        .filter_map(|option| {
            let value = option.value().attr("value")?.to_string();
            let name = option.text().collect::<String>().trim().to_string();
            Some((value, name))
        })
        .collect()
}

/// Parses the timestamp option list into `UTC time -> opaque data id`.
/// The site labels options day-first (`29-01-2018 22:00`); entries whose
/// text is not such a timestamp are skipped.
fn parse_timestamps(raw: &str) -> BTreeMap<NaiveDateTime, String> {
    parse_options(raw)
        .into_iter()
        .filter_map(|(data_id, text)| {
            NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT)
                .ok()
                .map(|time| (time, data_id))
        })
        .collect()
}

/// Extracts the air temperature from the embedded data table.
///
/// A pattern miss means the table shape changed and is a hard parse
/// failure. A matched value that is not numeric is reported as `None`,
/// which callers treat as a soft per-sample skip.
fn extract_temperature(content: &str) -> Result<Option<f64>, ParseError> {
    let pattern = Regex::new(r"Температура\s+воздуха[^<]*</td><td[^>]*>(?P<temperature>[^<]*)</td>")
        .expect("hardcoded pattern");

    let captures = pattern
        .captures(content)
        .ok_or_else(|| ParseError::pattern_miss("air temperature table row"))?;

    Ok(captures["temperature"].trim().parse::<f64>().ok())
}
