//! Paginated-monthly-table source: pogodaiklimat.ru monitoring pages.
//!
//! The site serves one observation table per city and month; each row
//! holds the day-of-month and the mean daily temperature, which may be
//! empty when no observation exists for that day.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use reqwest::Client as HttpClient;
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::error::ImportError;
use crate::model::TemperatureRecord;
use crate::sources::TemperatureReader;

const BASE_URL: &str = "http://www.pogodaiklimat.ru";

const CITY_LIST_PATH: &str = "/monitor.php";

pub struct PogodaIKlimatReader {
    http_client: HttpClient,
    base_url: String,
}

impl PogodaIKlimatReader {
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

    async fn get_page(&self, path_and_query: &str) -> Result<String, ImportError> {
        let url = format!("{}{}", self.base_url, path_and_query);
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

    async fn resolve_city(&self, city: &str) -> Result<String, ImportError> {
        let content = self.get_page(CITY_LIST_PATH).await?;
        parse_city_id(city, &content)
    }
}

impl Default for PogodaIKlimatReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TemperatureReader for PogodaIKlimatReader {
    async fn read_temperatures(
        &self,
        city: &str,
        _utc_offset: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TemperatureRecord>, ImportError> {
        let city_id = self.resolve_city(city).await?;

        let mut records = Vec::new();
        let mut loaded_month: Option<(i32, u32)> = None;
        let mut month_temperatures: HashMap<NaiveDate, f64> = HashMap::new();

        // The month table is re-fetched for the month of the date being
        // processed, so windows crossing a month boundary read each
        // month's own page.
        let mut date = from;
        while date < to {
            let key = (date.year(), date.month());
            if loaded_month != Some(key) {
                info!("loading month table for {}-{:02}", key.0, key.1);
                let content = self
                    .get_page(&format!(
                        "{}?id={}&month={}&year={}",
                        CITY_LIST_PATH, city_id, key.1, key.0
                    ))
                    .await?;
                month_temperatures = parse_month_table(key.0, key.1, &content);
                loaded_month = Some(key);
            }

            if let Some(&temperature) = month_temperatures.get(&date) {
                records.push(TemperatureRecord { date, temperature });
            }

            date = date + Duration::days(1);
        }

        Ok(records)
    }
}

/// Finds the city's numeric id in the monitoring index page.
///
/// The index lists cities as links inside `li.big-blue-billet__list_link`
/// elements; the match is on the link's visible text, case-insensitively.
fn parse_city_id(city: &str, content: &str) -> Result<String, ImportError> {
    let document = Html::parse_document(content);
    let selector =
        Selector::parse("li.big-blue-billet__list_link > a").expect("hardcoded selector");
    let id_pattern = Regex::new(r"id=(?P<id>[0-9]+)").expect("hardcoded pattern");

    let wanted = city.to_uppercase();

    for link in document.select(&selector) {
        let text = link.text().collect::<String>();
        if text.trim().to_uppercase() != wanted {
            continue;
        }
        if let Some(captures) = link
            .value()
            .attr("href")
            .and_then(|href| id_pattern.captures(href))
        {
            return Ok(captures["id"].to_string());
        }
    }

    Err(ImportError::resolution(format!(
        "no monitoring page found for city '{city}'"
    )))
}

/// Scans a month page line by line and builds a `date -> temperature` map.
///
/// Rows with an empty temperature cell contribute no entry; that day
/// simply has no record. Day numbers that do not form a valid date for
/// the month are ignored.
fn parse_month_table(year: i32, month: u32, content: &str) -> HashMap<NaiveDate, f64> {
    let pattern = Regex::new(
        r#"<td>(?P<day>[0-9]+)</td><td class="blue-color">.*?</td><td class="green-color">(?P<temperature>[\+\-\.0-9]*)</td><td class="red-color">.*?</td>"#,
    )
    .expect("hardcoded pattern");

    let mut result = HashMap::new();

    for line in content.lines() {
        let Some(captures) = pattern.captures(line.trim()) else {
            continue;
        };

        let raw_temperature = &captures["temperature"];
        if raw_temperature.is_empty() {
            continue;
        }

        let Ok(day) = captures["day"].parse::<u32>() else {
            continue;
        };
        let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
            continue;
        };

        match raw_temperature.parse::<f64>() {
            Ok(temperature) => {
                result.insert(date, temperature);
            }
            Err(_) => warn!("unparsable temperature '{raw_temperature}' for day {day}, skipping"),
        }
    }

    result
}
