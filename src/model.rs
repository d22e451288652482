//! Data model shared by all temperature sources.
//!
//! A source produces either finished daily records directly, or sub-daily
//! samples that are collapsed into one record per calendar date by
//! [`aggregate_daily`].

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// One daily-average outdoor temperature, in degrees Celsius.
///
/// This is the universal currency of the pipeline: every source reduces
/// its page structure to a list of these, and the saver consumes them.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureRecord {
    /// The sampling day, in the territory's local calendar.
    pub date: NaiveDate,
    /// Daily-average temperature in °C.
    pub temperature: f64,
}

/// A sub-daily temperature sample in territory-local time.
///
/// Only the JSON-API source produces these; the other sources report one
/// value per day and never go through aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureSample {
    /// Local sample time (UTC timestamp plus the territory's offset).
    pub time: NaiveDateTime,
    /// Measured temperature in °C.
    pub value: f64,
}

/// Collapses sub-daily samples into one record per calendar date.
///
/// Each output record carries the arithmetic mean of that date's sample
/// values. Output is sorted by date ascending.
pub fn aggregate_daily(samples: Vec<TemperatureSample>) -> Vec<TemperatureRecord> {
    let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();

    for sample in samples {
        by_date.entry(sample.time.date()).or_default().push(sample.value);
    }

    by_date
        .into_iter()
        .map(|(date, values)| TemperatureRecord {
            date,
            temperature: values.iter().sum::<f64>() / values.len() as f64,
        })
        .collect()
}
