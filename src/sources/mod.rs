//! Weather site readers.
//!
//! Each source reduces one site's page structure to a uniform list of
//! [`TemperatureRecord`]s for a requested city and date window. All three
//! readers use the half-open window `[from, to)` and return at most one
//! record per date, sorted ascending.

pub mod gismeteo;
pub mod meteoinfo;
pub mod pogodaiklimat;

use async_trait::async_trait;
use chrono::NaiveDate;
use clap::ValueEnum;

use crate::error::ImportError;
use crate::model::TemperatureRecord;

/// Weather site to import temperatures from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImportSource {
    /// meteoinfo.ru (hourly JSON archive, aggregated to daily means)
    #[value(name = "meteoinfo")]
    MeteoInfo,
    /// pogodaiklimat.ru (monthly observation tables)
    #[value(name = "pogodaiklimat")]
    PogodaIKlimat,
    /// gismeteo.ru (per-month weather diary tables)
    #[value(name = "gismeteo")]
    GisMeteo,
}

/// Reads daily-average temperatures for one city from a weather site.
///
/// `utc_offset` is the destination territory's offset from UTC in whole
/// hours; sources reporting UTC timestamps apply it before deciding
/// whether a sample falls inside `[from, to)`.
#[async_trait]
pub trait TemperatureReader {
    async fn read_temperatures(
        &self,
        city: &str,
        utc_offset: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TemperatureRecord>, ImportError>;
}

/// Creates the reader for the selected source.
pub fn create_reader(source: ImportSource) -> Box<dyn TemperatureReader> {
    match source {
        ImportSource::MeteoInfo => Box::new(meteoinfo::MeteoInfoReader::new()),
        ImportSource::PogodaIKlimat => Box::new(pogodaiklimat::PogodaIKlimatReader::new()),
        ImportSource::GisMeteo => Box::new(gismeteo::GisMeteoReader::new()),
    }
}
