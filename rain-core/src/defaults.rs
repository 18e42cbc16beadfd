//! Reference values used to fill fields the caller left empty.

use crate::model::{RainToday, WeatherRecord};

/// A complete record of fallback values. Every field is present.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultConfig {
    reference: WeatherRecord,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            reference: WeatherRecord {
                location: Some("Sydney".to_string()),
                min_temp: Some(12.0),
                max_temp: Some(23.0),
                rainfall: Some(0.0),
                evaporation: Some(3.2),
                sunshine: Some(9.8),
                wind_gust_dir: Some("NW".to_string()),
                wind_gust_speed: Some(39.0),
                wind_dir_9am: Some("WNW".to_string()),
                wind_dir_3pm: Some("WNW".to_string()),
                wind_speed_9am: Some(13.0),
                wind_speed_3pm: Some(19.0),
                humidity_9am: Some(70.0),
                humidity_3pm: Some(52.0),
                pressure_9am: Some(1010.0),
                pressure_3pm: Some(1010.0),
                cloud_9am: Some(5),
                cloud_3pm: Some(5),
                temp_9am: Some(20.0),
                temp_3pm: Some(22.0),
                rain_today: Some(RainToday::Code(0)),
            },
        }
    }
}

impl DefaultConfig {
    /// Built-in reference values with the given overrides layered on top.
    pub fn with_overrides(overrides: &WeatherRecord) -> Self {
        let base = Self::default();
        Self { reference: merge(overrides.clone(), &base.reference) }
    }

    pub fn reference(&self) -> &WeatherRecord {
        &self.reference
    }

    /// Fill every absent field of `record`. Present values, zero included, are kept.
    pub fn fill(&self, record: WeatherRecord) -> WeatherRecord {
        merge(record, &self.reference)
    }

    pub fn fill_all(&self, records: Vec<WeatherRecord>) -> Vec<WeatherRecord> {
        records.into_iter().map(|record| self.fill(record)).collect()
    }
}

fn merge(record: WeatherRecord, fallback: &WeatherRecord) -> WeatherRecord {
    let d = fallback;
    WeatherRecord {
        location: record.location.or_else(|| d.location.clone()),
        min_temp: record.min_temp.or(d.min_temp),
        max_temp: record.max_temp.or(d.max_temp),
        rainfall: record.rainfall.or(d.rainfall),
        evaporation: record.evaporation.or(d.evaporation),
        sunshine: record.sunshine.or(d.sunshine),
        wind_gust_dir: record.wind_gust_dir.or_else(|| d.wind_gust_dir.clone()),
        wind_gust_speed: record.wind_gust_speed.or(d.wind_gust_speed),
        wind_dir_9am: record.wind_dir_9am.or_else(|| d.wind_dir_9am.clone()),
        wind_dir_3pm: record.wind_dir_3pm.or_else(|| d.wind_dir_3pm.clone()),
        wind_speed_9am: record.wind_speed_9am.or(d.wind_speed_9am),
        wind_speed_3pm: record.wind_speed_3pm.or(d.wind_speed_3pm),
        humidity_9am: record.humidity_9am.or(d.humidity_9am),
        humidity_3pm: record.humidity_3pm.or(d.humidity_3pm),
        pressure_9am: record.pressure_9am.or(d.pressure_9am),
        pressure_3pm: record.pressure_3pm.or(d.pressure_3pm),
        cloud_9am: record.cloud_9am.or(d.cloud_9am),
        cloud_3pm: record.cloud_3pm.or(d.cloud_3pm),
        temp_9am: record.temp_9am.or(d.temp_9am),
        temp_3pm: record.temp_3pm.or(d.temp_3pm),
        rain_today: record.rain_today.or_else(|| d.rain_today.clone()),
    }
}
