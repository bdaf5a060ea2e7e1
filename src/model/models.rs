use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Deserializer};

use crate::model::apperror::{ApplicationError, ErrorType};

/**
 * Lowest accepted temperature in degrees Celsius.
 */
pub const TEMPERATURE_MIN: f64 = -80.0;

/**
 * Highest accepted temperature in degrees Celsius.
 */
pub const TEMPERATURE_MAX: f64 = 60.0;

/**
 * Lowest accepted relative humidity in percent.
 */
pub const HUMIDITY_MIN: f64 = 0.0;

/**
 * Highest accepted relative humidity in percent.
 */
pub const HUMIDITY_MAX: f64 = 100.0;

/***************** Weather record models *********************/

/**
 * A stored weather observation.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRecordType {
    pub id: i64,
    pub city: String,
    pub date: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: Option<f64>,
    pub description: Option<String>,
}

impl WeatherRecordType {
    /**
     * Creates a new instance of WeatherRecordType.
     */
    pub fn new(id: i64, city: String, date: DateTime<Utc>, temperature: f64, humidity: f64, wind_speed: Option<f64>, description: Option<String>) -> Self {
        WeatherRecordType { id, city, date, temperature, humidity, wind_speed, description }
    }

    /**
     * Applies the supplied fields of a partial update to this record.
     * Fields marked as unchanged keep their current value. Id, city and date are never touched.
     *
     * # Arguments
     * `update`: The partial update to apply.
     *
     * # Returns
     * The merged record.
     */
    pub fn merge(self, update: RecordUpdateInputType) -> Self {
        WeatherRecordType {
            temperature: update.temperature.apply(self.temperature),
            humidity: update.humidity.apply(self.humidity),
            wind_speed: update.wind_speed.apply(self.wind_speed),
            description: update.description.apply(self.description),
            ..self
        }
    }
}

/**
 * Input for creating a weather record.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct RecordAddInputType {
    pub city: String,
    /**
     * Observation time. The store uses the current time when absent.
     */
    pub date: Option<DateTime<Utc>>,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: Option<f64>,
    pub description: Option<String>,
}

impl RecordAddInputType {
    /**
     * Validates the input before it is handed to the store.
     *
     * # Returns
     * The validated input or a validation error naming the offending field.
     */
    pub fn validate(self) -> Result<Self, ApplicationError> {
        if self.city.trim().is_empty() {
            return Err(ApplicationError::new(ErrorType::Validation, "City must not be empty".to_string()));
        }
        validate_temperature(self.temperature)?;
        validate_humidity(self.humidity)?;
        Ok(self)
    }
}

/**
 * Input for a partial update of a weather record.
 */
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdateInputType {
    pub temperature: Patch<f64>,
    pub humidity: Patch<f64>,
    pub wind_speed: Patch<Option<f64>>,
    pub description: Patch<Option<String>>,
}

impl RecordUpdateInputType {
    /**
     * Validates only the fields present in the update.
     *
     * # Returns
     * The validated input or a validation error naming the offending field.
     */
    pub fn validate(self) -> Result<Self, ApplicationError> {
        if let Patch::Set(temperature) = self.temperature {
            validate_temperature(temperature)?;
        }
        if let Patch::Set(humidity) = self.humidity {
            validate_humidity(humidity)?;
        }
        Ok(self)
    }
}

/**
 * A single field of a partial update. Either left as is, or set to a new value.
 *
 * For nullable columns `Patch<Option<T>>` is used, where `Set(None)` clears the value.
 */
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Unchanged,
    Set(T),
}

impl<T> Patch<T> {
    /**
     * Returns the new value if set, otherwise the current one.
     */
    pub fn apply(self, current: T) -> T {
        match self {
            Patch::Unchanged => current,
            Patch::Set(value) => value,
        }
    }
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unchanged
    }
}

/**
 * A field that is present in the payload is always `Set`. Missing fields fall back to
 * `Default` and must therefore be annotated with `#[serde(default)]`.
 */
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Patch::Set)
    }
}

/**
 * Mean value of a column across all records for one city.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct CityAverageType {
    pub city: String,
    pub value: f64,
}

impl CityAverageType {
    pub fn new(city: String, value: f64) -> Self {
        CityAverageType { city, value }
    }
}

/***************** Validation *********************/

/**
 * Checks that a temperature lies within the accepted range (inclusive).
 */
pub fn validate_temperature(temperature: f64) -> Result<f64, ApplicationError> {
    if !(TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&temperature) {
        return Err(ApplicationError::new(ErrorType::Validation, "Temperature must be between -80°C and 60°C".to_string()));
    }
    Ok(temperature)
}

/**
 * Checks that a humidity lies within the accepted range (inclusive).
 */
pub fn validate_humidity(humidity: f64) -> Result<f64, ApplicationError> {
    if !(HUMIDITY_MIN..=HUMIDITY_MAX).contains(&humidity) {
        return Err(ApplicationError::new(ErrorType::Validation, "Humidity must be between 0% and 100%".to_string()));
    }
    Ok(humidity)
}

/***************** Date filter *********************/

/**
 * Parses a timestamp given either as RFC 3339 or as a naive date time, which is read as UTC.
 * Date and time may be separated by `T` or a single space.
 */
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim().replacen(' ', "T", 1);
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(&value) {
        return Some(timestamp.with_timezone(&Utc));
    }
    value.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc())
}

/**
 * Date given as a path parameter when looking up records.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    /**
     * An exact point in time.
     */
    Instant(DateTime<Utc>),
    /**
     * A whole calendar day in UTC.
     */
    Day(NaiveDate),
}

impl DateFilter {
    /**
     * Returns the inclusive range of timestamps matched by this filter.
     * An instant matches only itself, a day matches from midnight up to the last microsecond of the day.
     */
    pub fn range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            DateFilter::Instant(instant) => (*instant, *instant),
            DateFilter::Day(day) => {
                let start = day.and_time(NaiveTime::MIN).and_utc();
                let end = start.checked_add_signed(TimeDelta::days(1) - TimeDelta::microseconds(1)).unwrap_or(DateTime::<Utc>::MAX_UTC);
                (start, end)
            }
        }
    }

    /**
     * Returns the single timestamp this filter denotes. A day denotes its midnight.
     */
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            DateFilter::Instant(instant) => *instant,
            DateFilter::Day(day) => day.and_time(NaiveTime::MIN).and_utc(),
        }
    }
}

impl FromStr for DateFilter {
    type Err = ApplicationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Some(timestamp) = parse_timestamp(value) {
            return Ok(DateFilter::Instant(timestamp));
        }
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(DateFilter::Day)
            .map_err(|err| ApplicationError::new(ErrorType::Validation, format!("Invalid date {value}: {err}")))
    }
}

impl fmt::Display for DateFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DateFilter::Instant(instant) if instant.nanosecond() == 0 => write!(f, "{}", instant.format("%Y-%m-%d %H:%M:%S")),
            DateFilter::Instant(instant) => write!(f, "{}", instant.format("%Y-%m-%d %H:%M:%S%.6f")),
            DateFilter::Day(day) => write!(f, "{}", day.format("%Y-%m-%d")),
        }
    }
}

/***************** Common models *********************/

/**
 * Offset based pagination input.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationInput {
    /**
     * Number of records to skip.
     */
    pub skip: i64,
    /**
     * Maximum number of records to return.
     */
    pub limit: i64,
}

impl PaginationInput {
    pub fn new(skip: i64, limit: i64) -> Self {
        PaginationInput { skip, limit }
    }

    /**
     * Validates that both skip and limit are non-negative.
     */
    pub fn validate(self) -> Result<Self, ApplicationError> {
        if self.skip < 0 {
            return Err(ApplicationError::new(ErrorType::Validation, "Skip must not be negative".to_string()));
        }
        if self.limit < 0 {
            return Err(ApplicationError::new(ErrorType::Validation, "Limit must not be negative".to_string()));
        }
        Ok(self)
    }
}
