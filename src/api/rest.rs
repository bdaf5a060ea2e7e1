use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::{CityAverageType, Patch, RecordAddInputType, RecordUpdateInputType, WeatherRecordType, parse_timestamp},
};

/***************** Records:add models *********************/

/**
 * Request body for creating a weather record.
 */
#[derive(Debug, Deserialize)]
pub struct RecordAddRequest {
    pub city: String,
    /**
     * Observation time. Accepts RFC 3339 or a naive timestamp read as UTC. Defaults to now.
     */
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub date: Option<DateTime<Utc>>,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: Option<f64>,
    pub description: Option<String>,
}

impl From<RecordAddRequest> for RecordAddInputType {
    fn from(request: RecordAddRequest) -> Self {
        RecordAddInputType {
            city: request.city,
            date: request.date,
            temperature: request.temperature,
            humidity: request.humidity,
            wind_speed: request.wind_speed,
            description: request.description,
        }
    }
}

/***************** Records:update models *********************/

/**
 * Request body for a partial update. Fields left out are not changed.
 */
#[derive(Debug, Deserialize)]
pub struct RecordUpdateRequest {
    #[serde(default)]
    pub temperature: Patch<f64>,
    #[serde(default)]
    pub humidity: Patch<f64>,
    #[serde(default)]
    pub wind_speed: Patch<Option<f64>>,
    #[serde(default)]
    pub description: Patch<Option<String>>,
}

impl From<RecordUpdateRequest> for RecordUpdateInputType {
    fn from(request: RecordUpdateRequest) -> Self {
        RecordUpdateInputType { temperature: request.temperature, humidity: request.humidity, wind_speed: request.wind_speed, description: request.description }
    }
}

/***************** Record response models *********************/

/**
 * Weather record as returned by the API.
 */
#[derive(Debug, Serialize)]
pub struct WeatherRecordResponse {
    pub id: i64,
    pub city: String,
    pub date: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: Option<f64>,
    pub description: Option<String>,
}

impl From<WeatherRecordType> for WeatherRecordResponse {
    fn from(record: WeatherRecordType) -> Self {
        WeatherRecordResponse {
            id: record.id,
            city: record.city,
            date: record.date,
            temperature: record.temperature,
            humidity: record.humidity,
            wind_speed: record.wind_speed,
            description: record.description,
        }
    }
}

/**
 * Converts a list of records into their response form.
 */
pub fn to_response_list(records: Vec<WeatherRecordType>) -> Vec<WeatherRecordResponse> {
    records.into_iter().map(WeatherRecordResponse::from).collect()
}

/**
 * Average temperature of a city.
 */
#[derive(Debug, Serialize)]
pub struct AverageTemperatureResponse {
    pub city: String,
    pub average_temperature: f64,
}

impl From<CityAverageType> for AverageTemperatureResponse {
    fn from(average: CityAverageType) -> Self {
        AverageTemperatureResponse { city: average.city, average_temperature: average.value }
    }
}

/**
 * Average humidity of a city.
 */
#[derive(Debug, Serialize)]
pub struct AverageHumidityResponse {
    pub city: String,
    pub average_humidity: f64,
}

impl From<CityAverageType> for AverageHumidityResponse {
    fn from(average: CityAverageType) -> Self {
        AverageHumidityResponse { city: average.city, average_humidity: average.value }
    }
}

/***************** Error models *********************/

/**
 * Custom error response for the application.
 */
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct ErrorResponse {
    /**
     * The error code associated with the error type.
     */
    pub code: u16,
    /**
     * A human-readable message describing the error.
     */
    pub message: String,
}

impl ResponseError for ApplicationError {
    fn status_code(&self) -> StatusCode {
        get_statuscode(&self.error_type)
    }

    /**
     * Generates an error response for the application error.
     */
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse { code: get_error_code(&self.error_type), message: self.message.clone() };
        HttpResponse::build(self.status_code()).json(&error_response)
    }
}

/**
* Maps application errors to HTTP status codes.
*
* # Arguments
* `application_error`: The type of error that occurred.
*
* # Returns
* The corresponding HTTP status code.
*/
fn get_statuscode(application_error: &ErrorType) -> StatusCode {
    match application_error {
        ErrorType::Initialization => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorType::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorType::NotFound => StatusCode::NOT_FOUND,
        ErrorType::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/**
 * Maps application errors to error codes.
 *
 * # Arguments
 * `application_error`: The type of error that occurred.
 *
 * # Returns
 * The corresponding error code.
 */
fn get_error_code(application_error: &ErrorType) -> u16 {
    match application_error {
        ErrorType::Initialization => 1001,
        ErrorType::Validation => 1002,
        ErrorType::DatabaseError => 1003,
        ErrorType::NotFound => 1004,
    }
}

/***************** Common models *********************/

/**
 * Offset pagination query parameters.
 */
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    /**
     * Number of records to skip.
     */
    pub skip: Option<i64>,
    /**
     * Maximum number of records to return.
     */
    pub limit: Option<i64>,
}

fn deserialize_optional_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let value: Option<String> = Option::deserialize(deserializer)?;
    value
        .map(|value| parse_timestamp(&value).ok_or_else(|| de::Error::custom(format!("invalid timestamp {value}"))))
        .transpose()
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_add_request_defaults() {
        let request: RecordAddRequest = serde_json::from_str(r#"{"city": "Paris", "temperature": 22.5, "humidity": 60}"#).unwrap();
        let input = RecordAddInputType::from(request);
        assert_eq!(input.city, "Paris");
        assert_eq!(input.date, None);
        assert_eq!(input.wind_speed, None);
        assert_eq!(input.description, None);
    }

    #[test]
    fn test_add_request_with_naive_date() {
        let request: RecordAddRequest = serde_json::from_str(r#"{"city": "Paris", "date": "2024-06-01T12:00:00", "temperature": 22.5, "humidity": 60}"#).unwrap();
        assert_eq!(request.date, Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        let request: RecordAddRequest = serde_json::from_str(r#"{"city": "Paris", "date": "2024-06-01 12:00:00", "temperature": 22.5, "humidity": 60}"#).unwrap();
        assert_eq!(request.date, Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
    }

    #[test]
    fn test_add_request_invalid_date() {
        let result = serde_json::from_str::<RecordAddRequest>(r#"{"city": "Paris", "date": "soon", "temperature": 22.5, "humidity": 60}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_add_request_missing_temperature() {
        let result = serde_json::from_str::<RecordAddRequest>(r#"{"city": "Paris", "humidity": 60}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_update_request_partial() {
        let request: RecordUpdateRequest = serde_json::from_str(r#"{"humidity": 70, "description": null, "city": "Ignored"}"#).unwrap();
        let input = RecordUpdateInputType::from(request);
        assert_eq!(input.temperature, Patch::Unchanged);
        assert_eq!(input.humidity, Patch::Set(70.0));
        assert_eq!(input.wind_speed, Patch::Unchanged);
        assert_eq!(input.description, Patch::Set(None));
    }

    #[test]
    fn test_record_response_serialization() {
        let record = WeatherRecordType::new(1, "Paris".to_string(), Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(), 22.5, 60.0, None, Some("Sunny".to_string()));
        let json = serde_json::to_value(WeatherRecordResponse::from(record)).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["city"], "Paris");
        assert_eq!(json["date"], "2024-06-01T12:00:00Z");
        assert_eq!(json["temperature"], 22.5);
        assert_eq!(json["humidity"], 60.0);
        assert!(json["wind_speed"].is_null());
        assert_eq!(json["description"], "Sunny");
    }

    #[test]
    fn test_average_response_serialization() {
        let json = serde_json::to_value(AverageTemperatureResponse::from(CityAverageType::new("Paris".to_string(), 25.0))).unwrap();
        assert_eq!(json, serde_json::json!({"city": "Paris", "average_temperature": 25.0}));
        let json = serde_json::to_value(AverageHumidityResponse::from(CityAverageType::new("Paris".to_string(), 55.0))).unwrap();
        assert_eq!(json, serde_json::json!({"city": "Paris", "average_humidity": 55.0}));
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApplicationError::new(ErrorType::Validation, String::new()).status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApplicationError::new(ErrorType::NotFound, String::new()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApplicationError::new(ErrorType::DatabaseError, String::new()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApplicationError::new(ErrorType::Initialization, String::new()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
