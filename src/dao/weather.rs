use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::{Instrument, instrument};

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::{CityAverageType, PaginationInput, RecordAddInputType, RecordUpdateInputType, WeatherRecordType},
};

/**
 * Database response type for a weather record row.
 */
pub type QueryWeatherRecordDbResp = (i64, String, DateTime<Utc>, f64, f64, Option<f64>, Option<String>);

/**
 * Database response type for a per city average.
 */
pub type QueryCityAverageDbResp = (String, f64);

/**
 * SQL statements creating the weather record table and its lookup indexes.
 */
const CREATE_SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS weather_records (
        id BIGSERIAL PRIMARY KEY,
        city TEXT NOT NULL,
        date TIMESTAMPTZ NOT NULL DEFAULT now(),
        temperature DOUBLE PRECISION NOT NULL,
        humidity DOUBLE PRECISION NOT NULL,
        wind_speed DOUBLE PRECISION,
        description TEXT
    )",
    "CREATE INDEX IF NOT EXISTS weather_records_city_idx ON weather_records (city)",
    "CREATE INDEX IF NOT EXISTS weather_records_date_idx ON weather_records (date)",
];

/**
 * SQL query to retrieve a single record.
 */
const QUERY_RECORD: &str = "SELECT id, city, date, temperature, humidity, wind_speed, description FROM weather_records WHERE id = $1";

/**
 * SQL query to retrieve and lock a single record before it is updated.
 */
const QUERY_RECORD_FOR_UPDATE: &str = "SELECT id, city, date, temperature, humidity, wind_speed, description FROM weather_records WHERE id = $1 FOR UPDATE";

/**
 * SQL query to retrieve a page of records.
 */
const QUERY_RECORD_LIST: &str = "SELECT id, city, date, temperature, humidity, wind_speed, description FROM weather_records ORDER BY id LIMIT $1 OFFSET $2";

/**
 * SQL query to retrieve all records for a city.
 */
const QUERY_RECORDS_BY_CITY: &str = "SELECT id, city, date, temperature, humidity, wind_speed, description FROM weather_records WHERE city = $1 ORDER BY date, id";

/**
 * SQL query to retrieve all records within an inclusive date range.
 */
const QUERY_RECORDS_BY_DATE_RANGE: &str = "SELECT id, city, date, temperature, humidity, wind_speed, description FROM weather_records WHERE date >= $1 AND date <= $2 ORDER BY date, id";

/**
 * SQL query to retrieve all records for a city at an exact timestamp.
 */
const QUERY_RECORDS_BY_CITY_AND_DATE: &str = "SELECT id, city, date, temperature, humidity, wind_speed, description FROM weather_records WHERE city = $1 AND date = $2 ORDER BY id";

/**
 * SQL query to add a record. The date falls back to the current time.
 */
const ADD_RECORD: &str = "INSERT INTO weather_records (city, date, temperature, humidity, wind_speed, description) VALUES ($1, COALESCE($2, now()), $3, $4, $5, $6)
                          RETURNING id, city, date, temperature, humidity, wind_speed, description";

/**
 * SQL query to write back a merged record.
 */
const UPDATE_RECORD: &str = "UPDATE weather_records SET temperature = $1, humidity = $2, wind_speed = $3, description = $4 WHERE id = $5
                             RETURNING id, city, date, temperature, humidity, wind_speed, description";

/**
 * SQL query to delete a record.
 */
const DELETE_RECORD: &str = "DELETE FROM weather_records WHERE id = $1";

/**
 * SQL query for the average temperature of a city.
 */
const QUERY_AVERAGE_TEMPERATURE: &str = "SELECT city, AVG(temperature) FROM weather_records WHERE city = $1 GROUP BY city";

/**
 * SQL query for the average humidity of a city.
 */
const QUERY_AVERAGE_HUMIDITY: &str = "SELECT city, AVG(humidity) FROM weather_records WHERE city = $1 GROUP BY city";

/**
 * DAO for weather record database operations.
 *
 * The DAO performs no validation. Absent rows are reported as `None`/`false`, errors are always infrastructure errors.
 */
pub struct WeatherDao {}

impl WeatherDao {
    /**
     * Creates a new instance of `WeatherDao`.
     *
     * # Returns
     * A new instance of `WeatherDao`.
     */
    pub fn new() -> Self {
        WeatherDao {}
    }

    /**
     * Creates the weather record table and indexes if they do not exist.
     *
     * # Arguments
     * `connection`: The database connection.
     */
    #[instrument(skip(self, connection))]
    pub async fn init_schema(&self, connection: &mut PgConnection) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        for statement in CREATE_SCHEMA {
            sqlx::query(statement)
                .execute(&mut *connection)
                .instrument(span.clone())
                .await
                .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create schema: {err}")))?;
        }
        Ok(())
    }

    /**
     * Retrieves a record by id.
     *
     * # Arguments
     * `connection`: The database connection.
     * `record_id`: The id of the record.
     *
     * # Returns
     * The record, or `None` if it does not exist.
     */
    #[instrument(skip(self, connection))]
    pub async fn get_record(&self, connection: &mut PgConnection, record_id: i64) -> Result<Option<WeatherRecordType>, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryWeatherRecordDbResp> = sqlx::query_as(QUERY_RECORD)
            .bind(record_id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error("get record", &err))?;
        Ok(result.map(WeatherRecordType::from))
    }

    /**
     * Retrieves a page of records ordered by id.
     *
     * # Arguments
     * `connection`: The database connection.
     * `pagination_input`: Number of records to skip and the maximum number to return.
     */
    #[instrument(skip(self, connection))]
    pub async fn list_records(&self, connection: &mut PgConnection, pagination_input: PaginationInput) -> Result<Vec<WeatherRecordType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryWeatherRecordDbResp> = sqlx::query_as(QUERY_RECORD_LIST)
            .bind(pagination_input.limit)
            .bind(pagination_input.skip)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error("list records", &err))?;
        Ok(results.into_iter().map(WeatherRecordType::from).collect())
    }

    /**
     * Retrieves all records for a city. The city must match exactly.
     */
    #[instrument(skip(self, connection))]
    pub async fn list_records_by_city(&self, connection: &mut PgConnection, city: &str) -> Result<Vec<WeatherRecordType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryWeatherRecordDbResp> = sqlx::query_as(QUERY_RECORDS_BY_CITY)
            .bind(city)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error("list records by city", &err))?;
        Ok(results.into_iter().map(WeatherRecordType::from).collect())
    }

    /**
     * Retrieves all records dated between `start` and `end`, both inclusive.
     */
    #[instrument(skip(self, connection))]
    pub async fn list_records_by_date_range(&self, connection: &mut PgConnection, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<WeatherRecordType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryWeatherRecordDbResp> = sqlx::query_as(QUERY_RECORDS_BY_DATE_RANGE)
            .bind(start)
            .bind(end)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error("list records by date range", &err))?;
        Ok(results.into_iter().map(WeatherRecordType::from).collect())
    }

    /**
     * Retrieves all records for a city at exactly the given timestamp.
     */
    #[instrument(skip(self, connection))]
    pub async fn list_records_by_city_and_date(&self, connection: &mut PgConnection, city: &str, date: DateTime<Utc>) -> Result<Vec<WeatherRecordType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryWeatherRecordDbResp> = sqlx::query_as(QUERY_RECORDS_BY_CITY_AND_DATE)
            .bind(city)
            .bind(date)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error("list records by city and date", &err))?;
        Ok(results.into_iter().map(WeatherRecordType::from).collect())
    }

    /**
     * Adds a new record.
     *
     * # Arguments
     * `connection`: The database connection or transaction.
     * `record_add_input`: The validated record fields.
     *
     * # Returns
     * The stored record including the assigned id and date.
     */
    #[instrument(skip(self, connection))]
    pub async fn create_record(&self, connection: &mut PgConnection, record_add_input: RecordAddInputType) -> Result<WeatherRecordType, ApplicationError> {
        let span = tracing::Span::current();
        let result: QueryWeatherRecordDbResp = sqlx::query_as(ADD_RECORD)
            .bind(record_add_input.city)
            .bind(record_add_input.date)
            .bind(record_add_input.temperature)
            .bind(record_add_input.humidity)
            .bind(record_add_input.wind_speed)
            .bind(record_add_input.description)
            .fetch_one(connection)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error("create record", &err))?;
        let record = WeatherRecordType::from(result);
        tracing::debug!("Created record with id {}", record.id);
        Ok(record)
    }

    /**
     * Applies a partial update to an existing record.
     *
     * The row is locked, merged with the supplied fields and written back. Should be called within a transaction.
     *
     * # Arguments
     * `transaction`: The database transaction.
     * `record_id`: The id of the record to update.
     * `record_update_input`: The validated partial update.
     *
     * # Returns
     * The updated record, or `None` if it does not exist.
     */
    #[instrument(skip(self, transaction))]
    pub async fn update_record(&self, transaction: &mut PgConnection, record_id: i64, record_update_input: RecordUpdateInputType) -> Result<Option<WeatherRecordType>, ApplicationError> {
        let span = tracing::Span::current();
        let existing: Option<QueryWeatherRecordDbResp> = sqlx::query_as(QUERY_RECORD_FOR_UPDATE)
            .bind(record_id)
            .fetch_optional(&mut *transaction)
            .instrument(span.clone())
            .await
            .map_err(|err| Self::handle_database_error("lock record", &err))?;
        let Some(existing) = existing else {
            tracing::debug!("Record with id {} not found for update", record_id);
            return Ok(None);
        };
        let merged = WeatherRecordType::from(existing).merge(record_update_input);
        let result: QueryWeatherRecordDbResp = sqlx::query_as(UPDATE_RECORD)
            .bind(merged.temperature)
            .bind(merged.humidity)
            .bind(merged.wind_speed)
            .bind(merged.description)
            .bind(record_id)
            .fetch_one(&mut *transaction)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error("update record", &err))?;
        Ok(Some(WeatherRecordType::from(result)))
    }

    /**
     * Deletes a record by id.
     *
     * # Returns
     * `true` if a record was deleted, `false` if none existed.
     */
    #[instrument(skip(self, transaction))]
    pub async fn delete_record(&self, transaction: &mut PgConnection, record_id: i64) -> Result<bool, ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(DELETE_RECORD)
            .bind(record_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error("delete record", &err))?;
        if result.rows_affected() == 0 {
            tracing::debug!("Record with id {} not found for deletion", record_id);
            return Ok(false);
        }
        Ok(true)
    }

    /**
     * Computes the mean temperature of all records for a city.
     *
     * # Returns
     * The average, or `None` if the city has no records.
     */
    #[instrument(skip(self, connection))]
    pub async fn average_temperature(&self, connection: &mut PgConnection, city: &str) -> Result<Option<CityAverageType>, ApplicationError> {
        self.city_average(connection, QUERY_AVERAGE_TEMPERATURE, city).await
    }

    /**
     * Computes the mean humidity of all records for a city.
     *
     * # Returns
     * The average, or `None` if the city has no records.
     */
    #[instrument(skip(self, connection))]
    pub async fn average_humidity(&self, connection: &mut PgConnection, city: &str) -> Result<Option<CityAverageType>, ApplicationError> {
        self.city_average(connection, QUERY_AVERAGE_HUMIDITY, city).await
    }

    async fn city_average(&self, connection: &mut PgConnection, query: &'static str, city: &str) -> Result<Option<CityAverageType>, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryCityAverageDbResp> = sqlx::query_as(query)
            .bind(city)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error("compute city average", &err))?;
        Ok(result.map(CityAverageType::from))
    }

    /**
     * Maps a sqlx error to an application error.
     *
     * # Arguments
     * `operation`: Short description of the failed operation.
     * `error`: The sqlx error.
     *
     * # Returns
     * An `ApplicationError` of type `DatabaseError`.
     */
    fn handle_database_error(operation: &str, error: &sqlx::Error) -> ApplicationError {
        if let Some(db_error) = error.as_database_error() {
            tracing::error!("Database error during {}: {} ({:?})", operation, db_error, db_error.code());
        } else {
            tracing::error!("Failed to {}: {}", operation, error);
        }
        ApplicationError::new(ErrorType::DatabaseError, format!("Failed to {operation}"))
    }
}

impl From<QueryWeatherRecordDbResp> for WeatherRecordType {
    fn from(row: QueryWeatherRecordDbResp) -> Self {
        WeatherRecordType::new(row.0, row.1, row.2, row.3, row.4, row.5, row.6)
    }
}

impl From<QueryCityAverageDbResp> for CityAverageType {
    fn from(row: QueryCityAverageDbResp) -> Self {
        CityAverageType::new(row.0, row.1)
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_record_from_row() {
        let date = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let row: QueryWeatherRecordDbResp = (7, "Paris".to_string(), date, 22.5, 60.0, None, Some("Sunny".to_string()));
        let record = WeatherRecordType::from(row);
        assert_eq!(record.id, 7);
        assert_eq!(record.city, "Paris");
        assert_eq!(record.date, date);
        assert_eq!(record.temperature, 22.5);
        assert_eq!(record.humidity, 60.0);
        assert_eq!(record.wind_speed, None);
        assert_eq!(record.description.as_deref(), Some("Sunny"));
    }

    #[test]
    fn test_average_from_row() {
        let average = CityAverageType::from(("Paris".to_string(), 25.0));
        assert_eq!(average, CityAverageType::new("Paris".to_string(), 25.0));
    }

    #[test]
    fn test_handle_database_error() {
        let err = WeatherDao::handle_database_error("get record", &sqlx::Error::RowNotFound);
        assert_eq!(err.error_type, ErrorType::DatabaseError);
        assert_eq!(err.message, "Failed to get record");
    }
}
