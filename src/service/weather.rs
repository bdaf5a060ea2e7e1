use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, pool::PoolConnection};
use tracing::instrument;

use crate::{
    dao::weather::WeatherDao,
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{CityAverageType, PaginationInput, RecordAddInputType, RecordUpdateInputType, WeatherRecordType},
    },
};

/**
 * Represents the service for managing weather records.
 */
pub struct WeatherService {
    /**
     * The DAO for weather record operations.
     */
    weather_dao: WeatherDao,
    /**
     * Optional connection pool for database operations. Optional for test purposes until we have a better way to mock the database.
     */
    connection_pool: Option<Pool<Postgres>>,
}

impl WeatherService {
    /**
     * Creates a new instance of `WeatherService`.
     *
     * # Arguments
     * `weather_dao`: The DAO for weather record operations.
     * `connection_pool`: Optional connection pool for database operations.
     *
     * # Returns
     * A new instance of `WeatherService`.
     */
    pub fn new(weather_dao: WeatherDao, connection_pool: Option<Pool<Postgres>>) -> Self {
        WeatherService { weather_dao, connection_pool }
    }

    /**
     * Creates the database schema if it is missing.
     */
    pub async fn init_schema(&self) -> Result<(), ApplicationError> {
        let mut connection = self.acquire().await?;
        self.weather_dao.init_schema(&mut connection).await
    }

    /**
     * Retrieves a record by id.
     */
    #[instrument(skip(self))]
    pub async fn get_record(&self, record_id: i64) -> Result<Option<WeatherRecordType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.weather_dao.get_record(&mut connection, record_id).await
    }

    /**
     * Retrieves a page of records.
     */
    #[instrument(skip(self))]
    pub async fn list_records(&self, pagination_input: PaginationInput) -> Result<Vec<WeatherRecordType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.weather_dao.list_records(&mut connection, pagination_input).await
    }

    /**
     * Retrieves all records for a city.
     */
    #[instrument(skip(self))]
    pub async fn list_records_by_city(&self, city: &str) -> Result<Vec<WeatherRecordType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.weather_dao.list_records_by_city(&mut connection, city).await
    }

    /**
     * Retrieves all records dated within the inclusive range.
     */
    #[instrument(skip(self))]
    pub async fn list_records_by_date_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<WeatherRecordType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.weather_dao.list_records_by_date_range(&mut connection, start, end).await
    }

    /**
     * Retrieves all records for a city at an exact timestamp.
     */
    #[instrument(skip(self))]
    pub async fn list_records_by_city_and_date(&self, city: &str, date: DateTime<Utc>) -> Result<Vec<WeatherRecordType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.weather_dao.list_records_by_city_and_date(&mut connection, city, date).await
    }

    /**
     * Adds a new record.
     *
     * # Arguments
     * `record_add_input`: The validated record fields.
     *
     * # Returns
     * The stored record including id and date.
     */
    #[instrument(skip(self))]
    pub async fn create_record(&self, record_add_input: RecordAddInputType) -> Result<WeatherRecordType, ApplicationError> {
        let mut transaction = self.begin().await?;
        match self.weather_dao.create_record(&mut transaction, record_add_input).await {
            Ok(record) => {
                transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?;
                Ok(record)
            }
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                Err(err)
            }
        }
    }

    /**
     * Applies a partial update to a record.
     *
     * # Arguments
     * `record_id`: The id of the record to update.
     * `record_update_input`: The validated partial update.
     *
     * # Returns
     * The updated record, or `None` if it does not exist.
     */
    #[instrument(skip(self))]
    pub async fn update_record(&self, record_id: i64, record_update_input: RecordUpdateInputType) -> Result<Option<WeatherRecordType>, ApplicationError> {
        let mut transaction = self.begin().await?;
        match self.weather_dao.update_record(&mut transaction, record_id, record_update_input).await {
            Ok(Some(record)) => {
                transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?;
                Ok(Some(record))
            }
            Ok(None) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                Ok(None)
            }
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                Err(err)
            }
        }
    }

    /**
     * Deletes a record.
     *
     * # Returns
     * `true` if the record existed and was deleted.
     */
    #[instrument(skip(self))]
    pub async fn delete_record(&self, record_id: i64) -> Result<bool, ApplicationError> {
        let mut transaction = self.begin().await?;
        match self.weather_dao.delete_record(&mut transaction, record_id).await {
            Ok(deleted) => {
                transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?;
                Ok(deleted)
            }
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                Err(err)
            }
        }
    }

    /**
     * Computes the average temperature for a city.
     */
    #[instrument(skip(self))]
    pub async fn average_temperature(&self, city: &str) -> Result<Option<CityAverageType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.weather_dao.average_temperature(&mut connection, city).await
    }

    /**
     * Computes the average humidity for a city.
     */
    #[instrument(skip(self))]
    pub async fn average_humidity(&self, city: &str) -> Result<Option<CityAverageType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.weather_dao.average_humidity(&mut connection, city).await
    }

    fn pool(&self) -> Result<&Pool<Postgres>, ApplicationError> {
        self.connection_pool.as_ref().ok_or_else(|| ApplicationError::new(ErrorType::DatabaseError, "No database connection available".to_string()))
    }

    async fn acquire(&self) -> Result<PoolConnection<Postgres>, ApplicationError> {
        self.pool()?.acquire().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to acquire connection: {err}")))
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, Postgres>, ApplicationError> {
        self.pool()?.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[actix_web::test]
    async fn test_without_pool_reports_database_error() {
        let weather_service = WeatherService::new(WeatherDao::new(), None);
        let err = weather_service.get_record(1).await.unwrap_err();
        assert_eq!(err.error_type, ErrorType::DatabaseError);
        assert_eq!(err.message, "No database connection available");
        let err = weather_service.delete_record(1).await.unwrap_err();
        assert_eq!(err.error_type, ErrorType::DatabaseError);
    }
}
