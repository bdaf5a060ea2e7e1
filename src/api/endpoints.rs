use actix_web::{
    delete, get, post, put, web::{self, Path}, HttpRequest, HttpResponse
};
use tracing::{instrument, Instrument};

use crate::{
    api::{
        rest::{to_response_list, AverageHumidityResponse, AverageTemperatureResponse, PaginationQuery, RecordAddRequest, RecordUpdateRequest, WeatherRecordResponse},
        state::AppState,
    },
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{DateFilter, PaginationInput, RecordAddInputType, RecordUpdateInputType, WeatherRecordType},
    },
};

/**
 * Registers extractor error handling and all record endpoints.
 * Malformed bodies, paths and queries are reported as validation errors.
 */
pub fn configure(config: &mut web::ServiceConfig) {
    config
        .app_data(web::JsonConfig::default().error_handler(|err, _| ApplicationError::new(ErrorType::Validation, format!("Invalid request body: {err}")).into()))
        .app_data(web::PathConfig::default().error_handler(|err, _| ApplicationError::new(ErrorType::Validation, format!("Invalid path parameter: {err}")).into()))
        .app_data(web::QueryConfig::default().error_handler(|err, _| ApplicationError::new(ErrorType::Validation, format!("Invalid query parameter: {err}")).into()))
        .service(record_create)
        .service(records_list)
        .service(records_by_city)
        .service(records_by_date)
        .service(records_by_city_and_date)
        .service(average_temperature)
        .service(average_humidity)
        .service(record_get)
        .service(record_update)
        .service(record_delete);
}

/**
 * Endpoint to create a weather record.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "createRecord", trace_id = get_trace_id(&http_request)))]
#[post("/records/")]
pub async fn record_create(http_request: HttpRequest, request_body: web::Json<RecordAddRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let record_add_input = RecordAddInputType::from(request_body.into_inner()).validate()?;
    let record = app_state.weather_service.create_record(record_add_input).instrument(span).await?;
    Ok(HttpResponse::Created().json(WeatherRecordResponse::from(record)))
}

/**
 * Endpoint to list records page by page.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "listRecords", trace_id = get_trace_id(&http_request)))]
#[get("/records/")]
pub async fn records_list(http_request: HttpRequest, pagination: web::Query<PaginationQuery>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let pagination_input = PaginationInput::new(pagination.skip.unwrap_or(0), pagination.limit.unwrap_or(app_state.default_limit)).validate()?;
    let records = app_state.weather_service.list_records(pagination_input).instrument(span).await?;
    Ok(HttpResponse::Ok().json(to_response_list(records)))
}

/**
 * Endpoint to get a single record.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "getRecord", trace_id = get_trace_id(&http_request)))]
#[get("/records/{recordId}")]
pub async fn record_get(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let record_id = path.into_inner();
    let record = app_state.weather_service.get_record(record_id).instrument(span).await?.ok_or_else(record_not_found)?;
    Ok(HttpResponse::Ok().json(WeatherRecordResponse::from(record)))
}

/**
 * Endpoint to list all records of a city.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "listRecordsByCity", trace_id = get_trace_id(&http_request)))]
#[get("/records/city/{city}")]
pub async fn records_by_city(path: Path<String>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let city = path.into_inner();
    let records = app_state.weather_service.list_records_by_city(&city).instrument(span).await?;
    let records = require_records(records, || "No records found for this city".to_string())?;
    Ok(HttpResponse::Ok().json(to_response_list(records)))
}

/**
 * Endpoint to list all records of a date. A calendar date matches the whole day, a timestamp only that instant.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "listRecordsByDate", trace_id = get_trace_id(&http_request)))]
#[get("/records/date/{date}")]
pub async fn records_by_date(path: Path<String>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let date_filter: DateFilter = path.into_inner().parse()?;
    let (start, end) = date_filter.range();
    let records = app_state.weather_service.list_records_by_date_range(start, end).instrument(span).await?;
    let records = require_records(records, || "No records found for this date".to_string())?;
    Ok(HttpResponse::Ok().json(to_response_list(records)))
}

/**
 * Endpoint to list the records of a city at an exact timestamp.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "listRecordsByCityAndDate", trace_id = get_trace_id(&http_request)))]
#[get("/records/city/{city}/date/{date}")]
pub async fn records_by_city_and_date(path: Path<(String, String)>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let (city, date) = path.into_inner();
    let date_filter: DateFilter = date.parse()?;
    let records = app_state.weather_service.list_records_by_city_and_date(&city, date_filter.instant()).instrument(span).await?;
    let records = require_records(records, || format!("No records found for city {city} on date {date_filter}"))?;
    Ok(HttpResponse::Ok().json(to_response_list(records)))
}

/**
 * Endpoint to partially update a record.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "updateRecord", trace_id = get_trace_id(&http_request)))]
#[put("/records/{recordId}")]
pub async fn record_update(path: Path<i64>, http_request: HttpRequest, request_body: web::Json<RecordUpdateRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let record_id = path.into_inner();
    let record_update_input = RecordUpdateInputType::from(request_body.into_inner()).validate()?;
    let record = app_state.weather_service.update_record(record_id, record_update_input).instrument(span).await?.ok_or_else(record_not_found)?;
    Ok(HttpResponse::Ok().json(WeatherRecordResponse::from(record)))
}

/**
 * Endpoint to delete a record.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "deleteRecord", trace_id = get_trace_id(&http_request)))]
#[delete("/records/{recordId}")]
pub async fn record_delete(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let record_id = path.into_inner();
    if !app_state.weather_service.delete_record(record_id).instrument(span).await? {
        return Err(record_not_found());
    }
    Ok(HttpResponse::NoContent().finish())
}

/**
 * Endpoint for the average temperature of a city.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "averageTemperature", trace_id = get_trace_id(&http_request)))]
#[get("/records/city/{city}/average/temperature")]
pub async fn average_temperature(path: Path<String>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let city = path.into_inner();
    let average = app_state.weather_service.average_temperature(&city).instrument(span).await?.ok_or_else(|| city_not_found(&city))?;
    Ok(HttpResponse::Ok().json(AverageTemperatureResponse::from(average)))
}

/**
 * Endpoint for the average humidity of a city.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "averageHumidity", trace_id = get_trace_id(&http_request)))]
#[get("/records/city/{city}/average/humidity")]
pub async fn average_humidity(path: Path<String>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let city = path.into_inner();
    let average = app_state.weather_service.average_humidity(&city).instrument(span).await?.ok_or_else(|| city_not_found(&city))?;
    Ok(HttpResponse::Ok().json(AverageHumidityResponse::from(average)))
}

fn record_not_found() -> ApplicationError {
    ApplicationError::new(ErrorType::NotFound, "Record not found".to_string())
}

fn city_not_found(city: &str) -> ApplicationError {
    ApplicationError::new(ErrorType::NotFound, format!("No records found for city {city} or city does not exist"))
}

/**
 * Turns an empty lookup result into a not found error with the given message.
 */
fn require_records(records: Vec<WeatherRecordType>, message: impl FnOnce() -> String) -> Result<Vec<WeatherRecordType>, ApplicationError> {
    if records.is_empty() {
        return Err(ApplicationError::new(ErrorType::NotFound, message()));
    }
    Ok(records)
}

/**
 * Retrieves the trace ID from the HTTP request headers.
 * If the trace ID is not present, a new UUID is generated.
 */
fn get_trace_id(http_request: &HttpRequest) -> String {
    http_request.headers().get("X-Trace-ID")
        .and_then(|v| v.to_str().ok().map(std::string::ToString::to_string))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}


#[cfg(feature = "integration-test")]
#[cfg(test)]
mod integration_test {
    use actix_web::{App, http::StatusCode, test::{self, TestRequest}};
    use serde_json::{Value, json};
    use sqlx::PgPool;

    use super::*;
    use crate::{dao::weather::WeatherDao, service::weather::WeatherService};

    async fn app_state() -> web::Data<AppState> {
        dotenv::from_filename("./test_config/.env-test").ok();
        let pool = PgPool::connect(dotenv::var("DATABASE_URL").unwrap().as_str()).await.unwrap();
        let weather_service = WeatherService::new(WeatherDao::new(), Some(pool));
        weather_service.init_schema().await.unwrap();
        web::Data::new(AppState::new(weather_service, 100))
    }

    #[sqlx::test]
    async fn test_record_lifecycle() {
        let app = test::init_service(App::new().app_data(app_state().await).configure(configure)).await;

        let request = TestRequest::post().uri("/records/").set_json(json!({"city": "Lifecycle City", "temperature": 22.5, "humidity": 60, "wind_speed": 10, "description": "Sunny"}));
        let response = test::call_service(&app, request.to_request()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(response).await;
        let id = created["id"].as_i64().unwrap();
        assert!(created["date"].is_string());

        let response = test::call_service(&app, TestRequest::get().uri(&format!("/records/{id}")).to_request()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let fetched: Value = test::read_body_json(response).await;
        assert_eq!(fetched, created);

        let request = TestRequest::put().uri(&format!("/records/{id}")).set_json(json!({"humidity": 75}));
        let updated: Value = test::call_and_read_body_json(&app, request.to_request()).await;
        assert_eq!(updated["humidity"], 75.0);
        assert_eq!(updated["temperature"], created["temperature"]);
        assert_eq!(updated["date"], created["date"]);

        let response = test::call_service(&app, TestRequest::delete().uri(&format!("/records/{id}")).to_request()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = test::call_service(&app, TestRequest::delete().uri(&format!("/records/{id}")).to_request()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = test::call_service(&app, TestRequest::get().uri(&format!("/records/{id}")).to_request()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    async fn test_average_temperature() {
        let app = test::init_service(App::new().app_data(app_state().await).configure(configure)).await;
        let mut ids = vec![];
        for temperature in [20, 30] {
            let request = TestRequest::post().uri("/records/").set_json(json!({"city": "Average City", "temperature": temperature, "humidity": 50}));
            let created: Value = test::call_and_read_body_json(&app, request.to_request()).await;
            ids.push(created["id"].as_i64().unwrap());
        }
        let average: Value = test::call_and_read_body_json(&app, TestRequest::get().uri("/records/city/Average%20City/average/temperature").to_request()).await;
        assert_eq!(average, json!({"city": "Average City", "average_temperature": 25.0}));
        for id in ids {
            test::call_service(&app, TestRequest::delete().uri(&format!("/records/{id}")).to_request()).await;
        }
    }

    #[sqlx::test]
    async fn test_unknown_city() {
        let app = test::init_service(App::new().app_data(app_state().await).configure(configure)).await;
        let response = test::call_service(&app, TestRequest::get().uri("/records/city/Atlantis").to_request()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = test::call_service(&app, TestRequest::get().uri("/records/city/Atlantis/average/humidity").to_request()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
