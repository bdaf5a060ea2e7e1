use crate::service::weather::WeatherService;

/**
* Represents the application state shared across the Actix web application.
*/
pub struct AppState {
    /**
     * The weather service for handling record operations.
     */
    pub weather_service: WeatherService,
    /**
     * Page size used by the record list when the request gives no limit.
     */
    pub default_limit: i64,
}

/**
 * Creates a new instance of `AppState`.
 *
 * # Arguments
 * `weather_service`: The weather service for handling record operations.
 * `default_limit`: Page size used when listing records without a limit.
 */
impl AppState {
    pub fn new(weather_service: WeatherService, default_limit: i64) -> Self {
        AppState { weather_service, default_limit }
    }
}
