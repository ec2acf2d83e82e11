#![forbid(unsafe_code)]

use poem::Route;
use poem_openapi::OpenApiService;

use crate::api::hello::HelloApi;
use crate::api::status::StatusApi;
use crate::api::version::VersionApi;
use crate::utils::config::GreetingValues;

pub mod hello;
pub mod status;
pub mod version;

// Version advertised in the generated OpenAPI document.
const API_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// build_app:
// ---------------------------------------------------------------------------
/** Construct every responder from the startup values and register them on a
 * single route tree.  The API is mounted at the root so the greeting answers
 * on "/"; the generated OpenAPI artifacts live beside it.
 */
pub fn build_app(values: &GreetingValues, title: &str, server_url: &str) -> Route {
    let endpoints = (HelloApi::new(values), StatusApi, VersionApi);
    let api_service =
        OpenApiService::new(endpoints, title, API_VERSION).server(server_url);

    // Allow the generated openapi specs to be retrieved from the server.
    let spec = api_service.spec_endpoint();
    let spec_yaml = api_service.spec_endpoint_yaml();
    let ui = api_service.swagger_ui();

    Route::new()
        .nest("/docs", ui)
        .at("/spec", spec)
        .at("/spec_yaml", spec_yaml)
        .nest("/", api_service)
}
