use std::net::SocketAddr;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod cursor;
mod error;
mod routes;
mod state;
mod store;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stocktake API",
        version = "0.1.0",
        description = "Fleet inventory backend: machine check-in reconciliation, managed item and fact history, and tenancy-scoped reporting."
    ),
    paths(
        routes::health::health_check,
        routes::checkin::submit_checkin,
        routes::machines::list_machines,
        routes::machines::get_machine,
        routes::inventory::list_managed_items,
        routes::inventory::list_managed_item_history,
        routes::inventory::list_facts,
        routes::inventory::list_historical_facts,
        routes::inventory::list_messages,
        routes::tenancy::create_business_unit,
        routes::tenancy::list_business_units,
        routes::tenancy::delete_business_unit,
        routes::tenancy::add_member,
        routes::tenancy::create_machine_group,
        routes::tenancy::list_machine_groups,
        routes::tenancy::get_profile,
        routes::api_keys::create_api_key,
        routes::api_keys::list_api_keys,
        routes::registry::list_plugins,
        routes::registry::list_machine_detail_plugins,
        routes::registry::list_reports,
    ),
    components(schemas(
        routes::health::HealthResponse,
        stocktake_core::error::ApiError,
        stocktake_core::model::ItemStatus,
        stocktake_core::model::MessageType,
        stocktake_core::model::OsFamily,
        stocktake_core::model::ProfileLevel,
        stocktake_core::model::BusinessUnit,
        stocktake_core::model::MachineGroup,
        stocktake_core::model::Machine,
        stocktake_core::model::ManagementSource,
        stocktake_core::model::ManagedItem,
        stocktake_core::model::ManagedItemHistoryEntry,
        stocktake_core::model::Fact,
        stocktake_core::model::HistoricalFact,
        stocktake_core::model::Message,
        stocktake_core::model::ApiKey,
        stocktake_core::model::ApiKeyCreated,
        stocktake_core::model::UserProfile,
        stocktake_core::model::RegistryEntry,
        stocktake_core::model::PaginatedResponse<stocktake_core::model::Machine>,
        stocktake_core::model::PaginatedResponse<stocktake_core::model::ManagedItem>,
        stocktake_core::model::PaginatedResponse<stocktake_core::model::ManagedItemHistoryEntry>,
        stocktake_core::model::PaginatedResponse<stocktake_core::model::Fact>,
        stocktake_core::model::PaginatedResponse<stocktake_core::model::HistoricalFact>,
        stocktake_core::model::PaginatedResponse<stocktake_core::model::Message>,
        stocktake_core::checkin::CheckinRequest,
        stocktake_core::checkin::MachineFacts,
        stocktake_core::checkin::SourceReport,
        stocktake_core::checkin::ManagedItemReport,
        stocktake_core::checkin::MessageReport,
        stocktake_core::checkin::PluginResult,
        stocktake_core::checkin::PluginRowReport,
        stocktake_core::checkin::CheckinSummary,
        routes::api_keys::CreateApiKeyRequest,
        routes::tenancy::CreateBusinessUnitRequest,
        routes::tenancy::AddMemberRequest,
        routes::tenancy::CreateMachineGroupRequest,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "group_key",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
        components.add_security_scheme(
            "api_key",
            utoipa::openapi::security::SecurityScheme::ApiKey(
                utoipa::openapi::security::ApiKey::Header(
                    utoipa::openapi::security::ApiKeyValue::new("x-api-public-key"),
                ),
            ),
        );
    }
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stocktake_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Database connection
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let app_state = state::AppState {
        db: pool,
        registry: state::RegistryRefresh::from_env(),
    };

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::checkin::router())
        .merge(routes::machines::router())
        .merge(routes::inventory::router())
        .merge(routes::tenancy::router())
        .merge(routes::api_keys::router())
        .merge(routes::registry::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Stocktake API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
