use std::net::SocketAddr;
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};

use zipscore_api::api;
use zipscore_api::artifacts::ModelBundle;
use zipscore_api::config::Config;
use zipscore_api::db::Database;
use zipscore_api::db_storage::ZipDataStorage;
use zipscore_api::handlers::AppState;
use zipscore_api::obs;
use zipscore_api::store::{InMemoryStore, MetricStore};

/// Main entry point for the scoring server.
///
/// Loads configuration, the model bundle and the ZIP record store, then
/// serves the API. Missing or incompatible model artifacts abort startup.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    obs::init_tracing("zipscore_api=debug,tower_http=debug");

    let config = Config::from_env()?;

    let bundle = ModelBundle::load(&config.model_dir)
        .map_err(|e| anyhow::anyhow!("Failed to load models from {}: {}", config.model_dir.display(), e))?;
    tracing::info!(
        "Model bundle ready (classifier accuracy {:.2}, ranker R² {:.2})",
        bundle.info().metrics.classifier_accuracy,
        bundle.info().metrics.ranker_r2
    );

    let store: Arc<dyn MetricStore> = match (&config.database_url, &config.zip_data_file) {
        (Some(url), _) => {
            let db = Database::new(url).await?;
            tracing::info!("Database connection pool established");
            Arc::new(ZipDataStorage::new(db.pool.clone()))
        }
        (None, Some(path)) => Arc::new(
            InMemoryStore::from_json_file(path).map_err(|e| anyhow::anyhow!(e.to_string()))?,
        ),
        (None, None) => anyhow::bail!("No ZIP data source configured"),
    };

    let app_state = Arc::new(AppState {
        store,
        bundle: Arc::new(bundle),
        model_dir: config.model_dir.clone(),
        nearby_zip_count: config.nearby_zip_count,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = api::api_routes().layer(GovernorLayer {
        config: governor_conf,
    });

    // Health check bypasses rate limiting
    let app = api::app(app_state, protected_routes);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
