//! Example server: loads model descriptors from `MODELS_DIR` (default `demos/models`)
//! and mounts the Report model under its organization. Records live in memory
//! unless `DATABASE_URL` is set, in which case they are stored in PostgreSQL.

use resource_sdk::{
    load_models, FactoryOptions, MemoryStore, ModelResourceOptions, ModelStore, PgStore, Resource, ResourceOptions,
    ResourceServer, Settings, Variant,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const REPORTS_TABLE: &str = r#"CREATE TABLE IF NOT EXISTS "public"."reports" (
    "id" BIGSERIAL PRIMARY KEY,
    "organizationId" BIGINT NOT NULL,
    "frequency" BIGINT NOT NULL,
    "createdAt" TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    "updatedAt" TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Arc::new(Settings::from_env()?);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&settings.log_filter)?)
        .init();

    let models_dir = std::env::var("MODELS_DIR").unwrap_or_else(|_| "demos/models".into());
    let models = load_models(&models_dir).await?;
    let report = models
        .into_iter()
        .find(|m| m.name == "Report")
        .map(Arc::new)
        .ok_or("Report model not found")?;

    let store: Arc<dyn ModelStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await?;
            sqlx::query(REPORTS_TABLE).execute(&pool).await?;
            Arc::new(PgStore::new(pool, report.clone()))
        }
        Err(_) => Arc::new(MemoryStore::with_records(
            report.clone(),
            vec![
                json!({ "id": 13, "organizationId": 2, "frequency": 86400 }),
                json!({ "id": 125152, "organizationId": 510553, "frequency": 86400 }),
            ],
        )?),
    };

    let mut server = ResourceServer::new(settings.clone());
    server.add_model_resource(
        "/1.0/organizations/{organizationId}/reports/{reportId}",
        report,
        store,
        ModelResourceOptions {
            partial: true,
            ..ModelResourceOptions::new(FactoryOptions::new().parent_resource("organization"))
        },
    )?;
    server.add_route(
        "/1.0/status",
        Resource::from_fn(Variant::Read, settings.clone(), ResourceOptions::new(), |_ctx| async {
            Ok(json!({ "status": "ok", "time": chrono::Utc::now().to_rfc3339() }))
        }),
    )?;

    for route in server.inspect() {
        tracing::info!(method = %route.method, path = %route.path, "route");
    }

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("{} listening on {}", settings.service_name, listener.local_addr()?);
    axum::serve(listener, server.into_router()).await?;
    Ok(())
}
