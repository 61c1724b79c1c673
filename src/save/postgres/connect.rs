use crate::config::DatabaseConfig;
use std::sync::Arc;
use tokio_postgres::Client;

/// opens one database connection and spawns its connection-driver task,
/// mirroring the "one client, one background task" pattern used
/// throughout this engine's worker pipelines.
pub async fn connect(database: &DatabaseConfig) -> anyhow::Result<Arc<Client>> {
    log::info!("connecting to {}:{}/{}", database.host, database.port, database.name);
    let tls = tokio_postgres::tls::NoTls;
    let (client, connection) = tokio_postgres::connect(&database.connection_string(), tls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::error!("database connection closed: {e}");
        }
    });
    client
        .execute("SET client_min_messages TO WARNING", &[])
        .await?;
    Ok(Arc::new(client))
}
