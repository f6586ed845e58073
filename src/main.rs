//src/main.rs

use tokio::{net::TcpListener, sync::watch};
use tracing_subscriber::EnvFilter;

use workforce_backend::{
    build_router,
    config::{AppConfig, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Inicializa o logger (RUST_LOG controla o nível; padrão info)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // Se a configuração falhar, a aplicação não deve iniciar.
    let config = AppConfig::from_env()?;
    tracing::info!(?config, "Configuração carregada");
    let app_state = AppState::new(config)?;

    // 1. Migrações do banco master
    let master = app_state.registry.get_master().await?;
    sqlx::migrate!("./migrations/master").run(&master).await?;
    tracing::info!("✅ Migrações do banco master executadas com sucesso!");

    // 2. Migrações de cada empresa ativa (falhas por empresa só são logadas)
    app_state.provisioning_service.migrate_all().await?;

    // 3. Workers em segundo plano
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let erp_worker = tokio::spawn(app_state.erp_sync_service.clone().run_worker(
        app_state.registry.clone(),
        app_state.company_repo.clone(),
        shutdown_rx.clone(),
    ));
    let reconciler = tokio::spawn(app_state.exchange_service.clone().run_reconciler(shutdown_rx));

    // 4. Servidor HTTP
    let registry = app_state.registry.clone();
    let bind_addr = app_state.config.bind_addr.clone();
    let app = build_router(app_state);

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Falha ao escutar o sinal de desligamento");
            }
            tracing::info!("Sinal de desligamento recebido");
        })
        .await?;

    // 5. Para os workers e fecha todos os pools
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(erp_worker, reconciler);
    registry.destroy_all().await;
    tracing::info!("Servidor encerrado");

    Ok(())
}
