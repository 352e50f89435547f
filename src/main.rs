// src/main.rs
use actix_web::{App, HttpServer, middleware, web};
use log::info;
use portrait_studio::config::AppConfig;
use portrait_studio::{AppState, configure, json_config};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting portrait studio service...");

    let config = AppConfig::from_env()?;
    let app_state = AppState::from_config(&config)?;

    info!(
        "Rate limiting in {:?} mode, retries: {}, model: {}",
        config.rate_limit_posture,
        config.retry.max_retries,
        app_state.orchestrator.model()
    );

    let bind = (config.host.clone(), config.port);
    let max_body_bytes = config.max_body_bytes;

    info!("Starting HTTP server on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(json_config(max_body_bytes))
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
