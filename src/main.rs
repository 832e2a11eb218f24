use actix_web::web;
use dotenvy::dotenv;
use rx_fulfillment::{
    build_server, create_pool, run_migrations, spawn_maturation_sweep, AppConfig, DieselUnitOfWork,
    OrderLifecycle, Storage,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    })?;

    let pool = create_pool(&config.database_url, config.db_pool_size).map_err(std::io::Error::other)?;
    run_migrations(&pool).map_err(std::io::Error::other)?;

    let service = web::Data::new(OrderLifecycle::new(
        Storage::Postgres(DieselUnitOfWork::new(pool)),
        config.settlement_policy(),
    ));
    spawn_maturation_sweep(service.clone(), config.maturation_sweep_interval);

    log::info!("Starting server at http://{}:{}", config.host, config.port);

    build_server(service, &config.host, config.port)?.await
}
