pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;

use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use application::{OrderLifecycle, SettlementPolicy};
pub use config::{AppConfig, ConfigError};
pub use db::{create_pool, DbPool};
pub use handlers::Service;
pub use infrastructure::{DieselUnitOfWork, InMemoryUnitOfWork, Storage};

use domain::context::RequestContext;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), BoxError> {
    let mut conn = pool.get()?;
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    for version in applied {
        log::info!("Applied migration {}", version);
    }
    Ok(())
}

/// Registers every route on `cfg`. Shared by the server and the HTTP tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    use handlers::{finance, inventory, orders, payments};

    cfg.app_data(handlers::json_config())
        .service(
            web::scope("/orders")
                .route("", web::post().to(orders::checkout))
                .route("/{id}", web::get().to(orders::get_order))
                .route("/{id}/prescriptions", web::post().to(orders::submit_prescription))
                .route("/{id}/approve", web::post().to(orders::approve_order))
                .route("/{id}/request-payment", web::post().to(orders::request_payment))
                .route("/{id}/payments", web::post().to(payments::register_payment))
                .route("/{id}/payments", web::get().to(payments::list_payments))
                .route("/{id}/retry-payment", web::post().to(orders::retry_payment))
                .route("/{id}/prepare", web::post().to(orders::prepare))
                .route("/{id}/ship", web::post().to(orders::ship))
                .route("/{id}/deliver", web::post().to(orders::deliver))
                .route("/{id}/cancel", web::post().to(orders::cancel))
                .route("/{id}/commission", web::get().to(finance::order_commission)),
        )
        .service(
            web::scope("/prescriptions")
                .route("/{id}/approve", web::post().to(orders::approve_prescription))
                .route("/{id}/reject", web::post().to(orders::reject_prescription)),
        )
        .route("/webhooks/payments/{gateway}", web::post().to(payments::gateway_webhook))
        .service(
            web::scope("/inventory")
                .route("/{product_id}/adjust", web::post().to(inventory::adjust_stock))
                .route("/{product_id}/movements", web::get().to(inventory::list_movements)),
        )
        .route("/commissions/release", web::post().to(finance::release_commissions))
        .service(
            web::scope("/withdrawals")
                .route("", web::post().to(finance::request_withdrawal))
                .route("/{id}/process", web::post().to(finance::process_withdrawal)),
        );
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    service: web::Data<Service>,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .wrap(Logger::default())
            .configure(configure)
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", handlers::ApiDoc::openapi()))
    })
    .bind((host.to_string(), port))?
    .run())
}

/// Runs the commission maturation sweep every `every`, as the system actor.
/// The first run happens one full interval after startup.
pub fn spawn_maturation_sweep(service: web::Data<Service>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let svc = service.clone();
            let result = web::block(move || {
                svc.release_matured_commissions(&RequestContext::system(), None)
            })
            .await;
            match result {
                Ok(Ok(report)) => log::debug!(
                    "Maturation sweep: {} released, {} voided",
                    report.released,
                    report.voided
                ),
                Ok(Err(e)) => log::error!("Maturation sweep failed: {}", e),
                Err(e) => log::error!("Maturation sweep could not run: {}", e),
            }
        }
    })
}
