use actix_cors::Cors;
use actix_session::config::PersistentSession;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{time::Duration as CookieDuration, Key};
use actix_web::{
    middleware::Logger,
    web, App, HttpResponse, HttpServer, Responder,
};
use clap::Parser;
use inkpost_backend::{
    build_pool,
    config::Config,
    helper::email_helpers::Newsletter,
    middleware::{security_headers, RouteProtection, SESSION_TTL_DAYS},
    routes, AppState,
};
use std::path::PathBuf;

/// A simple handler for the root URL.
async fn root_handler() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

#[derive(Parser, Debug)]
#[command(name = "inkpost_server", author, version, about = "Starts the Inkpost API server.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

fn build_cors(allowed_origins: &str) -> Cors {
    let cors = if allowed_origins.trim() == "*" {
        Cors::default().allow_any_origin()
    } else {
        allowed_origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![
            actix_web::http::header::AUTHORIZATION,
            actix_web::http::header::ACCEPT,
            actix_web::http::header::CONTENT_TYPE,
        ])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    let database_file = config.database_file();
    if !database_file.exists() {
        panic!(
            "FATAL: Database not found at '{}'. Run 'setup_cli --env-file <path> db setup' first.",
            database_file.display()
        );
    }
    let pool = build_pool(&database_file, config.db_pool_size).expect("FATAL: Failed to create SQLite connection pool.");

    let newsletter = match Newsletter::new(&config) {
        Ok(newsletter) => Some(newsletter),
        Err(e) => {
            log::warn!("Newsletter email is disabled: {}", e);
            None
        }
    };
    let app_state = web::Data::new(AppState { site_url: config.site_url.clone(), newsletter });

    let session_key_bytes =
        hex::decode(&config.session_secret_key).expect("FATAL: SESSION_SECRET_KEY in .env is not a valid hex string.");
    let session_key = Key::try_from(session_key_bytes.as_slice())
        .expect("FATAL: The decoded SESSION_SECRET_KEY is not long enough (minimum 64 bytes required).");

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Server starting at http://{}", server_address);

    let pool_data = web::Data::new(pool.clone());
    let server = HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
            .cookie_secure(config.use_secure_cookies)
            .cookie_http_only(true)
            .cookie_same_site(actix_web::cookie::SameSite::Lax)
            .session_lifecycle(PersistentSession::default().session_ttl(CookieDuration::days(SESSION_TTL_DAYS)))
            .build();

        App::new()
            .wrap(RouteProtection)
            .wrap(session_mw)
            .wrap(build_cors(&config.allowed_origins))
            .wrap(Logger::default())
            .wrap(security_headers())
            .app_data(pool_data.clone())
            .app_data(app_state.clone())
            .configure(routes::config_api)
            .route("/", web::get().to(root_handler))
    })
    .bind(server_address)?
    .run()
    .await;

    drop(pool);
    log::info!("Server stopped; database pool released.");
    server
}
