use std::sync::Arc;

use axum::http::{HeaderValue, Method, header};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cursos::activation::LogActivation;
use cursos::config::Config;
use cursos::crypto::hash_password;
use cursos::db::{AppState, create_pool, init_db, queries};
use cursos::handlers;
use cursos::jwt::TokenService;
use cursos::models::UserRole;
use cursos::payments::MercadoPagoClient;

#[derive(Parser, Debug)]
#[command(name = "cursos")]
#[command(about = "Course marketplace API with Mercado Pago payments")]
struct Cli {
    /// Seed the database with dev accounts (admin and student)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only)
    #[arg(long)]
    ephemeral: bool,
}

/// Create the first superadmin when none exists yet.
fn bootstrap_superadmin(state: &AppState, email: &str, password: &str) -> Result<(), String> {
    let conn = state.db.get().map_err(|e| e.to_string())?;

    let count = queries::count_users_with_role(&conn, UserRole::Superadmin)
        .map_err(|e| e.to_string())?;
    if count > 0 {
        tracing::info!("Superadmin already exists, skipping bootstrap");
        return Ok(());
    }

    let username = email.split('@').next().unwrap_or("superadmin");
    let password_hash = hash_password(password).map_err(|e| e.to_string())?;
    let user = queries::create_user(&conn, username, email, &password_hash, UserRole::Superadmin)
        .map_err(|e| e.to_string())?;

    tracing::info!("============================================");
    tracing::info!("BOOTSTRAP SUPERADMIN CREATED");
    tracing::info!("Id: {}  Email: {}", user.id, user.email);
    tracing::info!("============================================");
    Ok(())
}

/// Dev accounts. Only runs on an empty users table.
fn seed_dev_data(state: &AppState) -> Result<(), String> {
    let conn = state.db.get().map_err(|e| e.to_string())?;

    if !queries::list_users(&conn).map_err(|e| e.to_string())?.is_empty() {
        tracing::info!("Database already has users, skipping seed");
        return Ok(());
    }

    let accounts = [
        ("admin", "admin@cursos.dev", UserRole::Admin),
        ("alumno", "alumno@cursos.dev", UserRole::User),
    ];
    for (username, email, role) in accounts {
        let password_hash = hash_password("password123").map_err(|e| e.to_string())?;
        let user = queries::create_user(&conn, username, email, &password_hash, role)
            .map_err(|e| e.to_string())?;
        tracing::info!("Seeded {} {} (id {})", role.as_ref(), email, user.id);
    }
    tracing::info!("Seed password for all dev accounts: password123");
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cursos=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let mut conn = db_pool.get().expect("Failed to get connection");
        init_db(&mut conn).expect("Failed to initialize database");
    }

    let state = AppState {
        db: db_pool,
        app_name: config.app_name.clone(),
        base_url: config.base_url.clone(),
        frontend_url: config.frontend_url.clone(),
        tokens: TokenService::new(&config.jwt_secret),
        mercadopago: MercadoPagoClient::new(
            &config.mercadopago_access_token,
            &config.mercadopago_api_url,
            &config.base_url,
            config.mercadopago_webhook_secret.clone(),
        ),
        activation: Arc::new(LogActivation),
    };

    if state.mercadopago.webhook_secret_configured() {
        tracing::info!("Mercado Pago webhook signatures will be verified");
    }

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set CURSOS_ENV=dev)");
        } else if let Err(e) = seed_dev_data(&state) {
            tracing::error!("Failed to seed dev data: {}", e);
        }
    }

    if let (Some(email), Some(password)) = (
        config.bootstrap_superadmin_email.as_deref(),
        config.bootstrap_superadmin_password.as_deref(),
    ) {
        if let Err(e) = bootstrap_superadmin(&state, email, password) {
            tracing::error!("Failed to bootstrap superadmin: {}", e);
            std::process::exit(1);
        }
    }

    let app = handlers::router(state)
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("{} listening on {}", config.app_name, addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        for path in [
            db_path.clone(),
            format!("{}-wal", db_path),
            format!("{}-shm", db_path),
        ] {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::info!("Removed {}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {}: {}", path, e),
            }
        }
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
