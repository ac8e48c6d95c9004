//! Loan-intake API server.
//!
//! Wires the record store (Sled), the blob store, and the Axum REST surface
//! together. Configuration comes from the environment (a `.env` file is
//! honored); the JWT secret is mandatory and startup aborts without it.
//!
//! Usage:
//!   cargo run --bin seed_data     # create the admin account + a demo center
//!   cargo run --bin loan_intake   # start the API server
//!   # Then drive it with loan-cli (see README-style help: loan-cli --help)

use std::env;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use loan_intake::blobstore::BlobStore;
use loan_intake::rest::{create_router, AppState};
use loan_intake::storage::Storage;

struct Config {
    addr: SocketAddr,
    data_dir: String,
    blob_dir: String,
    jwt_secret: Vec<u8>,
    public_url: String,
    normalize_uploads: bool,
    log_dir: Option<String>,
}

impl Config {
    fn from_env() -> Result<Self, String> {
        let addr = env::var("LOAN_INTAKE_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:5000".to_string())
            .parse()
            .map_err(|e| format!("bad LOAN_INTAKE_ADDR: {e}"))?;
        let jwt_secret = env::var("LOAN_INTAKE_JWT_SECRET")
            .map_err(|_| "missing environment variable LOAN_INTAKE_JWT_SECRET".to_string())?;

        Ok(Config {
            addr,
            data_dir: env::var("LOAN_INTAKE_DATA_DIR").unwrap_or_else(|_| "loan_data".to_string()),
            blob_dir: env::var("LOAN_INTAKE_BLOB_DIR").unwrap_or_else(|_| "loan_blobs".to_string()),
            jwt_secret: jwt_secret.into_bytes(),
            public_url: env::var("LOAN_INTAKE_PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:5000/storage".to_string()),
            normalize_uploads: matches!(
                env::var("LOAN_INTAKE_NORMALIZE_UPLOADS").as_deref(),
                Ok("1") | Ok("true")
            ),
            log_dir: env::var("LOAN_INTAKE_LOG_DIR").ok(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            std::process::exit(1);
        }
    };

    // Log to a daily-rolled file when a log dir is configured, stdout
    // otherwise. The guard must outlive the server for the file writer.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _guard = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "loan_intake.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .json()
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
            None
        }
    };

    println!("🚀 Loan intake backend starting on {}", config.addr);
    println!("📦 Records: Sled at {} | Blobs: {}", config.data_dir, config.blob_dir);

    let storage = Storage::open(&config.data_dir)?;
    let blobs = BlobStore::open(&config.blob_dir, &config.public_url)?;

    let app = create_router(AppState {
        storage,
        blobs,
        jwt_secret: config.jwt_secret,
        normalize_uploads: config.normalize_uploads,
    });

    tracing::info!(addr = %config.addr, "listening");
    let listener = TcpListener::bind(&config.addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
