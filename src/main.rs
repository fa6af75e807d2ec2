use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use chat_server::db::{self, Pool, PoolConfig};
use chat_server::kv::KvClient;
use chat_server::pubsub::PubSubBus;
use chat_server::state::AppState;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// `server <address> <port> <doc_root>`.
struct Args {
    address: String,
    port: u16,
    doc_root: PathBuf,
}

fn parse_args() -> Result<Args, String> {
    let mut args = env::args().skip(1);
    let address = args.next().ok_or("missing <address>")?;
    let port: u16 = args.next().ok_or("missing <port>")?.parse().map_err(|_| "<port> must be a number".to_owned())?;
    let doc_root = args.next().ok_or("missing <doc_root>")?;
    Ok(Args { address, port, doc_root: PathBuf::from(doc_root) })
}

// Single-threaded runtime: keeps pub/sub delivery and chat session tasks on
// one executor, so two publications to the same room reach a given
// subscriber in the order they were published (see `pubsub::PubSubBus`).
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(log_level)).init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("usage: server <address> <port> <doc_root>");
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let redis_host = env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_owned());
    let mysql_host = env::var("MYSQL_HOST").unwrap_or_else(|_| "localhost".to_owned());
    let mysql_username = env::var("MYSQL_USERNAME").unwrap_or_else(|_| "servertech_user".to_owned());
    let mysql_password = env::var("MYSQL_PASSWORD").unwrap_or_else(|_| "temp_password".to_owned());

    let redis_url = format!("redis://{redis_host}/");
    let database_url = format!("mysql://{mysql_username}:{mysql_password}@{mysql_host}/servertech_chat");

    info!("applying database migrations...");
    if let Err(err) = db::run_migrations(&database_url).await {
        error!(error = %err, "failed to run migrations");
        return ExitCode::FAILURE;
    }

    let kv = match KvClient::connect(&redis_url).await {
        Ok(kv) => kv,
        Err(err) => {
            error!(error = %err, "failed to connect to the key/value store");
            return ExitCode::FAILURE;
        }
    };

    let db_pool = Pool::spawn(database_url, PoolConfig::default());
    let pubsub = PubSubBus::new();
    let state = AppState::new(db_pool, kv, pubsub, args.doc_root);

    let router = chat_server::build_router(state);
    let bind_addr = format!("{}:{}", args.address, args.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(addr = %bind_addr, error = %err, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    info!(addr = %bind_addr, "server listening");
    if let Err(err) = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await {
        error!(error = %err, "server error");
        return ExitCode::FAILURE;
    }

    info!("server shut down gracefully");
    ExitCode::SUCCESS
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
