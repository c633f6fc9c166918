//! WebSocket edge for the poker engine: resolves configuration, wires a
//! lobby backed by either Postgres or an in-memory profile repository, and
//! serves the HTTP/WebSocket router.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Error;
use ctrlc::set_handler;
use pico_args::Arguments;
use poker_engine::broker::{Broker, InMemoryBroker};
use poker_engine::db::repository::mock::MockProfileRepository;
use poker_engine::db::repository::{PgProfileRepository, ProfileRepository};
use poker_engine::db::Database;
use poker_engine::lobby::{Lobby, LobbyConfig};
use tracing::info;

use poker_server::{api, config::ServerConfig, logging};

const HELP: &str = "\
Run a multi-room private poker server

USAGE:
  poker_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:6969]
  --db-url     URL         Database connection string  [default: env DATABASE_URL; omit for in-memory repository]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string (optional)
  ROOM_SMALL_BLIND, ROOM_BIG_BLIND, ROOM_STARTING_CHIPS
  (See .env file for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();
    logging::init();

    let mut pargs = Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let db_url_override: Option<String> = pargs.opt_value_from_str("--db-url")?;

    let server_config = ServerConfig::from_env(bind_override, db_url_override)?;
    server_config.validate()?;

    set_handler(|| std::process::exit(0))?;

    let repository: Arc<dyn ProfileRepository> = match &server_config.database {
        Some(db_config) => {
            info!("connecting to database: {}", db_config.database_url);
            let db = Database::new(db_config).await?;
            Arc::new(PgProfileRepository::new(db.pool().clone()))
        }
        None => {
            info!("no DATABASE_URL set; using the in-memory profile repository");
            Arc::new(MockProfileRepository::new())
        }
    };

    let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::default());
    let lobby = Arc::new(Lobby::new(
        broker.clone(),
        repository,
        LobbyConfig {
            small_blind: server_config.room_defaults.small_blind,
            big_blind: server_config.room_defaults.big_blind,
            starting_chips: server_config.room_defaults.starting_chips,
        },
    ));

    let app = api::create_router(api::AppState { lobby, broker });

    info!("starting HTTP/WebSocket server on {}", server_config.bind);
    let listener = tokio::net::TcpListener::bind(server_config.bind).await?;
    info!("server is running at http://{}. Press Ctrl+C to stop.", server_config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down server");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
}
