mod config;
mod database;
mod envelope;
mod errors;
mod invoker;
mod keys;
mod processor;
mod routes;
mod storage;
mod token;
mod workers;
mod workflow;


#[macro_use]
extern crate serde_json;

#[macro_use]
extern crate tracing;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::EndpointExt;
use tracing_subscriber::EnvFilter;

use crate::routes::AppState;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct ServerConfig {
    #[clap(long, env, default_value = "127.0.0.1")]
    /// The binding host address of the server.
    host: String,

    #[clap(short, long, env, default_value = "8000")]
    port: u16,

    #[clap(long, env, default_value = "config.yaml")]
    /// The file path to the YAML config file.
    config_file: PathBuf,

    #[clap(long, default_value = "info")]
    /// The log level filter for the server's own logs.
    ///
    /// `RUST_LOG` is applied on top of this.
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: ServerConfig = ServerConfig::parse();

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("shutter={}", args.log_level).parse()?)
        .add_directive("poem=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = config::load(&args.config_file).await?;
    let state = Arc::new(AppState::from_config(&cfg).await?);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Shutter listening on http://{}", addr);

    poem::Server::new(TcpListener::bind(addr))
        .run(routes::api(state).with(Tracing))
        .await?;

    Ok(())
}
