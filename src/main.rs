use std::{error::Error, sync::Arc};

use clap::Parser;
use log::{error, info, LevelFilter};

mod accounts;
mod args;
mod auth;
mod backend;
mod password;
mod routes;
mod time;
mod token;
mod user;

use accounts::Accounts;
use args::Args;
use backend::Backend;
use token::TokenService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::formatted_timed_builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    let addr = args.addr()?;

    let tokens = TokenService::new(&args.token_config()?);
    let backend = Backend::new(args.database()).await?;
    let accounts = Arc::new(Accounts::new(backend, tokens));

    let (addr, server) = warp::serve(routes::routes(accounts))
        .try_bind_with_graceful_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("couldn't listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
        })?;

    info!("listening on {addr}");
    server.await;

    Ok(())
}
