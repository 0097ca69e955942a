use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{HttpIdentityProvider, HttpPostStore, SessionController};
use tracing::info;

mod config;
mod events;
mod screens;

use screens::{Screen, ScreenLoop};

#[derive(Parser, Debug)]
struct Args {
    /// Base URL of the hosted identity/store service. Overrides client.toml
    /// and the POSTS_SERVER_URL / APP__SERVER_URL environment variables.
    #[arg(long)]
    server_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    info!(server_url = %settings.server_url, "starting posts client");

    let identity = Arc::new(HttpIdentityProvider::new(settings.server_url.clone()));
    let store = Arc::new(HttpPostStore::new(settings.server_url.clone()));
    let controller = SessionController::new(identity, store);

    let initial = if controller.resume_cached_session().await {
        Screen::Account
    } else {
        Screen::SignIn
    };

    ScreenLoop::new(controller).run(initial).await
}
