mod admin;
mod api;
mod app;
mod bid;
mod config;
mod host;
mod init_data;
mod render;
mod state;
mod store;
mod terminal;
mod timer;
mod types;

#[cfg(test)]
mod tests;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.parse().unwrap_or_default()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let api = api::BackendClient::new(&config)?;
    tracing::info!(
        backend = %api.base_url(),
        admins = config.admin_ids.len(),
        sold_limit = config.sold_display_limit,
        "stars-auction starting"
    );

    let (terminal, commands) = terminal::TerminalHost::new(&config)?;
    let state = state::AppState::new(config, api, terminal.clone(), terminal.clone());
    let app = app::App::new(state);

    app.start().await;
    terminal::run(&app, &terminal, commands).await;
    app.shutdown();

    tracing::info!("stars-auction stopped");
    Ok(())
}
