use log::{error, info};
use vr_session_server::configuration::config::Config;
use vr_session_server::storage::{connect_storage, Storage};
use vr_session_server::web_interface::WebServer;

#[tokio::main]
async fn main() {
    // https://docs.rs/env_logger/latest/env_logger/
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    info!("Importing configuration");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration imported successfully");

    let storage = match connect_storage(&config.storage).await {
        Ok(storage) => storage,
        Err(e) => {
            error!("No storage backend available: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    info!("Using the {} backend", storage.backend());

    let server = WebServer::new(storage);
    if let Err(e) = server.start(&config.bind_address, config.port).await {
        error!("Web server failed: {}, exiting...", e);
        std::process::exit(1);
    }
}
