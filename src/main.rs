use clap::Parser;
use live_flights::cli::Cli;
use live_flights::config::ApplicationConfig;
use live_flights::ingestor::Ingestor;
use live_flights::logging::setup_logging;
use live_flights::observer::{LogObserver, RefreshObserver};
use live_flights::server;
use live_flights::service::FlightService;
use log::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.logging_level);

    let application_config =
        ApplicationConfig::construct_from_path(&cli.config_file).map_err(|e| {
            log::error!("{e}");
            e
        })?;
    info!("Main: Application started.");

    let observer: std::sync::Arc<dyn RefreshObserver> = std::sync::Arc::new(LogObserver);

    // The blocking HTTP client has to be built (and later dropped) outside the async runtime.
    let ingestor = Ingestor::new(&application_config.upstream, observer.clone())
        .map_err(|e| {
            log::error!("Error constructing ingestor: {e}");
            e
        })?;
    let service = std::sync::Arc::new(FlightService::new(
        std::sync::Arc::new(ingestor),
        application_config.refresh.period(),
        observer,
    ));

    let address = cli
        .bind_address
        .unwrap_or(application_config.server.bind_address);
    let app = server::router(service.clone(), application_config.server.index_path.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(server::serve(address, app))?;
    drop(runtime);

    service.shutdown();
    info!("Main: Program finished.");
    Ok(())
}
