use clap::{App, Arg};
use firesim::protocol::StoreEvent;
use firesim::server::{run_server, EVENT_BROADCAST_BUFFER_SIZE};
use firesim::{SharedStore, SimulatorAgent, SimulatorConfig, Store, SystemClock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = App::new("firesim-simulator")
        .version("0.1.0")
        .about("🔥 Fire detection and suppression appliance simulator")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("seed")
                .short("s")
                .long("seed")
                .value_name("SEED")
                .help("Fixed RNG seed for reproducible runs")
                .takes_value(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Seed must be an unsigned integer".into()),
                }),
        )
        .arg(
            Arg::with_name("listen")
                .short("l")
                .long("listen")
                .value_name("ADDR")
                .help("Store server listen address")
                .takes_value(true),
        )
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => SimulatorConfig::load(path)?,
        None => SimulatorConfig::default(),
    };
    if let Some(seed) = matches.value_of("seed") {
        config.seed = Some(seed.parse()?);
    }
    if let Some(listen) = matches.value_of("listen") {
        config.listen_addr = listen.to_string();
    }

    println!("🔥 Fire Suppression Appliance Simulator");
    println!("=======================================");

    let store = SharedStore::new();
    let (event_tx, _) = broadcast::channel::<StoreEvent>(EVENT_BROADCAST_BUFFER_SIZE);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    let server_store = store.clone();
    let server_events = event_tx.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = run_server(listener, server_store, server_events).await {
            error!("Store server error: {}", e);
        }
    });

    let tick = Duration::from_millis(config.tick_interval_ms);
    let backoff = Duration::from_millis(config.error_backoff_ms);
    let root = config.store_root.clone();
    let mut agent = SimulatorAgent::new(config, store.clone(), SystemClock)?;
    info!("🚀 Simulation started, publishing under {:?}", root);

    let mut interval = time::interval(tick);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        match agent.update() {
            Ok(_) => match store.get(&root) {
                Ok(Some(value)) => {
                    // No subscribers is not an error.
                    let _ = event_tx.send(StoreEvent {
                        path: root.clone(),
                        value,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to read back published tree: {}", e),
            },
            Err(e) => {
                error!("❌ Tick failed: {}", e);
                time::sleep(backoff).await;
            }
        }
    }

    server.abort();
    println!("🛑 Simulator stopped");
    Ok(())
}
