//! TWT beacon node binary.
//!
//! Runs on both ESP32 and host platforms:
//! - **Host**: `cargo run --bin node` (simulated radio, real HTTP probe)
//! - **ESP32-C6**: `cargo espflash flash --bin node --features esp32 --release`
//!
//! ## Configuration
//!
//! Host: environment variables (`WIFI_SSID`, `WIFI_PASS`, `NODE_MAX_RETRY`,
//! `NODE_SETTLE_DELAY_MS`, `NODE_PROBE_URL`, `NODE_PROBE_INTERVAL_SECS`,
//! `NODE_PROBE_ALIGN`, `NODE_STATUS_PORT`).
//!
//! ESP32: credentials from NVS, seeded from the build-time `WIFI_SSID` /
//! `WIFI_PASS` on first boot.
//!
//! ## Endpoints
//!
//! - Status: http://localhost:8080/status (with `NODE_STATUS_PORT=8080`)

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;
use twt_beacon_esp32::radio::EventReceiver;
use twt_beacon_esp32::{
    event_channel, HttpProber, Node, NodeConfig, NodeError, ProbeScheduler, Radios, StatusServer,
};

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    platform_init();

    info!("=== TWT beacon node starting ===");

    #[cfg(feature = "esp32")]
    info!("Platform: ESP32");
    #[cfg(not(feature = "esp32"))]
    info!("Platform: Host (simulated radio)");

    if let Err(e) = run().await {
        error!("Node failed: {}", e);

        #[cfg(not(feature = "esp32"))]
        std::process::exit(1);

        #[cfg(feature = "esp32")]
        loop {
            std::thread::sleep(std::time::Duration::from_secs(60));
        }
    }
}

#[cfg(not(feature = "esp32"))]
async fn run() -> Result<(), NodeError> {
    use twt_beacon_esp32::radio::sim::{SimRadio, SimScript};

    let config = NodeConfig::from_env()?;
    let (events_tx, events_rx) = event_channel();
    let radio = SimRadio::new(events_tx, SimScript::default());
    let radios = Radios::new(radio.clone(), radio.clone(), radio);

    serve(config, radios, events_rx).await
}

#[cfg(feature = "esp32")]
async fn run() -> Result<(), NodeError> {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use twt_beacon_esp32::config::{init_nvs, load_wifi_config, save_wifi_config};
    use twt_beacon_esp32::radio::esp32;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let partition = EspDefaultNvsPartition::take()?;

    let mut config = NodeConfig::default();
    let mut nvs = init_nvs(partition.clone())?;
    match load_wifi_config(&nvs) {
        Some(wifi) => {
            info!("Using WiFi credentials from NVS");
            config.wifi = wifi;
        }
        None => {
            info!("Storing build-time WiFi credentials in NVS");
            if let Err(e) = save_wifi_config(&mut nvs, &config.wifi) {
                warn!("Failed to store WiFi credentials: {:?}", e);
            }
        }
    }
    config.validate()?;

    let (wifi_modem, bt_modem) = peripherals.modem.split();
    let (events_tx, events_rx) = event_channel();
    let (station, duty_cycle, advertising) =
        esp32::init(wifi_modem, bt_modem, sysloop, partition, events_tx)?;

    serve(
        config,
        Radios::new(station, duty_cycle, advertising),
        events_rx,
    )
    .await
}

/// Run the dispatcher and the probe scheduler until shutdown.
async fn serve(config: NodeConfig, radios: Radios, events: EventReceiver) -> Result<(), NodeError> {
    info!(
        "WiFi: {} (max {} retries), TWT period {:?}, beacon service {}",
        config.wifi.ssid,
        config.retry.max_attempts,
        config.duty_cycle.period(),
        config.service
    );

    let status_port = config.status_port;
    let probe = config.probe.clone();
    let node = Node::new(config, radios, events);
    let state = node.state();

    let _status_server = match status_port {
        Some(port) => match StatusServer::start(None, port, state.clone()) {
            Ok(server) => {
                info!("Status server at http://localhost:{}/status", port);
                Some(server)
            }
            Err(e) => {
                warn!("Failed to start status server: {}", e);
                None
            }
        },
        None => None,
    };

    let cancel = CancellationToken::new();

    let scheduler = ProbeScheduler::new(probe, HttpProber::new(), state, node.schedule());
    let probe_task = tokio::spawn(scheduler.run(cancel.clone()));

    #[cfg(not(feature = "esp32"))]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down...");
                cancel.cancel();
            }
        });
    }

    let result = node.run(cancel.clone()).await;
    cancel.cancel();
    if let Err(e) = probe_task.await {
        error!("Probe task error: {}", e);
    }
    result
}
