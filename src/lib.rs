pub mod serial;
pub mod device;
pub mod commands;
pub mod config;
pub mod console;
pub mod events;
pub mod monitor;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use config::{AppConfig, Cli};
use device::{DeviceError, DeviceManager};
use monitor::TemperatureMonitor;
use serial::{Connector, MockConnector, MockDevice, SerialConnector};

/// Starting point of the simulated board's drifting reading
const SIMULATED_START_CELSIUS: i32 = 22;

pub fn run() -> anyhow::Result<()> {
  let cli = Cli::parse();
  let config = AppConfig::resolve(&cli)?;

  let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str()));
  if let Some(level) = &cli.log_level {
    logger.parse_filters(level);
  }
  logger.init();

  let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
  let result = runtime.block_on(run_with_config(config));
  // stdin reads run on a blocking thread that may never return
  runtime.shutdown_timeout(Duration::from_millis(100));
  result
}

pub async fn run_with_config(config: AppConfig) -> anyhow::Result<()> {
  let connector: Arc<dyn Connector> = if config.simulate {
    log::info!("Using simulated sensor board");
    Arc::new(MockConnector::new(MockDevice::drifting(SIMULATED_START_CELSIUS)))
  } else {
    Arc::new(SerialConnector::new(config.matcher(), config.port.clone()))
  };

  let (event_tx, event_queue) = events::channel();
  let device_manager = Arc::new(DeviceManager::new(connector, event_tx));

  if let Err(e) = device_manager.connect().await {
    return Err(match e {
      DeviceError::NotFound(_) => anyhow::anyhow!(
        "Device not found: no serial port matching {:?}. Please connect the device and run the application again.",
        config.device_match
      ),
      other => anyhow::Error::new(other).context("failed to open sensor board"),
    });
  }

  let monitor = TemperatureMonitor::new();
  monitor
    .start(device_manager.clone(), config.reconnect)
    .await
    .map_err(anyhow::Error::msg)?;

  log::info!("Tempwatch started");
  let result = console::run_console(device_manager.clone(), event_queue, config.json_output).await;

  let _ = monitor.stop().await;
  device_manager.disconnect().await;
  result
}
