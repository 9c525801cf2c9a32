//! Console heart rate display
//!
//! Run with: cargo run --example heart_rate_console -- -m C8:2B:4F:11:22:33
//!
//! Options:
//!   -m MAC          Device address (or set HRM_ADDRESS)
//!   -g PATH         gatttool executable (default: found on PATH)
//!   -H HANDLE       Known measurement handle, skips resolution
//!   -t TYPE         Address type: random (default) or public
//!   -v              Verbose output
//!   -d              Echo raw gatttool I/O

use hrm_relay::{
    AddressType, AttributeHandle, Error, HeartRateMonitor, MonitorConfig, Result,
};
use std::io::Write;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

struct Options {
    address: Option<String>,
    gateway_path: Option<String>,
    handle: Option<AttributeHandle>,
    address_type: AddressType,
    verbose: bool,
    echo: bool,
}

fn parse_args() -> Result<Options> {
    let mut options = Options {
        address: std::env::var("HRM_ADDRESS").ok(),
        gateway_path: None,
        handle: None,
        address_type: AddressType::default(),
        verbose: false,
        echo: false,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-v" => options.verbose = true,
            "-d" => options.echo = true,
            "-m" | "-g" | "-H" | "-t" => {
                let value = args.next().ok_or_else(|| Error::InvalidParameter {
                    name: arg.clone(),
                    value: "missing value".to_string(),
                })?;
                match arg.as_str() {
                    "-m" => options.address = Some(value),
                    "-g" => options.gateway_path = Some(value),
                    "-H" => options.handle = Some(value.parse()?),
                    _ => options.address_type = value.parse()?,
                }
            }
            other => {
                return Err(Error::InvalidParameter {
                    name: "argument".to_string(),
                    value: other.to_string(),
                })
            }
        }
    }

    Ok(options)
}

#[tokio::main]
async fn main() -> Result<()> {
    let options = parse_args()?;

    let default_level = if options.verbose { "debug" } else { "warn" };
    let echo_level = if options.echo { ",hrm_relay::gateway::echo=info" } else { "" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{}{}", default_level, echo_level))),
        )
        .init();

    let mut config = MonitorConfig {
        address: options.address,
        address_type: options.address_type,
        echo_gateway_io: options.echo,
        ..MonitorConfig::default()
    };
    if let Some(path) = options.gateway_path {
        config = config.with_gateway_path(path);
    }
    if let Some(handle) = options.handle {
        config = config.with_measurement_handle(handle);
    }

    let monitor = HeartRateMonitor::new(config)?;

    println!("Heart Rate Monitor");
    println!("==================\n");
    println!("Connecting to {}...", monitor.address());
    println!("Press Ctrl+C to exit.\n");

    monitor.start()?;
    let mut heart_rate = monitor.receiver();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n\nExiting...");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                if !monitor.is_running() {
                    break;
                }
                // Keep showing the previous value until a new one arrives
                let value = heart_rate
                    .current()
                    .map_or_else(|| "---".to_string(), |bpm| bpm.to_string());
                print!("\r{:>3} bpm  [{}]      ", value, monitor.state());
                let _ = std::io::stdout().flush();
            }
        }
    }

    let stats = monitor.stats();
    monitor.shutdown().await?;

    println!(
        "Connections: {}  Link losses: {}  Readings: {}  Dropped: {}",
        stats.connections, stats.link_losses, stats.published, stats.dropped
    );

    Ok(())
}
