//! Terminal telemetry monitor: connects to a flight controller and prints
//! attitude, position and satellite count on a fixed interval.

use anyhow::{Context, anyhow};
use clap::Parser;
use std::thread;
use std::time::Duration;
use tracing::info;

use pixhawk_monitor::config::{MAP_ZOOM, POLL_INTERVAL_MS};
use pixhawk_monitor::link::LinkController;
use pixhawk_monitor::settings::PersistentSettings;

/// Live MAVLink telemetry monitor.
#[derive(Parser, Debug)]
#[command(name = "pixhawk-monitor", about = "Live MAVLink telemetry monitor")]
struct Args {
    /// Serial device (COM4, /dev/ttyACM0) or tcp:/udpin:/udpout: address.
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate.
    #[arg(short, long)]
    baud: Option<u32>,

    /// How long to wait for the first heartbeat, in milliseconds.
    #[arg(long)]
    heartbeat_timeout_ms: Option<u64>,

    /// Requested telemetry stream rate in Hz.
    #[arg(short, long)]
    rate: Option<u16>,

    /// Display refresh interval in milliseconds.
    #[arg(short, long, default_value_t = POLL_INTERVAL_MS,
          value_parser = clap::value_parser!(u64).range(100..=10_000))]
    interval_ms: u64,

    /// Stop after this many refreshes (runs until killed otherwise).
    #[arg(long)]
    ticks: Option<u64>,

    /// List available serial ports and exit.
    #[arg(short, long)]
    list_ports: bool,

    /// Remember the effective link settings for the next run.
    #[arg(long)]
    save: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.list_ports {
        list_ports()?;
        return Ok(());
    }

    let mut stored = PersistentSettings::load();
    if let Some(port) = &args.port {
        stored.address = Some(port.clone());
    }
    if let Some(baud) = args.baud {
        stored.baud = baud;
    }
    if let Some(timeout) = args.heartbeat_timeout_ms {
        stored.heartbeat_timeout_ms = timeout;
    }
    if let Some(rate) = args.rate {
        stored.stream_rate_hz = rate;
    }

    let settings = stored.to_link_settings();
    if args.save {
        let path = PersistentSettings::from(&settings)
            .save()
            .context("failed to save settings")?;
        info!(path = %path.display(), "saved settings");
    }

    let interval = Duration::from_millis(args.interval_ms);

    // The heartbeat wait blocks, so it runs off the display loop.
    let connect_settings = settings.clone();
    let worker = thread::spawn(move || {
        let mut controller = LinkController::new();
        let result = controller.connect(&connect_settings);
        (controller, result)
    });
    while !worker.is_finished() {
        println!("Status: connecting to {} ...", settings.address);
        thread::sleep(interval);
    }
    let (mut controller, result) = worker
        .join()
        .map_err(|_| anyhow!("connect thread panicked"))?;
    let remote = result.with_context(|| format!("connection to {} failed", settings.address))?;
    println!(
        "Status: connected to system {} ({:?})",
        remote.system_id, remote.vehicle_type
    );

    let mut tick = 0u64;
    loop {
        render(&mut controller);
        tick += 1;
        if args.ticks.is_some_and(|limit| tick >= limit) {
            break;
        }
        thread::sleep(interval);
    }

    controller.disconnect();
    Ok(())
}

fn render(controller: &mut LinkController) {
    if !controller.is_connected() {
        println!("Status: disconnected");
        return;
    }

    match controller.get_attitude() {
        Some(attitude) => println!(
            "Roll: {:.2}°  Pitch: {:.2}°  Yaw: {:.2}°",
            attitude.roll, attitude.pitch, attitude.yaw
        ),
        None => println!("Attitude: waiting for data..."),
    }

    match controller.get_position() {
        Some(position) => println!(
            "Latitude: {:.7}  Longitude: {:.7}  Altitude: {:.2}m  {}",
            position.latitude,
            position.longitude,
            position.altitude,
            position.map_url(MAP_ZOOM)
        ),
        None => println!("GPS: waiting for data..."),
    }

    println!("Satellites visible: {}", controller.get_satellite_count());
    println!();
}

fn list_ports() -> anyhow::Result<()> {
    let ports = serialport::available_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port.port_name);
    }
    Ok(())
}
