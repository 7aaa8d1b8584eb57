use std::io::{self, BufReader, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::Context;
use bacnet_trend_core::DeviceConfig;
use bacnet_trend_server::operator::{help_text, spawn_key_reader, spawn_line_reader, RawModeGuard};
use bacnet_trend_server::{DeviceContext, PassiveEngine, TrendServer, UdpTransport, APPLICATION_VERSION};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable naming the JSON configuration file.
const CONFIG_ENV: &str = "BACNET_TREND_CONFIG";

/// Stdout with `\n` expanded to `\r\n`, readable while the terminal is raw.
struct ConsoleWriter;

impl Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = io::stdout().lock();
        for chunk in buf.split_inclusive(|b| *b == b'\n') {
            match chunk.strip_suffix(b"\n") {
                Some(line) => {
                    out.write_all(line)?;
                    out.write_all(b"\r\n")?;
                }
                None => out.write_all(chunk)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,bacnet_trend_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(|| ConsoleWriter))
        .init();

    tracing::info!("BACnet trend server {} starting...", APPLICATION_VERSION);

    let config = load_config()?;
    let mut ctx = DeviceContext::setup(config);

    // The device does not start without its backup data.
    let loaded = ctx.load_backups().context("Failed to load trend log backups")?;
    tracing::info!(
        trend_log = loaded.trend_log.loaded,
        trend_log_multiple = loaded.trend_log_multiple.loaded,
        "Trend logs restored"
    );

    let transport = UdpTransport::bind(&ctx.config().bind_address, ctx.config().bacnet_port).await?;
    tracing::info!(
        "Device {} ready: {}",
        ctx.device_instance(),
        ctx.registry().device().name
    );
    for line in help_text().lines() {
        tracing::info!("{}", line);
    }

    // Single keypresses need raw mode; piped input is read as characters.
    let (_raw_mode, commands) = if io::stdin().is_terminal() {
        let guard = RawModeGuard::enable().context("Failed to enable raw terminal mode")?;
        (Some(guard), spawn_key_reader()?)
    } else {
        (None, spawn_line_reader(BufReader::new(io::stdin()))?)
    };

    let mut server = TrendServer::new(ctx, PassiveEngine::new(transport)).with_commands(commands);

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn load_config() -> anyhow::Result<DeviceConfig> {
    let Some(path) = std::env::var_os(CONFIG_ENV).map(PathBuf::from) else {
        tracing::info!("{} not set, using default configuration", CONFIG_ENV);
        return Ok(DeviceConfig::default());
    };

    if !path.exists() {
        tracing::warn!("Configuration {} not found, using defaults", path.display());
        return Ok(DeviceConfig::default());
    }

    let config = DeviceConfig::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::info!("Configuration loaded from {}", path.display());
    Ok(config)
}
