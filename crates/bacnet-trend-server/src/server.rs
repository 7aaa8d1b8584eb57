//! Cooperative main loop.
//!
//! One thread does everything: the protocol engine gets a slice of work,
//! clock-driven inputs are sampled, due trend logs are polled and at most
//! one operator command is handled, then the loop sleeps until the next
//! tick.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bacnet_trend_codec::CodecError;
use bacnet_trend_core::registry::instances;
use bacnet_trend_core::{ObjectType, PropertyRef, RegistryError};
use chrono::{DateTime, Local, TimeZone};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::context::DeviceContext;
use crate::engine::ProtocolEngine;
use crate::operator::{help_text, OperatorCommand};
use crate::poller::TrendPoller;
use crate::sampling;
use crate::APPLICATION_VERSION;

/// Step applied to the manually adjusted analog input.
pub const MANUAL_STEP: f32 = 0.01;

/// Errors raised by the device server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Reading or writing a trend log backup failed.
    #[error("Backup failed: {0}")]
    Backup(#[from] CodecError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The configured bind address is not an IPv4 address.
    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Whether the loop keeps going after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Quit,
}

/// The device server loop.
pub struct TrendServer<E> {
    ctx: DeviceContext,
    engine: E,
    poller: TrendPoller,
    commands: Option<mpsc::Receiver<OperatorCommand>>,
}

impl<E: ProtocolEngine> TrendServer<E> {
    pub fn new(ctx: DeviceContext, engine: E) -> Self {
        Self {
            ctx,
            engine,
            poller: TrendPoller::new(),
            commands: None,
        }
    }

    /// Attach the operator command channel.
    pub fn with_commands(mut self, commands: mpsc::Receiver<OperatorCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// One loop iteration at the current time.
    pub fn step(&mut self) -> StepOutcome {
        self.step_at(&Local::now(), Instant::now())
    }

    /// One loop iteration at an explicit wall-clock and monotonic time.
    pub fn step_at<Tz>(&mut self, wall: &DateTime<Tz>, now: Instant) -> StepOutcome
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        self.engine.poll(&mut self.ctx);

        let device = self.ctx.device_instance();
        for object in sampling::sample(self.ctx.registry_mut(), &wall.time()) {
            self.engine.value_updated(
                device,
                PropertyRef::present_value(object.object_type, object.instance),
            );
        }

        let timestamp = u64::try_from(wall.timestamp()).unwrap_or(0);
        self.poller.poll(&mut self.ctx, now, timestamp);

        let Some(commands) = self.commands.as_mut() else {
            return StepOutcome::Continue;
        };
        match commands.try_recv() {
            Ok(command) => match self.handle_command(command, wall) {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(%command, error = %e, "Operator command failed");
                    StepOutcome::Continue
                }
            },
            Err(TryRecvError::Empty) => StepOutcome::Continue,
            Err(TryRecvError::Disconnected) => {
                info!("Operator input closed");
                self.commands = None;
                StepOutcome::Continue
            }
        }
    }

    /// Apply one operator command.
    pub fn handle_command<Tz>(
        &mut self,
        command: OperatorCommand,
        wall: &DateTime<Tz>,
    ) -> Result<StepOutcome, ServerError>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        match command {
            OperatorCommand::Version => {
                info!("{} version {}", env!("CARGO_PKG_NAME"), APPLICATION_VERSION);
            }
            OperatorCommand::Increment | OperatorCommand::Decrement => {
                let delta = if command == OperatorCommand::Increment {
                    MANUAL_STEP
                } else {
                    -MANUAL_STEP
                };
                let value = self.ctx.registry_mut().adjust_real(
                    ObjectType::AnalogInput,
                    instances::AI_MANUAL_INCREMENT,
                    delta,
                )?;
                info!(value, "Analog input {} adjusted", instances::AI_MANUAL_INCREMENT);
                self.engine.value_updated(
                    self.ctx.device_instance(),
                    PropertyRef::present_value(
                        ObjectType::AnalogInput,
                        instances::AI_MANUAL_INCREMENT,
                    ),
                );
            }
            OperatorCommand::BackupTrendLog => {
                let path = self.ctx.backup_trend_log(wall)?;
                info!("Trend log backed up to {}", path.display());
            }
            OperatorCommand::BackupTrendLogMultiple => {
                let path = self.ctx.backup_trend_log_multiple(wall)?;
                info!("Trend log multiple backed up to {}", path.display());
            }
            OperatorCommand::Quit => {
                info!("Quit requested");
                return Ok(StepOutcome::Quit);
            }
            OperatorCommand::Help => {
                for line in help_text().lines() {
                    info!("{}", line);
                }
            }
        }
        Ok(StepOutcome::Continue)
    }

    /// Step on a fixed interval until the operator quits.
    pub async fn run(&mut self) {
        let period = Duration::from_millis(self.ctx.config().loop_interval_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = period.as_millis() as u64, "Server loop started");
        loop {
            ticker.tick().await;
            if self.step() == StepOutcome::Quit {
                break;
            }
        }
        info!("Server loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bacnet_trend_core::{DeviceConfig, ObjectId, PresentValue, TrendLogAccess};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct RecordingEngine {
        polls: usize,
        updates: Vec<(u32, PropertyRef)>,
    }

    impl ProtocolEngine for RecordingEngine {
        fn poll(&mut self, _ctx: &mut DeviceContext) {
            self.polls += 1;
        }

        fn value_updated(&mut self, device_instance: u32, property: PropertyRef) {
            self.updates.push((device_instance, property));
        }
    }

    fn server() -> TrendServer<RecordingEngine> {
        TrendServer::new(
            DeviceContext::setup(DeviceConfig::default()),
            RecordingEngine::default(),
        )
    }

    fn wall(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 5, 29, h, m, s).unwrap()
    }

    fn ai2(server: &TrendServer<RecordingEngine>) -> PresentValue {
        server
            .context()
            .registry()
            .get(ObjectType::AnalogInput, 2)
            .unwrap()
            .present_value()
    }

    #[test]
    fn test_step_samples_and_polls() {
        let mut server = server();
        let outcome = server.step_at(&wall(6, 2, 30), Instant::now());

        assert_eq!(outcome, StepOutcome::Continue);
        assert_eq!(server.engine().polls, 1);
        let notified: Vec<ObjectId> = server.engine().updates.iter().map(|(_, p)| p.object).collect();
        assert_eq!(
            notified,
            vec![
                ObjectId::new(ObjectType::AnalogInput, 1),
                ObjectId::new(ObjectType::BinaryInput, 3),
                ObjectId::new(ObjectType::MultiStateInput, 4),
            ]
        );

        let ctx = server.context();
        let (record, _) = ctx.trend_logs().read_at(ctx.trend_log_id(), 0).unwrap();
        assert_eq!(record.timestamp, wall(6, 2, 30).timestamp() as u64);
        assert_eq!(record.payload, b"30.0".to_vec());
    }

    #[test]
    fn test_increment_and_decrement() {
        let mut server = server();
        let now = wall(0, 0, 0);

        server.handle_command(OperatorCommand::Increment, &now).unwrap();
        server.handle_command(OperatorCommand::Increment, &now).unwrap();
        server.handle_command(OperatorCommand::Decrement, &now).unwrap();

        let PresentValue::Real(v) = ai2(&server) else {
            panic!("expected a real value");
        };
        assert!((v - 0.01).abs() < 1e-6);
        assert_eq!(server.engine().updates.len(), 3);
        assert!(server
            .engine()
            .updates
            .iter()
            .all(|(device, p)| *device == 389000 && p.object == ObjectId::new(ObjectType::AnalogInput, 2)));
    }

    #[test]
    fn test_version_and_help_keep_running() {
        let mut server = server();
        let now = wall(0, 0, 0);

        for command in [OperatorCommand::Version, OperatorCommand::Help] {
            assert_eq!(server.handle_command(command, &now).unwrap(), StepOutcome::Continue);
        }
        assert_eq!(
            server.handle_command(OperatorCommand::Quit, &now).unwrap(),
            StepOutcome::Quit
        );
    }

    #[test]
    fn test_commands_from_channel() {
        let (tx, rx) = mpsc::channel(4);
        let mut server = server().with_commands(rx);
        let now = wall(1, 1, 1);

        tx.try_send(OperatorCommand::Version).unwrap();
        tx.try_send(OperatorCommand::Quit).unwrap();

        // One command per step.
        assert_eq!(server.step_at(&now, Instant::now()), StepOutcome::Continue);
        assert_eq!(server.step_at(&now, Instant::now()), StepOutcome::Quit);
    }

    #[test]
    fn test_closed_input_keeps_running() {
        let (tx, rx) = mpsc::channel(1);
        let mut server = server().with_commands(rx);
        drop(tx);

        assert_eq!(server.step_at(&wall(1, 1, 1), Instant::now()), StepOutcome::Continue);
        assert_eq!(server.step_at(&wall(1, 1, 2), Instant::now()), StepOutcome::Continue);
    }

    #[test]
    fn test_backup_commands_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = DeviceConfig {
            backup_directory: dir.path().to_path_buf(),
            ..DeviceConfig::default()
        };
        let mut server = TrendServer::new(DeviceContext::setup(config), RecordingEngine::default());
        let now = wall(12, 30, 0);
        server.step_at(&now, Instant::now());

        server.handle_command(OperatorCommand::BackupTrendLog, &now).unwrap();
        server
            .handle_command(OperatorCommand::BackupTrendLogMultiple, &now)
            .unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            [
                "trendLogBackupExample_2020May291230.txt",
                "trendLogMultipleBackupExample_2020May291230.txt",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_quit() {
        let (tx, rx) = mpsc::channel(1);
        let mut server = server().with_commands(rx);
        tx.send(OperatorCommand::Quit).await.unwrap();

        server.run().await;
        assert!(server.engine().polls >= 1);
    }
}
