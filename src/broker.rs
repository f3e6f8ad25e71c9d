//! Request broker: turns named commands into peripheral calls, tracks
//! outstanding request ids, drains the shared completion channel for
//! `/poll` and keeps the board alive with heartbeats.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::time::{timeout, Instant};

use crate::config::Config;
use crate::rover::{Completion, CompletionKind, Rover, RoverError};

/// Bound of the shared completion channel.
pub const RESPONSE_CAPACITY: usize = 100;

/// How long a single `/poll` keeps draining once the channel goes quiet.
const POLL_DRAIN_WINDOW: Duration = Duration::from_millis(5);

/// No command for this long triggers a heartbeat on the next poll.
const HEARTBEAT_IDLE: Duration = Duration::from_secs(1);

/// With work outstanding, heartbeats only start once replies have been
/// overdue for this long.
const HEARTBEAT_OVERDUE: Duration = Duration::from_secs(5);

const PROBLEM_NOT_CONNECTED: &str = "_problem Roverduino is not connected\n";
const PROBLEM_COMMAND_FAILED: &str = "_problem Could not execute command\n";

/// Default milliseconds-per-degree for wheel turns, until `/turnCalibrate`
/// overrides it.
const DEFAULT_MILLIS_PER_DEGREE: i32 = 6;

/// One named command from the HTTP surface. Numeric path segments that
/// fail to parse arrive as zero, matching the lenient client protocol.
#[derive(Debug, Clone)]
pub enum Command {
    Reset,
    ReadSonar { id: String },
    TurnSonar { id: String, dir: String, angle: i32 },
    CenterSonar { id: String },
    Run { dir: String },
    Stop,
    Turn { id: String, dir: String, angle: i32 },
    TurnCalibrate { id: String, dir: String, angle: i32, steps: i32 },
    ReverseTurn { id: String, dir: String, angle: i32 },
    Step { id: String, dir: String, steps: i32 },
    WheelStep { id: String, which: String, dir: String, steps: i32 },
    LightOn { red: i32, green: i32, blue: i32 },
    LightColor { color: String },
    LightOff,
    PlayToneFor { id: String, freq: i32, delay_ms: i32 },
    PlayTone { freq: i32 },
    BuzzerOff,
    Beep,
    ReadLineSensor { id: String },
}

impl Command {
    /// The client-supplied request id, for commands that are polled for.
    pub fn id(&self) -> Option<&str> {
        match self {
            Command::ReadSonar { id }
            | Command::TurnSonar { id, .. }
            | Command::CenterSonar { id }
            | Command::Turn { id, .. }
            | Command::TurnCalibrate { id, .. }
            | Command::ReverseTurn { id, .. }
            | Command::Step { id, .. }
            | Command::WheelStep { id, .. }
            | Command::PlayToneFor { id, .. }
            | Command::ReadLineSensor { id } => Some(id),
            _ => None,
        }
    }
}

pub struct Broker {
    config: Config,
    rover: tokio::sync::Mutex<Option<Rover>>,
    outstanding: Mutex<HashSet<String>>,
    responses_tx: Sender<Completion>,
    responses_rx: tokio::sync::Mutex<Receiver<Completion>>,
    last_command: Mutex<Instant>,
    last_pending: Mutex<Instant>,
    millis_per_degree_turn: AtomicI32,
}

impl Broker {
    pub fn new(config: Config) -> Self {
        let (responses_tx, responses_rx) = channel(RESPONSE_CAPACITY);
        Self {
            config,
            rover: tokio::sync::Mutex::new(None),
            outstanding: Mutex::new(HashSet::new()),
            responses_tx,
            responses_rx: tokio::sync::Mutex::new(responses_rx),
            last_command: Mutex::new(Instant::now()),
            last_pending: Mutex::new(Instant::now()),
            millis_per_degree_turn: AtomicI32::new(DEFAULT_MILLIS_PER_DEGREE),
        }
    }

    /// Binds an already-open byte stream instead of opening the configured
    /// serial port.
    pub async fn attach<S>(&self, stream: S) -> Result<(), RoverError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let rover = Rover::attach(
            stream,
            self.config.write_timeout(),
            self.responses_tx.clone(),
        )
        .await?;
        *self.rover.lock().await = Some(rover);
        self.outstanding.lock().unwrap().clear();
        Ok(())
    }

    /// Runs one command: reconnects if needed, dispatches to the owning
    /// adapter and registers the id as outstanding on success. Returns the
    /// body for the HTTP response (empty on success).
    pub async fn execute(&self, command: Command) -> String {
        let mut rover = self.rover.lock().await;
        self.ensure_connected(&mut rover).await;
        let Some(rover) = rover.as_ref() else {
            return PROBLEM_NOT_CONNECTED.to_string();
        };

        *self.last_command.lock().unwrap() = Instant::now();

        let id = command.id().map(str::to_string);
        match self.dispatch(rover, &command).await {
            Ok(()) => {
                if let Some(id) = id {
                    self.outstanding.lock().unwrap().insert(id);
                    *self.last_pending.lock().unwrap() = Instant::now();
                }
                String::new()
            }
            Err(e) => {
                tracing::warn!(command = ?command, error = %e, "command failed");
                PROBLEM_COMMAND_FAILED.to_string()
            }
        }
    }

    async fn dispatch(&self, rover: &Rover, command: &Command) -> Result<(), RoverError> {
        match command {
            Command::Reset => rover.reset().await,
            Command::ReadSonar { id } => rover.sonar.read_range(id).await,
            Command::TurnSonar { id, dir, angle } => rover.sonar.turn(id, dir, *angle).await,
            Command::CenterSonar { id } => rover.sonar.turn(id, "left", 0).await,
            Command::Run { dir } => rover.wheels.run(dir, 0, 0).await,
            Command::Stop => rover.wheels.stop().await,
            Command::Turn { id, dir, angle } => {
                let steps = self.millis_per_degree_turn.load(Ordering::SeqCst);
                rover.wheels.turn(id, dir, *angle, steps).await
            }
            Command::TurnCalibrate { id, dir, angle, steps } => {
                self.millis_per_degree_turn.store(*steps, Ordering::SeqCst);
                rover.wheels.turn(id, dir, *angle, *steps).await
            }
            Command::ReverseTurn { id, dir, angle } => {
                let steps = self.millis_per_degree_turn.load(Ordering::SeqCst);
                rover.wheels.reverse_turn(id, dir, *angle, steps).await
            }
            Command::Step { id, dir, steps } => rover.wheels.step(id, dir, *steps).await,
            Command::WheelStep { id, which, dir, steps } => {
                rover.wheels.wheel_step(id, which, dir, *steps).await
            }
            Command::LightOn { red, green, blue } => {
                rover.light_on(*red as u8, *green as u8, *blue as u8).await
            }
            Command::LightColor { color } => rover.light_color(color).await,
            Command::LightOff => rover.light_off().await,
            Command::PlayToneFor { id, freq, delay_ms } => {
                rover.buzzer.play_tone(id, *freq as u16, *delay_ms as u16).await
            }
            Command::PlayTone { freq } => rover.buzzer.play_tone("", *freq as u16, 0).await,
            Command::BuzzerOff => rover.buzzer.off().await,
            Command::Beep => rover.buzzer.beep().await,
            Command::ReadLineSensor { id } => rover.line_sensor.read(id).await,
        }
    }

    /// Drains completions for up to the drain window, reports what is
    /// still pending and drives the heartbeat cadence.
    pub async fn poll(&self) -> String {
        {
            let mut rover = self.rover.lock().await;
            self.ensure_connected(&mut rover).await;
            if rover.is_none() {
                return PROBLEM_NOT_CONNECTED.to_string();
            }
        }

        let mut body = String::new();
        {
            let mut responses = self.responses_rx.lock().await;
            loop {
                match timeout(POLL_DRAIN_WINDOW, responses.recv()).await {
                    Ok(Some(completion)) => {
                        self.outstanding.lock().unwrap().remove(&completion.id);
                        match completion.kind {
                            CompletionKind::SonarRange => {
                                tracing::info!(id = %completion.id, cm = completion.result, "sonar range");
                                body.push_str(&format!("sonarRange {}\n", completion.result));
                            }
                            CompletionKind::LineLeft => {
                                tracing::info!(id = %completion.id, value = completion.result, "line left");
                                body.push_str(&format!("lineLeft {}\n", completion.result));
                            }
                            CompletionKind::LineRight => {
                                tracing::info!(id = %completion.id, value = completion.result, "line right");
                                body.push_str(&format!("lineRight {}\n", completion.result));
                            }
                            _ => {}
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
        }

        let pending: Vec<String> = {
            let outstanding = self.outstanding.lock().unwrap();
            outstanding.iter().cloned().collect()
        };
        if !pending.is_empty() {
            body.push_str(&format!("_busy {}\n", pending.join(" ")));
            let overdue = self.last_pending.lock().unwrap().elapsed() >= HEARTBEAT_OVERDUE;
            if overdue && self.last_command.lock().unwrap().elapsed() >= HEARTBEAT_IDLE {
                self.heart_beat().await;
            }
        } else {
            *self.last_pending.lock().unwrap() = Instant::now();
            if self.last_command.lock().unwrap().elapsed() >= HEARTBEAT_IDLE {
                self.heart_beat().await;
            }
        }
        body
    }

    /// Attempts a (re)connect when the session is down. A fresh session
    /// has no acknowledgements coming, so the outstanding set is cleared.
    async fn ensure_connected(&self, rover: &mut Option<Rover>) {
        if rover.as_ref().is_some_and(|r| r.connected()) {
            return;
        }
        match Rover::setup(&self.config, self.responses_tx.clone()).await {
            Ok(fresh) => {
                self.outstanding.lock().unwrap().clear();
                *rover = Some(fresh);
            }
            Err(e) => {
                tracing::warn!(port = %self.config.com_port, error = %e, "could not connect to board");
                *rover = None;
            }
        }
    }

    /// A heartbeat that cannot be written means the board is gone; the
    /// process exits and the wrapper respawns it against a fresh port.
    async fn heart_beat(&self) {
        *self.last_command.lock().unwrap() = Instant::now();
        tracing::debug!("rover heartbeat");
        let rover = self.rover.lock().await;
        let Some(rover) = rover.as_ref() else { return };
        if let Err(e) = rover.heart_beat().await {
            tracing::error!(error = %e, "board is disconnected");
            if let Err(e) = rover.board().disconnect().await {
                tracing::error!(error = %e, "could not release board");
            }
            std::process::exit(1);
        }
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("config", &self.config)
            .field(
                "millis_per_degree_turn",
                &self.millis_per_degree_turn.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}
