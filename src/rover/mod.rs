//! Rover peripheral layer: one adapter per function area, each owning the
//! FIFO pairing between issued commands and board acknowledgements, plus
//! the `Rover` aggregate that brings a full session up.

mod buzzer;
mod line_sensor;
mod sonar;
mod wheels;

pub use buzzer::Buzzer;
pub use line_sensor::LineSensor;
pub use sonar::{Sonar, MAX_DISTANCE};
pub use wheels::Wheels;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;
use tokio_serial::SerialPortBuilderExt;

use crate::board::{Board, BoardError};
use crate::config::Config;

/// Bound on every per-adapter FIFO queue.
pub const QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Error)]
pub enum RoverError {
    #[error("board error: {0}")]
    Board(#[from] BoardError),
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("adapter queue full")]
    QueueFull,
}

/// What a pending descriptor is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    SonarRange,
    SonarTurn,
    WheelTurn,
    WheelStep,
    BuzzerPlay,
    LineRead,
}

/// What a drained completion reports. A single line-sensor request fans
/// out into the two line completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    SonarRange,
    SonarTurn,
    WheelTurn,
    WheelStep,
    BuzzerPlay,
    LineLeft,
    LineRight,
}

/// In-flight request descriptor, enqueued when the board command goes out
/// and dequeued FIFO by the matching acknowledgement.
#[derive(Debug, Clone)]
pub(crate) struct Pending {
    pub id: String,
    pub kind: RequestKind,
}

/// Result of an acknowledged asynchronous command, carrying the
/// originating request id.
#[derive(Debug, Clone)]
pub struct Completion {
    pub id: String,
    pub kind: CompletionKind,
    pub result: i32,
}

/// Bounded FIFO shared between the command path (push) and the receive
/// task's event callbacks (pop). Both sides are non-blocking.
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestQueue {
    inner: Arc<Mutex<VecDeque<Pending>>>,
}

impl RequestQueue {
    pub fn push(&self, pending: Pending) -> Result<(), RoverError> {
        let mut queue = self.inner.lock().unwrap();
        if queue.len() >= QUEUE_CAPACITY {
            return Err(RoverError::QueueFull);
        }
        queue.push_back(pending);
        Ok(())
    }

    pub fn pop(&self) -> Option<Pending> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Takes back the most recently pushed descriptor; used to undo an
    /// enqueue whose transmit failed.
    pub fn remove_last(&self) -> Option<Pending> {
        self.inner.lock().unwrap().pop_back()
    }
}

/// The assembled rover: a board session plus the four peripheral
/// adapters, all feeding one shared completion channel.
pub struct Rover {
    board: Board,
    pub sonar: Sonar,
    pub buzzer: Buzzer,
    pub wheels: Wheels,
    pub line_sensor: LineSensor,
}

impl Rover {
    /// Opens the serial port and brings up a full session.
    pub async fn setup(config: &Config, responses: Sender<Completion>) -> Result<Self, RoverError> {
        tracing::info!(port = %config.com_port, baud = config.baud, "connecting to board");
        let stream = tokio_serial::new(config.com_port.as_str(), config.baud).open_native_async()?;
        Self::attach(stream, config.write_timeout(), responses).await
    }

    /// Builds a session on an already-open byte stream: runs the firmata
    /// handshake, wires the adapters and plays the startup indication.
    pub async fn attach<S>(
        stream: S,
        write_timeout: Duration,
        responses: Sender<Completion>,
    ) -> Result<Self, RoverError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let board = Board::new(write_timeout);
        board.connect(stream).await?;
        tracing::info!(
            firmware = %board.firmware_name(),
            version = %board.protocol_version(),
            "connected and initialized firmata"
        );

        let sonar = Sonar::new(&board, responses.clone());
        let buzzer = Buzzer::new(&board, responses.clone());
        let wheels = Wheels::new(&board, responses.clone());
        let line_sensor = LineSensor::new(&board, responses);

        let rover = Self {
            board,
            sonar,
            buzzer,
            wheels,
            line_sensor,
        };
        rover.startup_indication().await;
        Ok(rover)
    }

    pub fn connected(&self) -> bool {
        self.board.connected()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub async fn reset(&self) -> Result<(), RoverError> {
        self.board.reset().await.map_err(Into::into)
    }

    pub async fn heart_beat(&self) -> Result<(), RoverError> {
        self.board.rover_heart_beat().await.map_err(Into::into)
    }

    pub async fn light_on(&self, red: u8, green: u8, blue: u8) -> Result<(), RoverError> {
        self.board.rover_light(red, green, blue).await.map_err(Into::into)
    }

    /// Named palette for the block client; anything unknown is black.
    pub async fn light_color(&self, color: &str) -> Result<(), RoverError> {
        let (red, green, blue) = match color {
            "red" => (255, 0, 0),
            "green" => (0, 255, 0),
            "blue" => (0, 0, 255),
            "yellow" => (255, 255, 0),
            "cyan" => (0, 255, 255),
            "magenta" => (255, 0, 255),
            "white" => (255, 255, 255),
            _ => (0, 0, 0),
        };
        self.light_on(red, green, blue).await
    }

    pub async fn light_off(&self) -> Result<(), RoverError> {
        self.light_on(0, 0, 0).await
    }

    /// Red flash, two beeps, green flash: tells the operator the link is
    /// alive before the first command arrives.
    async fn startup_indication(&self) {
        let _ = self.light_color("red").await;
        sleep(Duration::from_millis(80)).await;
        let _ = self.buzzer.beep().await;
        sleep(Duration::from_millis(500)).await;
        let _ = self.light_color("green").await;
        sleep(Duration::from_millis(80)).await;
        let _ = self.buzzer.beep().await;
        sleep(Duration::from_millis(500)).await;
        let _ = self.buzzer.beep().await;
        let _ = self.light_off().await;
    }
}
