//! Firmata board session: pin table, firmware identity, the connect
//! handshake, the background receive loop and every write primitive,
//! including the rover vendor commands.

pub mod codec;
pub mod constants;
pub mod events;

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep, timeout};

use self::codec::{merge_u14, split_u14, DecodedFrame, Decoder, FramingError};
use self::constants::*;
use self::events::{EventBus, EventPayload, Topic};

/// Back-off between retries when the stream momentarily has no bytes.
const READ_RETRY_DELAY: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("client is already connected")]
    AlreadyConnected,
    #[error("not connected to a board")]
    NotConnected,
    #[error("could not write requested bytes: {written} of {expected}")]
    ShortWrite { written: usize, expected: usize },
    #[error("no such pin {0}")]
    UnknownPin(usize),
}

/// One microcontroller pin as reported by the capability response.
#[derive(Debug, Clone)]
pub struct Pin {
    pub supported_modes: Vec<u8>,
    pub mode: u8,
    pub value: u16,
    pub state: u32,
    pub analog_channel: u8,
}

impl Default for Pin {
    fn default() -> Self {
        Self {
            supported_modes: Vec::new(),
            mode: OUTPUT,
            value: 0,
            state: 0,
            analog_channel: ANALOG_CHANNEL_NONE,
        }
    }
}

/// Decoded reply to an I2C read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cReply {
    pub address: u16,
    pub register: u16,
    pub data: Vec<u8>,
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

struct BoardShared {
    pins: RwLock<Vec<Pin>>,
    /// Analog channel index -> owning pin index.
    analog_pins: RwLock<Vec<usize>>,
    firmware_name: RwLock<String>,
    protocol_version: RwLock<String>,
    connected: AtomicBool,
    writer: tokio::sync::Mutex<Option<Writer>>,
    write_timeout: Duration,
    events: EventBus,
}

/// Handle to a Firmata session. Clones share the same session.
#[derive(Clone)]
pub struct Board {
    shared: Arc<BoardShared>,
}

#[derive(Clone, Copy)]
enum HandshakeStage {
    AwaitingProtocol,
    AwaitingFirmware,
    AwaitingCapabilities,
    AwaitingAnalogMapping,
}

impl Board {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(BoardShared {
                pins: RwLock::new(Vec::new()),
                analog_pins: RwLock::new(Vec::new()),
                firmware_name: RwLock::new(String::new()),
                protocol_version: RwLock::new(String::new()),
                connected: AtomicBool::new(false),
                writer: tokio::sync::Mutex::new(None),
                write_timeout,
                events: EventBus::new(),
            }),
        }
    }

    pub fn connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn firmware_name(&self) -> String {
        self.shared.firmware_name.read().unwrap().clone()
    }

    pub fn protocol_version(&self) -> String {
        self.shared.protocol_version.read().unwrap().clone()
    }

    pub fn pins(&self) -> Vec<Pin> {
        self.shared.pins.read().unwrap().clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    /// Binds the session to `stream`, resets the firmata firmware and
    /// drives the init handshake (protocol version, firmware name,
    /// capabilities, analog mapping). Once the session is ready a
    /// background task drains the stream and publishes decoded events.
    pub async fn connect<S>(&self, stream: S) -> Result<(), BoardError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if self.connected() {
            return Err(BoardError::AlreadyConnected);
        }

        let (reader, writer) = tokio::io::split(stream);
        *self.shared.writer.lock().await = Some(Box::new(writer));
        let mut source = FrameSource::new(reader);

        if let Err(e) = self.handshake(&mut source).await {
            // Leave the session unconnected on any init failure.
            *self.shared.writer.lock().await = None;
            return Err(e);
        }

        self.shared.connected.store(true, Ordering::SeqCst);
        tracing::info!(
            firmware = %self.firmware_name(),
            version = %self.protocol_version(),
            "board session ready"
        );

        let shared = self.shared.clone();
        tokio::spawn(async move {
            receive_loop(shared, source).await;
        });
        Ok(())
    }

    /// Clears the connected flag and closes the stream. The receive task
    /// terminates once it observes the flag.
    pub async fn disconnect(&self) -> Result<(), BoardError> {
        self.shared.connected.store(false, Ordering::SeqCst);
        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }

    async fn handshake<R>(&self, source: &mut FrameSource<R>) -> Result<(), BoardError>
    where
        R: AsyncRead + Unpin,
    {
        self.reset().await?;
        self.protocol_version_query().await?;

        let mut stage = HandshakeStage::AwaitingProtocol;
        loop {
            let frame = source.next_frame(None).await?;
            self.shared.handle_frame(&frame);
            match (stage, &frame) {
                (HandshakeStage::AwaitingProtocol, DecodedFrame::ProtocolVersion { .. }) => {
                    self.firmware_query().await?;
                    stage = HandshakeStage::AwaitingFirmware;
                }
                (HandshakeStage::AwaitingFirmware, DecodedFrame::Sysex { command, .. })
                    if *command == REPORT_FIRMWARE =>
                {
                    self.capability_query().await?;
                    stage = HandshakeStage::AwaitingCapabilities;
                }
                (HandshakeStage::AwaitingCapabilities, DecodedFrame::Sysex { command, .. })
                    if *command == CAPABILITY_RESPONSE =>
                {
                    self.analog_mapping_query().await?;
                    stage = HandshakeStage::AwaitingAnalogMapping;
                }
                (HandshakeStage::AwaitingAnalogMapping, DecodedFrame::Sysex { command, .. })
                    if *command == ANALOG_MAPPING_RESPONSE =>
                {
                    self.report_digital(0, 1).await?;
                    self.report_digital(1, 1).await?;
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    // --- Firmata write primitives ---

    /// Sends the SystemReset command byte.
    pub async fn reset(&self) -> Result<(), BoardError> {
        self.write(&[SYSTEM_RESET]).await
    }

    pub async fn set_pin_mode(&self, pin: usize, mode: u8) -> Result<(), BoardError> {
        {
            let mut pins = self.shared.pins.write().unwrap();
            pins.get_mut(pin).ok_or(BoardError::UnknownPin(pin))?.mode = mode;
        }
        self.write(&[SET_PIN_MODE, pin as u8, mode]).await
    }

    /// Writes `value` to `pin` and transmits the owning port's full 8-bit
    /// mask, so individual pin writes always reflect current port state.
    pub async fn digital_write(&self, pin: usize, value: u16) -> Result<(), BoardError> {
        let port = (pin / 8) as u8;
        let mask = {
            let mut pins = self.shared.pins.write().unwrap();
            pins.get_mut(pin).ok_or(BoardError::UnknownPin(pin))?.value = value;
            let mut mask = 0u8;
            for bit in 0..8 {
                if let Some(p) = pins.get(port as usize * 8 + bit) {
                    if p.value != 0 {
                        mask |= 1 << bit;
                    }
                }
            }
            mask
        };
        self.write(&[DIGITAL_MESSAGE | port, mask & 0x7F, (mask >> 7) & 0x7F])
            .await
    }

    pub async fn analog_write(&self, pin: usize, value: u16) -> Result<(), BoardError> {
        {
            let mut pins = self.shared.pins.write().unwrap();
            pins.get_mut(pin).ok_or(BoardError::UnknownPin(pin))?.value = value;
        }
        let [lsb, msb] = split_u14(value);
        self.write(&[ANALOG_MESSAGE | pin as u8, lsb, msb]).await
    }

    /// Sets the servo PWM pulse-width range for `pin`.
    pub async fn servo_config(&self, pin: usize, max_us: u16, min_us: u16) -> Result<(), BoardError> {
        let [max_lsb, max_msb] = split_u14(max_us);
        let [min_lsb, min_msb] = split_u14(min_us);
        self.write_sysex(&[SERVO_CONFIG, pin as u8, max_lsb, max_msb, min_lsb, min_msb])
            .await
    }

    pub async fn protocol_version_query(&self) -> Result<(), BoardError> {
        self.write(&[REPORT_VERSION]).await
    }

    pub async fn firmware_query(&self) -> Result<(), BoardError> {
        self.write_sysex(&[REPORT_FIRMWARE]).await
    }

    pub async fn capability_query(&self) -> Result<(), BoardError> {
        self.write_sysex(&[CAPABILITY_QUERY]).await
    }

    pub async fn analog_mapping_query(&self) -> Result<(), BoardError> {
        self.write_sysex(&[ANALOG_MAPPING_QUERY]).await
    }

    pub async fn pin_state_query(&self, pin: usize) -> Result<(), BoardError> {
        self.write_sysex(&[PIN_STATE_QUERY, pin as u8]).await
    }

    /// Enables or disables digital reporting for `port`; any non-zero
    /// state enables.
    pub async fn report_digital(&self, port: usize, state: u16) -> Result<(), BoardError> {
        self.toggle_pin_reporting(port, state, REPORT_DIGITAL).await
    }

    /// Enables or disables analog reporting for `pin`.
    pub async fn report_analog(&self, pin: usize, state: u16) -> Result<(), BoardError> {
        self.toggle_pin_reporting(pin, state, REPORT_ANALOG).await
    }

    async fn toggle_pin_reporting(&self, pin: usize, state: u16, mode: u8) -> Result<(), BoardError> {
        let state = if state != 0 { 1 } else { 0 };
        self.write(&[mode | pin as u8, state]).await
    }

    /// Reads `num_bytes` from `address` once.
    pub async fn i2c_read(&self, address: u8, num_bytes: u16) -> Result<(), BoardError> {
        let [lsb, msb] = split_u14(num_bytes);
        self.write_sysex(&[I2C_REQUEST, address, I2C_MODE_READ << 3, lsb, msb])
            .await
    }

    pub async fn i2c_write(&self, address: u8, data: &[u8]) -> Result<(), BoardError> {
        let mut message = vec![I2C_REQUEST, address, I2C_MODE_WRITE << 3];
        for &value in data {
            let [lsb, msb] = split_u14(value as u16);
            message.push(lsb);
            message.push(msb);
        }
        self.write_sysex(&message).await
    }

    /// Configures the delay before a freshly-written register may be read.
    pub async fn i2c_config(&self, delay_ms: u16) -> Result<(), BoardError> {
        self.write_sysex(&[I2C_CONFIG, (delay_ms & 0xFF) as u8, ((delay_ms >> 8) & 0xFF) as u8])
            .await
    }

    // --- Rover vendor commands ---

    /// Triggers a single ultrasonic ranging.
    pub async fn sonar_read(&self) -> Result<(), BoardError> {
        self.write_sysex(&[ROVER_SONAR, SONAR_READ]).await
    }

    /// Turns the sonar head; `angle` is degrees from center, 14-bit.
    pub async fn sonar_turn(&self, dir: u8, angle: u16) -> Result<(), BoardError> {
        let [lsb, msb] = split_u14(angle);
        self.write_sysex(&[ROVER_SONAR, SONAR_TURN, dir, lsb, msb]).await
    }

    /// Starts both wheels. Speeds are omitted from the frame when both are
    /// zero, which tells the firmware to use its default.
    pub async fn rover_run(&self, dir: u8, left_speed: u16, right_speed: u16) -> Result<(), BoardError> {
        if left_speed == 0 && right_speed == 0 {
            self.write_sysex(&[ROVER_MOVE, MOVE_RUN, dir]).await
        } else {
            let [left_lsb, left_msb] = split_u14(left_speed);
            let [right_lsb, right_msb] = split_u14(right_speed);
            self.write_sysex(&[
                ROVER_MOVE, MOVE_RUN, dir, left_lsb, left_msb, right_lsb, right_msb,
            ])
            .await
        }
    }

    pub async fn rover_stop(&self) -> Result<(), BoardError> {
        self.write_sysex(&[ROVER_MOVE, MOVE_STOP]).await
    }

    /// Pivots the rover. `steps` carries the milliseconds-per-degree
    /// calibration value.
    pub async fn rover_turn(&self, side: u8, dir: u8, angle: u8, steps: u16) -> Result<(), BoardError> {
        let [lsb, msb] = split_u14(steps);
        self.write_sysex(&[ROVER_MOVE, MOVE_TURN, side, dir, angle, lsb, msb])
            .await
    }

    pub async fn rover_step(&self, dir: u8, steps: u16) -> Result<(), BoardError> {
        let [lsb, msb] = split_u14(steps);
        self.write_sysex(&[ROVER_MOVE, MOVE_STEP, MOVE_STEP_BOTH, dir, lsb, msb])
            .await
    }

    pub async fn rover_wheel_step(&self, which: u8, dir: u8, steps: u16) -> Result<(), BoardError> {
        let [lsb, msb] = split_u14(steps);
        self.write_sysex(&[ROVER_MOVE, MOVE_STEP, which, dir, lsb, msb])
            .await
    }

    /// Sets the RGB indicator. Channel values are 8-bit by convention.
    pub async fn rover_light(&self, red: u8, green: u8, blue: u8) -> Result<(), BoardError> {
        let [red_lsb, red_msb] = split_u14(red as u16);
        let [green_lsb, green_msb] = split_u14(green as u16);
        let [blue_lsb, blue_msb] = split_u14(blue as u16);
        self.write_sysex(&[
            ROVER_LED, red_lsb, red_msb, green_lsb, green_msb, blue_lsb, blue_msb,
        ])
        .await
    }

    /// Plays `freq` Hz; a zero delay plays until stopped, otherwise the
    /// firmware acknowledges with a Done response after `delay_ms`.
    pub async fn rover_play_tone(&self, freq: u16, delay_ms: u16) -> Result<(), BoardError> {
        let [freq_lsb, freq_msb] = split_u14(freq);
        match delay_ms {
            0 => {
                self.write_sysex(&[ROVER_BUZZER, BUZZER_PLAY, freq_lsb, freq_msb])
                    .await
            }
            _ => {
                let [delay_lsb, delay_msb] = split_u14(delay_ms);
                self.write_sysex(&[
                    ROVER_BUZZER, BUZZER_PLAY_FOR, freq_lsb, freq_msb, delay_lsb, delay_msb,
                ])
                .await
            }
        }
    }

    pub async fn rover_buzzer_off(&self) -> Result<(), BoardError> {
        self.write_sysex(&[ROVER_BUZZER, BUZZER_STOP]).await
    }

    pub async fn rover_beep(&self) -> Result<(), BoardError> {
        self.write_sysex(&[ROVER_BUZZER, BUZZER_BEEP]).await
    }

    /// Liveness probe; a failed write means the board is gone.
    pub async fn rover_heart_beat(&self) -> Result<(), BoardError> {
        let mut message = vec![ROVER_HEART_BEAT];
        message.extend_from_slice(&HEART_BEAT_PAYLOAD);
        self.write_sysex(&message).await
    }

    pub async fn rover_read_line_sensors(&self) -> Result<(), BoardError> {
        self.write_sysex(&[ROVER_LINE, LINE_REQ]).await
    }

    // --- Low-level output ---

    async fn write_sysex(&self, data: &[u8]) -> Result<(), BoardError> {
        self.write(&codec::sysex(data)).await
    }

    async fn write(&self, data: &[u8]) -> Result<(), BoardError> {
        let mut guard = self.shared.writer.lock().await;
        let writer = guard.as_mut().ok_or(BoardError::NotConnected)?;
        let written = timeout(self.shared.write_timeout, writer.write(data))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "serial write timed out"))??;
        if written < data.len() {
            return Err(BoardError::ShortWrite {
                written,
                expected: data.len(),
            });
        }
        timeout(self.shared.write_timeout, writer.flush())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "serial flush timed out"))??;
        Ok(())
    }
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("connected", &self.connected())
            .field("firmware_name", &self.firmware_name())
            .field("protocol_version", &self.protocol_version())
            .finish()
    }
}

/// Pulls complete frames off a reader, retaining partial-frame bytes.
struct FrameSource<R> {
    reader: R,
    decoder: Decoder,
    pending: VecDeque<u8>,
}

impl<R: AsyncRead + Unpin> FrameSource<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: Decoder::new(),
            pending: VecDeque::new(),
        }
    }

    /// Reads until one complete frame decodes. Zero-byte reads are
    /// transient (the firmware may still be booting) and are retried after
    /// a short back-off; when `stop` is given and cleared, an empty read
    /// terminates the wait instead.
    async fn next_frame(&mut self, stop: Option<&AtomicBool>) -> Result<DecodedFrame, BoardError> {
        let mut chunk = [0u8; 64];
        loop {
            while let Some(byte) = self.pending.pop_front() {
                if let Some(frame) = self.decoder.feed(byte)? {
                    return Ok(frame);
                }
            }
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                if let Some(flag) = stop {
                    if !flag.load(Ordering::SeqCst) {
                        return Err(BoardError::NotConnected);
                    }
                }
                sleep(READ_RETRY_DELAY).await;
                continue;
            }
            self.pending.extend(&chunk[..n]);
        }
    }
}

/// Background task: drains the stream until the session disconnects,
/// publishing one event per decoded frame. Framing and I/O errors are
/// published on the `Error` topic and the loop keeps going; disconnection
/// is detected through the shared flag.
async fn receive_loop<R: AsyncRead + Unpin>(shared: Arc<BoardShared>, mut source: FrameSource<R>) {
    loop {
        if !shared.connected.load(Ordering::SeqCst) {
            tracing::debug!("receive loop stopping, session disconnected");
            return;
        }
        match source.next_frame(Some(&shared.connected)).await {
            Ok(frame) => shared.handle_frame(&frame),
            Err(BoardError::NotConnected) => return,
            Err(BoardError::Framing(e)) => {
                tracing::warn!(error = %e, "dropping malformed frame");
                shared
                    .events
                    .publish(Topic::Error, &EventPayload::Error(e.to_string()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "serial read failed");
                shared
                    .events
                    .publish(Topic::Error, &EventPayload::Error(e.to_string()));
                sleep(READ_RETRY_DELAY).await;
            }
        }
    }
}

impl BoardShared {
    fn handle_frame(&self, frame: &DecodedFrame) {
        match frame {
            DecodedFrame::ProtocolVersion { major, minor } => {
                let version = format!("{major}.{minor}");
                *self.protocol_version.write().unwrap() = version.clone();
                self.events
                    .publish(Topic::ProtocolVersion, &EventPayload::Text(version));
            }
            DecodedFrame::AnalogPinUpdate { channel, value } => {
                let stored = {
                    let analog_pins = self.analog_pins.read().unwrap();
                    match analog_pins.get(*channel as usize) {
                        Some(&pin) => {
                            let mut pins = self.pins.write().unwrap();
                            pins.get_mut(pin).map(|p| {
                                p.value = *value;
                                *value
                            })
                        }
                        None => None,
                    }
                };
                if let Some(value) = stored {
                    self.events.publish(
                        Topic::AnalogRead(*channel),
                        &EventPayload::Value(value as i32),
                    );
                }
            }
            DecodedFrame::DigitalPortUpdate { port, mask } => {
                let mut updates = Vec::new();
                {
                    let mut pins = self.pins.write().unwrap();
                    for bit in 0..8usize {
                        let pin = *port as usize * 8 + bit;
                        if let Some(p) = pins.get_mut(pin) {
                            if p.mode == INPUT {
                                p.value = (mask >> bit) & 0x01;
                                updates.push((pin, p.value));
                            }
                        }
                    }
                }
                for (pin, value) in updates {
                    self.events.publish(
                        Topic::DigitalRead(pin as u8),
                        &EventPayload::Value(value as i32),
                    );
                }
            }
            DecodedFrame::Sysex { command, payload } => self.handle_sysex(*command, payload),
        }
    }

    fn handle_sysex(&self, command: u8, payload: &[u8]) {
        match command {
            CAPABILITY_RESPONSE => self.handle_capability_response(payload),
            ANALOG_MAPPING_RESPONSE => self.handle_analog_mapping_response(payload),
            PIN_STATE_RESPONSE => self.handle_pin_state_response(payload),
            I2C_REPLY => self.handle_i2c_reply(payload),
            REPORT_FIRMWARE => self.handle_firmware_report(payload),
            STRING_DATA => self.handle_string_data(payload),
            ROVER_SONAR => self.handle_sonar_response(payload),
            ROVER_BUZZER => {
                if payload.first() == Some(&BUZZER_DONE) {
                    self.events.publish(Topic::BuzzerDone, &EventPayload::Empty);
                }
            }
            ROVER_MOVE => match payload.first() {
                Some(&MOVE_TURN_RESP) => {
                    self.events.publish(Topic::RoverTurnDone, &EventPayload::Empty);
                }
                Some(&MOVE_STEP_RESP) => {
                    self.events.publish(Topic::RoverStepDone, &EventPayload::Empty);
                }
                _ => {}
            },
            ROVER_LINE => self.handle_line_response(payload),
            _ => {
                tracing::trace!("ignoring sysex command {command:#04x}");
            }
        }
    }

    /// Payload is a `(mode, resolution)` pair list per pin, each pin
    /// terminated by `0x7F`. The pin table is rebuilt from scratch.
    fn handle_capability_response(&self, payload: &[u8]) {
        let mut new_pins = Vec::new();
        let mut supported = 0u32;
        let mut nibble = 0;
        for &value in payload {
            if value == 0x7F {
                let supported_modes = [INPUT, OUTPUT, ANALOG, PWM, SERVO]
                    .iter()
                    .copied()
                    .filter(|&mode| supported & (1 << mode) != 0)
                    .collect();
                new_pins.push(Pin {
                    supported_modes,
                    ..Pin::default()
                });
                supported = 0;
                nibble = 0;
                continue;
            }
            if nibble == 0 && value < 32 {
                supported |= 1 << value;
            }
            nibble ^= 1;
        }
        let count = new_pins.len();
        *self.pins.write().unwrap() = new_pins;
        tracing::debug!(pins = count, "capability response rebuilt pin table");
        self.events
            .publish(Topic::CapabilityQuery, &EventPayload::Empty);
    }

    /// One byte per known pin; `0x7F` means no analog channel.
    fn handle_analog_mapping_response(&self, payload: &[u8]) {
        let mut analog_pins = Vec::new();
        {
            let mut pins = self.pins.write().unwrap();
            let count = pins.len();
            for (index, &channel) in payload.iter().take(count).enumerate() {
                pins[index].analog_channel = channel;
                if channel != ANALOG_CHANNEL_NONE {
                    analog_pins.push(index);
                }
            }
        }
        *self.analog_pins.write().unwrap() = analog_pins;
        self.events
            .publish(Topic::AnalogMappingQuery, &EventPayload::Empty);
    }

    /// Payload: pin, mode, then up to three 7-bit state groups.
    fn handle_pin_state_response(&self, payload: &[u8]) {
        if payload.len() < 3 {
            return;
        }
        let pin = payload[0] as usize;
        let mut state = payload[2] as u32;
        if payload.len() > 3 {
            state |= (payload[3] as u32) << 7;
        }
        if payload.len() > 4 {
            state |= (payload[4] as u32) << 14;
        }
        let snapshot = {
            let mut pins = self.pins.write().unwrap();
            match pins.get_mut(pin) {
                Some(p) => {
                    p.mode = payload[1];
                    p.state = state;
                    p.clone()
                }
                None => return,
            }
        };
        self.events
            .publish(Topic::PinState(pin as u8), &EventPayload::Pin(snapshot));
    }

    /// Address and register are 14-bit pairs, then data bytes as
    /// `(lsb7, msb7)` pairs, low nibble first.
    fn handle_i2c_reply(&self, payload: &[u8]) {
        if payload.len() < 6 {
            return;
        }
        let mut data = vec![payload[4] | (payload[5] << 7)];
        let mut index = 6;
        while index + 1 < payload.len() {
            data.push(payload[index] | (payload[index + 1] << 7));
            index += 2;
        }
        let reply = I2cReply {
            address: merge_u14(payload[0], payload[1]),
            register: merge_u14(payload[2], payload[3]),
            data,
        };
        self.events
            .publish(Topic::I2cReply, &EventPayload::I2c(reply));
    }

    /// Two version bytes, then the name as 7-bit character pairs with the
    /// zero bytes skipped.
    fn handle_firmware_report(&self, payload: &[u8]) {
        if payload.len() < 2 {
            return;
        }
        let name_bytes: Vec<u8> = payload[2..].iter().copied().filter(|&b| b != 0).collect();
        let name = String::from_utf8_lossy(&name_bytes).into_owned();
        *self.firmware_name.write().unwrap() = name.clone();
        self.events
            .publish(Topic::FirmwareQuery, &EventPayload::Text(name));
    }

    fn handle_string_data(&self, payload: &[u8]) {
        let text_bytes = match payload.split_last() {
            Some((&0, rest)) => rest,
            _ => payload,
        };
        let text = String::from_utf8_lossy(text_bytes).into_owned();
        self.events
            .publish(Topic::StringData, &EventPayload::Text(text));
    }

    fn handle_sonar_response(&self, payload: &[u8]) {
        match payload.first() {
            Some(&SONAR_RESP) if payload.len() >= 3 => {
                let distance = merge_u14(payload[1], payload[2]);
                self.events
                    .publish(Topic::SonarResponse, &EventPayload::Value(distance as i32));
            }
            Some(&SONAR_TURN) if payload.get(1) == Some(&TURN_RESP) => {
                self.events
                    .publish(Topic::SonarTurnDone, &EventPayload::Empty);
            }
            _ => {}
        }
    }

    fn handle_line_response(&self, payload: &[u8]) {
        if payload.first() != Some(&LINE_RESP) || payload.len() < 3 {
            return;
        }
        let left = payload[1];
        let right = payload[2];
        let value = (right << 1) | left;
        self.events
            .publish(Topic::RoverLineResponse, &EventPayload::Value(value as i32));
    }
}
