//! Defines the axum routes and handlers.
//!
//! The URL table is fixed by the block client; every route is a GET and
//! every body is plain text. Handlers stay thin: parse path segments and
//! hand a `Command` to the broker.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Router;

use crate::broker::{Broker, Command};

type AppState = Arc<Broker>;

/// Creates the router with the full fixed URL table.
pub fn create_router(broker: AppState) -> Router {
    Router::new()
        .route("/crossdomain.xml", get(crossdomain))
        .route("/poll", get(poll))
        .route("/reset_all", get(reset_all))
        .route("/readSonar/:id", get(read_sonar))
        .route("/turnSonar/:id/:dir/:angle", get(turn_sonar))
        .route("/centerSonar/:id", get(center_sonar))
        .route("/run/:dir", get(run))
        .route("/stop", get(stop))
        .route("/turn/:id/:dir/:angle", get(turn))
        .route("/turnCalibrate/:id/:dir/:angle/:steps", get(turn_calibrate))
        .route("/reverseTurn/:id/:dir/:angle", get(reverse_turn))
        .route("/step/:id/:dir/:steps", get(step))
        .route("/wheelStep/:id/:which/:dir/:steps", get(wheel_step))
        .route("/lightOn/:red/:green/:blue", get(light_on))
        .route("/lightColor/:color", get(light_color))
        .route("/lightOff", get(light_off))
        .route("/playToneFor/:id/:freq/:delay", get(play_tone_for))
        .route("/playTone/:freq", get(play_tone))
        .route("/buzzerOff", get(buzzer_off))
        .route("/beep", get(beep))
        .route("/readLineSensor/:id", get(read_line_sensor))
        .with_state(broker)
}

/// Unparsable numbers become zero; the block client never validates.
fn number(raw: &str) -> i32 {
    raw.parse().unwrap_or(0)
}

/// Flash-era clients probe this before talking to any port.
async fn crossdomain() -> &'static str {
    "<cross-domain-policy>\n<allow-access-from domain=\"*\" to-ports=\"45678\"/>\n</cross-domain-policy>\n"
}

async fn poll(State(broker): State<AppState>) -> String {
    broker.poll().await
}

async fn reset_all(State(broker): State<AppState>) -> String {
    broker.execute(Command::Reset).await
}

async fn read_sonar(State(broker): State<AppState>, Path(id): Path<String>) -> String {
    broker.execute(Command::ReadSonar { id }).await
}

async fn turn_sonar(
    State(broker): State<AppState>,
    Path((id, dir, angle)): Path<(String, String, String)>,
) -> String {
    broker
        .execute(Command::TurnSonar {
            id,
            dir,
            angle: number(&angle),
        })
        .await
}

async fn center_sonar(State(broker): State<AppState>, Path(id): Path<String>) -> String {
    broker.execute(Command::CenterSonar { id }).await
}

async fn run(State(broker): State<AppState>, Path(dir): Path<String>) -> String {
    broker.execute(Command::Run { dir }).await
}

async fn stop(State(broker): State<AppState>) -> String {
    broker.execute(Command::Stop).await
}

async fn turn(
    State(broker): State<AppState>,
    Path((id, dir, angle)): Path<(String, String, String)>,
) -> String {
    broker
        .execute(Command::Turn {
            id,
            dir,
            angle: number(&angle),
        })
        .await
}

async fn turn_calibrate(
    State(broker): State<AppState>,
    Path((id, dir, angle, steps)): Path<(String, String, String, String)>,
) -> String {
    broker
        .execute(Command::TurnCalibrate {
            id,
            dir,
            angle: number(&angle),
            steps: number(&steps),
        })
        .await
}

async fn reverse_turn(
    State(broker): State<AppState>,
    Path((id, dir, angle)): Path<(String, String, String)>,
) -> String {
    broker
        .execute(Command::ReverseTurn {
            id,
            dir,
            angle: number(&angle),
        })
        .await
}

async fn step(
    State(broker): State<AppState>,
    Path((id, dir, steps)): Path<(String, String, String)>,
) -> String {
    broker
        .execute(Command::Step {
            id,
            dir,
            steps: number(&steps),
        })
        .await
}

async fn wheel_step(
    State(broker): State<AppState>,
    Path((id, which, dir, steps)): Path<(String, String, String, String)>,
) -> String {
    broker
        .execute(Command::WheelStep {
            id,
            which,
            dir,
            steps: number(&steps),
        })
        .await
}

async fn light_on(
    State(broker): State<AppState>,
    Path((red, green, blue)): Path<(String, String, String)>,
) -> String {
    broker
        .execute(Command::LightOn {
            red: number(&red),
            green: number(&green),
            blue: number(&blue),
        })
        .await
}

async fn light_color(State(broker): State<AppState>, Path(color): Path<String>) -> String {
    broker.execute(Command::LightColor { color }).await
}

async fn light_off(State(broker): State<AppState>) -> String {
    broker.execute(Command::LightOff).await
}

/// The client sends the duration in seconds; the firmware wants
/// milliseconds.
async fn play_tone_for(
    State(broker): State<AppState>,
    Path((id, freq, delay)): Path<(String, String, String)>,
) -> String {
    broker
        .execute(Command::PlayToneFor {
            id,
            freq: number(&freq),
            delay_ms: number(&delay) * 1000,
        })
        .await
}

async fn play_tone(State(broker): State<AppState>, Path(freq): Path<String>) -> String {
    broker.execute(Command::PlayTone { freq: number(&freq) }).await
}

async fn buzzer_off(State(broker): State<AppState>) -> String {
    broker.execute(Command::BuzzerOff).await
}

async fn beep(State(broker): State<AppState>) -> String {
    broker.execute(Command::Beep).await
}

async fn read_line_sensor(State(broker): State<AppState>, Path(id): Path<String>) -> String {
    broker.execute(Command::ReadLineSensor { id }).await
}
