//! Ultrasonic range-finder adapter: two FIFO queues, one for ranging and
//! one for head turns.

use tokio::sync::mpsc::Sender;

use super::{Completion, CompletionKind, Pending, RequestKind, RequestQueue, RoverError};
use crate::board::constants::{TURN_LEFT, TURN_RIGHT};
use crate::board::events::{EventPayload, Topic};
use crate::board::Board;

/// Sentinel distance in centimetres when no echo came back.
pub const MAX_DISTANCE: i32 = 9999;

pub struct Sonar {
    board: Board,
    range_requests: RequestQueue,
    turn_requests: RequestQueue,
    responses: Sender<Completion>,
}

impl Sonar {
    pub fn new(board: &Board, responses: Sender<Completion>) -> Self {
        let range_requests = RequestQueue::default();
        let turn_requests = RequestQueue::default();

        {
            let queue = range_requests.clone();
            let responses = responses.clone();
            board.events().on(Topic::SonarResponse, move |payload| {
                let Some(pending) = queue.pop() else { return };
                let result = match payload {
                    EventPayload::Value(distance) => *distance,
                    _ => MAX_DISTANCE,
                };
                tracing::debug!(id = %pending.id, distance = result, "sonar range response");
                forward(
                    &responses,
                    Completion {
                        id: pending.id,
                        kind: CompletionKind::SonarRange,
                        result,
                    },
                );
            });
        }
        {
            let queue = turn_requests.clone();
            let responses = responses.clone();
            board.events().on(Topic::SonarTurnDone, move |_| {
                let Some(pending) = queue.pop() else { return };
                tracing::debug!(id = %pending.id, kind = ?pending.kind, "sonar turn done");
                forward(
                    &responses,
                    Completion {
                        id: pending.id,
                        kind: CompletionKind::SonarTurn,
                        result: 0,
                    },
                );
            });
        }

        Self {
            board: board.clone(),
            range_requests,
            turn_requests,
            responses,
        }
    }

    /// Fires one ranging. On transmit failure an immediate completion with
    /// the sentinel distance is pushed so the id never lingers.
    pub async fn read_range(&self, id: &str) -> Result<(), RoverError> {
        if let Err(e) = self.board.sonar_read().await {
            forward(
                &self.responses,
                Completion {
                    id: id.to_string(),
                    kind: CompletionKind::SonarRange,
                    result: MAX_DISTANCE,
                },
            );
            return Err(e.into());
        }
        tracing::debug!(id, "sonar range request sent");
        self.range_requests.push(Pending {
            id: id.to_string(),
            kind: RequestKind::SonarRange,
        })
    }

    /// Turns the sonar head. The head only sweeps a quarter circle, so the
    /// angle is taken modulo 91.
    pub async fn turn(&self, id: &str, direction: &str, angle: i32) -> Result<(), RoverError> {
        let dir = if direction == "right" { TURN_RIGHT } else { TURN_LEFT };
        let angle = angle.rem_euclid(91) as u16;

        if let Err(e) = self.board.sonar_turn(dir, angle).await {
            forward(
                &self.responses,
                Completion {
                    id: id.to_string(),
                    kind: CompletionKind::SonarTurn,
                    result: 0,
                },
            );
            return Err(e.into());
        }
        tracing::debug!(id, direction, angle, "sonar turn request sent");
        self.turn_requests.push(Pending {
            id: id.to_string(),
            kind: RequestKind::SonarTurn,
        })
    }
}

fn forward(responses: &Sender<Completion>, completion: Completion) {
    if responses.try_send(completion).is_err() {
        tracing::warn!("response channel full, dropping sonar completion");
    }
}
