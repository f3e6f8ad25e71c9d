//! Drive-wheel adapter: turn and step queues over the Move vendor
//! command. Run and stop are fire-and-forget.

use tokio::sync::mpsc::Sender;

use super::{Completion, CompletionKind, Pending, RequestKind, RequestQueue, RoverError};
use crate::board::constants::{
    MOVE_DIR_FWD, MOVE_DIR_REV, MOVE_STEP_LEFT, MOVE_STEP_RIGHT, TURN_LEFT, TURN_RIGHT,
};
use crate::board::events::Topic;
use crate::board::Board;

pub struct Wheels {
    board: Board,
    turn_requests: RequestQueue,
    step_requests: RequestQueue,
    responses: Sender<Completion>,
}

impl Wheels {
    pub fn new(board: &Board, responses: Sender<Completion>) -> Self {
        let turn_requests = RequestQueue::default();
        let step_requests = RequestQueue::default();

        {
            let queue = turn_requests.clone();
            let responses = responses.clone();
            board.events().on(Topic::RoverTurnDone, move |_| {
                let Some(pending) = queue.pop() else { return };
                tracing::debug!(id = %pending.id, kind = ?pending.kind, "rover turn done");
                forward(
                    &responses,
                    Completion {
                        id: pending.id,
                        kind: CompletionKind::WheelTurn,
                        result: 0,
                    },
                );
            });
        }
        {
            let queue = step_requests.clone();
            let responses = responses.clone();
            board.events().on(Topic::RoverStepDone, move |_| {
                let Some(pending) = queue.pop() else { return };
                tracing::debug!(id = %pending.id, kind = ?pending.kind, "rover step done");
                forward(
                    &responses,
                    Completion {
                        id: pending.id,
                        kind: CompletionKind::WheelStep,
                        result: 0,
                    },
                );
            });
        }

        Self {
            board: board.clone(),
            turn_requests,
            step_requests,
            responses,
        }
    }

    /// Pivots forward. `steps` is the milliseconds-per-degree calibration.
    pub async fn turn(
        &self,
        id: &str,
        direction: &str,
        angle: i32,
        steps: i32,
    ) -> Result<(), RoverError> {
        self.send_turn(id, direction, MOVE_DIR_FWD, angle, steps).await
    }

    /// Pivots with the wheels running backwards.
    pub async fn reverse_turn(
        &self,
        id: &str,
        direction: &str,
        angle: i32,
        steps: i32,
    ) -> Result<(), RoverError> {
        self.send_turn(id, direction, MOVE_DIR_REV, angle, steps).await
    }

    async fn send_turn(
        &self,
        id: &str,
        direction: &str,
        dir: u8,
        angle: i32,
        steps: i32,
    ) -> Result<(), RoverError> {
        let side = if direction == "left" { TURN_LEFT } else { TURN_RIGHT };
        if let Err(e) = self
            .board
            .rover_turn(side, dir, angle as u8, steps as u16)
            .await
        {
            forward(
                &self.responses,
                Completion {
                    id: id.to_string(),
                    kind: CompletionKind::WheelTurn,
                    result: 0,
                },
            );
            return Err(e.into());
        }
        tracing::debug!(id, direction, angle, steps, "turn request sent");
        self.turn_requests.push(Pending {
            id: id.to_string(),
            kind: RequestKind::WheelTurn,
        })
    }

    /// Steps both wheels together.
    pub async fn step(&self, id: &str, direction: &str, steps: i32) -> Result<(), RoverError> {
        let dir = move_dir(direction);
        if let Err(e) = self.board.rover_step(dir, steps as u16).await {
            forward(
                &self.responses,
                Completion {
                    id: id.to_string(),
                    kind: CompletionKind::WheelStep,
                    result: 0,
                },
            );
            return Err(e.into());
        }
        tracing::debug!(id, direction, steps, "step request sent");
        self.step_requests.push(Pending {
            id: id.to_string(),
            kind: RequestKind::WheelStep,
        })
    }

    /// Steps a single wheel.
    pub async fn wheel_step(
        &self,
        id: &str,
        which: &str,
        direction: &str,
        steps: i32,
    ) -> Result<(), RoverError> {
        let which = if which == "right" { MOVE_STEP_RIGHT } else { MOVE_STEP_LEFT };
        let dir = move_dir(direction);
        if let Err(e) = self.board.rover_wheel_step(which, dir, steps as u16).await {
            forward(
                &self.responses,
                Completion {
                    id: id.to_string(),
                    kind: CompletionKind::WheelStep,
                    result: 0,
                },
            );
            return Err(e.into());
        }
        tracing::debug!(id, direction, steps, "wheel step request sent");
        self.step_requests.push(Pending {
            id: id.to_string(),
            kind: RequestKind::WheelStep,
        })
    }

    /// Free-runs the wheels; no completion is produced.
    pub async fn run(
        &self,
        direction: &str,
        left_speed: u16,
        right_speed: u16,
    ) -> Result<(), RoverError> {
        self.board
            .rover_run(move_dir(direction), left_speed, right_speed)
            .await
            .map_err(Into::into)
    }

    pub async fn stop(&self) -> Result<(), RoverError> {
        self.board.rover_stop().await.map_err(Into::into)
    }
}

fn move_dir(direction: &str) -> u8 {
    if direction == "forward" {
        MOVE_DIR_FWD
    } else {
        MOVE_DIR_REV
    }
}

fn forward(responses: &Sender<Completion>, completion: Completion) {
    if responses.try_send(completion).is_err() {
        tracing::warn!("response channel full, dropping wheel completion");
    }
}
