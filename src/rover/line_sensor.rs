//! Line-follower sensor adapter. One request yields one raw octet from
//! the board, which fans out into a left and a right completion sharing
//! the request id.

use tokio::sync::mpsc::Sender;

use super::{Completion, CompletionKind, Pending, RequestKind, RequestQueue, RoverError};
use crate::board::events::{EventPayload, Topic};
use crate::board::Board;

pub struct LineSensor {
    board: Board,
    requests: RequestQueue,
}

impl LineSensor {
    pub fn new(board: &Board, responses: Sender<Completion>) -> Self {
        let requests = RequestQueue::default();

        {
            let queue = requests.clone();
            board.events().on(Topic::RoverLineResponse, move |payload| {
                let Some(pending) = queue.pop() else { return };
                let value = match payload {
                    EventPayload::Value(value) => *value,
                    _ => 0,
                };
                tracing::debug!(id = %pending.id, kind = ?pending.kind, value, "line response");
                // The sensors read 0 on the line; invert so 1 means "line
                // seen" on the client side.
                let left = Completion {
                    id: pending.id.clone(),
                    kind: CompletionKind::LineLeft,
                    result: !value & 0x01,
                };
                let right = Completion {
                    id: pending.id,
                    kind: CompletionKind::LineRight,
                    result: !(value >> 1) & 0x01,
                };
                for completion in [left, right] {
                    if responses.try_send(completion).is_err() {
                        tracing::warn!("response channel full, dropping line completion");
                    }
                }
            });
        }

        Self {
            board: board.clone(),
            requests,
        }
    }

    /// Requests one reading of both line sensors.
    pub async fn read(&self, id: &str) -> Result<(), RoverError> {
        self.requests.push(Pending {
            id: id.to_string(),
            kind: RequestKind::LineRead,
        })?;
        if let Err(e) = self.board.rover_read_line_sensors().await {
            self.requests.remove_last();
            return Err(e.into());
        }
        tracing::debug!(id, "line sensor request sent");
        Ok(())
    }
}
