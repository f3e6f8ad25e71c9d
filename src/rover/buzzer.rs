//! Piezo buzzer adapter. Only PlayFor produces a Done acknowledgement, so
//! only timed plays are tracked in the queue.

use tokio::sync::mpsc::Sender;

use super::{Completion, CompletionKind, Pending, RequestKind, RequestQueue, RoverError};
use crate::board::events::Topic;
use crate::board::Board;

pub struct Buzzer {
    board: Board,
    play_requests: RequestQueue,
}

impl Buzzer {
    pub fn new(board: &Board, responses: Sender<Completion>) -> Self {
        let play_requests = RequestQueue::default();

        {
            let queue = play_requests.clone();
            board.events().on(Topic::BuzzerDone, move |_| {
                let Some(pending) = queue.pop() else { return };
                tracing::debug!(id = %pending.id, kind = ?pending.kind, "buzzer done");
                if responses
                    .try_send(Completion {
                        id: pending.id,
                        kind: CompletionKind::BuzzerPlay,
                        result: 0,
                    })
                    .is_err()
                {
                    tracing::warn!("response channel full, dropping buzzer completion");
                }
            });
        }

        Self {
            board: board.clone(),
            play_requests,
        }
    }

    /// Plays `freq` Hz. With a positive delay the firmware sends Done
    /// afterwards and a descriptor is tracked; a zero delay plays until
    /// explicitly stopped and produces no completion.
    pub async fn play_tone(&self, id: &str, freq: u16, delay_ms: u16) -> Result<(), RoverError> {
        if delay_ms == 0 {
            return self.board.rover_play_tone(freq, 0).await.map_err(Into::into);
        }
        self.play_requests.push(Pending {
            id: id.to_string(),
            kind: RequestKind::BuzzerPlay,
        })?;
        if let Err(e) = self.board.rover_play_tone(freq, delay_ms).await {
            self.play_requests.remove_last();
            return Err(e.into());
        }
        tracing::debug!(id, freq, delay_ms, "timed play request sent");
        Ok(())
    }

    pub async fn off(&self) -> Result<(), RoverError> {
        self.board.rover_buzzer_off().await.map_err(Into::into)
    }

    pub async fn beep(&self) -> Result<(), RoverError> {
        self.board.rover_beep().await.map_err(Into::into)
    }
}
