//! Typed publish/subscribe bus for decoded board events.
//!
//! Callbacks run on the receive task and must not block; the adapter layer
//! only dequeues a descriptor and pushes completions from them.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{I2cReply, Pin};

/// Subscription key. Per-pin and per-channel topics carry the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ProtocolVersion,
    FirmwareQuery,
    CapabilityQuery,
    AnalogMappingQuery,
    I2cReply,
    StringData,
    DigitalRead(u8),
    AnalogRead(u8),
    PinState(u8),
    SonarResponse,
    SonarTurnDone,
    BuzzerDone,
    RoverTurnDone,
    RoverStepDone,
    RoverLineResponse,
    Error,
}

/// Data attached to a published event.
#[derive(Debug, Clone)]
pub enum EventPayload {
    Empty,
    Value(i32),
    Text(String),
    I2c(I2cReply),
    Pin(Pin),
    Error(String),
}

type Callback = Box<dyn Fn(&EventPayload) + Send + Sync>;

struct Subscriber {
    callback: Callback,
    once: bool,
}

#[derive(Default)]
pub struct EventBus {
    topics: Mutex<HashMap<Topic, Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes for every future publication of `topic`.
    pub fn on<F>(&self, topic: Topic, callback: F)
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        self.subscribe(topic, callback, false);
    }

    /// Subscribes for the next publication only.
    pub fn once<F>(&self, topic: Topic, callback: F)
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        self.subscribe(topic, callback, true);
    }

    fn subscribe<F>(&self, topic: Topic, callback: F, once: bool)
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        self.topics
            .lock()
            .unwrap()
            .entry(topic)
            .or_default()
            .push(Subscriber {
                callback: Box::new(callback),
                once,
            });
    }

    /// Invokes every subscriber of `topic` in registration order, dropping
    /// the one-shot ones afterwards. The subscriber list is detached while
    /// callbacks run so a callback may subscribe without deadlocking.
    pub fn publish(&self, topic: Topic, payload: &EventPayload) {
        let detached = { self.topics.lock().unwrap().remove(&topic) };
        let Some(detached) = detached else { return };

        let mut kept = Vec::with_capacity(detached.len());
        for subscriber in detached {
            (subscriber.callback)(payload);
            if !subscriber.once {
                kept.push(subscriber);
            }
        }

        let mut topics = self.topics.lock().unwrap();
        let slot = topics.entry(topic).or_default();
        // Anything subscribed during dispatch landed in `slot`; keep the
        // surviving originals ahead of it.
        kept.append(slot);
        *slot = kept;
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn on_fires_for_every_publication() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        bus.on(Topic::SonarResponse, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(Topic::SonarResponse, &EventPayload::Value(1));
        bus.publish(Topic::SonarResponse, &EventPayload::Value(2));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn once_fires_a_single_time() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        bus.once(Topic::ProtocolVersion, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(Topic::ProtocolVersion, &EventPayload::Empty);
        bus.publish(Topic::ProtocolVersion, &EventPayload::Empty);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn topics_are_independent() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        bus.on(Topic::DigitalRead(2), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(Topic::DigitalRead(3), &EventPayload::Value(1));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        bus.publish(Topic::DigitalRead(2), &EventPayload::Value(1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callbacks_may_subscribe_during_dispatch() {
        let bus = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let bus_ref = bus.clone();
            let counter = hits.clone();
            bus.once(Topic::Error, move |_| {
                let counter = counter.clone();
                bus_ref.on(Topic::Error, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            });
        }
        bus.publish(Topic::Error, &EventPayload::Empty);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        bus.publish(Topic::Error, &EventPayload::Empty);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
