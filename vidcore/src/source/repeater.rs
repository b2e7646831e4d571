use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use media_types::{Error, FrameBuffer, Result};

use crate::property::{Configurable, PropertyDescriptor, Value, ValueType};
use crate::stop::StopSignal;

use super::frame_queue::FrameQueue;
use super::{Acquired, Backend};

const REPEATER_CAPACITY: usize = 8;

/**
    A named hand-off point: graph steps push frames in, repeater sources
    pop them out.

    The queue is bounded; when the consumer falls behind, the oldest frame
    is dropped so the producer never blocks.
*/
pub struct Repeater {
    id: String,
    queue: FrameQueue,
}

impl Repeater {
    fn new(id: String) -> Self {
        Self {
            id,
            queue: FrameQueue::new(REPEATER_CAPACITY),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /**
        Queue a frame. Returns false once the repeater is closed.
    */
    pub fn push(&self, frame: FrameBuffer) -> bool {
        self.queue.push(frame)
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Option<FrameBuffer> {
        self.queue.pop_timeout(timeout)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /**
        Refuse further frames; consumers drain what is queued and end.
    */
    pub fn close(&self) {
        self.queue.close();
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl fmt::Debug for Repeater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repeater")
            .field("id", &self.id)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/**
    Directory of live repeaters by id.

    Only weak references are kept: a repeater exists while some producer or
    consumer holds it and is gone once the last one lets go.
*/
#[derive(Default)]
pub struct RepeaterRegistry {
    repeaters: Mutex<HashMap<String, Weak<Repeater>>>,
}

impl RepeaterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        The live repeater named `id`, created if none exists.
    */
    pub fn get_or_create(&self, id: &str) -> Arc<Repeater> {
        let mut repeaters = self.repeaters.lock();
        if let Some(repeater) = repeaters.get(id).and_then(Weak::upgrade) {
            return repeater;
        }

        repeaters.retain(|_, weak| weak.strong_count() > 0);
        let repeater = Arc::new(Repeater::new(id.to_string()));
        repeaters.insert(id.to_string(), Arc::downgrade(&repeater));
        debug!(repeater = id, "repeater created");
        repeater
    }

    pub fn get(&self, id: &str) -> Option<Arc<Repeater>> {
        self.repeaters.lock().get(id).and_then(Weak::upgrade)
    }

    /**
        Ids of the repeaters currently alive, sorted.
    */
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .repeaters
            .lock()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for RepeaterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeaterRegistry")
            .field("repeaters", &self.ids())
            .finish()
    }
}

const REPEATER_PROPERTIES: &[PropertyDescriptor] = &[
    PropertyDescriptor::new("repeater_id", ValueType::String, "repeater to read from").idle_only(),
    PropertyDescriptor::new(
        "poll_timeout_ms",
        ValueType::U32,
        "longest wait for a frame before checking for stop",
    )
    .with_range(1.0, 60_000.0),
];

/**
    Configuration of a repeater source. The registry is fixed at
    construction; only the id is a property.
*/
#[derive(Clone)]
pub struct RepeaterConfig {
    registry: Arc<RepeaterRegistry>,
    pub repeater_id: String,
    pub poll_timeout_ms: u32,
}

impl RepeaterConfig {
    pub fn new(registry: Arc<RepeaterRegistry>, repeater_id: impl Into<String>) -> Self {
        Self {
            registry,
            repeater_id: repeater_id.into(),
            poll_timeout_ms: 100,
        }
    }

    pub fn registry(&self) -> &Arc<RepeaterRegistry> {
        &self.registry
    }
}

impl fmt::Debug for RepeaterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeaterConfig")
            .field("repeater_id", &self.repeater_id)
            .field("poll_timeout_ms", &self.poll_timeout_ms)
            .finish_non_exhaustive()
    }
}

impl Configurable for RepeaterConfig {
    fn properties(&self) -> &'static [PropertyDescriptor] {
        REPEATER_PROPERTIES
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        match name {
            "repeater_id" => Ok(self.repeater_id.clone().into()),
            "poll_timeout_ms" => Ok(self.poll_timeout_ms.into()),
            _ => Err(Error::InvalidProperty(name.to_string())),
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        let value = self.descriptor(name)?.check(value)?;
        match name {
            "repeater_id" => self.repeater_id = value.try_into()?,
            "poll_timeout_ms" => self.poll_timeout_ms = value.try_into()?,
            _ => return Err(Error::InvalidProperty(name.to_string())),
        }
        Ok(())
    }
}

/**
    Replays frames pushed into a repeater by another graph.
*/
pub struct RepeaterBackend {
    repeater: Arc<Repeater>,
    poll_timeout: Duration,
}

impl Backend for RepeaterBackend {
    type Config = RepeaterConfig;

    fn open(config: &RepeaterConfig) -> Result<Self> {
        if config.repeater_id.is_empty() {
            return Err(Error::InvalidConfiguration("no repeater id configured".to_string()));
        }
        Ok(Self {
            repeater: config.registry.get_or_create(&config.repeater_id),
            poll_timeout: Duration::from_millis(config.poll_timeout_ms.into()),
        })
    }

    fn next_frame(&mut self, _stop: &StopSignal, image: &mut Option<FrameBuffer>) -> Acquired {
        match self.repeater.pop_timeout(self.poll_timeout) {
            Some(frame) => {
                *image = Some(frame);
                Acquired::Frame
            }
            None if self.repeater.is_closed() => Acquired::Fatal(Error::EndOfStream),
            None => Acquired::Idle,
        }
    }

    fn reconfigure(&mut self, config: &RepeaterConfig) {
        self.poll_timeout = Duration::from_millis(config.poll_timeout_ms.into());
    }
}

#[cfg(test)]
mod tests {
    use media_types::PixelFormat;

    use super::*;

    fn frame(value: u8) -> FrameBuffer {
        FrameBuffer::from_vec(1, 1, PixelFormat::Gray8, 1, vec![value]).unwrap()
    }

    #[test]
    fn registry_shares_live_repeaters() {
        let registry = RepeaterRegistry::new();
        let first = registry.get_or_create("cam");
        let second = registry.get_or_create("cam");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.ids(), vec!["cam".to_string()]);

        first.push(frame(4));
        assert_eq!(second.pop_timeout(Duration::ZERO).unwrap().data(), &[4]);
    }

    #[test]
    fn repeater_is_destroyed_with_its_last_user() {
        let registry = RepeaterRegistry::new();
        let repeater = registry.get_or_create("cam");
        repeater.push(frame(1));
        drop(repeater);

        assert!(registry.get("cam").is_none());
        assert!(registry.is_empty());
        // A fresh repeater starts empty
        assert_eq!(registry.get_or_create("cam").pending(), 0);
    }

    #[test]
    fn backend_pops_frames_and_ends_when_closed() {
        let registry = Arc::new(RepeaterRegistry::new());
        let mut config = RepeaterConfig::new(registry.clone(), "cam");
        config.set_property("poll_timeout_ms", Value::U32(5)).unwrap();

        let mut backend = RepeaterBackend::open(&config).unwrap();
        let producer = registry.get("cam").unwrap();
        let stop = StopSignal::new();
        let mut image = None;

        assert!(matches!(backend.next_frame(&stop, &mut image), Acquired::Idle));
        producer.push(frame(9));
        assert!(matches!(backend.next_frame(&stop, &mut image), Acquired::Frame));
        assert_eq!(image.as_ref().unwrap().data(), &[9]);

        producer.close();
        assert!(matches!(
            backend.next_frame(&stop, &mut image),
            Acquired::Fatal(Error::EndOfStream)
        ));
    }

    #[test]
    fn empty_id_is_invalid_configuration() {
        let config = RepeaterConfig::new(Arc::new(RepeaterRegistry::new()), "");
        assert!(matches!(
            RepeaterBackend::open(&config),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
