use std::sync::Arc;

use media_types::{Error, FrameBuffer, PixelFormat, Result};
use tracing::debug;

use crate::plugin::ImageProcessingPlugin;
use crate::property::{Configurable, PropertyDescriptor, Value, ValueType};
use crate::source::{Repeater, RepeaterRegistry};

const PROPERTIES: &[PropertyDescriptor] = &[
    PropertyDescriptor::new("repeater_id", ValueType::String, "repeater to publish to"),
    PropertyDescriptor::new("dropped", ValueType::U32, "frames dropped by slow readers").read_only(),
];

/**
    Publishes every frame it sees to a [`Repeater`].

    The frame is shared, not copied; readers that modify it get their own
    copy on write.
*/
pub struct RepeaterPush {
    registry: Arc<RepeaterRegistry>,
    repeater_id: String,
    repeater: Option<Arc<Repeater>>,
}

impl RepeaterPush {
    pub fn new(registry: Arc<RepeaterRegistry>) -> Self {
        Self {
            registry,
            repeater_id: String::new(),
            repeater: None,
        }
    }
}

impl Configurable for RepeaterPush {
    fn properties(&self) -> &'static [PropertyDescriptor] {
        PROPERTIES
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        match name {
            "repeater_id" => Ok(self.repeater_id.clone().into()),
            "dropped" => {
                let dropped = self.repeater.as_ref().map_or(0, |repeater| repeater.dropped());
                Ok(Value::U32(u32::try_from(dropped).unwrap_or(u32::MAX)))
            }
            _ => Err(Error::InvalidProperty(name.to_string())),
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        let value = self.descriptor(name)?.check(value)?;
        match name {
            "repeater_id" => {
                self.repeater_id = value.try_into()?;
                self.repeater = None;
            }
            _ => return Err(Error::InvalidProperty(name.to_string())),
        }
        Ok(())
    }
}

impl ImageProcessingPlugin for RepeaterPush {
    fn is_pixel_format_supported(&self, _format: PixelFormat) -> bool {
        true
    }

    fn is_read_only_mode(&self) -> bool {
        true
    }

    fn observe(&mut self, image: &FrameBuffer) -> Result<()> {
        if self.repeater_id.trim().is_empty() {
            return Err(Error::InvalidConfiguration("repeater id is empty".to_string()));
        }

        let repeater = match &self.repeater {
            Some(repeater) => repeater,
            None => {
                debug!(id = %self.repeater_id, "publishing to repeater");
                self.repeater.insert(self.registry.get_or_create(&self.repeater_id))
            }
        };
        // A closed repeater has no readers left
        repeater.push(image.clone());
        Ok(())
    }
}
