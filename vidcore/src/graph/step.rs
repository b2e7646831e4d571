use std::fmt;
use std::time::Duration;

use media_types::{Error, FrameBuffer, Result};

use crate::plugin::{ImageProcessingPlugin, PluginRegistry};
use crate::property::{Configuration, Value};

/**
    Accumulated run time of one step.
*/
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepTiming {
    pub name: String,
    pub calls: u64,
    pub total: Duration,
}

impl StepTiming {
    pub fn average(&self) -> Duration {
        match u32::try_from(self.calls) {
            Ok(0) => Duration::ZERO,
            Ok(calls) => self.total / calls,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.calls as f64),
        }
    }
}

/**
    A named use of a plugin inside a graph.

    The plugin instance is created on first use, or earlier through
    [`ProcessingGraph::instantiate`](super::ProcessingGraph::instantiate),
    and keeps its state between frames. Steps that produce new images keep
    their output buffer so it can be reused on the next frame.
*/
pub struct ProcessingStep {
    name: String,
    plugin_id: String,
    configuration: Configuration,
    plugin: Option<Box<dyn ImageProcessingPlugin>>,
    output: Option<FrameBuffer>,
    pub(super) calls: u64,
    pub(super) total: Duration,
}

impl ProcessingStep {
    pub fn new(name: impl Into<String>, plugin_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugin_id: plugin_id.into(),
            configuration: Configuration::new(),
            plugin: None,
            output: None,
            calls: 0,
            total: Duration::ZERO,
        }
    }

    pub fn with_configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn is_instantiated(&self) -> bool {
        self.plugin.is_some()
    }

    pub fn timing(&self) -> StepTiming {
        StepTiming {
            name: self.name.clone(),
            calls: self.calls,
            total: self.total,
        }
    }

    /**
        The plugin instance, created and configured if it does not exist.
    */
    pub(super) fn plugin_mut(
        &mut self,
        registry: &PluginRegistry,
    ) -> Result<&mut Box<dyn ImageProcessingPlugin>> {
        match self.plugin {
            Some(ref mut plugin) => Ok(plugin),
            None => {
                let plugin = registry.create_configured(&self.plugin_id, &self.configuration)?;
                Ok(self.plugin.insert(plugin))
            }
        }
    }

    /**
        Apply `configuration` to the plugin and keep it as the step's
        configuration.
    */
    pub(super) fn reconfigure(
        &mut self,
        registry: &PluginRegistry,
        configuration: Configuration,
    ) -> Result<()> {
        let plugin = self.plugin_mut(registry)?;
        plugin.configure(&configuration)?;
        self.configuration = configuration;
        Ok(())
    }

    pub(super) fn property(&mut self, registry: &PluginRegistry, name: &str) -> Result<Value> {
        self.plugin_mut(registry)?.get_property(name)
    }

    /**
        Run one frame through the plugin according to its mode.
    */
    pub(super) fn run(&mut self, registry: &PluginRegistry, frame: FrameBuffer) -> Result<FrameBuffer> {
        let format = frame.format();
        let plugin = match self.plugin {
            Some(ref mut plugin) => plugin,
            None => {
                let plugin = registry.create_configured(&self.plugin_id, &self.configuration)?;
                self.plugin.insert(plugin)
            }
        };

        if !plugin.is_pixel_format_supported(format) {
            return Err(Error::UnsupportedPixelFormat(format));
        }

        if plugin.is_read_only_mode() {
            plugin.observe(&frame)?;
            return Ok(frame);
        }

        if plugin.can_process_in_place() {
            let mut frame = frame;
            plugin.process_in_place(&mut frame)?;
            return Ok(frame);
        }

        plugin.process_image(&frame, &mut self.output)?;
        let expected = plugin.output_pixel_format(format);
        match &self.output {
            Some(output) if output.format() == expected => Ok(output.clone()),
            Some(output) => Err(Error::UnsupportedPixelFormat(output.format())),
            None => Err(Error::InvalidArgument(format!(
                "step '{}' produced no image",
                self.name
            ))),
        }
    }

    pub(super) fn reset_timing(&mut self) {
        self.calls = 0;
        self.total = Duration::ZERO;
    }
}

impl fmt::Debug for ProcessingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingStep")
            .field("name", &self.name)
            .field("plugin_id", &self.plugin_id)
            .field("configuration", &self.configuration)
            .field("instantiated", &self.is_instantiated())
            .finish_non_exhaustive()
    }
}
