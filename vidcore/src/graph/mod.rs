/*!
    Processing graphs: ordered chains of plugin steps applied to each frame.
*/

mod step;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, trace};

use media_types::{Error, FrameBuffer, Result};

use crate::plugin::PluginRegistry;
use crate::property::{Configuration, Value};

pub use step::{ProcessingStep, StepTiming};

/**
    A graph shared between the thread that edits it and the source worker
    that runs it. The lock is held for a whole frame, so edits land between
    frames.
*/
pub type SharedGraph = Arc<Mutex<ProcessingGraph>>;

/**
    An ordered list of processing steps.

    Every frame passes through the steps strictly in order. The first step
    that fails aborts the frame; nothing partially processed is returned.
*/
pub struct ProcessingGraph {
    name: String,
    registry: Arc<PluginRegistry>,
    steps: Vec<ProcessingStep>,
    timing_enabled: bool,
    frames_processed: u64,
}

impl ProcessingGraph {
    pub fn new(name: impl Into<String>, registry: Arc<PluginRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
            steps: Vec::new(),
            timing_enabled: false,
            frames_processed: 0,
        }
    }

    pub fn into_shared(self) -> SharedGraph {
        Arc::new(Mutex::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[ProcessingStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Result<&ProcessingStep> {
        let len = self.steps.len();
        self.steps
            .get(index)
            .ok_or(Error::IndexOutOfBounds { index, len })
    }

    fn step_mut(&mut self, index: usize) -> Result<&mut ProcessingStep> {
        let len = self.steps.len();
        self.steps
            .get_mut(index)
            .ok_or(Error::IndexOutOfBounds { index, len })
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /**
        Append a step, returning its index.
    */
    pub fn add_step(&mut self, step: ProcessingStep) -> Result<usize> {
        if !self.registry.contains(step.plugin_id()) {
            return Err(Error::InvalidArgument(format!(
                "unknown plugin '{}'",
                step.plugin_id()
            )));
        }

        debug!(graph = %self.name, step = step.name(), plugin = step.plugin_id(), "step added");
        self.steps.push(step);
        Ok(self.steps.len() - 1)
    }

    pub fn remove_step(&mut self, index: usize) -> Result<ProcessingStep> {
        self.step(index)?;
        let step = self.steps.remove(index);
        debug!(graph = %self.name, step = step.name(), "step removed");
        Ok(step)
    }

    /**
        Move the step at `from` so that it ends up at index `to`.
    */
    pub fn move_step(&mut self, from: usize, to: usize) -> Result<()> {
        self.step(from)?;
        self.step(to)?;
        let step = self.steps.remove(from);
        self.steps.insert(to, step);
        Ok(())
    }

    /**
        Replace a step's configuration and apply it to the plugin now,
        creating the plugin first if needed. The step keeps its position.
    */
    pub fn set_plugin_configuration(&mut self, index: usize, configuration: Configuration) -> Result<()> {
        let registry = self.registry.clone();
        self.step_mut(index)?.reconfigure(&registry, configuration)
    }

    /**
        Read a property of a step's plugin.
    */
    pub fn plugin_property(&mut self, index: usize, name: &str) -> Result<Value> {
        let registry = self.registry.clone();
        self.step_mut(index)?.property(&registry, name)
    }

    /**
        Create every plugin now, so configuration errors surface before the
        first frame.
    */
    pub fn instantiate(&mut self) -> Result<()> {
        let registry = self.registry.clone();
        for step in &mut self.steps {
            step.plugin_mut(&registry)?;
        }
        Ok(())
    }

    /**
        Run `frame` through every step in order.
    */
    pub fn process(&mut self, frame: FrameBuffer) -> Result<FrameBuffer> {
        let registry = self.registry.clone();
        let mut frame = frame;
        for step in &mut self.steps {
            let started = self.timing_enabled.then(Instant::now);
            let result = step.run(&registry, frame);
            if let Some(started) = started {
                step.calls += 1;
                step.total += started.elapsed();
            }

            frame = result.map_err(|error| {
                trace!(graph = %self.name, step = step.name(), %error, "step failed");
                error
            })?;
        }

        self.frames_processed += 1;
        Ok(frame)
    }

    pub fn set_timing_enabled(&mut self, enabled: bool) {
        self.timing_enabled = enabled;
    }

    pub fn timing_enabled(&self) -> bool {
        self.timing_enabled
    }

    /**
        Per-step run times collected while timing was enabled.
    */
    pub fn timing(&self) -> Vec<StepTiming> {
        self.steps.iter().map(ProcessingStep::timing).collect()
    }

    pub fn reset_timing(&mut self) {
        for step in &mut self.steps {
            step.reset_timing();
        }
    }
}

impl fmt::Debug for ProcessingGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingGraph")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("timing_enabled", &self.timing_enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use media_types::PixelFormat;

    use super::*;
    use crate::plugin::{ImageProcessingPlugin, PluginInfo};
    use crate::property::{Configurable, PropertyDescriptor, ValueType};
    use crate::source::RepeaterRegistry;

    /// Appends its tag to a shared log and adds one to every byte.
    struct Tagger {
        tag: u8,
        log: Arc<Mutex<Vec<u8>>>,
    }

    const TAGGER_PROPERTIES: &[PropertyDescriptor] =
        &[PropertyDescriptor::new("tag", ValueType::U8, "tag written to the log")];

    impl Configurable for Tagger {
        fn properties(&self) -> &'static [PropertyDescriptor] {
            TAGGER_PROPERTIES
        }

        fn get_property(&self, name: &str) -> Result<Value> {
            match name {
                "tag" => Ok(self.tag.into()),
                _ => Err(Error::InvalidProperty(name.to_string())),
            }
        }

        fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
            let value = self.descriptor(name)?.check(value)?;
            self.tag = value.try_into()?;
            Ok(())
        }
    }

    impl ImageProcessingPlugin for Tagger {
        fn is_pixel_format_supported(&self, format: PixelFormat) -> bool {
            format == PixelFormat::Gray8
        }

        fn can_process_in_place(&self) -> bool {
            true
        }

        fn process_in_place(&mut self, image: &mut FrameBuffer) -> Result<()> {
            self.log.lock().push(self.tag);
            for value in image.data_mut() {
                *value = value.wrapping_add(1);
            }
            Ok(())
        }
    }

    fn registry(log: Arc<Mutex<Vec<u8>>>) -> Arc<PluginRegistry> {
        let mut registry = PluginRegistry::with_builtin_filters(Arc::new(RepeaterRegistry::new()));
        registry
            .register(PluginInfo::new("tagger", "Tagger", "test plugin"), move || {
                Box::new(Tagger {
                    tag: 0,
                    log: log.clone(),
                })
            })
            .unwrap();
        Arc::new(registry)
    }

    fn tagged(name: &str, tag: u8) -> ProcessingStep {
        ProcessingStep::new(name, "tagger")
            .with_configuration(Configuration::new().with("tag", Value::U8(tag)))
    }

    fn gray(value: u8) -> FrameBuffer {
        FrameBuffer::from_vec(2, 1, PixelFormat::Gray8, 2, vec![value; 2]).unwrap()
    }

    #[test]
    fn steps_run_in_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = ProcessingGraph::new("g", registry(log.clone()));
        for tag in [3, 1, 2] {
            graph.add_step(tagged(&format!("t{tag}"), tag)).unwrap();
        }

        let output = graph.process(gray(10)).unwrap();
        assert_eq!(*log.lock(), vec![3, 1, 2]);
        assert_eq!(output.data(), &[13, 13]);
        assert_eq!(graph.frames_processed(), 1);
    }

    #[test]
    fn plugins_are_created_lazily() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = ProcessingGraph::new("g", registry(log));
        graph.add_step(tagged("a", 1)).unwrap();
        assert!(!graph.step(0).unwrap().is_instantiated());

        graph.instantiate().unwrap();
        assert!(graph.step(0).unwrap().is_instantiated());
    }

    #[test]
    fn unknown_plugin_is_rejected_when_added() {
        let mut graph = ProcessingGraph::new("g", registry(Arc::default()));
        assert!(matches!(
            graph.add_step(ProcessingStep::new("x", "sharpen")),
            Err(Error::InvalidArgument(_))
        ));
        assert!(graph.is_empty());
    }

    #[test]
    fn unsupported_format_aborts_the_frame() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = ProcessingGraph::new("g", registry(log.clone()));
        graph.add_step(ProcessingStep::new("inv", "invert")).unwrap();
        graph.add_step(tagged("gray only", 1)).unwrap();
        graph.add_step(tagged("after", 2)).unwrap();

        let color = FrameBuffer::new(2, 2, PixelFormat::Rgb24).unwrap();
        assert_eq!(
            graph.process(color),
            Err(Error::UnsupportedPixelFormat(PixelFormat::Rgb24))
        );
        assert!(log.lock().is_empty());
        assert_eq!(graph.frames_processed(), 0);
    }

    #[test]
    fn original_frame_is_left_untouched() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = ProcessingGraph::new("g", registry(log));
        graph.add_step(tagged("a", 1)).unwrap();

        let input = gray(5);
        let output = graph.process(input.clone()).unwrap();
        assert_eq!(input.data(), &[5, 5]);
        assert_eq!(output.data(), &[6, 6]);
    }

    #[test]
    fn new_image_steps_change_the_format() {
        let mut graph = ProcessingGraph::new("g", registry(Arc::default()));
        graph.add_step(ProcessingStep::new("gray", "grayscale")).unwrap();
        graph.add_step(ProcessingStep::new("inv", "invert")).unwrap();

        let mut white = FrameBuffer::new(3, 2, PixelFormat::Rgb24).unwrap();
        white.data_mut().fill(255);
        let output = graph.process(white).unwrap();

        assert_eq!(output.format(), PixelFormat::Gray8);
        assert_eq!((output.width(), output.height()), (3, 2));
        assert!(output.data().iter().all(|v| *v <= 1));
    }

    #[test]
    fn steps_can_be_moved_and_removed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = ProcessingGraph::new("g", registry(log.clone()));
        for tag in [1, 2, 3] {
            graph.add_step(tagged(&format!("t{tag}"), tag)).unwrap();
        }

        graph.move_step(2, 0).unwrap();
        let removed = graph.remove_step(1).unwrap();
        assert_eq!(removed.name(), "t1");

        graph.process(gray(0)).unwrap();
        assert_eq!(*log.lock(), vec![3, 2]);

        assert_eq!(
            graph.move_step(0, 5),
            Err(Error::IndexOutOfBounds { index: 5, len: 2 })
        );
        assert!(matches!(
            graph.remove_step(2),
            Err(Error::IndexOutOfBounds { index: 2, len: 2 })
        ));
    }

    #[test]
    fn reconfiguration_applies_before_the_next_frame() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = ProcessingGraph::new("g", registry(log.clone()));
        graph.add_step(tagged("a", 1)).unwrap();
        graph.add_step(tagged("b", 2)).unwrap();
        graph.process(gray(0)).unwrap();

        graph
            .set_plugin_configuration(0, Configuration::new().with("tag", Value::U8(9)))
            .unwrap();
        graph.process(gray(0)).unwrap();

        assert_eq!(*log.lock(), vec![1, 2, 9, 2]);
        assert_eq!(graph.step(0).unwrap().name(), "a");
        assert_eq!(graph.plugin_property(0, "tag"), Ok(Value::U8(9)));
        assert!(matches!(
            graph.set_plugin_configuration(0, Configuration::new().with("tag", Value::from("x"))),
            Err(Error::IncompatibleTypes(_))
        ));
    }

    #[test]
    fn timing_is_collected_only_when_enabled() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = ProcessingGraph::new("g", registry(log));
        graph.add_step(tagged("a", 1)).unwrap();

        graph.process(gray(0)).unwrap();
        assert_eq!(graph.timing()[0].calls, 0);

        graph.set_timing_enabled(true);
        graph.process(gray(0)).unwrap();
        graph.process(gray(0)).unwrap();
        let timing = graph.timing();
        assert_eq!(timing[0].name, "a");
        assert_eq!(timing[0].calls, 2);
        assert!(timing[0].average() <= timing[0].total);

        graph.reset_timing();
        assert_eq!(graph.timing()[0].calls, 0);
    }
}
