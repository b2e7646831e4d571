/*!
    Image processing plugins and the registry that creates them.
*/

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use media_types::{Error, FrameBuffer, PixelFormat, Result};

use crate::filters;
use crate::property::{Configurable, Configuration};
use crate::source::RepeaterRegistry;

/**
    One processing stage of a graph.

    A plugin works in exactly one of three modes, checked in this order:
    read-only plugins [`observe`] frames and pass them on unchanged,
    in-place plugins modify the frame through [`process_in_place`], and all
    others write a new image with [`process_image`]. The graph only calls
    the method matching the mode, and only for formats the plugin supports.

    [`observe`]: ImageProcessingPlugin::observe
    [`process_in_place`]: ImageProcessingPlugin::process_in_place
    [`process_image`]: ImageProcessingPlugin::process_image
*/
pub trait ImageProcessingPlugin: Configurable + Send {
    fn is_pixel_format_supported(&self, format: PixelFormat) -> bool;

    /**
        Format of the image [`process_image`](Self::process_image) produces
        for `input`.
    */
    fn output_pixel_format(&self, input: PixelFormat) -> PixelFormat {
        input
    }

    fn can_process_in_place(&self) -> bool {
        false
    }

    fn is_read_only_mode(&self) -> bool {
        false
    }

    fn process_in_place(&mut self, _image: &mut FrameBuffer) -> Result<()> {
        Err(Error::NotImplemented)
    }

    /**
        Write the result for `input` into `output`, reusing the buffer
        already there when it fits.
    */
    fn process_image(&mut self, _input: &FrameBuffer, _output: &mut Option<FrameBuffer>) -> Result<()> {
        Err(Error::NotImplemented)
    }

    fn observe(&mut self, _image: &FrameBuffer) -> Result<()> {
        Err(Error::NotImplemented)
    }
}

/**
    Catalogue entry for a plugin type.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl PluginInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}

type PluginFactory = Box<dyn Fn() -> Box<dyn ImageProcessingPlugin> + Send + Sync>;

struct RegisteredPlugin {
    info: PluginInfo,
    factory: PluginFactory,
}

/**
    Creates plugin instances by id.

    Built explicitly and handed to the graphs that use it; there is no
    global catalogue.
*/
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, RegisteredPlugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        A registry holding the filters that ship with this crate. Repeater
        steps publish into `repeaters`.
    */
    pub fn with_builtin_filters(repeaters: Arc<RepeaterRegistry>) -> Self {
        let mut registry = Self::new();
        filters::register_builtin(&mut registry, repeaters);
        registry
    }

    /**
        Add a plugin type. Ids are unique.
    */
    pub fn register<F>(&mut self, info: PluginInfo, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn ImageProcessingPlugin> + Send + Sync + 'static,
    {
        if self.plugins.contains_key(&info.id) {
            return Err(Error::InvalidArgument(format!(
                "plugin '{}' is already registered",
                info.id
            )));
        }
        self.plugins.insert(
            info.id.clone(),
            RegisteredPlugin {
                info,
                factory: Box::new(factory),
            },
        );
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    pub fn info(&self, id: &str) -> Option<&PluginInfo> {
        self.plugins.get(id).map(|plugin| &plugin.info)
    }

    /**
        Every registered plugin, ordered by id.
    */
    pub fn plugins(&self) -> impl Iterator<Item = &PluginInfo> {
        self.plugins.values().map(|plugin| &plugin.info)
    }

    pub fn create(&self, id: &str) -> Result<Box<dyn ImageProcessingPlugin>> {
        self.plugins
            .get(id)
            .map(|plugin| (plugin.factory)())
            .ok_or_else(|| Error::InvalidArgument(format!("unknown plugin '{id}'")))
    }

    /**
        Create a plugin and apply `configuration` to it.
    */
    pub fn create_configured(
        &self,
        id: &str,
        configuration: &Configuration,
    ) -> Result<Box<dyn ImageProcessingPlugin>> {
        let mut plugin = self.create(id)?;
        plugin.configure(configuration)?;
        Ok(plugin)
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.plugins.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Value;

    fn registry() -> PluginRegistry {
        PluginRegistry::with_builtin_filters(Arc::new(RepeaterRegistry::new()))
    }

    #[test]
    fn builtin_filters_are_listed_by_id() {
        let ids: Vec<String> = registry().plugins().map(|info| info.id.clone()).collect();
        assert_eq!(
            ids,
            [
                "grayscale",
                "invert",
                "mirror",
                "repeater_push",
                "resize",
                "snapshot",
                "threshold",
                "video_writer",
            ]
        );
    }

    #[test]
    fn unknown_plugin_is_an_invalid_argument() {
        assert!(matches!(
            registry().create("sharpen"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut registry = registry();
        let duplicate = PluginInfo::new("invert", "Invert", "again");
        let result = registry.register(duplicate, || Box::new(filters::Invert::new()));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn created_plugins_receive_their_configuration() {
        let configuration = Configuration::new().with("threshold", Value::U8(40));
        let plugin = registry()
            .create_configured("threshold", &configuration)
            .unwrap();
        assert_eq!(plugin.get_property("threshold"), Ok(Value::U8(40)));
    }
}
