/*!
    Filters that ship with the crate.
*/

mod grayscale;
mod invert;
mod mirror;
mod recorder;
mod repeater_push;
mod resize;
mod snapshot;
mod threshold;

use std::sync::Arc;

use crate::plugin::{PluginInfo, PluginRegistry};
use crate::source::RepeaterRegistry;

pub use grayscale::Grayscale;
pub use invert::Invert;
pub use mirror::Mirror;
pub use recorder::Recorder;
pub use repeater_push::RepeaterPush;
pub use resize::Resize;
pub use snapshot::Snapshot;
pub use threshold::Threshold;

pub(crate) fn register_builtin(registry: &mut PluginRegistry, repeaters: Arc<RepeaterRegistry>) {
    let builtin: [(PluginInfo, fn() -> Box<dyn crate::plugin::ImageProcessingPlugin>); 7] = [
        (
            PluginInfo::new("grayscale", "Grayscale", "Convert color images to 8-bit gray"),
            || Box::new(Grayscale::new()),
        ),
        (
            PluginInfo::new("invert", "Invert", "Invert every color channel"),
            || Box::new(Invert::new()),
        ),
        (
            PluginInfo::new("mirror", "Mirror", "Flip horizontally and/or vertically"),
            || Box::new(Mirror::new()),
        ),
        (
            PluginInfo::new("resize", "Resize", "Nearest-neighbour resize to a fixed size"),
            || Box::new(Resize::new()),
        ),
        (
            PluginInfo::new("threshold", "Threshold", "Binarize 8-bit gray images"),
            || Box::new(Threshold::new()),
        ),
        (
            PluginInfo::new("snapshot", "Snapshot", "Save every n-th frame as an image file"),
            || Box::new(Snapshot::new()),
        ),
        (
            PluginInfo::new("video_writer", "Video writer", "Record frames to video files"),
            || Box::new(Recorder::new()),
        ),
    ];

    for (info, factory) in builtin {
        // Ids are distinct and the registry starts empty
        let _ = registry.register(info, factory);
    }

    let _ = registry.register(
        PluginInfo::new(
            "repeater_push",
            "Repeater",
            "Publish frames to a repeater for other sources to replay",
        ),
        move || Box::new(RepeaterPush::new(repeaters.clone())),
    );
}
