/*!
    Video file output for the acquisition pipeline.

    [`VideoFileWriter`] encodes frame buffers into container files. Around
    the encoder it handles the file layout: optional time-stamped names,
    splitting into fixed-length fragments, and deleting the oldest
    fragments once the output folder grows past a size budget.
*/

mod config;
mod encoder;
mod layout;
mod writer;

pub use config::{VideoCodec, WriterConfig};
pub use layout::{enforce_folder_budget, file_name, timestamp_suffix};
pub use writer::VideoFileWriter;
