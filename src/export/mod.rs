// Export module
// Renders a session's take for use outside the stream

pub mod midi;

pub use midi::{export_take, write_take, ExportError, MidiExportOptions};
