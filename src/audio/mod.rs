// Audio processing module
// Handles wire decoding, hop framing, the analysis window and the volume gate

pub mod framer;
pub mod gate;
pub mod spectrum;
pub mod window;
pub mod wire;

pub use framer::StreamFramer;
pub use gate::{rms, GateReading, GateState, VolumeGate};
pub use window::{AnalysisWindow, WindowError};
pub use wire::{decode_f32_le, encode_f32_le, WireError};
