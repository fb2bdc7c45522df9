//! IO modules - external system interfaces
//!
//! This module contains the collaborators around the monitor:
//! - `location` - Location source interface and signal channel
//! - `replay` - Scripted location source fed from a JSONL file
//! - `render` - Map rendering interface and its logging worker
//! - `display` - Periodic event table
//! - `http` - JSON views, Prometheus metrics and region control over HTTP

pub mod display;
pub mod http;
pub mod location;
pub mod render;
pub mod replay;

// Re-export commonly used types
pub use location::{create_signal_channel, LocationError, LocationSignal, LocationSource, SignalSender};
pub use render::{create_render_channel, RenderCommand, RenderSender, RenderSink};
pub use replay::{load_script, parse_script, ReplaySource, ScriptEntry};
