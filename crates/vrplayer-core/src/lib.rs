pub mod config;
pub mod cursor;
pub mod errors;
pub mod frame;
pub mod input;
pub mod pose;
pub mod types;

pub use config::{PlayerConfig, RawOptions, SourceSelection};
pub use cursor::CursorImage;
pub use errors::{CaptureError, DecodeError, ErrorClass, PlayerError, PoseError, RenderError};
pub use frame::FrameContext;
pub use input::{MouseButton, PlayerAction};
pub use pose::PoseMatrix;
pub use types::*;
