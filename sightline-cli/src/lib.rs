pub mod error;
pub mod client;
pub mod capture;
pub mod frame;
pub mod dashboard;
pub mod pipeline;

pub use error::{CaptureError, ClientError};
pub use client::VisionClient;
pub use capture::CaptureTimer;
pub use frame::{DirectorySource, EncodedFrame, FrameEncoder, FrameSlot, FrameSource, ImageFileSource};
pub use dashboard::{ApiStatus, CaptureStatus, ConfidenceLevel, Dashboard};
pub use pipeline::{CapturePipeline, CycleOutcome};
