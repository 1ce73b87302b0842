mod backend;
pub mod backends;
mod detector;
mod labels;
pub mod postprocess;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use detector::{Detector, DEFAULT_CONFIDENCE_THRESHOLD};
pub use labels::LabelTable;
pub use result::{max_confidence, Detection, RawDetection};
