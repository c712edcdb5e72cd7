pub mod format;
pub mod reel;
pub mod trace;
pub mod medium;
pub mod filter;
pub mod sink;
pub mod listing;
pub mod config;
pub mod summary;
pub mod transcode;

pub use format::{DataFormat, convert_samples, ibm_to_ieee, ieee_to_ibm};
pub use reel::{BinaryHeader, TextHeader};
pub use trace::TraceHeader;
pub use medium::{MediumError, MediumReader, MediumWriter, WriterOptions};
pub use config::{ConfigError, CopyOptions, InputSpec, OutputSpec};
pub use summary::CopySummary;
pub use transcode::{TranscodeError, Transcoder};
