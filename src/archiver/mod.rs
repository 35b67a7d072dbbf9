//! The media pipeline: downloading, converting and the runner driving them.

pub mod download;
pub mod pipeline;
pub mod runner;
pub mod summary;
pub mod thread_archiver;
pub mod transcode;

pub use download::{download, DownloadError, DownloadStatus};
pub use pipeline::{
    ConversionState, FailureKind, FetchState, ItemFailure, ItemPipeline, TaskOutcome,
};
pub use runner::{run_all, Progress, RunReport};
pub use summary::{RunStatus, RunSummary};
pub use thread_archiver::{resolve_converter, ThreadArchiver};
pub use transcode::{
    locate_converter, temporary_path, Converter, FfmpegConverter, TranscodeEngine,
    TranscodeError, TranscodeStatus,
};
