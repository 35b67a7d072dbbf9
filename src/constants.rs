//! Shared constants used across the application.

/// User agent string sent with every API and media request.
pub const ARCHIVER_USER_AGENT: &str = concat!("thread-archiver/", env!("CARGO_PKG_VERSION"));

/// Default base URL of the thread JSON API.
pub const DEFAULT_API_BASE: &str = "https://a.4cdn.org";

/// Default base URL of the media host.
pub const DEFAULT_MEDIA_BASE: &str = "https://i.4cdn.org";

/// Name of the persisted post-list snapshot inside a thread directory.
pub const POST_LIST_FILE: &str = "thread.json";

/// Name of the persisted validator snapshot inside a thread directory.
pub const VALIDATOR_FILE: &str = "meta";

/// Source extension that gets normalized by the converter.
pub const TRANSCODE_SOURCE_EXT: &str = ".webm";

/// Extension (without dot) of converted media.
pub const TRANSCODE_TARGET_EXT: &str = "mp4";

/// Marker appended to a target path while the converter writes to it.
///
/// Fixed rather than per-process so a later run can find and remove leftovers
/// from a crashed conversion.
pub const TRANSCODE_TEMP_MARKER: &str = "__transcode_tmp";
