pub mod capture_source;
pub mod host_clock;
pub mod media_library;
pub mod media_sink;
pub mod recording_delegate;
