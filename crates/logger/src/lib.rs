//! Process-wide `tracing` subscriber setup shared by the workspace binaries.

mod tracing;

pub use self::tracing::init_with_file;
