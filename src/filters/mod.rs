//! Provides filters for determining whether a path should be backed up or not.

pub mod ignore;
pub mod pattern;

pub use self::ignore::IgnoreFilter;
pub use self::pattern::{Error, Pattern};
