//! Mergetail: run many commands and tail their output as one stream.
//!
//! Every output line is prefixed with a padded, colored label of the command that
//! produced it. See [`merge_tail`] for the entry point.

pub mod config;
pub mod error;
pub mod events;
pub mod input;
pub mod merge;
pub mod observer;
pub mod output;
pub mod prefix;
pub mod process;
pub mod runner;

pub use error::MergeError;
pub use merge::{merge_tail, MergeEngine, MergeOptions};
pub use observer::{NoopObserver, Observer, TracingObserver};
pub use process::CommandSpec;
