//! Policy model and decision engine
//!
//! The policy is a single configuration object with six user-managed entry
//! sets (origin, path and raw pattern, each for whitelist and blacklist), a
//! built-in analytics denylist and a path-shape heuristic. Resolution order,
//! highest first:
//!
//! 1. whitelist pattern (substring of the full URL)
//! 2. whitelist origin / path
//! 3. blacklist pattern / origin / path
//! 4. denylist host, then the tracking heuristic

mod config;
mod decide;
mod entries;

pub use config::*;
pub use decide::*;
pub use entries::*;
