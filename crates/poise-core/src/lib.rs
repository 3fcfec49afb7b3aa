//! Poise Core Library
//!
//! This crate holds the host-independent half of the Poise anti-tracking
//! extension: the allow/deny policy model and the deterministic per-origin
//! noise engine. Nothing in here performs I/O; the background service and the
//! wasm bindings feed it URLs, buffers and configuration snapshots.
//!
//! # Modules
//!
//! - `hash`: FNV-1a and xmur3 string hashes used for seeding
//! - `domain`: base-domain (registrable domain) heuristic
//! - `url`: fast URL slicing for the decision hot path
//! - `prng`: seeded xorshift32 / mulberry32 generators
//! - `persona`: stable fake device/network persona per origin
//! - `policy`: policy configuration, entry normalization and precedence
//! - `noise`: fingerprint surface mutators and clock decorators
//! - `schemas`: per-vendor payload mutators for tracker requests
//! - `params`: tracking query-parameter poisoning
//! - `intercept`: page-boundary request interception policy
//! - `types`: shared type definitions

pub mod domain;
pub mod hash;
pub mod intercept;
pub mod noise;
pub mod params;
pub mod persona;
pub mod policy;
pub mod prng;
pub mod schemas;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use domain::{base_domain, is_same_base};
pub use hash::{fnv1a_32, xmur3_32};
pub use intercept::{Interception, NetworkInterceptor, PageInterceptor, Transport};
pub use persona::{build_persona, Persona};
pub use policy::{ConfigPatch, Dimension, PolicyConfig, PolicyError, Verdict};
pub use prng::{keyed_rng, rng_for_origin, Mulberry32, NoiseSource, Xorshift32};
pub use types::{Mode, Module, Surface, TabId};
