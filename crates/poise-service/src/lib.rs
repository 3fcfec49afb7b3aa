//! Poise background service.
//!
//! Owns the persisted policy, installs the compiled declarative rules,
//! tracks per-tab bypass and keeps the threat counters and event log. The
//! host browser APIs sit behind two traits, [`KvStore`] for persistent
//! storage and [`RuleEngine`] for the declarative request filter, with
//! in-memory implementations for tests and the CLI simulator.

pub mod background;
pub mod bridge;
pub mod bypass;
pub mod engine;
pub mod error;
pub mod events;
pub mod live;
pub mod messages;
pub mod policy_store;
pub mod secret;
pub mod stats;
pub mod store;

pub use background::{Background, RuleMatch, SyncReport};
pub use bridge::{BridgeConfig, BridgePayload};
pub use bypass::{BypassState, BypassTracker};
pub use engine::{MemoryRuleEngine, RuleEngine};
pub use error::{Result, RuleEngineError, ServiceError, StoreError};
pub use events::{EventLog, LogEntry, PoisonedEvent, RequestInfo};
pub use live::{LiveMessage, Scope, SubscribeRequest};
pub use messages::{Request, Response, Sender};
pub use policy_store::PolicyStore;
pub use store::{KvStore, MemoryStore};
