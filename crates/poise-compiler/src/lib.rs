//! Poise Rule Compiler
//!
//! This crate compiles the policy's whitelist/blacklist entries and the
//! built-in denylist into declarative network rules, and plans the
//! remove-then-add sync that installs them.

pub mod builder;
pub mod category;
pub mod compile;
pub mod optimizer;
pub mod regex;
pub mod rules;
pub mod sync;

pub use builder::{build_rule_set, build_rule_set_with, session_bypass_rule, CompileOptions, RuleSet};
pub use category::{CompileError, RuleCategory};
pub use compile::{compile_entries, CompiledRule};
pub use optimizer::{optimize_rules, OptimizeStats};
pub use rules::{ActionType, DnrRule, RuleCondition};
pub use sync::{plan_session_bypass, plan_sync, CategoryPlan, RuleUpdate};
