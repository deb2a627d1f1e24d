//! 对手 AI：基于优先级规则的脚本化策略。

pub mod policy;

pub use policy::{GameAction, OpponentPolicy};
