//! 对局核心：状态、规则、目标卡效果、回合流程。

pub mod catalog;
pub mod config;
pub mod effects;
pub mod ports;
pub mod rules;
pub mod state;
pub mod turn;

pub use catalog::{CardCatalog, CatalogError};
pub use config::{MatchConfig, PacingConfig};
pub use effects::{EffectContext, EffectResolution, GoalEffect};
pub use ports::{ActionPort, MatchObserver, NoDelay, Pacer, RecordingObserver};
pub use rules::{AttackAction, PlayCardAction, RuleEngine, RuleError};
pub use state::{
    Ability,
    CardDefinition,
    CardId,
    CardInstance,
    CardType,
    GameEvent,
    InstanceId,
    IntegrityError,
    MatchState,
    PlayerState,
    Side,
    TurnPhase,
    VictoryReason,
    VictoryState,
    Zone,
    GOAL_SLOTS,
};
pub use turn::{act, Dispatch, Duel, TurnController};
