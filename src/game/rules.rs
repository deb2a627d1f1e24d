use std::fmt;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{
    catalog::CardCatalog,
    effects::EffectContext,
    state::{
        CardInstance, GameEvent, InstanceId, IntegrityError, MatchState, Side, TurnPhase,
    },
};
use crate::utils;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayCardAction {
    pub side: Side,
    pub instance_id: InstanceId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttackAction {
    pub attacker_side: Side,
    pub attacker_id: InstanceId,
    pub target_id: InstanceId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    GameFinished,
    NotYourTurn { side: Side },
    CardNotFound { instance_id: InstanceId },
    NotAMonster { name: String },
    FieldFull { side: Side },
    HandFull { side: Side },
    DeckEmpty { side: Side },
    AttackerNotFound { instance_id: InstanceId },
    AlreadyAttacked { name: String },
    AttackerFrozen { name: String },
    NoAttackerSelected,
    InvalidTarget { instance_id: InstanceId },
    ProtectorRequired,
    IntegrityViolation { error: IntegrityError },
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::GameFinished => f.write_str("The match is over."),
            RuleError::NotYourTurn { side } => write!(f, "It is not the {} turn.", side.label()),
            RuleError::CardNotFound { .. } => f.write_str("That card is not in hand."),
            RuleError::NotAMonster { name } => {
                write!(f, "Only monsters can be played to the field ({name}).")
            }
            RuleError::FieldFull { side } => {
                write!(f, "{}: field is full (max 5 monsters)!", side.label())
            }
            RuleError::HandFull { side } => {
                write!(f, "{}: hand is full (max 7 cards)!", side.label())
            }
            RuleError::DeckEmpty { side } => write!(f, "{}'s deck is empty!", side.label()),
            RuleError::AttackerNotFound { .. } => f.write_str("The attacker is not on the field."),
            RuleError::AlreadyAttacked { name } => {
                write!(f, "{name} has already attacked this turn.")
            }
            RuleError::AttackerFrozen { name } => write!(f, "{name} is frozen and cannot attack."),
            RuleError::NoAttackerSelected => f.write_str("Select one of your monsters first."),
            RuleError::InvalidTarget { .. } => f.write_str("That target cannot be attacked."),
            RuleError::ProtectorRequired => {
                f.write_str("Attack blocked! You must target a monster with \"Protector\" first.")
            }
            RuleError::IntegrityViolation { error } => write!(f, "Corrupt match state: {error}"),
        }
    }
}

/// 攻击目标的两种类别。
enum Target {
    Monster(CardInstance),
    Goal { slot: usize, card: CardInstance },
}

/// 规则引擎：所有对局状态的修改都经由这里。
pub struct RuleEngine {
    catalog: Arc<CardCatalog>,
    rng: SmallRng,
}

impl RuleEngine {
    pub fn new(catalog: Arc<CardCatalog>) -> Self {
        Self {
            catalog,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(catalog: Arc<CardCatalog>, seed: u64) -> Self {
        Self {
            catalog,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn rng_mut(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    fn ensure_running(state: &MatchState) -> Result<(), RuleError> {
        if state.game_is_over {
            return Err(RuleError::GameFinished);
        }
        Ok(())
    }

    fn ensure_integrity(state: &MatchState) -> Result<(), RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    fn ensure_turn_owner(state: &MatchState, side: Side) -> Result<(), RuleError> {
        if state.active_side() != side {
            return Err(RuleError::NotYourTurn { side });
        }
        Ok(())
    }

    fn commit(state: &mut MatchState, events: &mut Vec<GameEvent>, event: GameEvent) {
        state.record_event(event.clone());
        events.push(event);
    }

    /// 标准抽牌操作；效果与回合开始的自动抽牌也经由此处，不检查回合归属。
    pub fn draw_card(
        &mut self,
        state: &mut MatchState,
        side: Side,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_running(state)?;
        Self::ensure_integrity(state)?;

        let event = state.draw_card(side, &self.catalog)?;
        let mut events = Vec::new();
        Self::commit(state, &mut events, event);
        Ok(events)
    }

    /// 主阶段中由当前行动方主动抽牌。
    pub fn draw_on_turn(
        &mut self,
        state: &mut MatchState,
        side: Side,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_running(state)?;
        Self::ensure_turn_owner(state, side)?;
        self.draw_card(state, side)
    }

    pub fn play_card(
        &mut self,
        state: &mut MatchState,
        action: PlayCardAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_running(state)?;
        Self::ensure_integrity(state)?;
        Self::ensure_turn_owner(state, action.side)?;

        let event = state.play_to_field(action.side, &action.instance_id)?;
        let mut events = Vec::new();
        Self::commit(state, &mut events, event);
        Ok(events)
    }

    /// 玩家选中一只可攻击的怪兽。
    pub fn select_attacker(
        &mut self,
        state: &mut MatchState,
        instance_id: &InstanceId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_running(state)?;
        Self::ensure_turn_owner(state, Side::Player)?;

        let card = state
            .player
            .find_on_field(instance_id)
            .ok_or_else(|| RuleError::AttackerNotFound {
                instance_id: instance_id.clone(),
            })?;
        if card.has_attacked_this_turn {
            return Err(RuleError::AlreadyAttacked {
                name: card.name.clone(),
            });
        }
        if card.is_frozen() {
            return Err(RuleError::AttackerFrozen {
                name: card.name.clone(),
            });
        }

        let event = GameEvent::AttackerSelected {
            instance_id: card.instance_id.clone(),
            name: card.name.clone(),
        };
        state.selected_attacker = Some(instance_id.clone());
        let mut events = Vec::new();
        Self::commit(state, &mut events, event);
        Ok(events)
    }

    /// 战斗结算。任何前置条件失败都不会修改区域；玩家的选择在每次尝试后清空。
    pub fn attack(
        &mut self,
        state: &mut MatchState,
        action: AttackAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let result = self.resolve_attack(state, &action);
        if action.attacker_side == Side::Player {
            state.selected_attacker = None;
        }
        result
    }

    fn resolve_attack(
        &mut self,
        state: &mut MatchState,
        action: &AttackAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_running(state)?;
        Self::ensure_integrity(state)?;
        Self::ensure_turn_owner(state, action.attacker_side)?;

        let attacker_side = action.attacker_side;
        let defender_side = attacker_side.opponent();

        let attacker = state
            .side(attacker_side)
            .find_on_field(&action.attacker_id)
            .cloned()
            .ok_or_else(|| RuleError::AttackerNotFound {
                instance_id: action.attacker_id.clone(),
            })?;
        if attacker.has_attacked_this_turn {
            return Err(RuleError::AlreadyAttacked {
                name: attacker.name,
            });
        }
        if attacker.is_frozen() {
            return Err(RuleError::AttackerFrozen {
                name: attacker.name,
            });
        }

        let defender = state.side(defender_side);
        let target = if let Some(card) = defender.find_on_field(&action.target_id) {
            Target::Monster(card.clone())
        } else if let Some(slot) = defender.goal_slot(&action.target_id) {
            let card = defender.goals[slot]
                .clone()
                .ok_or_else(|| RuleError::InvalidTarget {
                    instance_id: action.target_id.clone(),
                })?;
            Target::Goal { slot, card }
        } else {
            return Err(RuleError::InvalidTarget {
                instance_id: action.target_id.clone(),
            });
        };

        // 守护者规则必须在任何结算之前检查
        if defender.has_protector() {
            let allowed = matches!(&target, Target::Monster(card) if card.is_protector());
            if !allowed {
                return Err(RuleError::ProtectorRequired);
            }
        }

        let mut events = Vec::new();
        if let Some(card) = state
            .side_mut(attacker_side)
            .find_on_field_mut(&action.attacker_id)
        {
            card.has_attacked_this_turn = true;
        }
        let target_name = match &target {
            Target::Monster(card) | Target::Goal { card, .. } => card.name.clone(),
        };
        Self::commit(
            state,
            &mut events,
            GameEvent::AttackDeclared {
                side: attacker_side,
                attacker_id: attacker.instance_id.clone(),
                attacker_name: attacker.name.clone(),
                attack: attacker.attack,
                target_id: action.target_id.clone(),
                target_name,
            },
        );

        match target {
            Target::Monster(defender_card) => {
                if attacker.attack > defender_card.defense_value() {
                    if let Some(card) =
                        state.remove_from_field(defender_side, &defender_card.instance_id)
                    {
                        Self::commit(
                            state,
                            &mut events,
                            GameEvent::MonsterDestroyed {
                                side: defender_side,
                                card,
                            },
                        );
                    }
                } else {
                    Self::commit(
                        state,
                        &mut events,
                        GameEvent::AttackAbsorbed {
                            attacker_name: attacker.name.clone(),
                            defender_name: defender_card.name,
                        },
                    );
                }
            }
            Target::Goal { slot, card } => {
                let mut revealed = card;
                revealed.is_revealed = true;
                if let Some(goal) = state.side_mut(defender_side).goals[slot].as_mut() {
                    goal.is_revealed = true;
                }
                Self::commit(
                    state,
                    &mut events,
                    GameEvent::GoalDestroyed {
                        side: defender_side,
                        slot,
                        card: revealed.clone(),
                    },
                );

                match &revealed.effect_on_destroy {
                    Some(effect) => {
                        Self::commit(
                            state,
                            &mut events,
                            GameEvent::GoalEffectTriggered {
                                side: defender_side,
                                name: revealed.name.clone(),
                                description: revealed.description.clone(),
                            },
                        );
                        let ctx = EffectContext::new(
                            attacker_side,
                            attacker.instance_id.clone(),
                            attacker.name.clone(),
                        );
                        let resolution = effect.apply(&ctx, state, &self.catalog, &mut self.rng);
                        for event in resolution.events {
                            Self::commit(state, &mut events, event);
                        }
                    }
                    None => utils::log_warn(&format!(
                        "goal card {} has no destroy effect",
                        revealed.card_id
                    )),
                }

                state.destroy_goal(defender_side, slot);
            }
        }

        if let Some(outcome) = state.evaluate_victory() {
            events.push(GameEvent::GameWon {
                winner: outcome.winner,
                reason: outcome.reason,
            });
        }

        Ok(events)
    }

    pub fn end_player_turn(&mut self, state: &mut MatchState) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_running(state)?;
        Self::ensure_turn_owner(state, Side::Player)?;

        state.is_player_turn = false;
        state.selected_attacker = None;
        state.phase = TurnPhase::PlayerEndingTurn;

        let mut events = Vec::new();
        Self::commit(state, &mut events, GameEvent::TurnEnded { side: Side::Player });
        Ok(events)
    }

    /// 对手回合第一步：重置其场上怪兽。
    pub fn start_opponent_turn(
        &mut self,
        state: &mut MatchState,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_running(state)?;
        Self::ensure_turn_owner(state, Side::Opponent)?;

        state.phase = TurnPhase::OpponentUntap;
        let started = GameEvent::TurnStarted {
            side: Side::Opponent,
            turn_number: state.turn_number,
        };
        let mut events = Vec::new();
        Self::commit(state, &mut events, started);
        for event in state.untap_side(Side::Opponent) {
            Self::commit(state, &mut events, event);
        }
        Ok(events)
    }

    /// 控制权交回玩家：重置、回合数加一、自动抽一张。只能在对手回合中调用。
    pub fn start_player_turn(&mut self, state: &mut MatchState) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_running(state)?;
        Self::ensure_turn_owner(state, Side::Opponent)?;

        let mut events = Vec::new();
        Self::commit(state, &mut events, GameEvent::TurnEnded { side: Side::Opponent });
        state.phase = TurnPhase::PlayerUntap;
        state.is_player_turn = true;
        state.selected_attacker = None;
        state.turn_number += 1;
        let started = GameEvent::TurnStarted {
            side: Side::Player,
            turn_number: state.turn_number,
        };
        Self::commit(state, &mut events, started);
        for event in state.untap_side(Side::Player) {
            Self::commit(state, &mut events, event);
        }

        match self.draw_card(state, Side::Player) {
            Ok(mut drawn) => events.append(&mut drawn),
            Err(error) => Self::commit(
                state,
                &mut events,
                GameEvent::DrawFailed {
                    side: Side::Player,
                    reason: error.to_string(),
                },
            ),
        }

        state.phase = TurnPhase::PlayerMain;
        Ok(events)
    }

    pub fn enter_phase(state: &mut MatchState, phase: TurnPhase) -> Result<(), RuleError> {
        Self::ensure_running(state)?;
        state.phase = phase;
        Ok(())
    }
}
