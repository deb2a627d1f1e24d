use std::cmp::Reverse;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::game::{AttackAction, CardInstance, InstanceId, MatchState, PlayCardAction, Side};

/// 策略产出的动作，与人类输入走同一套规则入口。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameAction {
    Draw { side: Side },
    PlayCard { action: PlayCardAction },
    Attack { action: AttackAction },
}

/// 对手的脚本化策略：只读取状态，不修改状态。
pub struct OpponentPolicy {
    side: Side,
    rng: SmallRng,
}

impl OpponentPolicy {
    pub fn new() -> Self {
        Self {
            side: Side::Opponent,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            side: Side::Opponent,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn decide_draw(&self, state: &MatchState) -> Option<GameAction> {
        let own = state.side(self.side);
        if own.deck.is_empty() || own.hand.len() >= state.max_hand_size {
            return None;
        }
        Some(GameAction::Draw { side: self.side })
    }

    /// 场上没有守护者时优先补一只守护者，否则出攻击最高的怪兽。
    pub fn decide_play(&self, state: &MatchState) -> Option<GameAction> {
        let own = state.side(self.side);
        if own.hand.is_empty() || own.field.len() >= state.max_field_size {
            return None;
        }

        let protector = if own.has_protector() {
            None
        } else {
            own.hand.iter().find(|card| card.is_protector())
        };
        let chosen = protector.or_else(|| {
            own.hand
                .iter()
                .filter(|card| card.is_monster())
                .min_by_key(|card| Reverse(card.attack))
        })?;

        Some(GameAction::PlayCard {
            action: PlayCardAction {
                side: self.side,
                instance_id: chosen.instance_id.clone(),
            },
        })
    }

    /// 本回合可攻击的怪兽，按场上顺序。
    pub fn attack_order(&self, state: &MatchState) -> Vec<InstanceId> {
        state
            .side(self.side)
            .field
            .iter()
            .filter(|card| card.can_attack())
            .map(|card| card.instance_id.clone())
            .collect()
    }

    pub fn choose_target(&mut self, state: &MatchState, attacker_id: &InstanceId) -> Option<GameAction> {
        let enemy = state.side(self.side.opponent());

        let target: &CardInstance = if enemy.has_protector() {
            enemy
                .field
                .iter()
                .filter(|card| card.is_protector())
                .min_by_key(|card| card.defense_value())?
        } else {
            let hidden: Vec<&CardInstance> = enemy.unrevealed_goals().collect();
            match hidden.choose(&mut self.rng) {
                Some(goal) => *goal,
                None => enemy
                    .field
                    .iter()
                    .filter(|card| card.is_monster())
                    .min_by_key(|card| card.defense_value())?,
            }
        };

        Some(GameAction::Attack {
            action: AttackAction {
                attacker_side: self.side,
                attacker_id: attacker_id.clone(),
                target_id: target.instance_id.clone(),
            },
        })
    }
}

impl Default for OpponentPolicy {
    fn default() -> Self {
        Self::new()
    }
}
