use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::catalog::CardCatalog;
use super::state::{GameEvent, InstanceId, MatchState, Side};
use crate::utils;

const ATTACK_MODIFIER: i32 = 5;
const SUMMON_MAX_ATTACK: i32 = 10;

/// 目标卡被摧毁时触发的效果。未知键保留原文，结算时只记录警告。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GoalEffect {
    DestroyAttacker,
    OpponentDiscardRandom,
    OwnerDrawCard,
    ReduceAttackerMonsterAtk5,
    BuffOwnMonsterAtk5,
    ReturnAttackerToHand,
    FreezeAttackerNextTurn,
    SpecialSummonFromHandAtk10,
    Unrecognized(String),
}

impl GoalEffect {
    pub fn key(&self) -> &str {
        match self {
            GoalEffect::DestroyAttacker => "DESTROY_ATTACKER",
            GoalEffect::OpponentDiscardRandom => "OPPONENT_DISCARD_RANDOM",
            GoalEffect::OwnerDrawCard => "OWNER_DRAW_CARD",
            GoalEffect::ReduceAttackerMonsterAtk5 => "REDUCE_ATTACKER_MONSTER_ATK_5",
            GoalEffect::BuffOwnMonsterAtk5 => "BUFF_OWN_MONSTER_ATK_5",
            GoalEffect::ReturnAttackerToHand => "RETURN_ATTACKER_TO_HAND",
            GoalEffect::FreezeAttackerNextTurn => "FREEZE_ATTACKER_NEXT_TURN",
            GoalEffect::SpecialSummonFromHandAtk10 => "SPECIAL_SUMMON_FROM_HAND_ATK_10",
            GoalEffect::Unrecognized(key) => key,
        }
    }
}

impl From<String> for GoalEffect {
    fn from(value: String) -> Self {
        match value.as_str() {
            "DESTROY_ATTACKER" => GoalEffect::DestroyAttacker,
            "OPPONENT_DISCARD_RANDOM" => GoalEffect::OpponentDiscardRandom,
            "OWNER_DRAW_CARD" => GoalEffect::OwnerDrawCard,
            "REDUCE_ATTACKER_MONSTER_ATK_5" => GoalEffect::ReduceAttackerMonsterAtk5,
            "BUFF_OWN_MONSTER_ATK_5" => GoalEffect::BuffOwnMonsterAtk5,
            "RETURN_ATTACKER_TO_HAND" => GoalEffect::ReturnAttackerToHand,
            "FREEZE_ATTACKER_NEXT_TURN" => GoalEffect::FreezeAttackerNextTurn,
            "SPECIAL_SUMMON_FROM_HAND_ATK_10" => GoalEffect::SpecialSummonFromHandAtk10,
            _ => GoalEffect::Unrecognized(value),
        }
    }
}

impl From<GoalEffect> for String {
    fn from(value: GoalEffect) -> Self {
        value.key().to_string()
    }
}

impl fmt::Display for GoalEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// 效果结算的参与方。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectContext {
    pub attacker_side: Side,
    pub attacker_id: InstanceId,
    pub attacker_name: String,
    /// 目标卡的持有者。
    pub owner: Side,
}

impl EffectContext {
    pub fn new(attacker_side: Side, attacker_id: InstanceId, attacker_name: impl Into<String>) -> Self {
        Self {
            attacker_side,
            attacker_id,
            attacker_name: attacker_name.into(),
            owner: attacker_side.opponent(),
        }
    }
}

#[derive(Default, Debug, Clone)]
pub struct EffectResolution {
    pub events: Vec<GameEvent>,
}

impl EffectResolution {
    fn single(event: GameEvent) -> Self {
        Self {
            events: vec![event],
        }
    }
}

impl GoalEffect {
    /// 结算一次效果。所有随机选择都在结算时刻的合格集合上均匀抽取。
    pub fn apply<R: Rng + ?Sized>(
        &self,
        ctx: &EffectContext,
        state: &mut MatchState,
        catalog: &CardCatalog,
        rng: &mut R,
    ) -> EffectResolution {
        match self {
            GoalEffect::DestroyAttacker => {
                match state.remove_from_field(ctx.attacker_side, &ctx.attacker_id) {
                    Some(card) => EffectResolution::single(GameEvent::MonsterDestroyed {
                        side: ctx.attacker_side,
                        card,
                    }),
                    None => attacker_gone(ctx),
                }
            }
            GoalEffect::OpponentDiscardRandom => {
                let hand = &mut state.side_mut(ctx.attacker_side).hand;
                if hand.is_empty() {
                    return EffectResolution::single(GameEvent::NothingToDiscard {
                        side: ctx.attacker_side,
                    });
                }
                let idx = rng.gen_range(0..hand.len());
                let card = hand.remove(idx);
                EffectResolution::single(GameEvent::CardDiscarded {
                    side: ctx.attacker_side,
                    card,
                })
            }
            GoalEffect::OwnerDrawCard => {
                let event = match state.draw_card(ctx.owner, catalog) {
                    Ok(event) => event,
                    Err(error) => GameEvent::DrawFailed {
                        side: ctx.owner,
                        reason: error.to_string(),
                    },
                };
                EffectResolution::single(event)
            }
            GoalEffect::ReduceAttackerMonsterAtk5 => {
                let side = ctx.attacker_side;
                match state.side_mut(side).find_on_field_mut(&ctx.attacker_id) {
                    Some(card) => {
                        let before = card.attack;
                        card.attack = (card.attack - ATTACK_MODIFIER).max(0);
                        EffectResolution::single(GameEvent::AttackChanged {
                            side,
                            instance_id: card.instance_id.clone(),
                            name: card.name.clone(),
                            attack: card.attack,
                            delta: card.attack - before,
                        })
                    }
                    None => attacker_gone(ctx),
                }
            }
            GoalEffect::BuffOwnMonsterAtk5 => {
                let side = ctx.owner;
                let mut monsters: Vec<_> = state
                    .side_mut(side)
                    .field
                    .iter_mut()
                    .filter(|card| card.is_monster())
                    .collect();
                match monsters.choose_mut(rng) {
                    Some(card) => {
                        card.attack += ATTACK_MODIFIER;
                        EffectResolution::single(GameEvent::AttackChanged {
                            side,
                            instance_id: card.instance_id.clone(),
                            name: card.name.clone(),
                            attack: card.attack,
                            delta: ATTACK_MODIFIER,
                        })
                    }
                    None => EffectResolution::single(GameEvent::NoMonsterToBuff { side }),
                }
            }
            GoalEffect::ReturnAttackerToHand => {
                let side = ctx.attacker_side;
                let max_hand_size = state.max_hand_size;
                let Some(card) = state.remove_from_field(side, &ctx.attacker_id) else {
                    return attacker_gone(ctx);
                };
                let player = state.side_mut(side);
                if player.hand.len() < max_hand_size {
                    let event = GameEvent::CardReturnedToHand {
                        side,
                        instance_id: card.instance_id.clone(),
                        name: card.name.clone(),
                    };
                    player.hand.push(card);
                    EffectResolution::single(event)
                } else {
                    EffectResolution::single(GameEvent::CardLost { side, card })
                }
            }
            GoalEffect::FreezeAttackerNextTurn => {
                let side = ctx.attacker_side;
                match state.side_mut(side).find_on_field_mut(&ctx.attacker_id) {
                    Some(card) => {
                        card.can_attack_next_turn = false;
                        EffectResolution::single(GameEvent::MonsterFrozen {
                            side,
                            instance_id: card.instance_id.clone(),
                            name: card.name.clone(),
                        })
                    }
                    None => attacker_gone(ctx),
                }
            }
            GoalEffect::SpecialSummonFromHandAtk10 => {
                let side = ctx.owner;
                let player = state.side(side);
                let eligible: Vec<InstanceId> = player
                    .hand
                    .iter()
                    .filter(|card| card.is_monster() && card.attack <= SUMMON_MAX_ATTACK)
                    .map(|card| card.instance_id.clone())
                    .collect();
                if player.field.len() >= state.max_field_size {
                    return EffectResolution::single(GameEvent::SummonUnavailable { side });
                }
                let Some(chosen) = eligible.choose(rng) else {
                    return EffectResolution::single(GameEvent::SummonUnavailable { side });
                };
                match state.play_to_field(side, chosen) {
                    Ok(GameEvent::CardPlayed {
                        instance_id, name, ..
                    }) => EffectResolution::single(GameEvent::SpecialSummoned {
                        side,
                        instance_id,
                        name,
                    }),
                    _ => EffectResolution::single(GameEvent::SummonUnavailable { side }),
                }
            }
            GoalEffect::Unrecognized(key) => {
                utils::log_warn(&format!("goal effect {key} is not implemented"));
                EffectResolution::single(GameEvent::UnrecognizedEffect { key: key.clone() })
            }
        }
    }
}

fn attacker_gone(ctx: &EffectContext) -> EffectResolution {
    EffectResolution::single(GameEvent::AttackerGone {
        name: ctx.attacker_name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{CardDefinition, CardInstance, CardType, PlayerState};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn catalog() -> CardCatalog {
        CardCatalog::from_definitions(vec![
            CardDefinition::monster("small", "Squire", 8, 3),
            CardDefinition::monster("big", "Colossus", 14, 10),
            CardDefinition::goal("ward", "Ward", CardType::Spell, GoalEffect::OwnerDrawCard),
        ])
        .expect("catalog should build")
    }

    fn instance(catalog: &CardCatalog, id: &str) -> CardInstance {
        CardInstance::from_definition(catalog.get(id).expect("known card"))
    }

    /// 玩家场上一只攻击者，对手为目标卡持有者。
    fn setup(catalog: &CardCatalog) -> (MatchState, EffectContext) {
        let mut player = PlayerState::empty(Side::Player);
        let attacker = instance(catalog, "big");
        let ctx = EffectContext::new(Side::Player, attacker.instance_id.clone(), attacker.name.clone());
        player.field.push(attacker);
        let opponent = PlayerState::new(Side::Opponent, vec!["small".into()], Default::default());
        (MatchState::new(player, opponent), ctx)
    }

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    #[test]
    fn keys_round_trip_and_unknown_keys_survive() {
        let parsed: GoalEffect = serde_json::from_str("\"FREEZE_ATTACKER_NEXT_TURN\"").expect("valid key");
        assert_eq!(parsed, GoalEffect::FreezeAttackerNextTurn);

        let unknown: GoalEffect = serde_json::from_str("\"SUMMON_DRAGON\"").expect("any string parses");
        assert_eq!(unknown, GoalEffect::Unrecognized("SUMMON_DRAGON".into()));
        assert_eq!(unknown.key(), "SUMMON_DRAGON");
    }

    #[test]
    fn destroy_attacker_removes_it_from_the_field() {
        let catalog = catalog();
        let (mut state, ctx) = setup(&catalog);

        let res = GoalEffect::DestroyAttacker.apply(&ctx, &mut state, &catalog, &mut rng());

        assert!(state.player.field.is_empty());
        assert!(matches!(res.events[0], GameEvent::MonsterDestroyed { side: Side::Player, .. }));
    }

    #[test]
    fn destroy_attacker_tolerates_a_missing_attacker() {
        let catalog = catalog();
        let (mut state, ctx) = setup(&catalog);
        state.player.field.clear();

        let res = GoalEffect::DestroyAttacker.apply(&ctx, &mut state, &catalog, &mut rng());

        assert!(matches!(res.events[0], GameEvent::AttackerGone { .. }));
    }

    #[test]
    fn discard_takes_one_card_from_the_attacking_hand() {
        let catalog = catalog();
        let (mut state, ctx) = setup(&catalog);
        state.player.hand.push(instance(&catalog, "small"));
        state.player.hand.push(instance(&catalog, "small"));

        let res = GoalEffect::OpponentDiscardRandom.apply(&ctx, &mut state, &catalog, &mut rng());

        assert_eq!(state.player.hand.len(), 1);
        assert!(matches!(res.events[0], GameEvent::CardDiscarded { side: Side::Player, .. }));

        state.player.hand.clear();
        let res = GoalEffect::OpponentDiscardRandom.apply(&ctx, &mut state, &catalog, &mut rng());
        assert!(matches!(res.events[0], GameEvent::NothingToDiscard { .. }));
    }

    #[test]
    fn owner_draw_uses_the_goal_owner_deck() {
        let catalog = catalog();
        let (mut state, ctx) = setup(&catalog);

        GoalEffect::OwnerDrawCard.apply(&ctx, &mut state, &catalog, &mut rng());

        assert_eq!(state.opponent.hand.len(), 1);
        assert!(state.opponent.deck.is_empty());

        let res = GoalEffect::OwnerDrawCard.apply(&ctx, &mut state, &catalog, &mut rng());
        assert!(matches!(res.events[0], GameEvent::DrawFailed { side: Side::Opponent, .. }));
        assert_eq!(state.opponent.hand.len(), 1);
    }

    #[test]
    fn attack_reduction_floors_at_zero() {
        let catalog = catalog();
        let (mut state, ctx) = setup(&catalog);

        GoalEffect::ReduceAttackerMonsterAtk5.apply(&ctx, &mut state, &catalog, &mut rng());
        assert_eq!(state.player.field[0].attack, 9);

        state.player.field[0].attack = 3;
        GoalEffect::ReduceAttackerMonsterAtk5.apply(&ctx, &mut state, &catalog, &mut rng());
        assert_eq!(state.player.field[0].attack, 0);
    }

    #[test]
    fn buff_targets_one_monster_of_the_goal_owner() {
        let catalog = catalog();
        let (mut state, ctx) = setup(&catalog);
        state.opponent.field.push(instance(&catalog, "small"));
        state.opponent.field.push(instance(&catalog, "small"));

        GoalEffect::BuffOwnMonsterAtk5.apply(&ctx, &mut state, &catalog, &mut rng());

        let total: i32 = state.opponent.field.iter().map(|card| card.attack).sum();
        assert_eq!(total, 8 + 8 + 5);
        assert_eq!(state.player.field[0].attack, 14);
    }

    #[test]
    fn buff_without_monsters_changes_nothing() {
        let catalog = catalog();
        let (mut state, ctx) = setup(&catalog);
        let before = state.clone();

        let res = GoalEffect::BuffOwnMonsterAtk5.apply(&ctx, &mut state, &catalog, &mut rng());

        assert!(matches!(res.events[0], GameEvent::NoMonsterToBuff { side: Side::Opponent }));
        assert_eq!(state, before);
    }

    #[test]
    fn returned_attacker_goes_back_to_hand() {
        let catalog = catalog();
        let (mut state, ctx) = setup(&catalog);

        GoalEffect::ReturnAttackerToHand.apply(&ctx, &mut state, &catalog, &mut rng());

        assert!(state.player.field.is_empty());
        assert_eq!(state.player.hand[0].instance_id, ctx.attacker_id);
    }

    #[test]
    fn returned_attacker_is_lost_when_hand_is_full() {
        let catalog = catalog();
        let (mut state, ctx) = setup(&catalog);
        for _ in 0..state.max_hand_size {
            state.player.hand.push(instance(&catalog, "small"));
        }

        let res = GoalEffect::ReturnAttackerToHand.apply(&ctx, &mut state, &catalog, &mut rng());

        assert!(state.player.field.is_empty());
        assert_eq!(state.player.hand.len(), state.max_hand_size);
        assert!(state.player.hand.iter().all(|card| card.instance_id != ctx.attacker_id));
        assert!(matches!(res.events[0], GameEvent::CardLost { .. }));
    }

    #[test]
    fn freeze_marks_the_attacker() {
        let catalog = catalog();
        let (mut state, ctx) = setup(&catalog);

        GoalEffect::FreezeAttackerNextTurn.apply(&ctx, &mut state, &catalog, &mut rng());

        assert!(state.player.field[0].is_frozen());
        assert!(!state.player.field[0].can_attack());
    }

    #[test]
    fn special_summon_only_picks_small_monsters() {
        let catalog = catalog();
        let (mut state, ctx) = setup(&catalog);
        state.opponent.hand.push(instance(&catalog, "big"));
        state.opponent.hand.push(instance(&catalog, "small"));

        let res = GoalEffect::SpecialSummonFromHandAtk10.apply(&ctx, &mut state, &catalog, &mut rng());

        assert!(matches!(res.events[0], GameEvent::SpecialSummoned { side: Side::Opponent, .. }));
        assert_eq!(state.opponent.field.len(), 1);
        assert_eq!(state.opponent.field[0].card_id, "small");
        assert_eq!(state.opponent.hand[0].card_id, "big");
    }

    #[test]
    fn special_summon_needs_room_on_the_field() {
        let catalog = catalog();
        let (mut state, ctx) = setup(&catalog);
        state.opponent.hand.push(instance(&catalog, "small"));
        for _ in 0..state.max_field_size {
            state.opponent.field.push(instance(&catalog, "big"));
        }
        let before = state.clone();

        let res = GoalEffect::SpecialSummonFromHandAtk10.apply(&ctx, &mut state, &catalog, &mut rng());

        assert!(matches!(res.events[0], GameEvent::SummonUnavailable { .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn unrecognized_effect_is_a_no_op() {
        let catalog = catalog();
        let (mut state, ctx) = setup(&catalog);
        let before = state.clone();

        let res = GoalEffect::Unrecognized("TIME_WARP".into()).apply(&ctx, &mut state, &catalog, &mut rng());

        assert_eq!(state, before);
        assert_eq!(
            res.events,
            vec![GameEvent::UnrecognizedEffect {
                key: "TIME_WARP".into()
            }]
        );
    }
}
