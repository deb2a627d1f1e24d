use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::catalog::CardCatalog;
use super::effects::GoalEffect;
use super::rules::RuleError;
use crate::utils;

/// 每位玩家的目标卡槽位数。
pub const GOAL_SLOTS: usize = 4;

pub const DEFAULT_MAX_HAND_SIZE: usize = 7;
pub const DEFAULT_MAX_FIELD_SIZE: usize = 5;

/// 卡牌定义标识（来自卡牌目录）。
pub type CardId = String;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// 单张实体卡的唯一标识，单调分配，永不复用。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn next() -> Self {
        let n = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("inst-{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 对局双方。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Player,
    Opponent,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Player => Side::Opponent,
            Side::Opponent => Side::Player,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Player => "Player",
            Side::Opponent => "Opponent",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CardType {
    #[serde(alias = "Monstre")]
    Monster,
    #[serde(alias = "Magie")]
    Spell,
    #[serde(alias = "Piege")]
    Trap,
}

impl Default for CardType {
    fn default() -> Self {
        CardType::Monster
    }
}

/// 怪兽能力标签；未知标签原样保留但没有规则效果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Ability {
    Protector,
    Other(String),
}

impl From<String> for Ability {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PROTECTOR" => Ability::Protector,
            _ => Ability::Other(value),
        }
    }
}

impl From<Ability> for String {
    fn from(value: Ability) -> Self {
        match value {
            Ability::Protector => "PROTECTOR".to_string(),
            Ability::Other(tag) => tag,
        }
    }
}

/// 卡牌目录中的不可变定义。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardDefinition {
    pub id: CardId,
    pub name: String,
    #[serde(rename = "type", alias = "card_type", default)]
    pub card_type: CardType,
    #[serde(default, alias = "atk")]
    pub attack: i32,
    #[serde(default, alias = "def", skip_serializing_if = "Option::is_none")]
    pub defense: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub abilities: Vec<Ability>,
    #[serde(default)]
    pub description: String,
    #[serde(
        default,
        alias = "effectOnDestroy",
        skip_serializing_if = "Option::is_none"
    )]
    pub effect_on_destroy: Option<GoalEffect>,
    #[serde(default)]
    pub rarity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<u8>,
}

impl CardDefinition {
    pub fn monster(id: impl Into<String>, name: impl Into<String>, attack: i32, defense: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            card_type: CardType::Monster,
            attack,
            defense: Some(defense),
            abilities: Vec::new(),
            description: String::new(),
            effect_on_destroy: None,
            rarity: "common".into(),
            cost: None,
        }
    }

    pub fn goal(
        id: impl Into<String>,
        name: impl Into<String>,
        card_type: CardType,
        effect: GoalEffect,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            card_type,
            attack: 0,
            defense: None,
            abilities: Vec::new(),
            description: String::new(),
            effect_on_destroy: Some(effect),
            rarity: "common".into(),
            cost: None,
        }
    }

    pub fn with_ability(mut self, ability: Ability) -> Self {
        self.abilities.push(ability);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_rarity(mut self, rarity: impl Into<String>) -> Self {
        self.rarity = rarity.into();
        self
    }

    pub fn is_monster(&self) -> bool {
        self.card_type == CardType::Monster
    }

    /// 魔法与陷阱可作为目标卡。
    pub fn is_goal_eligible(&self) -> bool {
        matches!(self.card_type, CardType::Spell | CardType::Trap)
    }
}

fn default_true() -> bool {
    true
}

/// 对局中的一张实体卡。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardInstance {
    pub instance_id: InstanceId,
    pub card_id: CardId,
    pub name: String,
    #[serde(rename = "type")]
    pub card_type: CardType,
    pub attack: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defense: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub abilities: Vec<Ability>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_on_destroy: Option<GoalEffect>,
    #[serde(default)]
    pub rarity: String,
    #[serde(default)]
    pub has_attacked_this_turn: bool,
    #[serde(default = "default_true")]
    pub can_attack_next_turn: bool,
    #[serde(default)]
    pub is_revealed: bool,
}

impl CardInstance {
    pub fn from_definition(definition: &CardDefinition) -> Self {
        Self {
            instance_id: InstanceId::next(),
            card_id: definition.id.clone(),
            name: definition.name.clone(),
            card_type: definition.card_type,
            attack: definition.attack,
            defense: definition.defense,
            abilities: definition.abilities.clone(),
            description: definition.description.clone(),
            effect_on_destroy: definition.effect_on_destroy.clone(),
            rarity: definition.rarity.clone(),
            has_attacked_this_turn: false,
            can_attack_next_turn: true,
            is_revealed: false,
        }
    }

    pub fn is_monster(&self) -> bool {
        self.card_type == CardType::Monster
    }

    pub fn is_protector(&self) -> bool {
        self.is_monster() && self.abilities.contains(&Ability::Protector)
    }

    pub fn defense_value(&self) -> i32 {
        self.defense.unwrap_or(0)
    }

    pub fn is_frozen(&self) -> bool {
        !self.can_attack_next_turn
    }

    pub fn can_attack(&self) -> bool {
        self.is_monster() && !self.has_attacked_this_turn && self.can_attack_next_turn
    }

    /// 回合开始时重置；返回此前是否处于冻结状态。
    pub fn untap(&mut self) -> bool {
        let was_frozen = self.is_frozen();
        self.has_attacked_this_turn = false;
        self.can_attack_next_turn = true;
        was_frozen
    }
}

/// 卡牌所在区域。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "zone")]
pub enum Zone {
    Hand,
    Field,
    Goal { slot: usize },
}

/// 一方的全部区域。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerState {
    pub side: Side,
    #[serde(default)]
    pub deck: Vec<CardId>,
    #[serde(default)]
    pub hand: Vec<CardInstance>,
    #[serde(default)]
    pub field: Vec<CardInstance>,
    #[serde(default)]
    pub goals: [Option<CardInstance>; GOAL_SLOTS],
}

impl PlayerState {
    pub fn new(side: Side, deck: Vec<CardId>, goals: [Option<CardInstance>; GOAL_SLOTS]) -> Self {
        Self {
            side,
            deck,
            hand: Vec::new(),
            field: Vec::new(),
            goals,
        }
    }

    pub fn empty(side: Side) -> Self {
        Self::new(side, Vec::new(), Default::default())
    }

    pub fn hand_index(&self, instance_id: &InstanceId) -> Option<usize> {
        self.hand
            .iter()
            .position(|card| &card.instance_id == instance_id)
    }

    pub fn field_index(&self, instance_id: &InstanceId) -> Option<usize> {
        self.field
            .iter()
            .position(|card| &card.instance_id == instance_id)
    }

    pub fn find_on_field(&self, instance_id: &InstanceId) -> Option<&CardInstance> {
        self.field
            .iter()
            .find(|card| &card.instance_id == instance_id)
    }

    pub fn find_on_field_mut(&mut self, instance_id: &InstanceId) -> Option<&mut CardInstance> {
        self.field
            .iter_mut()
            .find(|card| &card.instance_id == instance_id)
    }

    pub fn remove_from_hand(&mut self, instance_id: &InstanceId) -> Option<CardInstance> {
        let idx = self.hand_index(instance_id)?;
        Some(self.hand.remove(idx))
    }

    pub fn remove_from_field(&mut self, instance_id: &InstanceId) -> Option<CardInstance> {
        let idx = self.field_index(instance_id)?;
        Some(self.field.remove(idx))
    }

    pub fn goal_slot(&self, instance_id: &InstanceId) -> Option<usize> {
        self.goals.iter().position(|slot| {
            slot.as_ref()
                .map(|card| &card.instance_id == instance_id)
                .unwrap_or(false)
        })
    }

    /// 置空槽位，其余槽位保持原位。
    pub fn destroy_goal(&mut self, slot: usize) -> Option<CardInstance> {
        self.goals.get_mut(slot).and_then(Option::take)
    }

    pub fn goals_remaining(&self) -> usize {
        self.goals.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn unrevealed_goals(&self) -> impl Iterator<Item = &CardInstance> {
        self.goals
            .iter()
            .flatten()
            .filter(|card| !card.is_revealed)
    }

    pub fn has_protector(&self) -> bool {
        utils::has_protector(&self.field)
    }

    /// 重置场上怪兽的攻击状态，返回解冻的怪兽。
    pub fn untap_field(&mut self) -> Vec<(InstanceId, String)> {
        self.field
            .iter_mut()
            .filter_map(|card| {
                if card.untap() {
                    Some((card.instance_id.clone(), card.name.clone()))
                } else {
                    None
                }
            })
            .collect()
    }

    fn instances(&self) -> impl Iterator<Item = &CardInstance> {
        self.hand
            .iter()
            .chain(self.field.iter())
            .chain(self.goals.iter().flatten())
    }
}

/// 回合状态机的阶段。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TurnPhase {
    PlayerMain,
    PlayerEndingTurn,
    OpponentUntap,
    OpponentDraw,
    OpponentMain,
    OpponentAttacks,
    PlayerUntap,
    GameOver,
}

impl Default for TurnPhase {
    fn default() -> Self {
        TurnPhase::PlayerMain
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum VictoryReason {
    GoalsDestroyed { loser: Side },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VictoryState {
    pub winner: Side,
    pub reason: VictoryReason,
}

/// 游戏事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    MatchStarted,
    CardDrawn {
        side: Side,
        instance_id: InstanceId,
        card_id: CardId,
    },
    UnknownCardSkipped {
        side: Side,
        card_id: CardId,
    },
    DrawFailed {
        side: Side,
        reason: String,
    },
    CardPlayed {
        side: Side,
        instance_id: InstanceId,
        name: String,
    },
    AttackerSelected {
        instance_id: InstanceId,
        name: String,
    },
    AttackDeclared {
        side: Side,
        attacker_id: InstanceId,
        attacker_name: String,
        attack: i32,
        target_id: InstanceId,
        target_name: String,
    },
    MonsterDestroyed {
        side: Side,
        card: CardInstance,
    },
    AttackAbsorbed {
        attacker_name: String,
        defender_name: String,
    },
    GoalDestroyed {
        side: Side,
        slot: usize,
        card: CardInstance,
    },
    GoalEffectTriggered {
        side: Side,
        name: String,
        description: String,
    },
    AttackerGone {
        name: String,
    },
    CardDiscarded {
        side: Side,
        card: CardInstance,
    },
    NothingToDiscard {
        side: Side,
    },
    AttackChanged {
        side: Side,
        instance_id: InstanceId,
        name: String,
        attack: i32,
        delta: i32,
    },
    NoMonsterToBuff {
        side: Side,
    },
    CardReturnedToHand {
        side: Side,
        instance_id: InstanceId,
        name: String,
    },
    CardLost {
        side: Side,
        card: CardInstance,
    },
    MonsterFrozen {
        side: Side,
        instance_id: InstanceId,
        name: String,
    },
    MonsterThawed {
        side: Side,
        instance_id: InstanceId,
        name: String,
    },
    SpecialSummoned {
        side: Side,
        instance_id: InstanceId,
        name: String,
    },
    SummonUnavailable {
        side: Side,
    },
    UnrecognizedEffect {
        key: String,
    },
    TurnEnded {
        side: Side,
    },
    TurnStarted {
        side: Side,
        turn_number: u32,
    },
    GameWon {
        winner: Side,
        reason: VictoryReason,
    },
    MatchAbandoned,
}

impl GameEvent {
    /// 面向玩家的解说文本；纯内部事件返回 `None`。
    pub fn narration(&self) -> Option<String> {
        let text = match self {
            GameEvent::MatchStarted => {
                "Duel started! Destroy the 4 enemy goal cards. Your move!".to_string()
            }
            GameEvent::CardDrawn { .. } => return None,
            GameEvent::UnknownCardSkipped { .. } => return None,
            GameEvent::DrawFailed { reason, .. } => reason.clone(),
            GameEvent::CardPlayed { side, name, .. } => format!("{} plays {}.", side.label(), name),
            GameEvent::AttackerSelected { name, .. } => {
                format!("Selected: {name}. Pick an enemy target.")
            }
            GameEvent::AttackDeclared {
                side,
                attacker_name,
                attack,
                target_name,
                ..
            } => format!(
                "{}: {} (ATK {}) attacks {}!",
                side.label(),
                attacker_name,
                attack,
                target_name
            ),
            GameEvent::MonsterDestroyed { card, .. } => format!("{} is destroyed.", card.name),
            GameEvent::AttackAbsorbed {
                attacker_name,
                defender_name,
            } => format!("{attacker_name}'s attack is absorbed by {defender_name}'s DEF!"),
            GameEvent::GoalDestroyed { card, .. } => {
                format!("Goal card \"{}\" attacked and destroyed!", card.name)
            }
            GameEvent::GoalEffectTriggered {
                name, description, ..
            } => format!("Goal effect: \"{name}\" - {description}"),
            GameEvent::AttackerGone { name } => format!("{name} is no longer on the field."),
            GameEvent::CardDiscarded { side, card } => {
                format!("{} discards {} from hand.", side.label(), card.name)
            }
            GameEvent::NothingToDiscard { side } => {
                format!("{} has no cards in hand to discard.", side.label())
            }
            GameEvent::AttackChanged {
                side,
                name,
                attack,
                delta,
                ..
            } => {
                if *delta < 0 {
                    format!("{}'s {} loses ATK (now {} ATK).", side.label(), name, attack)
                } else {
                    format!("{}'s {} gains {} ATK (now {} ATK).", side.label(), name, delta, attack)
                }
            }
            GameEvent::NoMonsterToBuff { side } => {
                format!("{} has no monster on the field to empower.", side.label())
            }
            GameEvent::CardReturnedToHand { side, name, .. } => {
                format!("{} returns to {}'s hand!", name, side.label())
            }
            GameEvent::CardLost { side, card } => {
                format!("{}'s hand is full, {} is lost.", side.label(), card.name)
            }
            GameEvent::MonsterFrozen { side, name, .. } => format!(
                "{}'s {} is frozen and cannot attack next turn!",
                side.label(),
                name
            ),
            GameEvent::MonsterThawed { name, .. } => format!("{name} can attack again."),
            GameEvent::SpecialSummoned { side, name, .. } => {
                format!("{} special summons {} from hand!", side.label(), name)
            }
            GameEvent::SummonUnavailable { side } => format!(
                "{} cannot special summon (no eligible monster or the field is full).",
                side.label()
            ),
            GameEvent::UnrecognizedEffect { key } => {
                format!("Goal effect \"{key}\" is not implemented.")
            }
            GameEvent::TurnEnded { side } => format!("{} ends the turn.", side.label()),
            GameEvent::TurnStarted { side, turn_number } => match side {
                Side::Player => format!("--- Turn {turn_number} (Player) ---"),
                Side::Opponent => "--- Opponent's turn ---".to_string(),
            },
            GameEvent::GameWon { winner, .. } => match winner {
                Side::Player => "VICTORY! Every enemy goal card has been destroyed!".to_string(),
                Side::Opponent => "DEFEAT! All of your goal cards have been destroyed!".to_string(),
            },
            GameEvent::MatchAbandoned => "Match abandoned.".to_string(),
        };
        Some(text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    DuplicateInstance { instance_id: InstanceId },
    HandOverflow { side: Side, size: usize },
    FieldOverflow { side: Side, size: usize },
    NonMonsterOnField { instance_id: InstanceId },
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityError::DuplicateInstance { instance_id } => {
                write!(f, "instance {instance_id} appears in more than one zone")
            }
            IntegrityError::HandOverflow { side, size } => {
                write!(f, "{} hand holds {} cards", side.label(), size)
            }
            IntegrityError::FieldOverflow { side, size } => {
                write!(f, "{} field holds {} monsters", side.label(), size)
            }
            IntegrityError::NonMonsterOnField { instance_id } => {
                write!(f, "non-monster {instance_id} on the field")
            }
        }
    }
}

/// 对局的权威状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchState {
    pub player: PlayerState,
    pub opponent: PlayerState,
    pub is_player_turn: bool,
    pub turn_number: u32,
    pub game_is_over: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_attacker: Option<InstanceId>,
    #[serde(default)]
    pub phase: TurnPhase,
    pub max_hand_size: usize,
    pub max_field_size: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<VictoryState>,
}

impl MatchState {
    pub fn new(player: PlayerState, opponent: PlayerState) -> Self {
        Self {
            player,
            opponent,
            is_player_turn: true,
            turn_number: 1,
            game_is_over: false,
            selected_attacker: None,
            phase: TurnPhase::PlayerMain,
            max_hand_size: DEFAULT_MAX_HAND_SIZE,
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
            event_log: Vec::new(),
            outcome: None,
        }
    }

    pub fn with_limits(mut self, max_hand_size: usize, max_field_size: usize) -> Self {
        self.max_hand_size = max_hand_size;
        self.max_field_size = max_field_size;
        self
    }

    pub fn side(&self, side: Side) -> &PlayerState {
        match side {
            Side::Player => &self.player,
            Side::Opponent => &self.opponent,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut PlayerState {
        match side {
            Side::Player => &mut self.player,
            Side::Opponent => &mut self.opponent,
        }
    }

    pub fn active_side(&self) -> Side {
        if self.is_player_turn {
            Side::Player
        } else {
            Side::Opponent
        }
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    /// 从牌库顶（末尾）抽一张牌加入手牌。
    pub fn draw_card(&mut self, side: Side, catalog: &CardCatalog) -> Result<GameEvent, RuleError> {
        if self.game_is_over {
            return Err(RuleError::GameFinished);
        }
        let max_hand_size = self.max_hand_size;
        let player = self.side_mut(side);
        if player.deck.is_empty() {
            return Err(RuleError::DeckEmpty { side });
        }
        if player.hand.len() >= max_hand_size {
            return Err(RuleError::HandFull { side });
        }

        let card_id = player.deck.pop().ok_or(RuleError::DeckEmpty { side })?;
        let Some(definition) = catalog.get(&card_id) else {
            utils::log_warn(&format!("draw: no card definition for id {card_id}"));
            return Ok(GameEvent::UnknownCardSkipped { side, card_id });
        };
        let card = CardInstance::from_definition(definition);
        let instance_id = card.instance_id.clone();
        player.hand.push(card);
        Ok(GameEvent::CardDrawn {
            side,
            instance_id,
            card_id,
        })
    }

    /// 手牌中的怪兽进入场上。
    pub fn play_to_field(&mut self, side: Side, instance_id: &InstanceId) -> Result<GameEvent, RuleError> {
        let max_field_size = self.max_field_size;
        let player = self.side_mut(side);
        let idx = player
            .hand_index(instance_id)
            .ok_or_else(|| RuleError::CardNotFound {
                instance_id: instance_id.clone(),
            })?;
        if !player.hand[idx].is_monster() {
            return Err(RuleError::NotAMonster {
                name: player.hand[idx].name.clone(),
            });
        }
        if player.field.len() >= max_field_size {
            return Err(RuleError::FieldFull { side });
        }

        let card = player.hand.remove(idx);
        let event = GameEvent::CardPlayed {
            side,
            instance_id: card.instance_id.clone(),
            name: card.name.clone(),
        };
        player.field.push(card);
        Ok(event)
    }

    pub fn remove_from_field(&mut self, side: Side, instance_id: &InstanceId) -> Option<CardInstance> {
        self.side_mut(side).remove_from_field(instance_id)
    }

    pub fn destroy_goal(&mut self, side: Side, slot: usize) -> Option<CardInstance> {
        self.side_mut(side).destroy_goal(slot)
    }

    pub fn untap_side(&mut self, side: Side) -> Vec<GameEvent> {
        self.side_mut(side)
            .untap_field()
            .into_iter()
            .map(|(instance_id, name)| GameEvent::MonsterThawed {
                side,
                instance_id,
                name,
            })
            .collect()
    }

    pub fn goals_destroyed(&self, side: Side) -> bool {
        self.side(side).goals_remaining() == 0
    }

    /// 对手目标卡全灭优先判定，然后才是玩家。
    pub fn evaluate_victory(&mut self) -> Option<VictoryState> {
        if let Some(outcome) = &self.outcome {
            return Some(outcome.clone());
        }

        if self.goals_destroyed(Side::Opponent) {
            return Some(self.declare_victory(
                Side::Player,
                VictoryReason::GoalsDestroyed {
                    loser: Side::Opponent,
                },
            ));
        }
        if self.goals_destroyed(Side::Player) {
            return Some(self.declare_victory(
                Side::Opponent,
                VictoryReason::GoalsDestroyed {
                    loser: Side::Player,
                },
            ));
        }
        None
    }

    pub fn declare_victory(&mut self, winner: Side, reason: VictoryReason) -> VictoryState {
        let victory = VictoryState { winner, reason };
        if self.outcome.is_none() {
            self.record_event(GameEvent::GameWon {
                winner: victory.winner,
                reason: victory.reason.clone(),
            });
            self.outcome = Some(victory.clone());
        }
        self.game_is_over = true;
        self.phase = TurnPhase::GameOver;
        self.selected_attacker = None;
        victory
    }

    /// 玩家退出：终止对局但没有胜者。
    pub fn abandon(&mut self) {
        if self.game_is_over {
            return;
        }
        self.game_is_over = true;
        self.phase = TurnPhase::GameOver;
        self.selected_attacker = None;
        self.record_event(GameEvent::MatchAbandoned);
    }

    /// 查找任意区域中的实体卡。
    pub fn locate(&self, instance_id: &InstanceId) -> Option<(Side, Zone, &CardInstance)> {
        for side in [Side::Player, Side::Opponent] {
            let player = self.side(side);
            if let Some(card) = player.hand.iter().find(|c| &c.instance_id == instance_id) {
                return Some((side, Zone::Hand, card));
            }
            if let Some(card) = player.find_on_field(instance_id) {
                return Some((side, Zone::Field, card));
            }
            if let Some(slot) = player.goal_slot(instance_id) {
                if let Some(card) = player.goals[slot].as_ref() {
                    return Some((side, Zone::Goal { slot }, card));
                }
            }
        }
        None
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let mut seen = HashSet::new();
        for player in [&self.player, &self.opponent] {
            if player.hand.len() > self.max_hand_size {
                return Err(IntegrityError::HandOverflow {
                    side: player.side,
                    size: player.hand.len(),
                });
            }
            if player.field.len() > self.max_field_size {
                return Err(IntegrityError::FieldOverflow {
                    side: player.side,
                    size: player.field.len(),
                });
            }
            if let Some(card) = player.field.iter().find(|card| !card.is_monster()) {
                return Err(IntegrityError::NonMonsterOnField {
                    instance_id: card.instance_id.clone(),
                });
            }
            for card in player.instances() {
                if !seen.insert(card.instance_id.clone()) {
                    return Err(IntegrityError::DuplicateInstance {
                        instance_id: card.instance_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> CardCatalog {
        CardCatalog::from_definitions(vec![
            CardDefinition::monster("m1", "Footman", 5, 5),
            CardDefinition::goal("g1", "Mirror Ward", CardType::Trap, GoalEffect::OwnerDrawCard),
        ])
        .expect("catalog should build")
    }

    fn state_with_decks(player_deck: Vec<&str>) -> MatchState {
        let deck = player_deck.into_iter().map(String::from).collect();
        MatchState::new(
            PlayerState::new(Side::Player, deck, Default::default()),
            PlayerState::empty(Side::Opponent),
        )
    }

    #[test]
    fn draw_pops_top_of_deck_into_hand() {
        let catalog = catalog();
        let mut state = state_with_decks(vec!["g1", "m1"]);

        let event = state.draw_card(Side::Player, &catalog).expect("draw should succeed");

        assert!(matches!(event, GameEvent::CardDrawn { ref card_id, .. } if card_id == "m1"));
        assert_eq!(state.player.deck, vec!["g1".to_string()]);
        assert_eq!(state.player.hand.len(), 1);
        assert_eq!(state.player.hand[0].name, "Footman");
    }

    #[test]
    fn draw_from_empty_deck_is_rejected() {
        let catalog = catalog();
        let mut state = state_with_decks(Vec::new());
        let before = state.clone();

        let result = state.draw_card(Side::Player, &catalog);

        assert_eq!(result, Err(RuleError::DeckEmpty { side: Side::Player }));
        assert_eq!(state, before);
    }

    #[test]
    fn draw_with_full_hand_is_rejected() {
        let catalog = catalog();
        let mut state = state_with_decks(vec!["m1"; 9]);
        for _ in 0..DEFAULT_MAX_HAND_SIZE {
            state.draw_card(Side::Player, &catalog).expect("room in hand");
        }
        let before = state.clone();

        let result = state.draw_card(Side::Player, &catalog);

        assert_eq!(result, Err(RuleError::HandFull { side: Side::Player }));
        assert_eq!(state, before);
    }

    #[test]
    fn unknown_deck_entry_is_consumed_without_a_card() {
        let catalog = catalog();
        let mut state = state_with_decks(vec!["missing"]);

        let event = state.draw_card(Side::Player, &catalog).expect("draw should not fail");

        assert!(matches!(event, GameEvent::UnknownCardSkipped { .. }));
        assert!(state.player.deck.is_empty());
        assert!(state.player.hand.is_empty());
    }

    #[test]
    fn only_monsters_reach_the_field() {
        let catalog = catalog();
        let mut state = state_with_decks(vec!["g1"]);
        state.draw_card(Side::Player, &catalog).expect("draw should succeed");
        let trap_id = state.player.hand[0].instance_id.clone();

        let result = state.play_to_field(Side::Player, &trap_id);

        assert!(matches!(result, Err(RuleError::NotAMonster { .. })));
        assert_eq!(state.player.hand.len(), 1);
        assert!(state.player.field.is_empty());
    }

    #[test]
    fn full_field_rejects_another_monster() {
        let catalog = catalog();
        let mut state = state_with_decks(vec!["m1"; 6]);
        for _ in 0..6 {
            state.draw_card(Side::Player, &catalog).expect("draw should succeed");
        }
        for _ in 0..DEFAULT_MAX_FIELD_SIZE {
            let id = state.player.hand[0].instance_id.clone();
            state.play_to_field(Side::Player, &id).expect("field has room");
        }
        let last = state.player.hand[0].instance_id.clone();
        let before = state.clone();

        let result = state.play_to_field(Side::Player, &last);

        assert_eq!(result, Err(RuleError::FieldFull { side: Side::Player }));
        assert_eq!(state, before);
    }

    #[test]
    fn destroying_a_goal_keeps_other_slots_in_place() {
        let catalog = catalog();
        let definition = catalog.get("g1").expect("goal definition");
        let goals: [Option<CardInstance>; GOAL_SLOTS] =
            std::array::from_fn(|_| Some(CardInstance::from_definition(definition)));
        let ids: Vec<InstanceId> = goals
            .iter()
            .flatten()
            .map(|card| card.instance_id.clone())
            .collect();
        let mut state = MatchState::new(
            PlayerState::new(Side::Player, Vec::new(), goals),
            PlayerState::empty(Side::Opponent),
        );

        let removed = state.destroy_goal(Side::Player, 1).expect("slot 1 is occupied");

        assert_eq!(removed.instance_id, ids[1]);
        assert!(state.player.goals[1].is_none());
        assert_eq!(state.player.goal_slot(&ids[2]), Some(2));
        assert_eq!(state.player.goals_remaining(), 3);
        assert!(state.destroy_goal(Side::Player, 1).is_none());
    }

    #[test]
    fn opponent_defeat_is_checked_before_player_defeat() {
        let mut state = MatchState::new(
            PlayerState::empty(Side::Player),
            PlayerState::empty(Side::Opponent),
        );

        let outcome = state.evaluate_victory().expect("both sides have no goals");

        assert_eq!(outcome.winner, Side::Player);
        assert!(state.game_is_over);
        assert_eq!(state.phase, TurnPhase::GameOver);
    }

    #[test]
    fn integrity_check_flags_duplicate_instances() {
        let catalog = catalog();
        let mut state = state_with_decks(vec!["m1"]);
        state.draw_card(Side::Player, &catalog).expect("draw should succeed");
        let copy = state.player.hand[0].clone();
        state.opponent.field.push(copy);

        assert!(matches!(
            state.integrity_check(),
            Err(IntegrityError::DuplicateInstance { .. })
        ));
    }

    #[test]
    fn instance_ids_are_never_reused() {
        let definition = CardDefinition::monster("m1", "Footman", 5, 5);
        let a = CardInstance::from_definition(&definition);
        let b = CardInstance::from_definition(&definition);
        assert_ne!(a.instance_id, b.instance_id);
        assert!(a.instance_id.as_str().starts_with("inst-"));
    }

    #[test]
    fn definition_accepts_original_catalog_keys() {
        let json = r#"{"id":"c7","name":"Guardian","type":"Monstre","atk":3,"def":12,
            "abilities":["PROTECTOR","FLYING"],"description":"Wall","rarity":"rare"}"#;
        let definition: CardDefinition = serde_json::from_str(json).expect("valid definition");

        assert_eq!(definition.card_type, CardType::Monster);
        assert_eq!(definition.attack, 3);
        assert_eq!(definition.defense, Some(12));
        assert_eq!(
            definition.abilities,
            vec![Ability::Protector, Ability::Other("FLYING".into())]
        );
    }
}
