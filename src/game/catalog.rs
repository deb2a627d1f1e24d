//! 卡牌目录：对局开始前加载一次的只读定义表。

use std::collections::HashMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::effects::GoalEffect;
use super::state::{Ability, CardDefinition, CardId, CardInstance, CardType, GOAL_SLOTS};
use crate::utils;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum CatalogError {
    Parse { message: String },
    Empty,
    DuplicateId { card_id: CardId },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Parse { message } => write!(f, "card data could not be parsed: {message}"),
            CatalogError::Empty => f.write_str("card data contains no cards"),
            CatalogError::DuplicateId { card_id } => write!(f, "card id {card_id} is defined twice"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CardCatalog {
    cards: HashMap<CardId, CardDefinition>,
    // 保留文件中的顺序，默认牌组按此顺序循环取怪兽
    order: Vec<CardId>,
}

impl CardCatalog {
    pub fn from_definitions(definitions: Vec<CardDefinition>) -> Result<Self, CatalogError> {
        if definitions.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut catalog = Self::default();
        for definition in definitions {
            if catalog.cards.contains_key(&definition.id) {
                return Err(CatalogError::DuplicateId {
                    card_id: definition.id,
                });
            }
            catalog.order.push(definition.id.clone());
            catalog.cards.insert(definition.id.clone(), definition);
        }
        Ok(catalog)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let definitions: Vec<CardDefinition> =
            serde_json::from_str(json).map_err(|error| CatalogError::Parse {
                message: error.to_string(),
            })?;
        let catalog = Self::from_definitions(definitions)?;
        utils::log_info(&format!("card catalog loaded: {} cards", catalog.len()));
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&CardDefinition> {
        self.cards.get(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CardDefinition> {
        self.order.iter().filter_map(|id| self.cards.get(id))
    }

    pub fn monsters(&self) -> impl Iterator<Item = &CardDefinition> {
        self.iter().filter(|card| card.is_monster())
    }

    pub fn goal_candidates(&self) -> impl Iterator<Item = &CardDefinition> {
        self.iter().filter(|card| card.is_goal_eligible())
    }

    /// 只含怪兽的默认牌组：按目录顺序循环填满后洗牌。
    pub fn default_deck<R: Rng + ?Sized>(&self, size: usize, rng: &mut R) -> Vec<CardId> {
        let monsters: Vec<&CardDefinition> = self.monsters().collect();
        if monsters.is_empty() {
            utils::log_error("default deck: the catalog has no monster cards");
            return Vec::new();
        }
        let mut deck: Vec<CardId> = (0..size)
            .map(|i| monsters[i % monsters.len()].id.clone())
            .collect();
        utils::shuffle_deck(&mut deck, rng);
        deck
    }

    /// 随机抽取魔法/陷阱作为四张目标卡，不足时循环使用。
    pub fn deal_goal_cards<R: Rng + ?Sized>(&self, rng: &mut R) -> [Option<CardInstance>; GOAL_SLOTS] {
        let mut candidates: Vec<&CardDefinition> = self.goal_candidates().collect();
        if candidates.is_empty() {
            utils::log_warn("goal cards: the catalog has no spell or trap cards");
            return Default::default();
        }
        utils::shuffle_deck(&mut candidates, rng);
        std::array::from_fn(|i| {
            Some(CardInstance::from_definition(
                candidates[i % candidates.len()],
            ))
        })
    }

    /// 调试与演示用的小型目录。
    pub fn sample() -> Self {
        let definitions = vec![
            CardDefinition::monster("m-footman", "Vanguard Footman", 6, 4),
            CardDefinition::monster("m-lancer", "Ember Lancer", 12, 3),
            CardDefinition::monster("m-golem", "Guardian Golem", 4, 14)
                .with_ability(Ability::Protector)
                .with_description("Protector: must be attacked first.")
                .with_rarity("rare"),
            CardDefinition::monster("m-scout", "Dune Scout", 8, 6),
            CardDefinition::monster("m-drake", "Storm Drake", 15, 9).with_rarity("epic"),
            CardDefinition::goal(
                "g-spikes",
                "Spiked Pit",
                CardType::Trap,
                GoalEffect::DestroyAttacker,
            )
            .with_description("Destroys the attacking monster."),
            CardDefinition::goal(
                "g-whisper",
                "Whispering Ruin",
                CardType::Spell,
                GoalEffect::OpponentDiscardRandom,
            )
            .with_description("The attacker discards a random card."),
            CardDefinition::goal(
                "g-insight",
                "Hidden Insight",
                CardType::Spell,
                GoalEffect::OwnerDrawCard,
            )
            .with_description("Its owner draws a card."),
            CardDefinition::goal(
                "g-rust",
                "Rusting Curse",
                CardType::Trap,
                GoalEffect::ReduceAttackerMonsterAtk5,
            )
            .with_description("The attacker loses 5 ATK."),
            CardDefinition::goal(
                "g-rally",
                "Rallying Banner",
                CardType::Spell,
                GoalEffect::BuffOwnMonsterAtk5,
            )
            .with_description("A random friendly monster gains 5 ATK."),
            CardDefinition::goal(
                "g-gust",
                "Repelling Gust",
                CardType::Trap,
                GoalEffect::ReturnAttackerToHand,
            )
            .with_description("The attacker returns to its owner's hand."),
            CardDefinition::goal(
                "g-frost",
                "Frost Sigil",
                CardType::Trap,
                GoalEffect::FreezeAttackerNextTurn,
            )
            .with_description("The attacker cannot attack next turn."),
            CardDefinition::goal(
                "g-call",
                "Call to Arms",
                CardType::Spell,
                GoalEffect::SpecialSummonFromHandAtk10,
            )
            .with_description("Summons a monster with 10 ATK or less from hand."),
        ];
        match Self::from_definitions(definitions) {
            Ok(catalog) => catalog,
            Err(error) => {
                utils::log_error(&format!("sample catalog is invalid: {error}"));
                Self::default()
            }
        }
    }
}
