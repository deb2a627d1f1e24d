use serde::{Deserialize, Serialize};

use super::state::{DEFAULT_MAX_FIELD_SIZE, DEFAULT_MAX_HAND_SIZE};

/// 对局节奏（毫秒）。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PacingConfig {
    pub turn_handoff_ms: u32,
    pub untap_ms: u32,
    pub draw_ms: u32,
    pub play_ms: u32,
    pub attack_animation_ms: u32,
    pub between_attacks_ms: u32,
}

impl PacingConfig {
    /// 测试用：所有停顿为零。
    pub fn instant() -> Self {
        Self {
            turn_handoff_ms: 0,
            untap_ms: 0,
            draw_ms: 0,
            play_ms: 0,
            attack_animation_ms: 0,
            between_attacks_ms: 0,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            turn_handoff_ms: 1000,
            untap_ms: 700,
            draw_ms: 1200,
            play_ms: 1700,
            attack_animation_ms: 600,
            between_attacks_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MatchConfig {
    pub max_hand_size: usize,
    pub max_field_size: usize,
    pub opening_hand: usize,
    pub min_deck_size: usize,
    pub default_deck_size: usize,
    pub narration_ms: u32,
    pub pacing: PacingConfig,
}

impl MatchConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_hand_size: DEFAULT_MAX_HAND_SIZE,
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
            opening_hand: 5,
            min_deck_size: 20,
            default_deck_size: 20,
            narration_ms: 4000,
            pacing: PacingConfig::default(),
        }
    }
}
