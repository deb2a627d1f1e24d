//! 回合流程：`Duel` 把规则引擎、对手策略与观察者组合在一起，
//! `TurnController` 在其上按节奏推进对手回合。

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use super::{
    catalog::CardCatalog,
    config::{MatchConfig, PacingConfig},
    ports::{ActionPort, MatchObserver, Pacer},
    rules::{AttackAction, PlayCardAction, RuleEngine, RuleError},
    state::{
        CardId, CardInstance, GameEvent, InstanceId, MatchState, PlayerState, Side, TurnPhase,
        Zone,
    },
};
use crate::ai::{GameAction, OpponentPolicy};
use crate::utils;

pub struct Duel {
    state: MatchState,
    catalog: Arc<CardCatalog>,
    engine: RuleEngine,
    policy: OpponentPolicy,
    config: MatchConfig,
    observer: Rc<dyn MatchObserver>,
    /// 每开一局加一，用来识别属于旧对局的异步续体。
    epoch: u64,
    pending: Vec<String>,
    dirty: bool,
}

/// 借用期间积累的解说与渲染请求。
#[must_use]
pub struct Dispatch {
    observer: Rc<dyn MatchObserver>,
    messages: Vec<String>,
    snapshot: Option<MatchState>,
    narration_ms: u32,
}

impl Dispatch {
    pub fn deliver(self) {
        for message in &self.messages {
            self.observer.narrate(message, self.narration_ms);
        }
        if let Some(state) = &self.snapshot {
            self.observer.render(state);
        }
    }
}

/// 在借用内执行一步，释放借用后再通知观察者；回调因此可以重新读取对局。
pub fn act<T>(duel: &RefCell<Duel>, step: impl FnOnce(&mut Duel) -> T) -> T {
    let (output, dispatch) = {
        let mut duel = duel.borrow_mut();
        let output = step(&mut *duel);
        (output, duel.flush())
    };
    dispatch.deliver();
    output
}

impl Duel {
    pub fn new(
        catalog: Arc<CardCatalog>,
        config: MatchConfig,
        observer: Rc<dyn MatchObserver>,
    ) -> Self {
        let engine = RuleEngine::new(Arc::clone(&catalog));
        Self::build(catalog, engine, OpponentPolicy::new(), config, observer)
    }

    pub fn with_seed(
        catalog: Arc<CardCatalog>,
        config: MatchConfig,
        observer: Rc<dyn MatchObserver>,
        seed: u64,
    ) -> Self {
        let engine = RuleEngine::with_seed(Arc::clone(&catalog), seed);
        let policy = OpponentPolicy::with_seed(seed.wrapping_add(1));
        Self::build(catalog, engine, policy, config, observer)
    }

    fn build(
        catalog: Arc<CardCatalog>,
        engine: RuleEngine,
        policy: OpponentPolicy,
        config: MatchConfig,
        observer: Rc<dyn MatchObserver>,
    ) -> Self {
        let state = MatchState::new(
            PlayerState::empty(Side::Player),
            PlayerState::empty(Side::Opponent),
        )
        .with_limits(config.max_hand_size, config.max_field_size);
        Self {
            state,
            catalog,
            engine,
            policy,
            config,
            observer,
            epoch: 0,
            pending: Vec::new(),
            dirty: false,
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn is_over(&self) -> bool {
        self.state.game_is_over
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// 替换为外部提供的状态（调试或恢复用），先做完整性检查。
    pub fn load_state(&mut self, state: MatchState) -> Result<(), RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })?;
        self.state = state;
        self.epoch += 1;
        self.request_render();
        Ok(())
    }

    /// 开新局：校验牌组、发目标卡、双方轮流起手。
    pub fn setup_new_game(&mut self, player_deck: Option<Vec<CardId>>) -> Vec<GameEvent> {
        let min_deck = self.config.min_deck_size;
        let deck_size = self.config.default_deck_size;

        let player_deck = match player_deck {
            Some(mut deck) if deck.len() >= min_deck => {
                utils::shuffle_deck(&mut deck, self.engine.rng_mut());
                deck
            }
            supplied => {
                if let Some(deck) = supplied.filter(|deck| !deck.is_empty()) {
                    let message = format!(
                        "Your deck has only {} cards (minimum {min_deck}). Using a default deck.",
                        deck.len()
                    );
                    utils::log_warn(&message);
                    self.pending.push(message);
                }
                self.catalog.default_deck(deck_size, self.engine.rng_mut())
            }
        };
        let opponent_deck = self.catalog.default_deck(deck_size, self.engine.rng_mut());
        let player_goals = self.catalog.deal_goal_cards(self.engine.rng_mut());
        let opponent_goals = self.catalog.deal_goal_cards(self.engine.rng_mut());

        self.state = MatchState::new(
            PlayerState::new(Side::Player, player_deck, player_goals),
            PlayerState::new(Side::Opponent, opponent_deck, opponent_goals),
        )
        .with_limits(self.config.max_hand_size, self.config.max_field_size);
        self.epoch += 1;

        let mut events = Vec::new();
        for _ in 0..self.config.opening_hand {
            for side in [Side::Player, Side::Opponent] {
                match self.engine.draw_card(&mut self.state, side) {
                    Ok(mut drawn) => events.append(&mut drawn),
                    Err(error) => utils::log_warn(&format!("opening hand: {error}")),
                }
            }
        }

        self.state.record_event(GameEvent::MatchStarted);
        events.push(GameEvent::MatchStarted);
        utils::log_info(&format!(
            "new match: {} cards in the player deck, {} in the opponent deck",
            self.state.player.deck.len(),
            self.state.opponent.deck.len()
        ));
        self.publish(&events);
        events
    }

    pub fn quit_game(&mut self) {
        if self.state.game_is_over {
            return;
        }
        self.state.abandon();
        self.publish(&[GameEvent::MatchAbandoned]);
    }

    pub fn request_render(&mut self) {
        self.dirty = true;
    }

    /// 取走积累的通知；调用方应在释放借用后再 `deliver`。
    pub fn flush(&mut self) -> Dispatch {
        Dispatch {
            observer: Rc::clone(&self.observer),
            messages: std::mem::take(&mut self.pending),
            snapshot: std::mem::take(&mut self.dirty).then(|| self.state.clone()),
            narration_ms: self.config.narration_ms,
        }
    }

    fn publish(&mut self, events: &[GameEvent]) {
        self.pending
            .extend(events.iter().filter_map(GameEvent::narration));
        self.request_render();
    }

    /// 成功则解说事件，失败则解说原因；两种情况都重新渲染。
    fn settle(
        &mut self,
        result: Result<Vec<GameEvent>, RuleError>,
    ) -> Result<Vec<GameEvent>, RuleError> {
        match &result {
            Ok(events) => self.publish(events),
            Err(error) => {
                self.pending.push(error.to_string());
                self.request_render();
            }
        }
        result
    }

    pub fn apply(&mut self, action: GameAction) -> Result<Vec<GameEvent>, RuleError> {
        let result = match action {
            GameAction::Draw { side } => self.engine.draw_on_turn(&mut self.state, side),
            GameAction::PlayCard { action } => self.engine.play_card(&mut self.state, action),
            GameAction::Attack { action } => self.engine.attack(&mut self.state, action),
        };
        self.settle(result)
    }

    pub fn end_player_turn(&mut self) -> Result<Vec<GameEvent>, RuleError> {
        let result = self.engine.end_player_turn(&mut self.state);
        self.settle(result)
    }

    pub fn opponent_untap(&mut self) -> Result<Vec<GameEvent>, RuleError> {
        let result = self.engine.start_opponent_turn(&mut self.state);
        self.settle(result)
    }

    pub fn opponent_draw(&mut self) -> Result<Vec<GameEvent>, RuleError> {
        RuleEngine::enter_phase(&mut self.state, TurnPhase::OpponentDraw)?;
        match self.policy.decide_draw(&self.state) {
            Some(action) => self.apply(action),
            None => Ok(Vec::new()),
        }
    }

    pub fn opponent_play(&mut self) -> Result<Vec<GameEvent>, RuleError> {
        RuleEngine::enter_phase(&mut self.state, TurnPhase::OpponentMain)?;
        match self.policy.decide_play(&self.state) {
            Some(action) => self.apply(action),
            None => Ok(Vec::new()),
        }
    }

    /// 进入攻击阶段并给出出手顺序。
    pub fn opponent_attackers(&mut self) -> Result<Vec<InstanceId>, RuleError> {
        RuleEngine::enter_phase(&mut self.state, TurnPhase::OpponentAttacks)?;
        Ok(self.policy.attack_order(&self.state))
    }

    pub fn opponent_attack(&mut self, attacker_id: &InstanceId) -> Result<Vec<GameEvent>, RuleError> {
        // 之前的目标卡效果可能已经移走或冻结了这只怪兽
        let ready = self
            .state
            .opponent
            .find_on_field(attacker_id)
            .map(CardInstance::can_attack)
            .unwrap_or(false);
        if !ready {
            return Ok(Vec::new());
        }
        match self.policy.choose_target(&self.state, attacker_id) {
            Some(action) => self.apply(action),
            None => Ok(Vec::new()),
        }
    }

    pub fn start_player_turn(&mut self) -> Result<Vec<GameEvent>, RuleError> {
        let result = self.engine.start_player_turn(&mut self.state);
        self.settle(result)
    }
}

impl ActionPort for Duel {
    fn draw(&mut self) -> Result<Vec<GameEvent>, RuleError> {
        self.apply(GameAction::Draw { side: Side::Player })
    }

    fn play(&mut self, instance_id: &InstanceId) -> Result<Vec<GameEvent>, RuleError> {
        self.apply(GameAction::PlayCard {
            action: PlayCardAction {
                side: Side::Player,
                instance_id: instance_id.clone(),
            },
        })
    }

    fn select_attacker(&mut self, instance_id: &InstanceId) -> Result<Vec<GameEvent>, RuleError> {
        let result = self.engine.select_attacker(&mut self.state, instance_id);
        self.settle(result)
    }

    fn target(&mut self, instance_id: &InstanceId) -> Result<Vec<GameEvent>, RuleError> {
        let Some(attacker_id) = self.state.selected_attacker.clone() else {
            return self.settle(Err(RuleError::NoAttackerSelected));
        };
        self.apply(GameAction::Attack {
            action: AttackAction {
                attacker_side: Side::Player,
                attacker_id,
                target_id: instance_id.clone(),
            },
        })
    }

    fn show_info(&self, instance_id: &InstanceId) -> Option<CardInstance> {
        let (side, zone, card) = self.state.locate(instance_id)?;
        let visible = match (side, zone) {
            (Side::Player, _) => true,
            (Side::Opponent, Zone::Field) => true,
            (Side::Opponent, Zone::Goal { .. }) => card.is_revealed,
            (Side::Opponent, Zone::Hand) => false,
        };
        visible.then(|| card.clone())
    }
}

/// 异步回合推进。每次等待前都释放借用，等待后确认对局仍是同一局且未结束。
pub struct TurnController<P: Pacer> {
    duel: Rc<RefCell<Duel>>,
    pacer: P,
}

impl<P: Pacer> TurnController<P> {
    pub fn new(duel: Rc<RefCell<Duel>>, pacer: P) -> Self {
        Self { duel, pacer }
    }

    pub fn duel(&self) -> &Rc<RefCell<Duel>> {
        &self.duel
    }

    pub fn act<T>(&self, step: impl FnOnce(&mut Duel) -> T) -> T {
        act(&self.duel, step)
    }

    fn pacing(&self) -> PacingConfig {
        self.duel.borrow().config().pacing
    }

    fn running(&self, epoch: u64) -> bool {
        let duel = self.duel.borrow();
        !duel.is_over() && duel.epoch() == epoch
    }

    /// 玩家用选中的怪兽攻击，等待攻击动画后重新渲染。
    pub async fn player_attack(&self, target: &InstanceId) -> Result<Vec<GameEvent>, RuleError> {
        let epoch = self.duel.borrow().epoch();
        let events = self.act(|duel| duel.target(target))?;
        self.pacer.pause(self.pacing().attack_animation_ms).await;
        if self.duel.borrow().epoch() == epoch {
            self.act(Duel::request_render);
        }
        Ok(events)
    }

    pub async fn end_player_turn(&self) -> Result<(), RuleError> {
        let pacing = self.pacing();
        let epoch = self.duel.borrow().epoch();
        self.act(Duel::end_player_turn)?;
        self.pacer.pause(pacing.turn_handoff_ms).await;
        if !self.running(epoch) {
            return Ok(());
        }

        self.run_opponent_turn(&pacing, epoch).await;

        if self.running(epoch) {
            if let Err(error) = self.act(Duel::start_player_turn) {
                utils::log_warn(&format!("player turn did not start: {error}"));
            }
        }
        Ok(())
    }

    async fn run_opponent_turn(&self, pacing: &PacingConfig, epoch: u64) {
        if let Err(error) = self.act(Duel::opponent_untap) {
            utils::log_warn(&format!("opponent turn did not start: {error}"));
            return;
        }
        self.pacer.pause(pacing.untap_ms).await;
        if !self.running(epoch) {
            return;
        }

        if let Err(error) = self.act(Duel::opponent_draw) {
            utils::log_warn(&format!("opponent draw skipped: {error}"));
        }
        self.pacer.pause(pacing.draw_ms).await;
        if !self.running(epoch) {
            return;
        }

        if let Err(error) = self.act(Duel::opponent_play) {
            utils::log_warn(&format!("opponent play skipped: {error}"));
        }
        self.pacer.pause(pacing.play_ms).await;
        if !self.running(epoch) {
            return;
        }

        let attackers = match self.act(Duel::opponent_attackers) {
            Ok(attackers) => attackers,
            Err(error) => {
                utils::log_warn(&format!("opponent attacks skipped: {error}"));
                return;
            }
        };
        for (index, attacker) in attackers.iter().enumerate() {
            if !self.running(epoch) {
                return;
            }
            let attacked = self.act(|duel| duel.opponent_attack(attacker));
            match &attacked {
                Ok(events) if !events.is_empty() => {
                    self.pacer.pause(pacing.attack_animation_ms).await;
                    if self.running(epoch) {
                        self.act(Duel::request_render);
                    }
                }
                Ok(_) => {}
                Err(error) => utils::log_warn(&format!("opponent attack failed: {error}")),
            }
            if index + 1 < attackers.len() && self.running(epoch) {
                self.pacer.pause(pacing.between_attacks_ms).await;
            }
        }
    }
}
