use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use goal_duel::game::act;
use goal_duel::{
    ActionPort, CardCatalog, Duel, InstanceId, MatchConfig, MatchState, NoDelay, PacingConfig,
    RecordingObserver, RuleError, Side, TurnController,
};

const CATALOG: &str = r#"[
    {"id":"m-wolf","name":"Grey Wolf","type":"Monstre","atk":9,"def":4,"rarity":"common"},
    {"id":"m-bear","name":"Cave Bear","type":"Monstre","atk":11,"def":7,"rarity":"common"},
    {"id":"m-hawk","name":"Sky Hawk","type":"Monstre","atk":6,"def":2,"rarity":"common"},
    {"id":"g-draw","name":"Scroll Cache","type":"Magie","effectOnDestroy":"OWNER_DRAW_CARD"},
    {"id":"g-rally","name":"War Horn","type":"Magie","effectOnDestroy":"BUFF_OWN_MONSTER_ATK_5"},
    {"id":"g-rust","name":"Rust Trap","type":"Piege","effectOnDestroy":"REDUCE_ATTACKER_MONSTER_ATK_5"},
    {"id":"g-frost","name":"Frost Snare","type":"Piege","effectOnDestroy":"FREEZE_ATTACKER_NEXT_TURN"}
]"#;

fn new_match(seed: u64) -> (Rc<RefCell<Duel>>, Rc<RecordingObserver>) {
    let catalog = Arc::new(CardCatalog::from_json(CATALOG).expect("catalog parses"));
    let observer = Rc::new(RecordingObserver::default());
    let config = MatchConfig::default().with_pacing(PacingConfig::instant());
    let duel = Rc::new(RefCell::new(Duel::with_seed(
        catalog,
        config,
        observer.clone(),
        seed,
    )));
    act(&duel, |duel| duel.setup_new_game(None));
    (duel, observer)
}

fn every_instance(state: &MatchState) -> Vec<InstanceId> {
    [&state.player, &state.opponent]
        .into_iter()
        .flat_map(|side| {
            side.hand
                .iter()
                .chain(side.field.iter())
                .chain(side.goals.iter().flatten())
                .map(|card| card.instance_id.clone())
        })
        .collect()
}

/// 被摧毁过的槽位集合（玩家、对手）。
fn emptied_slots(state: &MatchState) -> HashSet<(Side, usize)> {
    let mut slots = HashSet::new();
    for side in [Side::Player, Side::Opponent] {
        for (slot, goal) in state.side(side).goals.iter().enumerate() {
            if goal.is_none() {
                slots.insert((side, slot));
            }
        }
    }
    slots
}

fn assert_invariants(state: &MatchState, emptied: &mut HashSet<(Side, usize)>) {
    let ids = every_instance(state);
    let unique: HashSet<&InstanceId> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len(), "instance ids must be unique");
    assert!(state.integrity_check().is_ok());

    for (side, slot) in emptied.iter() {
        assert!(
            state.side(*side).goals[*slot].is_none(),
            "destroyed goal slot was refilled"
        );
    }
    emptied.extend(emptied_slots(state));
}

/// 简单的人类回合：抽牌、出第一只怪兽、所有可攻击怪兽攻击第一个目标卡。
fn play_human_turn(duel: &Rc<RefCell<Duel>>) {
    let _ = act(duel, |duel| duel.draw());
    let first_monster = duel
        .borrow()
        .state()
        .player
        .hand
        .iter()
        .find(|card| card.is_monster())
        .map(|card| card.instance_id.clone());
    if let Some(id) = first_monster {
        let _ = act(duel, |duel| duel.play(&id));
    }

    let ready: Vec<InstanceId> = duel
        .borrow()
        .state()
        .player
        .field
        .iter()
        .filter(|card| card.can_attack())
        .map(|card| card.instance_id.clone())
        .collect();
    for attacker in ready {
        if duel.borrow().is_over() {
            return;
        }
        let target = duel
            .borrow()
            .state()
            .opponent
            .goals
            .iter()
            .flatten()
            .next()
            .map(|card| card.instance_id.clone());
        let Some(target) = target else {
            return;
        };
        act(duel, |duel| duel.select_attacker(&attacker))
            .expect("ready monster can be selected");
        act(duel, |duel| duel.target(&target)).expect("no protectors in this catalog");
    }
}

#[tokio::test]
async fn full_match_reaches_a_locked_game_over() {
    let (duel, observer) = new_match(2024);
    let controller = TurnController::new(duel.clone(), NoDelay);
    let mut emptied = HashSet::new();

    for _ in 0..40 {
        assert_invariants(duel.borrow().state(), &mut emptied);
        if duel.borrow().is_over() {
            break;
        }
        play_human_turn(&duel);
        assert_invariants(duel.borrow().state(), &mut emptied);
        if duel.borrow().is_over() {
            break;
        }
        controller.end_player_turn().await.expect("turn hands over");

        let duel = duel.borrow();
        if !duel.is_over() {
            let state = duel.state();
            assert!(state.is_player_turn);
            assert!(state
                .player
                .field
                .iter()
                .all(|card| !card.has_attacked_this_turn));
        }
    }

    let state = duel.borrow().state().clone();
    assert!(state.game_is_over, "someone should run out of goal cards");
    let outcome = state.outcome.clone().expect("a winner is recorded");
    let loser = outcome.winner.opponent();
    assert_eq!(state.side(loser).goals_remaining(), 0);
    assert!(observer.saw("VICTORY") || observer.saw("DEFEAT"));

    assert_eq!(duel.borrow_mut().draw(), Err(RuleError::GameFinished));
    assert_eq!(
        controller.end_player_turn().await,
        Err(RuleError::GameFinished)
    );
    if let Some(card) = state.player.hand.first() {
        assert_eq!(
            duel.borrow_mut().play(&card.instance_id),
            Err(RuleError::GameFinished)
        );
    }
    assert_eq!(duel.borrow().state(), &state);
}

#[test]
fn matches_with_the_same_seed_deal_the_same_cards() {
    let (first, _) = new_match(99);
    let (second, _) = new_match(99);

    let names = |duel: &Rc<RefCell<Duel>>| -> Vec<String> {
        duel.borrow()
            .state()
            .player
            .hand
            .iter()
            .map(|card| card.card_id.clone())
            .collect()
    };

    assert_eq!(names(&first), names(&second));
    assert_ne!(
        first.borrow().state().player.hand[0].instance_id,
        second.borrow().state().player.hand[0].instance_id
    );
}
