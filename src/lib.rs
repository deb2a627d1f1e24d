pub mod ai;
pub mod game;
pub mod utils;

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use gloo_timers::future::TimeoutFuture;
use once_cell::sync::OnceCell;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::{Function, Promise};

pub use ai::{GameAction, OpponentPolicy};
pub use game::{
    Ability, ActionPort, AttackAction, CardCatalog, CardDefinition, CardId, CardInstance,
    CardType, CatalogError, Dispatch, Duel, EffectContext, EffectResolution, GameEvent, GoalEffect,
    InstanceId, IntegrityError, MatchConfig, MatchObserver, MatchState, NoDelay, Pacer,
    PacingConfig, PlayCardAction, PlayerState, RecordingObserver, RuleEngine, RuleError, Side,
    TurnController, TurnPhase, VictoryReason, VictoryState, Zone, GOAL_SLOTS,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// 卡牌目录只加载一次，所有对局共享。
static CATALOG: OnceCell<Arc<CardCatalog>> = OnceCell::new();

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn events_to_js(result: Result<Vec<GameEvent>, RuleError>) -> Result<JsValue, JsValue> {
    let events = result.map_err(to_js_error)?;
    to_value(&events).map_err(JsValue::from)
}

/// 解析卡牌目录 JSON；失败时所有开局入口都不可用。
#[wasm_bindgen(js_name = "loadCatalog")]
pub fn load_catalog(json: &str) -> bool {
    if CATALOG.get().is_some() {
        utils::log_warn("card catalog already loaded; ignoring the new data");
        return true;
    }
    match CardCatalog::from_json(json) {
        Ok(catalog) => {
            let _ = CATALOG.set(Arc::new(catalog));
            true
        }
        Err(error) => {
            utils::log_error(&format!("card catalog rejected: {error}"));
            false
        }
    }
}

#[wasm_bindgen(js_name = "catalogLoaded")]
pub fn catalog_loaded() -> bool {
    CATALOG.get().is_some()
}

/// 返回内置示例目录的 JSON，方便前端调试。
#[wasm_bindgen(js_name = "sampleCatalogJson")]
pub fn sample_catalog_json() -> Result<String, JsValue> {
    let catalog = CardCatalog::sample();
    let cards: Vec<&CardDefinition> = catalog.iter().collect();
    serde_json::to_string(&cards).map_err(serde_to_js_error)
}

/// 基于浏览器计时器的节奏控制。
#[derive(Debug, Clone, Copy, Default)]
pub struct TimerPacer;

impl Pacer for TimerPacer {
    fn pause(&self, ms: u32) -> impl Future<Output = ()> {
        TimeoutFuture::new(ms)
    }
}

/// 把快照与解说转发给 JS 回调。
struct JsObserver {
    render_fn: Function,
    narrate_fn: Function,
}

impl MatchObserver for JsObserver {
    fn render(&self, state: &MatchState) {
        let snapshot = match to_value(state) {
            Ok(value) => value,
            Err(error) => {
                utils::log_error(&format!("render: state could not be serialized: {error}"));
                return;
            }
        };
        if let Err(error) = self.render_fn.call1(&JsValue::NULL, &snapshot) {
            utils::log_error(&format!("render callback failed: {error:?}"));
        }
    }

    fn narrate(&self, message: &str, duration_ms: u32) {
        let result = self.narrate_fn.call2(
            &JsValue::NULL,
            &JsValue::from_str(message),
            &JsValue::from(duration_ms),
        );
        if let Err(error) = result {
            utils::log_error(&format!("narrate callback failed: {error:?}"));
        }
    }
}

#[wasm_bindgen]
pub struct MatchEngine {
    controller: Rc<TurnController<TimerPacer>>,
}

impl MatchEngine {
    fn duel(&self) -> &Rc<RefCell<Duel>> {
        self.controller.duel()
    }
}

#[wasm_bindgen]
impl MatchEngine {
    /// `deck` 为卡牌 id 数组或 `null`；`config_json` 可覆盖默认配置。
    #[wasm_bindgen(constructor)]
    pub fn new(
        deck: JsValue,
        render: Function,
        narrate: Function,
        config_json: Option<String>,
    ) -> Result<MatchEngine, JsValue> {
        let catalog = CATALOG
            .get()
            .cloned()
            .ok_or_else(|| JsValue::from_str("card catalog is not loaded"))?;
        let config = match config_json {
            Some(json) => MatchConfig::from_json(&json).map_err(serde_to_js_error)?,
            None => MatchConfig::default(),
        };
        let deck: Option<Vec<CardId>> = from_value(deck).map_err(JsValue::from)?;

        let observer = Rc::new(JsObserver {
            render_fn: render,
            narrate_fn: narrate,
        });
        let duel = Rc::new(RefCell::new(Duel::new(catalog, config, observer)));
        game::act(&duel, |duel| duel.setup_new_game(deck));

        Ok(MatchEngine {
            controller: Rc::new(TurnController::new(duel, TimerPacer)),
        })
    }

    #[wasm_bindgen(js_name = "newGame")]
    pub fn new_game(&self, deck: JsValue) -> Result<JsValue, JsValue> {
        let deck: Option<Vec<CardId>> = from_value(deck).map_err(JsValue::from)?;
        let events = self.controller.act(|duel| duel.setup_new_game(deck));
        to_value(&events).map_err(JsValue::from)
    }

    pub fn draw(&self) -> Result<JsValue, JsValue> {
        let result = self.controller.act(|duel| duel.draw());
        events_to_js(result)
    }

    pub fn play(&self, instance_id: &str) -> Result<JsValue, JsValue> {
        let instance_id = InstanceId::from(instance_id);
        let result = self.controller.act(|duel| duel.play(&instance_id));
        events_to_js(result)
    }

    #[wasm_bindgen(js_name = "selectAttacker")]
    pub fn select_attacker(&self, instance_id: &str) -> Result<JsValue, JsValue> {
        let instance_id = InstanceId::from(instance_id);
        let result = self.controller.act(|duel| duel.select_attacker(&instance_id));
        events_to_js(result)
    }

    /// 攻击动画结束后 resolve 事件列表。
    pub fn target(&self, instance_id: String) -> Promise {
        let controller = Rc::clone(&self.controller);
        future_to_promise(async move {
            let target = InstanceId::from(instance_id.as_str());
            let result = controller.player_attack(&target).await;
            events_to_js(result)
        })
    }

    #[wasm_bindgen(js_name = "showInfo")]
    pub fn show_info(&self, instance_id: &str) -> Result<JsValue, JsValue> {
        let card = self.duel().borrow().show_info(&instance_id.into());
        to_value(&card).map_err(JsValue::from)
    }

    /// 结束玩家回合；对手回合完整执行后 resolve。
    #[wasm_bindgen(js_name = "endTurn")]
    pub fn end_turn(&self) -> Promise {
        let controller = Rc::clone(&self.controller);
        future_to_promise(async move {
            controller.end_player_turn().await.map_err(to_js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn quit(&self) {
        self.controller.act(Duel::quit_game);
    }

    #[wasm_bindgen(js_name = "isOver")]
    pub fn is_over(&self) -> bool {
        self.duel().borrow().is_over()
    }

    #[wasm_bindgen(js_name = "stateJson")]
    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.duel().borrow().state()).map_err(serde_to_js_error)
    }

    #[wasm_bindgen(js_name = "validateState")]
    pub fn validate_state(&self) -> Result<(), JsValue> {
        self.duel()
            .borrow()
            .state()
            .integrity_check()
            .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))
    }
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
