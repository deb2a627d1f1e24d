//! 对局引擎与外界之间的接口：动作入口、渲染/解说出口、节奏控制。

use std::cell::{Cell, RefCell};
use std::future::Future;

use super::rules::RuleError;
use super::state::{CardInstance, GameEvent, InstanceId, MatchState};

/// 人类玩家的输入入口。
pub trait ActionPort {
    fn draw(&mut self) -> Result<Vec<GameEvent>, RuleError>;
    fn play(&mut self, instance_id: &InstanceId) -> Result<Vec<GameEvent>, RuleError>;
    fn select_attacker(&mut self, instance_id: &InstanceId) -> Result<Vec<GameEvent>, RuleError>;
    /// 用已选中的攻击者攻击目标。
    fn target(&mut self, instance_id: &InstanceId) -> Result<Vec<GameEvent>, RuleError>;
    /// 只返回玩家可见的卡牌。
    fn show_info(&self, instance_id: &InstanceId) -> Option<CardInstance>;
}

/// 每次状态变化后接收快照与解说文本。
pub trait MatchObserver {
    fn render(&self, state: &MatchState);
    fn narrate(&self, message: &str, duration_ms: u32);
}

/// 延时提供者；浏览器中基于计时器，测试中立即完成。
pub trait Pacer {
    fn pause(&self, ms: u32) -> impl Future<Output = ()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Pacer for NoDelay {
    fn pause(&self, _ms: u32) -> impl Future<Output = ()> {
        std::future::ready(())
    }
}

/// 记录所有输出的观察者，用于无界面运行与测试。
#[derive(Debug, Default)]
pub struct RecordingObserver {
    renders: Cell<usize>,
    messages: RefCell<Vec<String>>,
}

impl RecordingObserver {
    pub fn render_count(&self) -> usize {
        self.renders.get()
    }

    pub fn saw(&self, needle: &str) -> bool {
        self.messages
            .borrow()
            .iter()
            .any(|message| message.contains(needle))
    }
}

impl MatchObserver for RecordingObserver {
    fn render(&self, _state: &MatchState) {
        self.renders.set(self.renders.get() + 1);
    }

    fn narrate(&self, message: &str, _duration_ms: u32) {
        self.messages.borrow_mut().push(message.to_string());
    }
}
