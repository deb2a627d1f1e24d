//! 通用工具：洗牌、守护者判定与浏览器控制台日志。

use rand::seq::SliceRandom;
use rand::Rng;

use crate::game::CardInstance;

/// Fisher-Yates 洗牌。
pub fn shuffle_deck<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    items.shuffle(rng);
}

/// 场上是否存在带有守护者能力的怪兽。
pub fn has_protector(field: &[CardInstance]) -> bool {
    field.iter().any(CardInstance::is_protector)
}

#[cfg(target_arch = "wasm32")]
pub fn log_info(message: &str) {
    web_sys::console::log_1(&message.into());
}

#[cfg(target_arch = "wasm32")]
pub fn log_warn(message: &str) {
    web_sys::console::warn_1(&message.into());
}

#[cfg(target_arch = "wasm32")]
pub fn log_error(message: &str) {
    web_sys::console::error_1(&message.into());
}

// 非 wasm 目标（原生测试）不能调用 JS 导入函数。
#[cfg(not(target_arch = "wasm32"))]
pub fn log_info(_message: &str) {}

#[cfg(not(target_arch = "wasm32"))]
pub fn log_warn(message: &str) {
    eprintln!("[warn] {message}");
}

#[cfg(not(target_arch = "wasm32"))]
pub fn log_error(message: &str) {
    eprintln!("[error] {message}");
}
