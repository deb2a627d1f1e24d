//! 浏览器环境测试：`wasm-pack test --headless --firefox`。

#![cfg(target_arch = "wasm32")]

use goal_duel::{load_catalog, sample_catalog_json, Pacer, TimerPacer};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
async fn timer_pacer_resolves() {
    TimerPacer.pause(5).await;
}

#[wasm_bindgen_test]
fn sample_catalog_loads_through_the_js_surface() {
    let json = sample_catalog_json().expect("sample catalog serializes");
    assert!(load_catalog(&json));
    assert!(goal_duel::catalog_loaded());
}
