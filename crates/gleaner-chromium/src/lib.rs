//! gleaner-chromium
//!
//! chromiumoxide を使った `Renderer` 実装。1 セッション = 1 ブラウザプロセス。
//! `close()` で必ずプロセスを終わらせ、close されずに drop された場合も
//! `Drop` から kill する。

mod renderer;

pub use self::renderer::{ChromiumConfig, ChromiumRenderer};
