//! Ports - 外部との境界
//!
//! 各 trait は外部システム（キュー API, ブラウザ, PostgreSQL）への
//! インターフェースです。本番実装は別クレート（`gleaner-pg`,
//! `gleaner-chromium`）、開発・テスト用の実装は `impls` に置きます。
//!
//! # 設計原則
//! - PostgreSQL の `parts_data` が正本（source of truth）
//! - ステージングは抽出と永続化を切り離す耐久バッファ
//! - レンダリングセッションは 1 呼び出しにつき 1 つ、必ず close する

pub mod clock;
pub mod extractor;
pub mod id_generator;
pub mod record_store;
pub mod renderer;
pub mod staging;
pub mod task_source;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::extractor::MarkupExtractor;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::record_store::{FailedCursor, RecordStore, UpsertSummary};
pub use self::renderer::{RenderSession, Renderer};
pub use self::staging::{StageMark, StagedSet, StagingCache};
pub use self::task_source::TaskSource;
