//! App - アプリケーション層
//!
//! ports を組み合わせてパイプラインを組み立てます。
//!
//! # 主要コンポーネント
//! - **ExtractionEngine**: 1 セッションでバッチを処理（タスク単位で失敗を隔離）
//! - **PersistenceStage**: staging → 正本の flush（冪等 upsert、成功時だけ clear）
//! - **RecoveryCoordinator**: 失敗 URL の再収集（試行回数の上限つき）
//! - **ControlLoop**: FETCH → DISPATCH → {SCRAPE, BACKOFF, RECOVER} の状態機械
//! - **BackoffPolicy** / **PipelineConfig**: 待ち時間と設定

pub mod backoff;
pub mod config;
pub mod control_loop;
pub mod extraction;
pub mod persist;
pub mod recovery;
pub mod status;

pub use self::backoff::BackoffPolicy;
pub use self::config::PipelineConfig;
pub use self::control_loop::{ControlLoop, LoopPorts};
pub use self::extraction::ExtractionEngine;
pub use self::persist::PersistenceStage;
pub use self::recovery::RecoveryCoordinator;
pub use self::status::{CycleReport, FlushReport, Phase};
