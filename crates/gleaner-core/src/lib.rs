//! gleaner-core
//!
//! Core building blocks for the gleaner scrape → stage → persist worker.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（task, signal, result, record, ids, errors）
//! - **ports**: 抽象化レイヤー（TaskSource, Renderer, MarkupExtractor, StagingCache, RecordStore, Clock）
//! - **app**: アプリケーションロジック（ExtractionEngine, PersistenceStage, RecoveryCoordinator, ControlLoop）
//! - **codec**: details / specs / staged result の共通シリアライズ
//! - **impls**: 実装（HttpTaskSource, PartPageExtractor と開発・テスト用の in-memory 実装）

pub mod app;
pub mod codec;
pub mod domain;
pub mod impls;
pub mod ports;
