//! Impls - 実装（HTTP ソース・抽出ルール・開発/テスト用）
//!
//! # 含まれる実装
//! - **HttpTaskSource**: `GET /api/urls` を叩く本番用 TaskSource
//! - **PartPageExtractor**: 部品ページ用の抽出ルール（scraper）
//! - **InMemoryStagingCache** / **InMemoryRecordStore**: 開発・テスト用
//! - **FixtureRenderer** / **ScriptedTaskSource**: テスト用の台本どおりに動く実装
//!
//! # 本番用実装
//! - `gleaner-pg`: PgRecordStore, PgStagingCache
//! - `gleaner-chromium`: ChromiumRenderer

pub mod fixture_renderer;
pub mod http_source;
pub mod inmem_staging;
pub mod inmem_store;
pub mod part_page;
pub mod scripted_source;

pub use self::fixture_renderer::{FixturePage, FixtureRenderer};
pub use self::http_source::HttpTaskSource;
pub use self::inmem_staging::InMemoryStagingCache;
pub use self::inmem_store::InMemoryRecordStore;
pub use self::part_page::{PartPageExtractor, PartPageRules};
pub use self::scripted_source::ScriptedTaskSource;
