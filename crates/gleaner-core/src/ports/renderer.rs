//! Renderer port - ステートフルなレンダリングセッション
//!
//! # ライフサイクル
//! 1. `Renderer::open()` でセッションを 1 つ取得
//! 2. `navigate()` を順番に呼ぶ（同時に 1 タスクのみ）
//! 3. どの経路で終わっても `close()` を await する
//!
//! close() されずに drop された場合も、実装は `Drop` でプロセスを止めること。

use async_trait::async_trait;

use crate::domain::{NavigateError, SessionError, SessionId};

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RenderSession>, SessionError>;
}

#[async_trait]
pub trait RenderSession: Send {
    fn id(&self) -> SessionId;

    /// Load `url` and return the rendered markup.
    async fn navigate(&mut self, url: &str) -> Result<String, NavigateError>;

    /// Tear the session down, terminating its rendering process.
    async fn close(self: Box<Self>) -> Result<(), SessionError>;
}
