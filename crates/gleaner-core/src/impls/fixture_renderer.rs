//! FixtureRenderer - 台本どおりにページを返すレンダラ（テスト用）
//!
//! 生存中のセッション数を数えるので、「どの終わり方でもセッションが残らない」
//! ことをテストで確認できる。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::{NavigateError, SessionError, SessionId};
use crate::ports::{IdGenerator, RenderSession, Renderer, SystemClock, UlidGenerator};

/// Scripted response for one URL.
#[derive(Debug, Clone)]
pub enum FixturePage {
    Markup(String),
    /// Navigation fails for this page only.
    Broken(String),
    /// The session dies while loading this page.
    SessionLost(String),
    /// Navigation never completes.
    Hang,
}

pub struct FixtureRenderer {
    pages: Arc<HashMap<String, FixturePage>>,
    live: Arc<AtomicUsize>,
    opened: AtomicUsize,
    visits: Arc<Mutex<Vec<String>>>,
    refuse_open: AtomicBool,
    ids: UlidGenerator<SystemClock>,
}

impl FixtureRenderer {
    pub fn new(pages: impl IntoIterator<Item = (String, FixturePage)>) -> Self {
        Self {
            pages: Arc::new(pages.into_iter().collect()),
            live: Arc::new(AtomicUsize::new(0)),
            opened: AtomicUsize::new(0),
            visits: Arc::new(Mutex::new(Vec::new())),
            refuse_open: AtomicBool::new(false),
            ids: UlidGenerator::new(SystemClock),
        }
    }

    /// Sessions opened and not yet torn down.
    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn opened_sessions(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// URLs navigated to, across all sessions, in order.
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn refuse_open(&self, refuse: bool) {
        self.refuse_open.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Renderer for FixtureRenderer {
    async fn open(&self) -> Result<Box<dyn RenderSession>, SessionError> {
        if self.refuse_open.load(Ordering::SeqCst) {
            return Err(SessionError::Launch("fixture refused to launch".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixtureSession {
            id: self.ids.generate_session_id(),
            pages: Arc::clone(&self.pages),
            live: Arc::clone(&self.live),
            visits: Arc::clone(&self.visits),
            released: false,
        }))
    }
}

struct FixtureSession {
    id: SessionId,
    pages: Arc<HashMap<String, FixturePage>>,
    live: Arc<AtomicUsize>,
    visits: Arc<Mutex<Vec<String>>>,
    released: bool,
}

impl FixtureSession {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl RenderSession for FixtureSession {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn navigate(&mut self, url: &str) -> Result<String, NavigateError> {
        self.visits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());

        match self.pages.get(url) {
            Some(FixturePage::Markup(html)) => Ok(html.clone()),
            Some(FixturePage::Broken(reason)) => Err(NavigateError::Page(reason.clone())),
            Some(FixturePage::SessionLost(reason)) => {
                Err(NavigateError::SessionLost(reason.clone()))
            }
            Some(FixturePage::Hang) => std::future::pending().await,
            None => Err(NavigateError::Page(format!("404 for {url}"))),
        }
    }

    async fn close(mut self: Box<Self>) -> Result<(), SessionError> {
        self.release();
        Ok(())
    }
}

impl Drop for FixtureSession {
    fn drop(&mut self) {
        self.release();
    }
}
