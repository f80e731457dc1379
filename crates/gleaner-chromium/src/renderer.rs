use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use gleaner_core::domain::{NavigateError, SessionError, SessionId};
use gleaner_core::ports::{IdGenerator, RenderSession, Renderer, SystemClock, UlidGenerator};

/// How long `close()` waits for the browser to exit before killing it.
const EXIT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ChromiumConfig {
    /// Browser binary; chromiumoxide searches the usual locations when unset.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub extra_args: Vec<String>,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            extra_args: Vec::new(),
        }
    }
}

pub struct ChromiumRenderer {
    config: ChromiumConfig,
    ids: UlidGenerator<SystemClock>,
}

impl ChromiumRenderer {
    pub fn new(config: ChromiumConfig) -> Self {
        Self {
            config,
            ids: UlidGenerator::new(SystemClock),
        }
    }

    fn browser_config(&self, profile_dir: &Path) -> Result<BrowserConfig, SessionError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(profile_dir)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.config.executable {
            builder = builder.chrome_executable(path);
        }
        for arg in &self.config.extra_args {
            builder = builder.arg(arg.as_str());
        }
        builder.build().map_err(SessionError::Launch)
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn open(&self) -> Result<Box<dyn RenderSession>, SessionError> {
        let id = self.ids.generate_session_id();
        // プロファイルはセッションごと。同じホストの別ワーカーと共有しない
        let profile_dir = std::env::temp_dir().join(format!("gleaner-{id}"));
        let config = self.browser_config(&profile_dir)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("cdp handler event error: {}", e);
                }
            }
        });

        let page = browser.new_page("about:blank").await;
        let mut session = ChromiumSession {
            id,
            browser: Some(browser),
            page: None,
            handler: Some(handler_task),
            profile_dir: Some(profile_dir),
        };
        match page {
            Ok(page) => session.page = Some(page),
            Err(e) => {
                if let Err(teardown) = session.shutdown().await {
                    warn!(session_id = %id, error = %teardown, "teardown after failed launch");
                }
                return Err(SessionError::Launch(e.to_string()));
            }
        }

        info!(session_id = %id, "browser session opened");
        Ok(Box::new(session))
    }
}

struct ChromiumSession {
    id: SessionId,
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    /// `None` once removed.
    profile_dir: Option<PathBuf>,
}

/// Transport-level CDP failures mean the browser is gone.
fn classify(e: CdpError) -> NavigateError {
    match e {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            NavigateError::SessionLost(e.to_string())
        }
        other => NavigateError::Page(other.to_string()),
    }
}

async fn remove_profile(id: SessionId, dir: PathBuf) {
    if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
        debug!(session_id = %id, "profile dir {} not removed: {}", dir.display(), e);
    }
}

impl ChromiumSession {
    async fn shutdown(&mut self) -> Result<(), SessionError> {
        self.page = None;
        let result = match self.browser.take() {
            Some(browser) => self.stop_browser(browser).await,
            None => Ok(()),
        };

        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        if let Some(dir) = self.profile_dir.take() {
            remove_profile(self.id, dir).await;
        }
        result
    }

    async fn stop_browser(&self, mut browser: Browser) -> Result<(), SessionError> {
        if let Err(e) = browser.close().await {
            debug!(session_id = %self.id, "graceful close failed: {}", e);
        }
        if matches!(timeout(EXIT_GRACE, browser.wait()).await, Ok(Ok(_))) {
            return Ok(());
        }

        warn!(session_id = %self.id, "browser did not exit; killing");
        match browser.kill().await {
            Some(Err(e)) => Err(SessionError::Teardown(e.to_string())),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn navigate(&mut self, url: &str) -> Result<String, NavigateError> {
        if self.handler.as_ref().is_none_or(|h| h.is_finished()) {
            return Err(NavigateError::SessionLost("cdp connection closed".to_string()));
        }
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| NavigateError::SessionLost("session already closed".to_string()))?;

        page.goto(url).await.map_err(classify)?;
        page.content().await.map_err(classify)
    }

    async fn close(mut self: Box<Self>) -> Result<(), SessionError> {
        let result = self.shutdown().await;
        debug!(session_id = %self.id, "browser session closed");
        result
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        let browser = self.browser.take();
        let profile_dir = self.profile_dir.take();
        if browser.is_none() && profile_dir.is_none() {
            return;
        }

        let id = self.id;
        if browser.is_some() {
            warn!(session_id = %id, "session dropped without close; killing browser");
        }
        // Drop からは await できないのでランタイムに任せる
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Some(mut browser) = browser {
                        if let Some(Err(e)) = browser.kill().await {
                            warn!(session_id = %id, error = %e, "killing dropped browser failed");
                        }
                    }
                    if let Some(dir) = profile_dir {
                        remove_profile(id, dir).await;
                    }
                });
            }
            Err(_) => {
                warn!(session_id = %id, "no runtime to clean up dropped session");
                if let Some(dir) = profile_dir {
                    if let Err(e) = std::fs::remove_dir_all(&dir) {
                        debug!(session_id = %id, "profile dir {} not removed: {}", dir.display(), e);
                    }
                }
            }
        }
    }
}
