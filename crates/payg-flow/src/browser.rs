//! Chromium backend over the DevTools protocol (chromiumoxide).
//!
//! Every scenario context is a CDP browser context, so cookies, storage and
//! cache are private to it. Locators are evaluated page-side with the
//! JavaScript produced by [`crate::locator::Locator`].

use crate::config::RunConfig;
use crate::driver::{BrowserDriver, ContextOptions, Launcher, LoadState, PageDriver, Screenshot};
use crate::ident::CorrelationId;
use crate::locator::Locator;
use crate::result::{FlowError, FlowResult};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const READY_POLL: Duration = Duration::from_millis(50);

fn driver_err(e: impl std::fmt::Display) -> FlowError {
    FlowError::driver(e.to_string())
}

/// Launches a local chromium
#[derive(Debug, Default, Clone, Copy)]
pub struct CdpLauncher;

#[async_trait]
impl Launcher for CdpLauncher {
    async fn launch(&self, config: &RunConfig) -> FlowResult<Arc<dyn BrowserDriver>> {
        let mut builder =
            CdpConfig::builder().window_size(config.viewport_width, config.viewport_height);

        if !config.headless {
            builder = builder.with_head();
        }

        if !config.sandbox {
            builder = builder.no_sandbox();
        }

        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder
            .build()
            .map_err(|message| FlowError::BrowserLaunch { message })?;

        let (browser, mut handler) =
            CdpBrowser::launch(cdp_config)
                .await
                .map_err(|e| FlowError::BrowserLaunch {
                    message: e.to_string(),
                })?;

        // The connection only makes progress while its handler is polled
        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(Arc::new(CdpBrowserDriver {
            inner: Arc::new(Mutex::new(browser)),
            handle,
        }))
    }
}

/// A running chromium
#[derive(Debug)]
pub struct CdpBrowserDriver {
    inner: Arc<Mutex<CdpBrowser>>,
    handle: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl BrowserDriver for CdpBrowserDriver {
    fn backend(&self) -> &'static str {
        "chromium"
    }

    async fn new_context(&self, options: ContextOptions) -> FlowResult<Box<dyn PageDriver>> {
        let context_err = |e: &dyn std::fmt::Display| FlowError::Context {
            message: format!("context {}: {e}", options.id),
        };

        let browser = self.inner.lock().await;
        let context = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| context_err(&e))?
            .result
            .browser_context_id;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context.clone())
            .build()
            .map_err(|e| context_err(&e))?;
        let page = browser.new_page(target).await.map_err(|e| context_err(&e))?;
        drop(browser);

        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(options.viewport_width),
            i64::from(options.viewport_height),
            1.0,
            false,
        ))
        .await
        .map_err(|e| context_err(&e))?;

        Ok(Box::new(CdpPageDriver {
            id: options.id,
            browser: Arc::clone(&self.inner),
            context: Some(context),
            page,
        }))
    }

    async fn close(&self) -> FlowResult<()> {
        let mut browser = self.inner.lock().await;
        let closed = browser.close().await.map(|_| ()).map_err(driver_err);
        if let Err(e) = browser.wait().await {
            tracing::debug!(error = %e, "chromium exit status unavailable");
        }
        self.handle.abort();
        closed
    }
}

/// A page in its own CDP browser context
#[derive(Debug)]
pub struct CdpPageDriver {
    id: CorrelationId,
    browser: Arc<Mutex<CdpBrowser>>,
    context: Option<BrowserContextId>,
    page: CdpPage,
}

impl CdpPageDriver {
    async fn eval<T: serde::de::DeserializeOwned>(&self, js: String) -> FlowResult<T> {
        self.page
            .evaluate(js)
            .await
            .map_err(driver_err)?
            .into_value()
            .map_err(driver_err)
    }
}

#[async_trait]
impl PageDriver for CdpPageDriver {
    async fn goto(&mut self, url: &str, state: LoadState) -> FlowResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| FlowError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        loop {
            let ready: String = self.eval("document.readyState".to_string()).await?;
            if state.ready_states().contains(&ready.as_str()) {
                return Ok(());
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    async fn count(&mut self, locator: &Locator) -> FlowResult<usize> {
        self.eval(locator.to_count_query()).await
    }

    async fn click(&mut self, locator: &Locator, index: usize) -> FlowResult<bool> {
        self.eval(locator.to_click_query(index)).await
    }

    async fn is_visible(&mut self, locator: &Locator, index: usize) -> FlowResult<bool> {
        self.eval(locator.to_visible_query(index)).await
    }

    async fn screenshot(&mut self) -> FlowResult<Screenshot> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();

        let shot = self
            .page
            .execute(params)
            .await
            .map_err(|e| FlowError::Recording {
                message: e.to_string(),
            })?;

        let data = base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(|e| FlowError::Recording {
                message: e.to_string(),
            })?;
        let (width, height) = image::ImageReader::new(std::io::Cursor::new(&data))
            .with_guessed_format()
            .ok()
            .and_then(|r| r.into_dimensions().ok())
            .unwrap_or((0, 0));
        Ok(Screenshot::new(data, width, height))
    }

    async fn close(&mut self) -> FlowResult<()> {
        let Some(context) = self.context.take() else {
            return Ok(());
        };
        if let Err(e) = self.page.clone().close().await {
            tracing::debug!(context = %self.id, error = %e, "page already gone");
        }
        let browser = self.browser.lock().await;
        browser
            .execute(DisposeBrowserContextParams::new(context))
            .await
            .map(|_| ())
            .map_err(|e| FlowError::Context {
                message: format!("context {}: {e}", self.id),
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a local chromium"]
    async fn test_launch_and_open_context() {
        let config = RunConfig::default();
        let browser = CdpLauncher.launch(&config).await.unwrap();
        let mut page = browser
            .new_context(ContextOptions::from_config(CorrelationId::new("live"), &config))
            .await
            .unwrap();
        page.goto("about:blank", LoadState::Load).await.unwrap();
        assert!(page.screenshot().await.unwrap().is_valid());
        page.close().await.unwrap();
        browser.close().await.unwrap();
    }
}
