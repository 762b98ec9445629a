use chromiumoxide::{
    browser::{Browser, BrowserConfig},
    error::CdpError,
    Page,
};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BrowserSettings;

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),
    #[error("Browser protocol error: {0}")]
    Cdp(#[from] CdpError),
    #[error("Element not found: {0}")]
    ElementNotFound(String),
}

/// One exclusive tab with its own navigation and DOM state.
#[allow(async_fn_in_trait)]
pub trait PageSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;
    async fn has_element(&mut self, selector: &str) -> Result<bool, BrowserError>;
    async fn click(&mut self, selector: &str) -> Result<(), BrowserError>;
    async fn scroll_into_view(&mut self, selector: &str) -> Result<(), BrowserError>;
    /// Serialized DOM as currently rendered.
    async fn content(&mut self) -> Result<String, BrowserError>;
    async fn close(self) -> Result<(), BrowserError>;
}

#[allow(async_fn_in_trait)]
pub trait BrowserDriver {
    type Session: PageSession;

    async fn open_session(&self) -> Result<Self::Session, BrowserError>;
}

/// Headless Chromium driven over the DevTools protocol.
pub struct ChromeBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromeBrowser {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .window_size(settings.window_width, settings.window_height);
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
        });
        info!("Launched Chromium (headless: {})", settings.headless);

        Ok(Self { browser, handler })
    }

    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Failed waiting for browser exit: {}", e);
        }
        self.handler.abort();
    }
}

impl BrowserDriver for ChromeBrowser {
    type Session = ChromePage;

    async fn open_session(&self) -> Result<ChromePage, BrowserError> {
        let page = self.browser.new_page("about:blank").await?;
        Ok(ChromePage { page })
    }
}

pub struct ChromePage {
    page: Page,
}

/// First element of a lookup. An empty match set is `ElementNotFound`; protocol
/// failures surface from the lookup itself as `Cdp`.
fn first_match<T>(elements: Vec<T>, selector: &str) -> Result<T, BrowserError> {
    elements
        .into_iter()
        .next()
        .ok_or_else(|| BrowserError::ElementNotFound(selector.to_string()))
}

impl PageSession for ChromePage {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.page.goto(url).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn has_element(&mut self, selector: &str) -> Result<bool, BrowserError> {
        Ok(!self.page.find_elements(selector).await?.is_empty())
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        let element = first_match(self.page.find_elements(selector).await?, selector)?;
        element.click().await?;
        Ok(())
    }

    async fn scroll_into_view(&mut self, selector: &str) -> Result<(), BrowserError> {
        let element = first_match(self.page.find_elements(selector).await?, selector)?;
        element.scroll_into_view().await?;
        Ok(())
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        Ok(self.page.content().await?)
    }

    async fn close(self) -> Result<(), BrowserError> {
        self.page.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match() {
        assert_eq!(first_match(vec![3, 4], "#a").unwrap(), 3);
        assert!(matches!(
            first_match(Vec::<u8>::new(), "#ui-id-3"),
            Err(BrowserError::ElementNotFound(selector)) if selector == "#ui-id-3"
        ));
    }

    #[test]
    fn test_protocol_errors_stay_distinct() {
        let err = BrowserError::from(CdpError::Timeout);
        assert!(matches!(err, BrowserError::Cdp(_)));
    }
}
