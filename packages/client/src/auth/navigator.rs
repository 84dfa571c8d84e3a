//! Redirect handling for a terminal client.
//!
//! A browser app changes `window.location`; here the URL is handed to the
//! user, who opens it in a browser.

use reqwest::Url;

/// Sends the user to an identity-provider URL
#[cfg_attr(test, mockall::automock)]
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &Url);
}

/// Prints the URL on the terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, url: &Url) {
        tracing::info!("Redirecting to {}", url);
        println!("\nOpen this URL in your browser to continue:\n  {}\n", url);
    }
}
