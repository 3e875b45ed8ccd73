//! Browser launching for the interactive login flow
//!
//! The flow only needs "open this URL in the default viewer", so the call is
//! behind a trait and tests substitute a driver that hits the local routes
//! directly.

use anyhow::Result;

/// Opens a URL in the user's default browser.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// Launches the system default browser via the `open` crate.
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        println!("Opening browser for login...");
        println!();
        println!("If the browser doesn't open automatically, visit:");
        println!("{}", url);
        println!();

        open::that(url)?;
        Ok(())
    }
}
