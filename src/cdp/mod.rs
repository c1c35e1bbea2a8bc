//! Minimal Chrome DevTools Protocol stack: WebSocket client, page sessions,
//! and the browser lifecycle wrapper used by the renderer.

pub mod browser;
pub mod client;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;

pub use browser::{Browser, BrowserError};
pub use client::CdpClient;
pub use error::CdpError;
pub use network::{LoadState, NetworkIdleTracker};
pub use protocol::{CdpEvent, PrintToPdfParams};
pub use session::{PageSession, ProxyAuthGuard};
