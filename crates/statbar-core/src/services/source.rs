//! Usage source trait
//!
//! The seam between the monitor and its two upstreams. Each source is
//! responsible for:
//! 1. Attempting one fetch and converting every failure into a typed
//!    [`SourceError`] - nothing propagates uncaught past this boundary
//! 2. Producing a [`UsageSnapshot`] tagged with its own source kind
//!
//! The monitor holds sources as `Arc<dyn UsageSource>` so tests can inject
//! scripted implementations.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::models::{SourceKind, UsageSnapshot};

/// A single usage-reporting upstream
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Which of the two configured sources this is
    fn kind(&self) -> SourceKind;

    /// Human-readable name for logs and UI
    fn display_name(&self) -> &'static str;

    /// Quick configuration check without any I/O.
    ///
    /// Used by the monitor to report `NotConfigured` instead of attempting a
    /// fetch that cannot succeed.
    fn is_configured(&self) -> bool;

    /// Attempt one fetch.
    ///
    /// Implementations own their internal recovery (the OAuth client's single
    /// token refresh + retry); the monitor layers its cross-cycle retry
    /// policy on top of the returned error.
    async fn fetch(&self) -> Result<UsageSnapshot, SourceError>;
}
