use std::sync::Arc;

use crate::campaign::manager::CampaignManager;
use crate::config::Config;
use crate::voice::VoiceProvider;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    // Kept for handlers that will need per-request config (timeout overrides).
    #[allow(dead_code)]
    pub config: Config,
    /// Pluggable voice provider. Production: `VoiceClient`; tests swap in a
    /// scripted fake.
    pub voice: Arc<dyn VoiceProvider>,
    pub campaigns: Arc<CampaignManager>,
}
