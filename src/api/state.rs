use std::sync::Arc;

use crate::{
    db::UserStore,
    services::{IdentityVerifier, MetadataCache, PreferenceStore, RecommendationEngine},
};

/// Shared application state handed to every handler.
///
/// All collaborators sit behind `Arc` (directly or internally), so cloning
/// the state per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub metadata: Arc<MetadataCache>,
    pub preferences: PreferenceStore,
    pub engine: RecommendationEngine,
}
