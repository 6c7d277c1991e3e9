pub mod identity;
pub mod metadata_cache;
pub mod preferences;
pub mod providers;
pub mod quota;
pub mod recommend;
pub mod retry;

pub use identity::{provision_user, IdentityClaims, IdentityVerifier, TokeninfoVerifier};
pub use metadata_cache::{BatchResolution, MetadataCache, Provenance, ResolvedMovie};
pub use preferences::{PreferenceStore, PreferencesPatch};
pub use providers::{
    openai::OpenAiProvider, tmdb::TmdbProvider, MetadataProvider, SuggestionProvider,
    SuggestionRequest,
};
pub use quota::QuotaTracker;
pub use recommend::{
    CuratedCandidate, RecommendationEngine, RecommendationResponse, SessionPrefs,
};
pub use retry::RetryPolicy;
