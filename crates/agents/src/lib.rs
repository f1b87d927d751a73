pub mod bootstrap;
pub mod decision;
pub mod handlers;
pub mod links;
pub mod orchestrator;

pub use bootstrap::{
    build_pipeline, Capabilities, Pipeline, PipelineSettings, StatisticalBackend,
    DEFAULT_CACHE_CAPACITY,
};
pub use decision::{BackTranslationPolicy, LanguageSignals};
pub use handlers::{format_places, format_rating, HandlerReply, Handlers, TurnFacts};
pub use links::{link_lines, search_keyword, LinkBuilder, LinkIntent};
pub use orchestrator::{
    apology, CacheReport, Collaborators, ResponseOrchestrator, SessionLanguages, TurnOutcome,
    DEFAULT_SESSION_CAPACITY,
};
