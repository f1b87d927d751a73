pub mod cache;
pub mod collaborators;
pub mod error;
pub mod intent;
pub mod lexicon;
pub mod models;
pub mod script;

pub use cache::{BoundedCache, CacheStats};
pub use collaborators::{
    CancelOnDrop, CompanyRecordStore, DisabledPlaces, EscalationNotifier, FaqLookup, LogNotifier,
    PlaceCategory, PlacesSearch, TranslationEngine, TurnContext,
};
pub use error::{CollaboratorError, ConfigError, Degradation};
pub use intent::{
    normalize_text, IntentClassifier, Route, HIGH_FAQ_CONFIDENCE, MEDIUM_FAQ_CONFIDENCE,
};
pub use lexicon::{IntentKeywords, Lexicon, PlaceNameEquivalent};
pub use models::*;
