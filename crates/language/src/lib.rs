pub mod detector;
pub mod protect;
pub mod quality;
pub mod statistical;
pub mod translate;

pub use detector::LanguageDetector;
pub use protect::{ProtectedText, TermKind, TermProtector};
pub use quality::{QualityGate, QualityRejection};
pub use statistical::{EngineDetector, StatisticalDetector, WhatlangDetector};
pub use translate::{
    is_protected_line, BackTranslation, TranslationCache, TranslationOrchestrator,
    TranslationOutcome, TranslationQuality, DEFAULT_MAX_ATTEMPTS,
};
