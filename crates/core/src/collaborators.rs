//! Seams to everything outside the pipeline. Calls are synchronous and each
//! implementation bounds its own latency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CollaboratorError;
use crate::models::{EscalationContext, FaqAnswer, LangCode, LocationRecord, PlaceResult};

pub trait TranslationEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn translate(
        &self,
        text: &str,
        target: LangCode,
        source: Option<LangCode>,
    ) -> Result<String, CollaboratorError>;

    /// Best guess for `text` with the engine's confidence, `None` when the
    /// engine answers with a language outside the supported set.
    fn detect_language(&self, text: &str) -> Result<Option<(LangCode, f32)>, CollaboratorError>;

    /// Cheap round-trip used to validate availability once per process.
    fn check_available(&self) -> Result<(), CollaboratorError> {
        let output = self.translate("こんにちは", LangCode::En, Some(LangCode::Ja))?;
        if output.trim().is_empty() {
            return Err(CollaboratorError::invalid(self.name(), "empty availability check output"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceCategory {
    Restaurant,
    Tourism,
}

impl PlaceCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Restaurant => "restaurant",
            Self::Tourism => "tourism",
        }
    }
}

pub trait PlacesSearch: Send + Sync {
    fn search(
        &self,
        location: &str,
        query: &str,
        category: PlaceCategory,
        language: LangCode,
    ) -> Result<Vec<PlaceResult>, CollaboratorError>;
}

pub trait FaqLookup: Send + Sync {
    fn lookup(&self, text: &str, company_id: &str) -> Result<FaqAnswer, CollaboratorError>;
}

pub trait CompanyRecordStore: Send + Sync {
    fn base_location(&self, company_id: &str) -> Result<Option<LocationRecord>, CollaboratorError>;
}

pub trait EscalationNotifier: Send + Sync {
    fn notify(
        &self,
        text: &str,
        company_id: &str,
        context: &EscalationContext,
    ) -> Result<(), CollaboratorError>;
}

/// Notifier used when no push channel is configured: the escalation only lands in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl EscalationNotifier for LogNotifier {
    fn notify(
        &self,
        text: &str,
        company_id: &str,
        context: &EscalationContext,
    ) -> Result<(), CollaboratorError> {
        info!(
            company_id,
            language = %context.detected_language,
            reason = %context.reason,
            chars = text.chars().count(),
            "escalation recorded"
        );
        Ok(())
    }
}

/// Places backend used when no API key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledPlaces;

impl PlacesSearch for DisabledPlaces {
    fn search(
        &self,
        _location: &str,
        _query: &str,
        _category: PlaceCategory,
        _language: LangCode,
    ) -> Result<Vec<PlaceResult>, CollaboratorError> {
        Ok(Vec::new())
    }
}

/// Cancellation flag for one turn. Cloned into every stage; once set, no
/// further collaborator call is started.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    cancelled: Arc<AtomicBool>,
}

impl TurnContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn ensure_active(&self, service: &'static str) -> Result<(), CollaboratorError> {
        if self.is_cancelled() {
            Err(CollaboratorError::Cancelled { service })
        } else {
            Ok(())
        }
    }

    /// Guard that cancels the turn when dropped unless disarmed.
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            context: self.clone(),
            armed: true,
        }
    }
}

pub struct CancelOnDrop {
    context: TurnContext,
    armed: bool,
}

impl CancelOnDrop {
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.context.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_guard_cancels_unless_disarmed() {
        let context = TurnContext::new();
        {
            let _guard = context.cancel_on_drop();
        }
        assert!(context.is_cancelled());
        assert!(context.ensure_active("faq").is_err());

        let context = TurnContext::new();
        context.cancel_on_drop().disarm();
        assert!(!context.is_cancelled());
    }
}
