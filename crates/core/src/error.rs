use serde::Serialize;
use thiserror::Error;

/// Failure reported by an external collaborator. Callers absorb these; none of
/// them reach the guest.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{service} timed out")]
    Timeout { service: &'static str },
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },
    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },
    #[error("turn cancelled before calling {service}")]
    Cancelled { service: &'static str },
}

impl CollaboratorError {
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            message: message.into(),
        }
    }

    pub fn invalid(service: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service,
            message: message.into(),
        }
    }

    pub fn service(&self) -> &'static str {
        match self {
            Self::Timeout { service }
            | Self::Unavailable { service, .. }
            | Self::InvalidResponse { service, .. }
            | Self::Cancelled { service } => service,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Conditions a turn recovered from. Recorded on the turn and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    DetectionAmbiguous,
    TranslationUnavailable,
    TranslationQualityRejected,
    LocationUnresolved,
    ExternalServiceTimeout,
    EscalationRequired,
}

impl Degradation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DetectionAmbiguous => "detection_ambiguous",
            Self::TranslationUnavailable => "translation_unavailable",
            Self::TranslationQualityRejected => "translation_quality_rejected",
            Self::LocationUnresolved => "location_unresolved",
            Self::ExternalServiceTimeout => "external_service_timeout",
            Self::EscalationRequired => "escalation_required",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {what}: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {what}: {message}")]
    Invalid { what: &'static str, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_collaborator_errors() {
        let err = CollaboratorError::unavailable("places", "HTTP 503");
        assert_eq!(err.to_string(), "places unavailable: HTTP 503");
        assert_eq!(err.service(), "places");
        assert!(CollaboratorError::Timeout { service: "faq" }.is_timeout());
    }
}
