use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::Client;
use serde_json::json;
use tabi_core::{CollaboratorError, EscalationContext, EscalationNotifier};
use tracing::{info, warn};

use crate::{check_status, http_client, send_error};

const SERVICE: &str = "line_push";
const DEFAULT_BASE_URL: &str = "https://api.line.me";
const MAX_MESSAGE_CHARS: usize = 2000;

/// Pushes escalations to staff accounts through the LINE messaging API.
pub struct LineNotifier {
    client: Client,
    channel_token: String,
    recipients: Vec<String>,
    base_url: String,
}

impl LineNotifier {
    pub fn new(
        channel_token: impl Into<String>,
        recipients: Vec<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            channel_token: channel_token.into(),
            recipients,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn push(&self, recipient: &str, message: &str) -> Result<(), CollaboratorError> {
        let body = json!({
            "to": recipient,
            "messages": [{ "type": "text", "text": message }],
        });
        let response = self
            .client
            .post(format!("{}/v2/bot/message/push", self.base_url))
            .bearer_auth(&self.channel_token)
            .json(&body)
            .send()
            .map_err(|err| send_error(SERVICE, err))?;
        check_status(SERVICE, response).map(|_| ())
    }
}

/// Staff-facing message in the pivot language.
pub fn format_escalation(text: &str, company_id: &str, context: &EscalationContext) -> String {
    let message = format!(
        "【要対応】お客様からのお問い合わせ\n会社ID: {company_id}\n言語: {}\n理由: {}\n時刻: {}\n\n内容:\n{text}",
        context.detected_language.pivot_display_name(),
        context.reason,
        context.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    );
    if message.chars().count() <= MAX_MESSAGE_CHARS {
        return message;
    }
    let mut truncated: String = message.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    truncated.push('…');
    truncated
}

impl EscalationNotifier for LineNotifier {
    /// Tries every recipient; reports the last failure if any push failed.
    fn notify(
        &self,
        text: &str,
        company_id: &str,
        context: &EscalationContext,
    ) -> Result<(), CollaboratorError> {
        let message = format_escalation(text, company_id, context);
        let mut last_error = None;
        let mut delivered = 0;
        for recipient in &self.recipients {
            match self.push(recipient, &message) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(company_id, error = %err, "escalation push failed");
                    last_error = Some(err);
                }
            }
        }
        info!(company_id, delivered, recipients = self.recipients.len(), "escalation pushed");
        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabi_core::LangCode;

    fn context() -> EscalationContext {
        EscalationContext {
            detected_language: LangCode::Ko,
            reason: "unknown_intent".to_string(),
            timestamp: "2026-03-01T09:30:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn escalation_message_is_written_for_staff() {
        let message = format_escalation("주차장 있나요?", "demo-company", &context());
        assert!(message.starts_with("【要対応】"));
        assert!(message.contains("言語: 韓国語"));
        assert!(message.contains("時刻: 2026-03-01 09:30:00 UTC"));
        assert!(message.ends_with("주차장 있나요?"));
    }

    #[test]
    fn long_messages_are_truncated() {
        let long = "あ".repeat(3000);
        let message = format_escalation(&long, "demo-company", &context());
        assert_eq!(message.chars().count(), MAX_MESSAGE_CHARS);
        assert!(message.ends_with('…'));
    }

    #[test]
    fn no_recipients_is_a_quiet_success() {
        let notifier = LineNotifier::new("token", Vec::new(), Duration::from_secs(1)).unwrap();
        assert!(notifier.notify("test", "demo-company", &context()).is_ok());
    }
}
