//! Optional webhook notifications for daemon events.
//!
//! The webhook kind is detected from the URL: Discord and Slack get their
//! native payload shapes, anything else receives plain JSON. Delivery is
//! fire-and-forget; a failed notification is logged and never fails the
//! operation that triggered it.

use std::path::Path;
use std::time::Duration;

use serde_json::json;

/// A daemon event worth telling the operator about.
#[derive(Debug, Clone)]
pub enum Event {
    Startup,
    Shutdown,
    ConversionSuccess {
        path: String,
        title: String,
        duration_secs: u64,
    },
    ConversionFailed {
        path: String,
        title: String,
        error: String,
    },
}

impl Event {
    fn title(&self) -> &'static str {
        match self {
            Event::Startup => "Dovarr started",
            Event::Shutdown => "Dovarr stopped",
            Event::ConversionSuccess { .. } => "Conversion complete",
            Event::ConversionFailed { .. } => "Conversion failed",
        }
    }

    fn message(&self) -> String {
        match self {
            Event::Startup => "Daemon is running and watching the library.".to_string(),
            Event::Shutdown => "Daemon shut down cleanly.".to_string(),
            Event::ConversionSuccess {
                title,
                duration_secs,
                ..
            } => {
                format!("{title} converted to Profile 8.1 in {duration_secs}s")
            }
            Event::ConversionFailed { title, error, .. } => {
                format!("{title}: {error}")
            }
        }
    }

    fn file_path(&self) -> Option<&str> {
        match self {
            Event::ConversionSuccess { path, .. } | Event::ConversionFailed { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }

    fn color(&self) -> u32 {
        match self {
            Event::Startup | Event::ConversionSuccess { .. } => 0x00FF00,
            Event::Shutdown => 0x808080,
            Event::ConversionFailed { .. } => 0xFF0000,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Event::Startup => "startup",
            Event::Shutdown => "shutdown",
            Event::ConversionSuccess { .. } => "conversion_success",
            Event::ConversionFailed { .. } => "conversion_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WebhookKind {
    Discord,
    Slack,
    Generic,
}

fn detect_kind(url: &str) -> WebhookKind {
    let lower = url.to_lowercase();
    if lower.contains("discord.com/api/webhooks") {
        WebhookKind::Discord
    } else if lower.contains("hooks.slack.com") {
        WebhookKind::Slack
    } else {
        WebhookKind::Generic
    }
}

/// Sends webhook notifications for daemon events.
pub struct Notifier {
    client: reqwest::Client,
    url: String,
    kind: WebhookKind,
}

impl Notifier {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let kind = detect_kind(&url);
        tracing::info!("notifications enabled ({kind:?})");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("failed to build HTTP client with timeout: {e}");
                reqwest::Client::new()
            });

        Self { client, url, kind }
    }

    /// Deliver one event. Failures are logged, never propagated.
    pub async fn notify(&self, event: Event) {
        let payload = build_payload(self.kind, &event);
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!("webhook returned {}", response.status());
            }
            Err(e) => {
                tracing::warn!("failed to send notification: {e}");
            }
        }
    }
}

fn build_payload(kind: WebhookKind, event: &Event) -> serde_json::Value {
    match kind {
        WebhookKind::Discord => {
            let mut embed = json!({
                "title": event.title(),
                "description": event.message(),
                "color": event.color(),
                "footer": {"text": "Dovarr"},
            });
            if let Some(path) = event.file_path() {
                let name = Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string());
                embed["fields"] = json!([{"name": "File", "value": format!("`{name}`")}]);
            }
            json!({"embeds": [embed]})
        }
        WebhookKind::Slack => json!({
            "text": format!("*{}*\n{}", event.title(), event.message()),
        }),
        WebhookKind::Generic => json!({
            "event": event.kind(),
            "title": event.title(),
            "message": event.message(),
            "file_path": event.file_path(),
        }),
    }
}

/// Fire-and-forget delivery from non-async or latency-sensitive call sites.
pub fn spawn_notify(notifier: Option<std::sync::Arc<Notifier>>, event: Event) {
    if let Some(notifier) = notifier {
        tokio::spawn(async move {
            notifier.notify(event).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_detection() {
        assert_eq!(
            detect_kind("https://discord.com/api/webhooks/123/abc"),
            WebhookKind::Discord
        );
        assert_eq!(
            detect_kind("https://hooks.slack.com/services/T0/B0/x"),
            WebhookKind::Slack
        );
        assert_eq!(
            detect_kind("https://example.test/notify"),
            WebhookKind::Generic
        );
    }

    #[test]
    fn discord_payload_carries_file_field() {
        let event = Event::ConversionSuccess {
            path: "/movies/Film (2020)/Film.mkv".into(),
            title: "Film".into(),
            duration_secs: 481,
        };
        let payload = build_payload(WebhookKind::Discord, &event);
        assert_eq!(payload["embeds"][0]["title"], "Conversion complete");
        assert_eq!(
            payload["embeds"][0]["fields"][0]["value"],
            "`Film.mkv`"
        );
    }

    #[test]
    fn generic_payload_is_flat_json() {
        let event = Event::ConversionFailed {
            path: "/tv/Show/ep.mkv".into(),
            title: "ep".into(),
            error: "verification failed".into(),
        };
        let payload = build_payload(WebhookKind::Generic, &event);
        assert_eq!(payload["event"], "conversion_failed");
        assert_eq!(payload["file_path"], "/tv/Show/ep.mkv");
        assert!(payload["message"]
            .as_str()
            .unwrap()
            .contains("verification failed"));
    }

    #[test]
    fn startup_has_no_file() {
        let payload = build_payload(WebhookKind::Generic, &Event::Startup);
        assert!(payload["file_path"].is_null());
    }
}
