//! Webhook notifications.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::config::NotifierConfig;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("unknown notification channel `{0}`")]
    UnknownChannel(String),
    #[error("invalid webhook for channel `{channel}`: {source}")]
    InvalidUrl {
        channel: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("delivery to `{channel}` failed: {source}")]
    Delivery {
        channel: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    title: &'a str,
    body: &'a str,
}

/// The `notifier` singleton.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: reqwest::Client,
    channels: BTreeMap<String, Url>,
}

impl Notifier {
    pub fn from_config(config: &NotifierConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(NotifyError::Client)?;

        let channels = config
            .channels
            .iter()
            .map(|(name, webhook)| {
                Url::parse(webhook)
                    .map(|url| (name.clone(), url))
                    .map_err(|source| NotifyError::InvalidUrl {
                        channel: name.clone(),
                        source,
                    })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { client, channels })
    }

    /// Configured channel names.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// POST `{title, body}` as JSON to the channel's webhook.
    pub async fn send(&self, channel: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        let url = self
            .channels
            .get(channel)
            .ok_or_else(|| NotifyError::UnknownChannel(channel.to_string()))?;

        let delivery = |source| NotifyError::Delivery {
            channel: channel.to_string(),
            source,
        };
        self.client
            .post(url.clone())
            .json(&Message { title, body })
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(delivery)?;

        tracing::debug!(channel, title, "Notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(channels: &[(&str, &str)]) -> NotifierConfig {
        NotifierConfig {
            timeout_secs: 1,
            channels: channels
                .iter()
                .map(|(n, u)| (n.to_string(), u.to_string()))
                .collect(),
        }
    }

    #[test]
    fn lists_channels_in_order() {
        let notifier = Notifier::from_config(&config(&[
            ("wecom", "http://127.0.0.1:9/hook"),
            ("ops", "http://127.0.0.1:9/ops"),
        ]))
        .unwrap();
        assert_eq!(notifier.channels().collect::<Vec<_>>(), vec!["ops", "wecom"]);
    }

    #[test]
    fn invalid_webhook_rejected() {
        let err = Notifier::from_config(&config(&[("ops", "::nope")])).unwrap_err();
        assert!(matches!(err, NotifyError::InvalidUrl { ref channel, .. } if channel == "ops"));
    }

    #[tokio::test]
    async fn unknown_channel_rejected() {
        let notifier = Notifier::from_config(&config(&[])).unwrap();
        let err = notifier.send("pager", "hi", "there").await.unwrap_err();
        assert!(matches!(err, NotifyError::UnknownChannel(_)));
    }
}
