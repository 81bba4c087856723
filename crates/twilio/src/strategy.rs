//! Ways of pointing Twilio's inbound callback at the relay, in the order
//! bring-up tries them.

use std::sync::Arc;

use {
    async_trait::async_trait,
    relay_channels::{CallbackStrategy, Error, HttpMethod, ProviderCallbackStrategy, Result},
    relay_config::TwilioConfig,
};

use crate::client::TwilioClient;

/// WhatsApp sender webhook via the Channels Senders API.
pub struct SenderWebhookStrategy {
    client: Arc<TwilioClient>,
    sender_sid: Option<String>,
}

impl SenderWebhookStrategy {
    pub fn new(client: Arc<TwilioClient>, sender_sid: Option<String>) -> Self {
        Self { client, sender_sid }
    }

    fn sid(&self) -> Result<&str> {
        self.sender_sid
            .as_deref()
            .ok_or_else(|| Error::unavailable("twilio.sender_sid is not set"))
    }
}

#[async_trait]
impl CallbackStrategy for SenderWebhookStrategy {
    fn name(&self) -> &str {
        "sender-webhook"
    }

    fn is_configured(&self) -> bool {
        self.sender_sid.is_some()
    }

    async fn apply(&self, url: &str, method: HttpMethod) -> Result<()> {
        self.client
            .update_sender_webhook(self.sid()?, url, method)
            .await
    }

    async fn read_back(&self) -> Result<Option<String>> {
        self.client.fetch_sender_webhook(self.sid()?).await
    }
}

/// Inbound request URL on a messaging service.
pub struct MessagingServiceStrategy {
    client: Arc<TwilioClient>,
    service_sid: Option<String>,
}

impl MessagingServiceStrategy {
    pub fn new(client: Arc<TwilioClient>, service_sid: Option<String>) -> Self {
        Self {
            client,
            service_sid,
        }
    }

    fn sid(&self) -> Result<&str> {
        self.service_sid
            .as_deref()
            .ok_or_else(|| Error::unavailable("twilio.messaging_service_sid is not set"))
    }
}

#[async_trait]
impl CallbackStrategy for MessagingServiceStrategy {
    fn name(&self) -> &str {
        "messaging-service"
    }

    fn is_configured(&self) -> bool {
        self.service_sid.is_some()
    }

    async fn apply(&self, url: &str, method: HttpMethod) -> Result<()> {
        self.client
            .update_messaging_service_callback(self.sid()?, url, method)
            .await
    }

    async fn read_back(&self) -> Result<Option<String>> {
        self.client.fetch_messaging_service_callback(self.sid()?).await
    }
}

/// Sender webhook, then messaging service, then the incoming number's `SmsUrl`.
pub fn callback_strategies(
    client: Arc<TwilioClient>,
    cfg: &TwilioConfig,
) -> Vec<Box<dyn CallbackStrategy>> {
    vec![
        Box::new(SenderWebhookStrategy::new(
            Arc::clone(&client),
            cfg.sender_sid.clone(),
        )),
        Box::new(MessagingServiceStrategy::new(
            Arc::clone(&client),
            cfg.messaging_service_sid.clone(),
        )),
        Box::new(ProviderCallbackStrategy::new("incoming-number", client)),
    ]
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    fn client(url: &str) -> Arc<TwilioClient> {
        Arc::new(
            TwilioClient::new("AC1", "AC1", Secret::new("t".into()), "whatsapp:+1000")
                .with_base_urls(url, url),
        )
    }

    #[test]
    fn order_and_configuration() {
        let cfg = TwilioConfig {
            messaging_service_sid: Some("MG1".into()),
            ..Default::default()
        };
        let strategies = callback_strategies(client("http://127.0.0.1:9"), &cfg);
        let names: Vec<&str> = strategies.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["sender-webhook", "messaging-service", "incoming-number"]);
        let configured: Vec<bool> = strategies.iter().map(|s| s.is_configured()).collect();
        assert_eq!(configured, [false, true, true]);
    }

    #[tokio::test]
    async fn sender_webhook_write_and_read_back() {
        let mut server = mockito::Server::new_async().await;
        let update = server
            .mock("POST", "/v2/Channels/Senders/XE1")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "webhook": {"callback_url": "https://h/webhook", "callback_method": "POST"}
            })))
            .with_status(200)
            .with_body(r#"{"sid":"XE1","webhook":{"callback_url":"https://h/webhook"}}"#)
            .create_async()
            .await;
        let fetch = server
            .mock("GET", "/v2/Channels/Senders/XE1")
            .with_status(200)
            .with_body(r#"{"sid":"XE1","webhook":{"callback_url":"https://h/webhook","callback_method":"POST"}}"#)
            .create_async()
            .await;

        let strategy = SenderWebhookStrategy::new(client(&server.url()), Some("XE1".into()));
        strategy.apply("https://h/webhook", HttpMethod::Post).await.unwrap();
        assert_eq!(
            strategy.read_back().await.unwrap().as_deref(),
            Some("https://h/webhook")
        );
        update.assert_async().await;
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn messaging_service_write_and_read_back() {
        let mut server = mockito::Server::new_async().await;
        let update = server
            .mock("POST", "/v1/Services/MG1")
            .match_body(mockito::Matcher::UrlEncoded(
                "InboundRequestUrl".into(),
                "https://h/webhook".into(),
            ))
            .with_status(200)
            .with_body(r#"{"sid":"MG1","inbound_request_url":"https://h/webhook"}"#)
            .create_async()
            .await;
        let fetch = server
            .mock("GET", "/v1/Services/MG1")
            .with_status(200)
            .with_body(r#"{"sid":"MG1","inbound_request_url":"https://old/hook"}"#)
            .create_async()
            .await;

        let strategy = MessagingServiceStrategy::new(client(&server.url()), Some("MG1".into()));
        strategy.apply("https://h/webhook", HttpMethod::Post).await.unwrap();
        assert_eq!(
            strategy.read_back().await.unwrap().as_deref(),
            Some("https://old/hook")
        );
        update.assert_async().await;
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn unconfigured_strategy_errors_without_network() {
        let strategy = SenderWebhookStrategy::new(client("http://127.0.0.1:9"), None);
        assert!(!strategy.is_configured());
        assert!(matches!(
            strategy.apply("https://h", HttpMethod::Post).await,
            Err(Error::Unavailable { .. })
        ));
    }
}
