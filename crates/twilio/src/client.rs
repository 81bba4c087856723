use {
    async_trait::async_trait,
    relay_channels::{
        Error, HttpMethod, InboundCallback, InboundFilter, MessagingProvider, Result, SentMessage,
    },
    relay_common::{address::normalize_address, types::InboundMessage},
    relay_config::TwilioConfig,
    secrecy::{ExposeSecret, Secret},
    serde::de::DeserializeOwned,
    tracing::{debug, info, warn},
};

use crate::types::{
    IncomingPhoneNumber, IncomingPhoneNumberPage, MessagePage, MessageResource, MessagingService,
    Sender,
};

pub const DEFAULT_BASE_URL: &str = "https://api.twilio.com";
pub const DEFAULT_MESSAGING_BASE_URL: &str = "https://messaging.twilio.com";

const API_VERSION: &str = "2010-04-01";
const DEFAULT_PAGE_SIZE: u32 = 50;

/// Twilio REST client bound to one account and sender number.
#[derive(Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    account_sid: String,
    username: String,
    password: Secret<String>,
    from: String,
    base_url: String,
    messaging_base_url: String,
}

impl std::fmt::Debug for TwilioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioClient")
            .field("account_sid", &self.account_sid)
            .field("username", &self.username)
            .field("from", &self.from)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TwilioClient {
    pub fn new(
        account_sid: impl Into<String>,
        username: impl Into<String>,
        password: Secret<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_sid: account_sid.into(),
            username: username.into(),
            password,
            from: from.into(),
            base_url: DEFAULT_BASE_URL.into(),
            messaging_base_url: DEFAULT_MESSAGING_BASE_URL.into(),
        }
    }

    /// Build a client from config. Missing credentials or sender is a
    /// configuration error.
    pub fn from_config(cfg: &TwilioConfig) -> Result<Self> {
        let account_sid = cfg
            .account_sid
            .clone()
            .ok_or_else(|| Error::invalid_input("twilio.account_sid is not set"))?;
        let (username, password) = cfg.credentials().ok_or_else(|| {
            Error::invalid_input("twilio credentials are not set (auth_token or api_key/api_secret)")
        })?;
        let from = cfg
            .from
            .clone()
            .ok_or_else(|| Error::invalid_input("twilio.from is not set"))?;

        let mut client = Self::new(account_sid, username, password, from);
        if let Some(url) = &cfg.base_url {
            client.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = &cfg.messaging_base_url {
            client.messaging_base_url = url.trim_end_matches('/').to_string();
        }
        Ok(client)
    }

    /// Point both API hosts somewhere else (tests, proxies).
    #[must_use]
    pub fn with_base_urls(mut self, api: impl Into<String>, messaging: impl Into<String>) -> Self {
        self.base_url = api.into();
        self.messaging_base_url = messaging.into();
        self
    }

    pub fn from_number(&self) -> &str {
        &self.from
    }

    fn account_url(&self, path: &str) -> String {
        format!(
            "{}/{API_VERSION}/Accounts/{}/{path}",
            self.base_url, self.account_sid
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        context: &str,
        req: reqwest::RequestBuilder,
    ) -> Result<T> {
        let resp = req
            .send()
            .await
            .map_err(|e| Error::external(context.to_string(), e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::http(context, status.as_u16(), body));
        }
        resp.json()
            .await
            .map_err(|e| Error::external(format!("{context}: decoding response"), e))
    }

    // ── Incoming phone number ───────────────────────────────────────────────

    /// Look up the incoming phone number resource for our sender.
    pub async fn find_incoming_number(&self) -> Result<IncomingPhoneNumber> {
        let number = normalize_address(&self.from)
            .ok_or_else(|| Error::invalid_input(format!("cannot parse sender {}", self.from)))?;
        let req = self
            .request(reqwest::Method::GET, &self.account_url("IncomingPhoneNumbers.json"))
            .query(&[("PhoneNumber", number.as_str())]);
        let page: IncomingPhoneNumberPage =
            self.send_json("listing incoming phone numbers", req).await?;
        page.incoming_phone_numbers
            .into_iter()
            .next()
            .ok_or_else(|| Error::unavailable(format!("{number} is not an incoming number on this account")))
    }

    // ── Messaging service ───────────────────────────────────────────────────

    pub async fn update_messaging_service_callback(
        &self,
        service_sid: &str,
        url: &str,
        method: HttpMethod,
    ) -> Result<()> {
        let endpoint = format!("{}/v1/Services/{service_sid}", self.messaging_base_url);
        let req = self
            .request(reqwest::Method::POST, &endpoint)
            .form(&[("InboundRequestUrl", url), ("InboundMethod", method.as_str())]);
        let _: MessagingService = self.send_json("updating messaging service", req).await?;
        Ok(())
    }

    pub async fn fetch_messaging_service_callback(&self, service_sid: &str) -> Result<Option<String>> {
        let endpoint = format!("{}/v1/Services/{service_sid}", self.messaging_base_url);
        let req = self.request(reqwest::Method::GET, &endpoint);
        let service: MessagingService = self.send_json("fetching messaging service", req).await?;
        Ok(service.inbound_request_url)
    }

    // ── WhatsApp sender ─────────────────────────────────────────────────────

    pub async fn update_sender_webhook(
        &self,
        sender_sid: &str,
        url: &str,
        method: HttpMethod,
    ) -> Result<()> {
        let endpoint = format!("{}/v2/Channels/Senders/{sender_sid}", self.messaging_base_url);
        let req = self
            .request(reqwest::Method::POST, &endpoint)
            .json(&serde_json::json!({
                "webhook": { "callback_url": url, "callback_method": method.as_str() }
            }));
        let _: Sender = self.send_json("updating sender webhook", req).await?;
        Ok(())
    }

    pub async fn fetch_sender_webhook(&self, sender_sid: &str) -> Result<Option<String>> {
        let endpoint = format!("{}/v2/Channels/Senders/{sender_sid}", self.messaging_base_url);
        let req = self.request(reqwest::Method::GET, &endpoint);
        let sender: Sender = self.send_json("fetching sender", req).await?;
        Ok(sender.webhook.and_then(|w| w.callback_url))
    }
}

#[async_trait]
impl MessagingProvider for TwilioClient {
    async fn list_inbound(&self, filter: &InboundFilter) -> Result<Vec<InboundMessage>> {
        let to = filter.to.as_deref().unwrap_or(&self.from);
        let page_size = filter.limit.unwrap_or(DEFAULT_PAGE_SIZE).to_string();
        let req = self
            .request(reqwest::Method::GET, &self.account_url("Messages.json"))
            .query(&[("To", to), ("PageSize", page_size.as_str())]);
        let page: MessagePage = self.send_json("listing messages", req).await?;

        let fetched = page.messages.len();
        let messages: Vec<InboundMessage> = page
            .messages
            .into_iter()
            .filter(|m| m.is_inbound())
            .filter_map(|m| {
                let sid = m.sid.clone();
                match InboundMessage::try_from(m) {
                    Ok(msg) => Some(msg),
                    Err(e) => {
                        warn!(sid, error = %e, "skipping invalid twilio message");
                        None
                    },
                }
            })
            .filter(|m| filter.created_after.is_none_or(|since| m.created_at >= since))
            .collect();

        debug!(fetched, inbound = messages.len(), "listed twilio messages");
        Ok(messages)
    }

    async fn send(
        &self,
        from: &str,
        to: &str,
        body: &str,
        media_urls: &[String],
    ) -> Result<SentMessage> {
        if body.is_empty() && media_urls.is_empty() {
            return Err(Error::invalid_input("message needs a body or media"));
        }
        let mut form: Vec<(&str, &str)> = vec![("From", from), ("To", to)];
        if !body.is_empty() {
            form.push(("Body", body));
        }
        form.extend(media_urls.iter().map(|u| ("MediaUrl", u.as_str())));

        let req = self
            .request(reqwest::Method::POST, &self.account_url("Messages.json"))
            .form(&form);
        let sent: MessageResource = self.send_json("sending message", req).await?;
        info!(sid = %sent.sid, to, media = media_urls.len(), "twilio message sent");
        Ok(SentMessage { id: sent.sid })
    }

    async fn set_inbound_callback(&self, url: &str, method: HttpMethod) -> Result<()> {
        let number = self.find_incoming_number().await?;
        let req = self
            .request(
                reqwest::Method::POST,
                &self.account_url(&format!("IncomingPhoneNumbers/{}.json", number.sid)),
            )
            .form(&[("SmsUrl", url), ("SmsMethod", method.as_str())]);
        let _: IncomingPhoneNumber = self.send_json("updating incoming number", req).await?;
        Ok(())
    }

    async fn fetch_inbound_callback(&self) -> Result<InboundCallback> {
        let number = self.find_incoming_number().await?;
        Ok(InboundCallback {
            url: number.sms_url,
            method: number.sms_method,
        })
    }
}
