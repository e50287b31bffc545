//! Mail transports: a JSON mail gateway over HTTP, and an in-process loopback mailbox.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use rfpdesk_core::collaborators::{
    CollaboratorError, MailSender, MessageDirection, OutboundEmail, SendReceipt, ThreadFetcher,
    ThreadMessage,
};
use rfpdesk_core::config::MailConfig;
use rfpdesk_core::domain::quotation::MessageId;
use rfpdesk_core::domain::session::AccountId;

/// Talks to a mail gateway exposing
/// `POST {base}/messages` and `GET {base}/accounts/{account}/threads/{thread}/messages`.
pub struct HttpMailGateway {
    client: Client,
    base_url: Url,
    api_token: Option<SecretString>,
}

#[derive(Deserialize)]
struct ThreadPayload {
    messages: Vec<ThreadMessage>,
}

impl HttpMailGateway {
    pub fn from_config(config: &MailConfig) -> anyhow::Result<Self> {
        let raw = config
            .gateway_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("mail.gateway_url is required for the gateway transport"))?;
        let base_url = Url::parse(raw)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("mail.gateway_url `{raw}` cannot be used as a base url");
        }
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self { client, base_url, api_token: config.api_token.clone() })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, CollaboratorError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CollaboratorError::Rejected("gateway url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

async fn checked(response: Result<Response, reqwest::Error>, what: &str) -> Result<Response, CollaboratorError> {
    let response = response.map_err(|error| CollaboratorError::Unavailable(format!("{what}: {error}")))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    let message = format!("{what}: gateway returned {status} {}", detail.trim());
    Err(match status {
        StatusCode::NOT_FOUND => CollaboratorError::NotFound(message),
        status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
            CollaboratorError::Unavailable(message)
        }
        _ => CollaboratorError::Rejected(message),
    })
}

#[async_trait]
impl MailSender for HttpMailGateway {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, CollaboratorError> {
        let url = self.url(&["messages"])?;
        let response = checked(self.authorize(self.client.post(url)).json(email).send().await, "send").await?;
        response
            .json::<SendReceipt>()
            .await
            .map_err(|error| CollaboratorError::Rejected(format!("send receipt unreadable: {error}")))
    }
}

#[async_trait]
impl ThreadFetcher for HttpMailGateway {
    async fn fetch_thread(
        &self,
        account: &AccountId,
        thread_id: &str,
    ) -> Result<Vec<ThreadMessage>, CollaboratorError> {
        let url = self.url(&["accounts", &account.0, "threads", thread_id, "messages"])?;
        let response = checked(self.authorize(self.client.get(url)).send().await, "fetch thread").await?;
        let payload = response
            .json::<ThreadPayload>()
            .await
            .map_err(|error| CollaboratorError::Rejected(format!("thread payload unreadable: {error}")))?;
        Ok(payload.messages)
    }
}

#[derive(Clone, Debug)]
struct LoopbackThread {
    owner: AccountId,
    messages: Vec<ThreadMessage>,
}

/// Keeps every thread in process memory. Vendor replies are injected with
/// [`LoopbackMailbox::deliver_reply`].
#[derive(Debug, Default)]
pub struct LoopbackMailbox {
    threads: RwLock<BTreeMap<String, LoopbackThread>>,
    sequence: AtomicU64,
}

impl LoopbackMailbox {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub async fn deliver_reply(
        &self,
        thread_id: &str,
        subject: &str,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<MessageId, CollaboratorError> {
        let message_id = MessageId(self.next_id("loopback-in"));
        let mut threads = self.threads.write().await;
        let thread = threads
            .get_mut(thread_id)
            .ok_or_else(|| CollaboratorError::NotFound(format!("thread {thread_id}")))?;
        thread.messages.push(ThreadMessage {
            message_id: message_id.clone(),
            direction: MessageDirection::Inbound,
            timestamp: at,
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(message_id)
    }

    pub async fn thread_ids(&self) -> Vec<String> {
        self.threads.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl MailSender for LoopbackMailbox {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, CollaboratorError> {
        if !email.to.contains('@') {
            return Err(CollaboratorError::Rejected(format!("`{}` is not an email address", email.to)));
        }
        let thread_id = self.next_id("loopback-thread");
        let message_id = self.next_id("loopback-out");
        self.threads.write().await.insert(
            thread_id.clone(),
            LoopbackThread {
                owner: email.from.clone(),
                messages: vec![ThreadMessage {
                    message_id: MessageId(message_id.clone()),
                    direction: MessageDirection::Outbound,
                    timestamp: Utc::now(),
                    subject: email.subject.clone(),
                    body: email.body.clone(),
                }],
            },
        );
        info!(
            event_name = "agent.mail.loopback_sent",
            thread_id = %thread_id,
            to = %email.to,
            "email kept in loopback mailbox"
        );
        Ok(SendReceipt { thread_id, message_id })
    }
}

#[async_trait]
impl ThreadFetcher for LoopbackMailbox {
    async fn fetch_thread(
        &self,
        account: &AccountId,
        thread_id: &str,
    ) -> Result<Vec<ThreadMessage>, CollaboratorError> {
        let threads = self.threads.read().await;
        match threads.get(thread_id) {
            Some(thread) if &thread.owner == account => Ok(thread.messages.clone()),
            Some(_) => {
                warn!(
                    event_name = "agent.mail.foreign_thread",
                    thread_id = %thread_id,
                    account = %account.0,
                    "thread belongs to another account"
                );
                Err(CollaboratorError::NotFound(format!("thread {thread_id}")))
            }
            None => Err(CollaboratorError::NotFound(format!("thread {thread_id}"))),
        }
    }
}
