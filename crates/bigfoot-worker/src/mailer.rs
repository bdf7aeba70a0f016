//! Mail provider adapters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::collaborators::Mailer;
use crate::config::MailConfig;
use crate::error::{WorkerError, WorkerResult};

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Sends mail through a JSON HTTP provider API.
#[derive(Clone)]
pub struct HttpMailer {
    http: Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> WorkerResult<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            api_url: api_url.into(),
            api_key,
            from: from.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> WorkerResult<()> {
        let mut request = self.http.post(&self.api_url).json(&SendRequest {
            from: &self.from,
            to,
            subject,
            body,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(WorkerError::mail_failed(format!("provider returned {status}: {detail}")));
        }
        Ok(())
    }
}

/// Logs mail instead of sending it. Used when no provider is configured.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_email(&self, to: &str, subject: &str, _body: &str) -> WorkerResult<()> {
        info!(to, subject, "No mail provider configured, email logged only");
        Ok(())
    }
}

/// Pick the mailer for `config`.
pub fn mailer_from_config(config: &MailConfig, timeout: Duration) -> WorkerResult<Arc<dyn Mailer>> {
    match &config.api_url {
        Some(url) => Ok(Arc::new(HttpMailer::new(
            url.clone(),
            config.api_key.clone(),
            config.from.clone(),
            timeout,
        )?)),
        None => Ok(Arc::new(LogMailer)),
    }
}
