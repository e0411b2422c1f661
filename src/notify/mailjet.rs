// src/notify/mailjet.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

use super::{Mailer, OutgoingEmail};

const MAILJET_SEND_URL: &str = "https://api.mailjet.com/v3.1/send";

/// Mailjet v3.1 send API over HTTPS.
#[derive(Clone)]
pub struct MailjetMailer {
    client: Client,
    url: String,
    public_key: String,
    private_key: String,
    sender: String,
    sender_name: String,
    max_retries: u8,
}

impl MailjetMailer {
    pub fn new(
        public_key: String,
        private_key: String,
        sender: String,
        sender_name: String,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building mailjet http client")?;
        Ok(Self {
            client,
            url: MAILJET_SEND_URL.to_string(),
            public_key,
            private_key,
            sender,
            sender_name,
            max_retries: 3,
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    fn payload<'a>(&'a self, email: &'a OutgoingEmail) -> SendRequest<'a> {
        SendRequest {
            messages: vec![MjMessage {
                from: MjAddress {
                    email: &self.sender,
                    name: Some(&self.sender_name),
                },
                to: email
                    .to
                    .iter()
                    .map(|t| MjAddress {
                        email: t,
                        name: None,
                    })
                    .collect(),
                subject: &email.subject,
                html_part: &email.html_body,
                attachments: email
                    .attachment
                    .iter()
                    .map(|a| MjAttachment {
                        content_type: &a.content_type,
                        filename: &a.filename,
                        base64_content: STANDARD.encode(&a.bytes),
                    })
                    .collect(),
            }],
        }
    }
}

#[async_trait]
impl Mailer for MailjetMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let payload = self.payload(email);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .basic_auth(&self.public_key, Some(&self.private_key))
                .json(&payload)
                .send()
                .await;

            let retry_in = Duration::from_millis(500u64 << (attempt - 1));
            match res {
                Ok(rsp) if rsp.status().is_success() => return Ok(()),
                Ok(rsp) if rsp.status().is_server_error() && attempt < self.max_retries => {
                    warn!(status = %rsp.status(), attempt, "mailjet server error, retrying");
                    tokio::time::sleep(retry_in).await;
                }
                Ok(rsp) => {
                    let status = rsp.status();
                    let body = rsp.text().await.unwrap_or_default();
                    return Err(anyhow!("mailjet send failed ({status}): {body}"));
                }
                Err(e) if attempt < self.max_retries => {
                    warn!(error = %e, attempt, "mailjet request failed, retrying");
                    tokio::time::sleep(retry_in).await;
                }
                Err(e) => return Err(anyhow!("mailjet request failed: {e}")),
            }
        }
    }

    fn name(&self) -> &'static str {
        "mailjet"
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    #[serde(rename = "Messages")]
    messages: Vec<MjMessage<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct MjMessage<'a> {
    from: MjAddress<'a>,
    to: Vec<MjAddress<'a>>,
    subject: &'a str,
    #[serde(rename = "HTMLPart")]
    html_part: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<MjAttachment<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct MjAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct MjAttachment<'a> {
    content_type: &'a str,
    filename: &'a str,
    base64_content: String,
}
