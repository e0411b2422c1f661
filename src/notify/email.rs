// src/notify/email.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, Message, MultiPart, SinglePart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{Mailer, OutgoingEmail};

/// SMTP delivery. Port 465 uses implicit TLS, anything else STARTTLS.
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        server: &str,
        port: u16,
        user: String,
        password: String,
        sender: &str,
        sender_name: &str,
    ) -> Result<Self> {
        let creds = Credentials::new(user, password);
        let builder = (if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)
        })
        .with_context(|| format!("invalid SMTP_SERVER '{server}'"))?;
        let mailer = builder.port(port).credentials(creds).build();

        let from: Mailbox = format!("{sender_name} <{sender}>")
            .parse()
            .with_context(|| format!("invalid SENDER_EMAIL '{sender}'"))?;
        Ok(Self { mailer, from })
    }

    fn build(&self, email: &OutgoingEmail) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject.clone());
        for to in &email.to {
            let mb: Mailbox = to
                .parse()
                .with_context(|| format!("invalid recipient '{to}'"))?;
            builder = builder.to(mb);
        }

        let html = SinglePart::html(email.html_body.clone());
        let message = match &email.attachment {
            Some(att) => {
                let ct = ContentType::parse(&att.content_type)
                    .map_err(|e| anyhow!("attachment content type: {e}"))?;
                let part = MailAttachment::new(att.filename.clone()).body(att.bytes.clone(), ct);
                builder.multipart(MultiPart::mixed().singlepart(html).singlepart(part))
            }
            None => builder.singlepart(html),
        };
        message.context("build email")
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let msg = self.build(email)?;
        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
