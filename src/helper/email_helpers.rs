//! Outbound email: the HTTP provider client, tera-rendered templates and the
//! batched newsletter broadcast.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use reqwest::Client;
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use crate::config::Config;
use crate::models::{Letter, Post};

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Email is not configured: {0}")]
    Config(String),
    #[error("Email transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Email provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Email template error: {0}")]
    Template(#[from] tera::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[allow(async_fn_in_trait)]
pub trait Mailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Client for the transactional email API. Cheap to clone.
#[derive(Clone)]
pub struct EmailClient {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl EmailClient {
    pub fn new(config: &Config) -> Result<Self, EmailError> {
        let api_key = config
            .email_api_key
            .clone()
            .ok_or_else(|| EmailError::Config("EMAIL_API_KEY is not set".to_string()))?;
        let from = config
            .email_from
            .clone()
            .ok_or_else(|| EmailError::Config("EMAIL_FROM is not set".to_string()))?;

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            api_url: config.email_api_url.trim_end_matches('/').to_string(),
            api_key,
            from,
        })
    }
}

impl Mailer for EmailClient {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let body = SendRequest {
            from: &self.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html,
        };
        let resp = self
            .client
            .post(format!("{}/emails", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(EmailError::Rejected { status, body });
        }
        Ok(())
    }
}

const NEWSLETTER_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
  <body style="font-family: Georgia, serif; max-width: 600px; margin: 0 auto;">
    <p style="color: #666;">A new {{ kind }} was just published.</p>
    <h1>{{ title }}</h1>
    {% if image %}<img src="{{ image }}" alt="" style="max-width: 100%;">{% endif %}
    <p>{{ excerpt }}</p>
    <p><a href="{{ url | safe }}">Read it on the site</a></p>
    <hr>
    <p style="font-size: 12px; color: #999;">
      <a href="{{ unsubscribe_url | safe }}">Unsubscribe</a>
    </p>
  </body>
</html>"#;

const WELCOME_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
  <body style="font-family: Georgia, serif; max-width: 600px; margin: 0 auto;">
    <h1>Thanks for subscribing</h1>
    <p>You will get an email whenever something new is published on <a href="{{ site_url | safe }}">{{ site_url | safe }}</a>.</p>
    <hr>
    <p style="font-size: 12px; color: #999;">
      <a href="{{ unsubscribe_url | safe }}">Unsubscribe</a>
    </p>
  </body>
</html>"#;

pub struct EmailTemplates {
    tera: Tera,
}

impl EmailTemplates {
    pub fn new() -> Result<Self, EmailError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("newsletter.html", NEWSLETTER_TEMPLATE),
            ("welcome.html", WELCOME_TEMPLATE),
        ])?;
        Ok(Self { tera })
    }

    pub fn render_newsletter(&self, message: &NewsletterMessage, unsubscribe_url: &str) -> Result<String, EmailError> {
        let mut ctx = Context::new();
        ctx.insert("kind", message.kind);
        ctx.insert("title", &message.title);
        ctx.insert("excerpt", &message.excerpt);
        ctx.insert("image", &message.image);
        ctx.insert("url", &message.url);
        ctx.insert("unsubscribe_url", unsubscribe_url);
        Ok(self.tera.render("newsletter.html", &ctx)?)
    }

    pub fn render_welcome(&self, site_url: &str, unsubscribe_url: &str) -> Result<String, EmailError> {
        let mut ctx = Context::new();
        ctx.insert("site_url", site_url);
        ctx.insert("unsubscribe_url", unsubscribe_url);
        Ok(self.tera.render("welcome.html", &ctx)?)
    }
}

/// What gets announced when a post or letter is published.
#[derive(Debug, Clone)]
pub struct NewsletterMessage {
    pub kind: &'static str,
    pub subject: String,
    pub title: String,
    pub excerpt: String,
    pub image: Option<String>,
    pub url: String,
}

impl NewsletterMessage {
    pub fn for_post(post: &Post, site_url: &str) -> Self {
        Self {
            kind: "post",
            subject: format!("New post: {}", post.title),
            title: post.title.clone(),
            excerpt: post.excerpt.clone(),
            image: post.image.clone(),
            url: format!("{}/blog/{}", site_url, post.slug),
        }
    }

    pub fn for_letter(letter: &Letter, site_url: &str) -> Self {
        Self {
            kind: "letter",
            subject: format!("Letter #{}: {}", letter.letter_number, letter.title),
            title: letter.title.clone(),
            excerpt: letter.excerpt.clone(),
            image: letter.image.clone(),
            url: format!("{}/letters/{}", site_url, letter.slug),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recipient {
    pub email: String,
    pub unsubscribe_token: String,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
    pub batches: usize,
}

pub fn unsubscribe_url(site_url: &str, token: &str) -> String {
    format!("{}/unsubscribe?token={}", site_url, token)
}

/// Sends `message` to every recipient. Each chunk of `batch_size` is sent
/// concurrently and chunks are separated by `delay`. Failures are logged and
/// counted; nothing is retried.
pub async fn broadcast<M: Mailer>(
    mailer: &M,
    templates: &EmailTemplates,
    site_url: &str,
    message: &NewsletterMessage,
    recipients: &[Recipient],
    settings: BatchSettings,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    let batch_size = settings.batch_size.max(1);

    for (index, chunk) in recipients.chunks(batch_size).enumerate() {
        if index > 0 && !settings.delay.is_zero() {
            tokio::time::sleep(settings.delay).await;
        }

        let sends = chunk.iter().map(|recipient| async move {
            let html = templates.render_newsletter(message, &unsubscribe_url(site_url, &recipient.unsubscribe_token))?;
            let email = OutgoingEmail { to: recipient.email.clone(), subject: message.subject.clone(), html };
            mailer.send(&email).await
        });

        for (recipient, result) in chunk.iter().zip(join_all(sends).await) {
            match result {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    log::error!("Failed to send newsletter to {}: {}", recipient.email, e);
                    report.failed += 1;
                }
            }
        }
        report.batches += 1;
    }

    log::info!(
        "Newsletter '{}' finished: {} sent, {} failed, {} batch(es).",
        message.title, report.sent, report.failed, report.batches
    );
    report
}

/// Everything a handler needs to fire off newsletter mail in the background.
#[derive(Clone)]
pub struct Newsletter {
    client: EmailClient,
    templates: Arc<EmailTemplates>,
    settings: BatchSettings,
}

impl Newsletter {
    pub fn new(config: &Config) -> Result<Self, EmailError> {
        Ok(Self {
            client: EmailClient::new(config)?,
            templates: Arc::new(EmailTemplates::new()?),
            settings: BatchSettings {
                batch_size: config.email_batch_size,
                delay: config.email_batch_delay(),
            },
        })
    }

    pub fn spawn_broadcast(&self, site_url: String, message: NewsletterMessage, recipients: Vec<Recipient>) {
        if recipients.is_empty() {
            log::info!("No active subscribers; skipping newsletter for '{}'.", message.title);
            return;
        }
        let this = self.clone();
        actix_web::rt::spawn(async move {
            broadcast(&this.client, &this.templates, &site_url, &message, &recipients, this.settings).await;
        });
    }

    pub fn spawn_welcome(&self, site_url: String, recipient: Recipient) {
        let this = self.clone();
        actix_web::rt::spawn(async move {
            let html = match this
                .templates
                .render_welcome(&site_url, &unsubscribe_url(&site_url, &recipient.unsubscribe_token))
            {
                Ok(html) => html,
                Err(e) => {
                    log::error!("Failed to render welcome email: {}", e);
                    return;
                }
            };
            let email = OutgoingEmail { to: recipient.email.clone(), subject: "Welcome aboard".to_string(), html };
            if let Err(e) = this.client.send(&email).await {
                log::error!("Failed to send welcome email to {}: {}", recipient.email, e);
            }
        });
    }
}
