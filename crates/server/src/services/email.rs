//! Transactional email: sign-in codes and print orders for the vendor.
//!
//! Uses SMTP via lettre; sign-in codes are rendered from Askama templates.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::instrument;

use crate::config::EmailConfig;

/// HTML template for the sign-in code email.
#[derive(Template)]
#[template(path = "email/otp_code.html")]
struct OtpCodeEmailHtml<'a> {
    code: &'a str,
    minutes: i64,
}

/// Plain text template for the sign-in code email.
#[derive(Template)]
#[template(path = "email/otp_code.txt")]
struct OtpCodeEmailText<'a> {
    code: &'a str,
    minutes: i64,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// Attachment content type could not be parsed.
    #[error("Invalid content type: {0}")]
    ContentType(String),

    /// No vendor inbox is configured.
    #[error("no print vendor email configured")]
    NoVendor,
}

/// A file attached to a vendor email.
#[derive(Debug, Clone)]
pub struct PdfAttachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A print order sent to the vendor.
#[derive(Debug, Clone)]
pub struct VendorOrder<'a> {
    pub slug: &'a str,
    pub customer_email: Option<&'a str>,
    pub subject_prefix: &'a str,
    pub attachments: Vec<PdfAttachment>,
}

impl VendorOrder<'_> {
    #[must_use]
    pub fn subject(&self) -> String {
        format!("{} - {}", self.subject_prefix, self.slug)
    }

    #[must_use]
    pub fn body(&self) -> String {
        format!(
            "Order ID: {}\nCustomer Email: {}\n\nPDF attached for printing.",
            self.slug,
            self.customer_email.unwrap_or("N/A")
        )
    }
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    config: EmailConfig,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            config: config.clone(),
        })
    }

    /// Send a sign-in code.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_otp_code(&self, to: &str, code: &str, minutes: i64) -> Result<(), EmailError> {
        let html = OtpCodeEmailHtml { code, minutes }.render()?;
        let text = OtpCodeEmailText { code, minutes }.render()?;

        let email = Message::builder()
            .from(self.from()?)
            .to(parse_address(to)?)
            .subject("Your DASH Memories sign-in code")
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            )?;

        self.mailer.send(email).await?;
        tracing::info!(to = %to, "Sign-in code sent");
        Ok(())
    }

    fn from(&self) -> Result<lettre::message::Mailbox, EmailError> {
        parse_address(&self.from_address)
    }
}

/// Outbound print orders.
pub trait VendorMailer: Send + Sync {
    /// Vendor inbox, and whether it is the test inbox.
    fn vendor_recipient(&self) -> Option<(&str, bool)>;

    /// Email print PDFs to the vendor (or the test inbox when configured).
    ///
    /// # Errors
    ///
    /// Returns `EmailError::NoVendor` if no inbox is configured, otherwise
    /// any build or transport error.
    fn send_vendor_order(
        &self,
        order: VendorOrder<'_>,
    ) -> impl Future<Output = Result<(), EmailError>> + Send;
}

impl VendorMailer for EmailService {
    fn vendor_recipient(&self) -> Option<(&str, bool)> {
        self.config.vendor_recipient()
    }

    #[instrument(skip(self, order), fields(slug = order.slug, attachments = order.attachments.len()))]
    async fn send_vendor_order(&self, order: VendorOrder<'_>) -> Result<(), EmailError> {
        let (to, _) = self.vendor_recipient().ok_or(EmailError::NoVendor)?;
        let email = build_vendor_message(&self.from_address, to, &order)?;

        self.mailer.send(email).await?;
        tracing::info!(to = %to, subject = %order.subject(), "Vendor email sent");
        Ok(())
    }
}

fn parse_address(address: &str) -> Result<lettre::message::Mailbox, EmailError> {
    address
        .parse()
        .map_err(|_| EmailError::InvalidAddress(address.to_string()))
}

fn build_vendor_message(from: &str, to: &str, order: &VendorOrder<'_>) -> Result<Message, EmailError> {
    let pdf = ContentType::parse("application/pdf")
        .map_err(|e| EmailError::ContentType(e.to_string()))?;

    let mut multipart = MultiPart::mixed().singlepart(
        SinglePart::builder()
            .header(ContentType::TEXT_PLAIN)
            .body(order.body()),
    );
    for attachment in &order.attachments {
        multipart = multipart.singlepart(
            Attachment::new(attachment.filename.clone()).body(attachment.bytes.clone(), pdf.clone()),
        );
    }

    Ok(Message::builder()
        .from(parse_address(from)?)
        .to(parse_address(to)?)
        .subject(order.subject())
        .multipart(multipart)?)
}

/// Generate a 6-digit sign-in code.
#[must_use]
pub fn generate_code() -> String {
    use rand::Rng;
    let code: u32 = rand::rng().random_range(100_000..1_000_000);
    code.to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn order() -> VendorOrder<'static> {
        VendorOrder {
            slug: "000042",
            customer_email: Some("family@example.com"),
            subject_prefix: "New Acrylic Order",
            attachments: vec![PdfAttachment {
                filename: "order-000042-acrylic.pdf".into(),
                bytes: b"%PDF-1.5".to_vec(),
            }],
        }
    }

    #[test]
    fn test_vendor_subject_and_body() {
        let order = order();
        assert_eq!(order.subject(), "New Acrylic Order - 000042");
        assert_eq!(
            order.body(),
            "Order ID: 000042\nCustomer Email: family@example.com\n\nPDF attached for printing."
        );

        let anonymous = VendorOrder {
            customer_email: None,
            ..order
        };
        assert!(anonymous.body().contains("Customer Email: N/A"));
    }

    #[test]
    fn test_vendor_message_has_attachment() {
        let message = build_vendor_message("noreply@dash.gift", "prints@vendor.test", &order()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: New Acrylic Order - 000042"));
        assert!(raw.contains("order-000042-acrylic.pdf"));
        assert!(raw.contains("application/pdf"));
    }

    #[test]
    fn test_vendor_message_rejects_bad_address() {
        let result = build_vendor_message("noreply@dash.gift", "not an address", &order());
        assert!(matches!(result, Err(EmailError::InvalidAddress(_))));
    }

    #[test]
    fn test_generate_code_format() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().unwrap();
            assert!((100_000..1_000_000).contains(&value));
        }
    }

    #[test]
    fn test_otp_templates_render() {
        let text = OtpCodeEmailText { code: "123456", minutes: 10 }.render().unwrap();
        assert!(text.contains("123456"));
        assert!(text.contains("10 minutes"));
        let html = OtpCodeEmailHtml { code: "123456", minutes: 10 }.render().unwrap();
        assert!(html.contains("123456"));
    }
}
