//! SMTP delivery collaborator. No retrieved example repo sends
//! mail; `lettre` is the standard ecosystem crate for this and is used
//! here purely at the transport boundary — the core only ever calls
//! [`send`].

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::SmtpConfig;
use crate::error::{KaiError, Result};

/// Send `subject`/`body` to every recipient in `config`, using plaintext,
/// STARTTLS, or implicit TLS per `config.use_tls`/`config.use_ssl`.
pub fn send(config: &SmtpConfig, subject: &str, body: &str) -> Result<()> {
    if config.recipients.is_empty() {
        return Ok(());
    }

    let from: Mailbox = config
        .from
        .parse()
        .map_err(|e| KaiError::Smtp(format!("invalid from address {:?}: {e}", config.from)))?;

    let mut builder = Message::builder().from(from);
    for recipient in &config.recipients {
        let mailbox: Mailbox = recipient
            .parse()
            .map_err(|e| KaiError::Smtp(format!("invalid recipient {recipient:?}: {e}")))?;
        builder = builder.to(mailbox);
    }
    if let Some(reply_to) = &config.reply_to {
        let mailbox: Mailbox = reply_to
            .parse()
            .map_err(|e| KaiError::Smtp(format!("invalid reply-to {reply_to:?}: {e}")))?;
        builder = builder.reply_to(mailbox);
    }

    let message = builder
        .subject(subject)
        .body(body.to_string())
        .map_err(|e| KaiError::Smtp(format!("could not build message: {e}")))?;

    let transport = build_transport(config)?;
    transport
        .send(&message)
        .map_err(|e| KaiError::Smtp(format!("delivery failed: {e}")))?;
    Ok(())
}

fn build_transport(config: &SmtpConfig) -> Result<SmtpTransport> {
    let mut builder = if config.use_ssl {
        SmtpTransport::relay(&config.server)
    } else if config.use_tls {
        SmtpTransport::starttls_relay(&config.server)
    } else {
        Ok(SmtpTransport::builder_dangerous(&config.server))
    }
    .map_err(|e| KaiError::Smtp(format!("could not configure SMTP transport: {e}")))?;

    builder = builder.port(config.port);

    if let Some(username) = &config.username {
        let password = config.password.clone().unwrap_or_default();
        builder = builder.credentials(Credentials::new(username.clone(), password));
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SmtpConfig {
        SmtpConfig {
            server: "smtp.example.com".into(),
            port: 587,
            username: None,
            password: None,
            use_tls: true,
            use_ssl: false,
            recipients: vec![],
            from: "kometa-ai@example.com".into(),
            reply_to: None,
            notify_on_no_changes: false,
            notify_on_errors_only: false,
        }
    }

    #[test]
    fn no_recipients_is_a_silent_no_op() {
        let config = base_config();
        assert!(send(&config, "subject", "body").is_ok());
    }

    #[test]
    fn invalid_from_address_is_an_error() {
        let mut config = base_config();
        config.from = "not-an-email".into();
        config.recipients = vec!["ok@example.com".into()];
        assert!(send(&config, "subject", "body").is_err());
    }

    #[test]
    fn transport_builds_for_each_tls_mode() {
        let mut starttls = base_config();
        starttls.recipients = vec!["ok@example.com".into()];
        assert!(build_transport(&starttls).is_ok());

        let mut implicit = base_config();
        implicit.use_tls = false;
        implicit.use_ssl = true;
        assert!(build_transport(&implicit).is_ok());

        let mut plain = base_config();
        plain.use_tls = false;
        plain.use_ssl = false;
        assert!(build_transport(&plain).is_ok());
    }
}
