//! Host-failure notification mail.
//!
//! One message per host-level failure, sent to the catalog administrator
//! over SMTP. Sending is best-effort: any failure is logged and the
//! message body preserved at debug level, never propagated into the crawl.

use std::path::PathBuf;

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, instrument, warn};

use crate::catalog::Host;
use crate::config::MailConfig;

/// Best-effort SMTP notifier for host-level failures.
#[derive(Debug, Clone)]
pub struct Notifier {
    mail: MailConfig,
    logdir: Option<PathBuf>,
}

impl Notifier {
    /// Creates a notifier from the mail settings.
    #[must_use]
    pub fn new(mail: MailConfig, logdir: Option<PathBuf>) -> Self {
        Self { mail, logdir }
    }

    /// A notifier that never sends anything; used when mail is not
    /// configured and in tests.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            mail: MailConfig::default(),
            logdir: None,
        }
    }

    /// Sends the failure report for one host.
    ///
    /// No-op unless mail is enabled. All failures are swallowed with a
    /// warning; the message body is logged at debug level so nothing is
    /// lost when the relay is down.
    #[instrument(skip(self, report, error_detail), fields(host = %host.name))]
    pub async fn host_failure(&self, host: &Host, report: &str, error_detail: Option<String>) {
        if !self.mail.send_email {
            return;
        }
        let (Some(from), Some(to)) = (&self.mail.mail_from, &self.mail.admin_mail_to) else {
            warn!("mail enabled but sender or recipient unconfigured");
            return;
        };

        let (Ok(from), Ok(to)) = (from.parse::<Mailbox>(), to.parse::<Mailbox>()) else {
            warn!("invalid sender or recipient address");
            return;
        };

        let mut body = format!("{report}\n");
        if let Some(logdir) = &self.logdir {
            body.push_str(&format!(
                "Log can be found at {}/{}.log\n",
                logdir.display(),
                host.id
            ));
        }
        if let Some(detail) = error_detail {
            body.push_str(&format!("Exception info: {detail}\n"));
        }

        let message = match Message::builder()
            .from(from)
            .to(to)
            .subject(format!("{} mirror crawler report", host.name))
            .date_now()
            .body(body.clone())
        {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "failed to build failure report mail");
                return;
            }
        };

        if let Err(err) = self.transport().send(message).await {
            warn!(error = %err, "error sending failure report mail");
            debug!(%body, "mail message follows");
        }
    }

    fn transport(&self) -> AsyncSmtpTransport<Tokio1Executor> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(self.mail.smtp_host.as_str())
                .port(self.mail.smtp_port);
        if let (Some(username), Some(password)) =
            (&self.mail.smtp_username, &self.mail.smtp_password)
        {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        builder.build()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn host() -> Host {
        Host {
            id: 42,
            site_id: 1,
            name: "mirror.example.com".to_string(),
            user_active: true,
            admin_active: true,
            private: false,
            last_crawled: None,
        }
    }

    #[tokio::test]
    async fn test_disabled_notifier_is_a_no_op() {
        let notifier = Notifier::disabled();
        // Must return without attempting any network traffic.
        notifier.host_failure(&host(), "something broke", None).await;
    }

    #[tokio::test]
    async fn test_enabled_notifier_swallows_send_failure() {
        let mail = MailConfig {
            send_email: true,
            mail_from: Some("crawler@example.com".to_string()),
            admin_mail_to: Some("admin@example.com".to_string()),
            smtp_host: "127.0.0.1".to_string(),
            // Nothing listens here; the send must fail quietly.
            smtp_port: 1,
            smtp_username: None,
            smtp_password: None,
        };
        let notifier = Notifier::new(mail, Some(PathBuf::from("/var/log/mirrorcheck")));
        notifier
            .host_failure(&host(), "something broke", Some("detail".to_string()))
            .await;
    }

    #[tokio::test]
    async fn test_enabled_notifier_requires_addresses() {
        let mail = MailConfig {
            send_email: true,
            ..MailConfig::default()
        };
        let notifier = Notifier::new(mail, None);
        notifier.host_failure(&host(), "report", None).await;
    }
}
