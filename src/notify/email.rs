//! SMTP notifier: sends group introductions via lettre.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use super::{Notifier, introduction_body, introduction_subject};
use crate::error::NotifyError;
use crate::matching::model::{Group, MemberContact};

// ── Configuration ───────────────────────────────────────────────────

/// SMTP configuration, built from environment variables.
#[derive(Debug)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    /// Where test-mode introductions are redirected. `None` skips sending in test mode.
    pub test_recipient: Option<String>,
}

impl EmailConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMTP_HOST` is not set (notifications disabled).
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;

        let smtp_port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("SMTP_PASSWORD").unwrap_or_default());
        let from_address =
            std::env::var("EMAIL_FROM_ADDRESS").unwrap_or_else(|_| username.clone());
        let test_recipient = std::env::var("EMAIL_TEST_RECIPIENT")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Some(Self {
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
            test_recipient,
        })
    }
}

// ── Notifier ────────────────────────────────────────────────────────

/// One outgoing introduction: the member it stands for and the rendered message.
struct Outgoing {
    user_ids: Vec<String>,
    recipient: String,
    message: Message,
}

/// Sends one introduction per member through an SMTP relay.
pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    test_recipient: Option<String>,
}

impl SmtpNotifier {
    pub fn new(config: EmailConfig) -> Result<Self, NotifyError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&config.smtp_host)
            .map_err(|e| NotifyError::Transport(format!("SMTP relay error: {e}")))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        let from = parse_mailbox(&config.from_address)?;

        Ok(Self {
            transport,
            from,
            test_recipient: config.test_recipient,
        })
    }

    fn build_message(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<Message, NotifyError> {
        Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(to)?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| NotifyError::SendFailed {
                recipient: to.to_string(),
                reason: format!("Failed to build email: {e}"),
            })
    }

    /// Decide who receives what. Test mode collapses everything to one message.
    fn plan(
        &self,
        group: &Group,
        members: &[MemberContact],
        test_mode: bool,
    ) -> Vec<Outgoing> {
        let subject = introduction_subject(group, test_mode);
        let body = introduction_body(group, members);
        let reachable: Vec<&MemberContact> = members
            .iter()
            .filter(|m| m.email.as_deref().is_some_and(|e| parse_mailbox(e).is_ok()))
            .collect();

        if test_mode {
            let Some(recipient) = &self.test_recipient else {
                info!(group_id = %group.id, "Test mode without a test recipient, not sending");
                return Vec::new();
            };
            return match self.build_message(recipient, &subject, &body) {
                Ok(message) => vec![Outgoing {
                    user_ids: reachable.iter().map(|m| m.user_id.clone()).collect(),
                    recipient: recipient.clone(),
                    message,
                }],
                Err(e) => {
                    warn!(group_id = %group.id, error = %e, "Invalid test recipient");
                    Vec::new()
                }
            };
        }

        reachable
            .into_iter()
            .filter_map(|member| {
                let email = member.email.as_deref()?;
                match self.build_message(email, &subject, &body) {
                    Ok(message) => Some(Outgoing {
                        user_ids: vec![member.user_id.clone()],
                        recipient: email.to_string(),
                        message,
                    }),
                    Err(e) => {
                        warn!(user_id = %member.user_id, error = %e, "Skipping member");
                        None
                    }
                }
            })
            .collect()
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|e| NotifyError::InvalidAddress {
        address: address.to_string(),
        reason: format!("{e}"),
    })
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify_group(
        &self,
        group: &Group,
        members: &[MemberContact],
        test_mode: bool,
    ) -> Result<Vec<String>, NotifyError> {
        let outgoing = self.plan(group, members, test_mode);
        if outgoing.is_empty() {
            return Ok(Vec::new());
        }

        // lettre's SmtpTransport is blocking.
        let transport = self.transport.clone();
        let results = tokio::task::spawn_blocking(move || {
            outgoing
                .into_iter()
                .map(|out| {
                    let result = transport.send(&out.message).map(|_| ()).map_err(|e| {
                        NotifyError::SendFailed {
                            recipient: out.recipient.clone(),
                            reason: format!("SMTP send failed: {e}"),
                        }
                    });
                    (out.user_ids, result)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| NotifyError::Transport(format!("send task failed: {e}")))?;

        let mut notified = Vec::new();
        let mut last_error = None;
        for (user_ids, result) in results {
            match result {
                Ok(()) => notified.extend(user_ids),
                Err(e) => {
                    warn!(group_id = %group.id, error = %e, "Introduction email failed");
                    last_error = Some(e);
                }
            }
        }

        match (notified.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => {
                info!(group_id = %group.id, notified = notified.len(), "Introduction emails sent");
                Ok(notified)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::model::{LifeStage, Location};
    use chrono::Utc;

    fn notifier(cfg: EmailConfig) -> Result<SmtpNotifier, NotifyError> {
        // Both rustls providers are in the dependency graph; pick one like main does.
        let _ = rustls::crypto::ring::default_provider().install_default();
        SmtpNotifier::new(cfg)
    }

    fn config(test_recipient: Option<&str>) -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            username: "circles".into(),
            password: SecretString::from("secret".to_string()),
            from_address: "Circles <hello@example.com>".into(),
            test_recipient: test_recipient.map(String::from),
        }
    }

    fn group() -> Group {
        Group::new(
            Location::new("Austin", "TX"),
            LifeStage::Toddler,
            1,
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            false,
            Utc::now(),
        )
    }

    fn members() -> Vec<MemberContact> {
        vec![
            MemberContact {
                user_id: "a".into(),
                name: Some("Al".into()),
                email: Some("al@example.com".into()),
            },
            MemberContact {
                user_id: "b".into(),
                name: Some("Bo".into()),
                email: None,
            },
            MemberContact {
                user_id: "c".into(),
                name: Some("Cy".into()),
                email: Some("not an address".into()),
            },
            MemberContact {
                user_id: "d".into(),
                name: Some("Di".into()),
                email: Some("di@example.com".into()),
            },
        ]
    }

    #[test]
    fn live_mode_sends_one_per_valid_address() {
        let notifier = notifier(config(None)).unwrap();
        let plan = notifier.plan(&group(), &members(), false);
        let recipients: Vec<_> = plan.iter().map(|o| o.recipient.as_str()).collect();
        assert_eq!(recipients, ["al@example.com", "di@example.com"]);
        assert_eq!(plan[0].user_ids, ["a"]);
    }

    #[test]
    fn test_mode_redirects_to_test_recipient() {
        let notifier = notifier(config(Some("qa@example.com"))).unwrap();
        let plan = notifier.plan(&group(), &members(), true);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].recipient, "qa@example.com");
        assert_eq!(plan[0].user_ids, ["a", "d"]);
    }

    #[test]
    fn test_mode_without_recipient_sends_nothing() {
        let notifier = notifier(config(None)).unwrap();
        assert!(notifier.plan(&group(), &members(), true).is_empty());
    }

    #[tokio::test]
    async fn nothing_to_send_is_not_an_error() {
        let notifier = notifier(config(None)).unwrap();
        let notified = notifier.notify_group(&group(), &members(), true).await.unwrap();
        assert!(notified.is_empty());
    }

    #[test]
    fn invalid_from_address_is_rejected() {
        let mut cfg = config(None);
        cfg.from_address = "nope".into();
        assert!(matches!(
            notifier(cfg),
            Err(NotifyError::InvalidAddress { .. })
        ));
    }
}
