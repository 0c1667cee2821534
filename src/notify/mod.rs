//! Group introduction notifications.
//!
//! The engine hands each freshly committed group to a `Notifier` and records
//! whichever members it reports as reached. Delivery never affects group
//! membership.

pub mod email;

use async_trait::async_trait;

use crate::error::NotifyError;
use crate::matching::model::{Group, MemberContact};

pub use email::{EmailConfig, SmtpNotifier};

/// Delivers the introduction for a newly formed group.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notify members and return the IDs of those successfully reached.
    async fn notify_group(
        &self,
        group: &Group,
        members: &[MemberContact],
        test_mode: bool,
    ) -> Result<Vec<String>, NotifyError>;
}

/// Subject line for a group introduction.
pub fn introduction_subject(group: &Group, test_mode: bool) -> String {
    let subject = format!("Meet your circle: {}", group.name);
    if test_mode {
        format!("[TEST] {subject}")
    } else {
        subject
    }
}

/// Plain-text body introducing the members to each other.
pub fn introduction_body(group: &Group, members: &[MemberContact]) -> String {
    let mut lines = vec![
        format!(
            "You've been matched with {} other {} dads in {}.",
            members.len().saturating_sub(1),
            group.life_stage.as_str().to_lowercase(),
            group.location
        ),
        String::new(),
        "Your group:".to_string(),
    ];
    for member in members {
        let name = member
            .name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
            .unwrap_or("A fellow dad");
        match &member.email {
            Some(email) => lines.push(format!("- {name} <{email}>")),
            None => lines.push(format!("- {name}")),
        }
    }
    lines.push(String::new());
    lines.push("Reply-all to say hello and pick a time to meet up.".to_string());
    lines.join("\n")
}
