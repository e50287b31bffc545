use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::AccountId;
use crate::domain::template::TemplateId;
use crate::domain::vendor::VendorId;
use crate::errors::DomainError;

/// Unique key of a dispatch: one record per (template, vendor) pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DispatchKey {
    pub template_id: TemplateId,
    pub vendor_id: VendorId,
}

impl DispatchKey {
    pub fn new(template_id: TemplateId, vendor_id: VendorId) -> Self {
        Self { template_id, vendor_id }
    }
}

impl std::fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.template_id.0, self.vendor_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Pending,
    Sent,
    Failed,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Nothing re-enters `Pending`, nothing leaves `Sent`.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Sent)
                | (Self::Pending, Self::Failed)
                | (Self::Failed, Self::Sent)
                | (Self::Failed, Self::Failed)
        )
    }

    pub fn transition_to(&self, next: Self) -> Result<Self, DomainError> {
        if self.can_transition_to(&next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidDispatchTransition { from: *self, to: next })
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub key: DispatchKey,
    /// Mailbox the template was sent from; thread fetches run as this account.
    pub sender: AccountId,
    pub vendor_name: String,
    pub vendor_email: String,
    pub status: DispatchStatus,
    pub thread_id: Option<String>,
    pub message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DispatchRecord {
    pub fn pending(
        key: DispatchKey,
        sender: AccountId,
        vendor_name: impl Into<String>,
        vendor_email: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            sender,
            vendor_name: vendor_name.into(),
            vendor_email: vendor_email.into(),
            status: DispatchStatus::Pending,
            thread_id: None,
            message_id: None,
            sent_at: None,
            failure_reason: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_sent(&self) -> bool {
        self.status == DispatchStatus::Sent
    }

    pub fn mark_sent(
        &mut self,
        thread_id: impl Into<String>,
        message_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.status = self.status.transition_to(DispatchStatus::Sent)?;
        self.thread_id = Some(thread_id.into());
        self.message_id = Some(message_id.into());
        self.sent_at = Some(now);
        self.failure_reason = None;
        self.attempts += 1;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.status = self.status.transition_to(DispatchStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        self.attempts += 1;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub sent: usize,
    pub failed: usize,
    pub pending: usize,
    pub total: usize,
}

impl DispatchStats {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a DispatchRecord>) -> Self {
        records.into_iter().fold(Self::default(), |mut stats, record| {
            match record.status {
                DispatchStatus::Sent => stats.sent += 1,
                DispatchStatus::Failed => stats.failed += 1,
                DispatchStatus::Pending => stats.pending += 1,
            }
            stats.total += 1;
            stats
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{DispatchKey, DispatchRecord, DispatchStats, DispatchStatus};
    use crate::domain::session::AccountId;
    use crate::domain::template::TemplateId;
    use crate::domain::vendor::VendorId;
    use crate::errors::DomainError;

    fn record(vendor: i64) -> DispatchRecord {
        DispatchRecord::pending(
            DispatchKey::new(TemplateId("T-1".to_owned()), VendorId(vendor)),
            AccountId("buyer@acme.test".to_owned()),
            "Vendor",
            "sales@vendor.test",
            Utc::now(),
        )
    }

    #[test]
    fn transition_table_never_reopens_pending_or_leaves_sent() {
        use DispatchStatus::{Failed, Pending, Sent};

        assert!(Pending.can_transition_to(&Sent));
        assert!(Pending.can_transition_to(&Failed));
        assert!(Failed.can_transition_to(&Sent));
        assert!(Failed.can_transition_to(&Failed));

        assert!(!Failed.can_transition_to(&Pending));
        assert!(!Sent.can_transition_to(&Pending));
        assert!(!Sent.can_transition_to(&Failed));
        assert!(!Sent.can_transition_to(&Sent));
        assert!(!Pending.can_transition_to(&Pending));
    }

    #[test]
    fn failed_record_can_be_retried_into_sent() {
        let mut record = record(1);
        record.mark_failed("smtp 550", Utc::now()).expect("pending -> failed");
        assert_eq!(record.failure_reason.as_deref(), Some("smtp 550"));

        record.mark_sent("thr-1", "msg-1", Utc::now()).expect("failed -> sent");
        assert_eq!(record.status, DispatchStatus::Sent);
        assert_eq!(record.thread_id.as_deref(), Some("thr-1"));
        assert!(record.failure_reason.is_none());
        assert_eq!(record.attempts, 2);

        let error = record.mark_failed("late", Utc::now()).expect_err("sent is terminal");
        assert_eq!(
            error,
            DomainError::InvalidDispatchTransition {
                from: DispatchStatus::Sent,
                to: DispatchStatus::Failed
            }
        );
    }

    #[test]
    fn stats_tally_counts_every_status() {
        let mut sent = record(1);
        sent.mark_sent("thr", "msg", Utc::now()).expect("sent");
        let mut failed = record(2);
        failed.mark_failed("bounce", Utc::now()).expect("failed");
        let pending = record(3);

        let stats = DispatchStats::tally([&sent, &failed, &pending]);
        assert_eq!(stats, DispatchStats { sent: 1, failed: 1, pending: 1, total: 3 });
    }
}
