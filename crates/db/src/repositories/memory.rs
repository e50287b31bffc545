use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use rfpdesk_core::audit::AuditEvent;
use rfpdesk_core::collaborators::{CollaboratorError, VendorDirectory};
use rfpdesk_core::domain::dispatch::{DispatchKey, DispatchRecord};
use rfpdesk_core::domain::quotation::{Quotation, QuotationId};
use rfpdesk_core::domain::score::VendorScore;
use rfpdesk_core::domain::session::{AccountId, ChatSession, SessionId, SessionStatus};
use rfpdesk_core::domain::template::{EmailTemplate, TemplateId};
use rfpdesk_core::domain::vendor::{VendorId, VendorProfile};

use super::{
    AuditEventRepository, DispatchRepository, QuotationRepository, RepositoryError,
    ScoreRepository, SessionRepository, TemplateRepository,
};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, ChatSession>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<ChatSession>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id.0).cloned())
    }

    async fn save(&self, session: ChatSession) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&session.id.0) {
            if existing.status == SessionStatus::Confirmed {
                return Err(RepositoryError::Conflict(format!(
                    "session {} is confirmed and can no longer change",
                    session.id.0
                )));
            }
        }
        sessions.insert(session.id.0.clone(), session);
        Ok(())
    }

    async fn list_for_owner(&self, owner: &AccountId) -> Result<Vec<ChatSession>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let mut owned =
            sessions.values().filter(|session| &session.owner == owner).cloned().collect::<Vec<_>>();
        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| b.id.cmp(&a.id)));
        Ok(owned)
    }
}

#[derive(Default)]
pub struct InMemoryTemplateRepository {
    templates: RwLock<HashMap<String, EmailTemplate>>,
}

#[async_trait::async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn find_by_id(&self, id: &TemplateId) -> Result<Option<EmailTemplate>, RepositoryError> {
        let templates = self.templates.read().await;
        Ok(templates.get(&id.0).cloned())
    }

    async fn find_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<EmailTemplate>, RepositoryError> {
        let templates = self.templates.read().await;
        Ok(templates.values().find(|template| &template.session_id == session_id).cloned())
    }

    async fn insert_for_session(
        &self,
        template: EmailTemplate,
    ) -> Result<EmailTemplate, RepositoryError> {
        let mut templates = self.templates.write().await;
        if let Some(existing) =
            templates.values().find(|stored| stored.session_id == template.session_id)
        {
            return Ok(existing.clone());
        }
        templates.insert(template.id.0.clone(), template.clone());
        Ok(template)
    }

    async fn list_for_owner(
        &self,
        owner: &AccountId,
    ) -> Result<Vec<EmailTemplate>, RepositoryError> {
        let templates = self.templates.read().await;
        let mut owned = templates
            .values()
            .filter(|template| &template.owner == owner)
            .cloned()
            .collect::<Vec<_>>();
        owned.sort_by(|a, b| b.generated_at.cmp(&a.generated_at).then_with(|| b.id.cmp(&a.id)));
        Ok(owned)
    }
}

#[derive(Default)]
pub struct InMemoryDispatchRepository {
    records: RwLock<BTreeMap<DispatchKey, DispatchRecord>>,
}

#[async_trait::async_trait]
impl DispatchRepository for InMemoryDispatchRepository {
    async fn find(&self, key: &DispatchKey) -> Result<Option<DispatchRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(key).cloned())
    }

    async fn save(&self, record: DispatchRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        if records.get(&record.key).is_some_and(DispatchRecord::is_sent) {
            return Err(RepositoryError::Conflict(format!(
                "dispatch {} is already sent",
                record.key
            )));
        }
        records.insert(record.key.clone(), record);
        Ok(())
    }

    async fn list_for_template(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<DispatchRecord>, RepositoryError> {
        // BTreeMap keys order by template, then vendor.
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|record| &record.key.template_id == template_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryQuotationRepository {
    quotations: RwLock<Vec<Quotation>>,
}

#[async_trait::async_trait]
impl QuotationRepository for InMemoryQuotationRepository {
    async fn insert_if_absent(&self, quotation: Quotation) -> Result<bool, RepositoryError> {
        let mut quotations = self.quotations.write().await;
        if quotations.iter().any(|stored| stored.message_id == quotation.message_id) {
            return Ok(false);
        }
        quotations.push(quotation);
        Ok(true)
    }

    async fn find_by_id(&self, id: &QuotationId) -> Result<Option<Quotation>, RepositoryError> {
        let quotations = self.quotations.read().await;
        Ok(quotations.iter().find(|quotation| &quotation.id == id).cloned())
    }

    async fn list_for_template(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<Quotation>, RepositoryError> {
        let quotations = self.quotations.read().await;
        let mut listed = quotations
            .iter()
            .filter(|quotation| &quotation.key.template_id == template_id)
            .cloned()
            .collect::<Vec<_>>();
        listed.sort_by(|a, b| {
            a.received_at.cmp(&b.received_at).then_with(|| a.message_id.cmp(&b.message_id))
        });
        Ok(listed)
    }

    async fn mark_reviewed(
        &self,
        id: &QuotationId,
        notes: Option<String>,
    ) -> Result<Option<Quotation>, RepositoryError> {
        let mut quotations = self.quotations.write().await;
        let Some(quotation) = quotations.iter_mut().find(|quotation| &quotation.id == id) else {
            return Ok(None);
        };
        quotation.is_reviewed = true;
        if notes.is_some() {
            quotation.notes = notes;
        }
        Ok(Some(quotation.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryScoreRepository {
    scores: RwLock<HashMap<String, Vec<VendorScore>>>,
}

#[async_trait::async_trait]
impl ScoreRepository for InMemoryScoreRepository {
    async fn replace_for_template(
        &self,
        template_id: &TemplateId,
        mut scores: Vec<VendorScore>,
    ) -> Result<(), RepositoryError> {
        if scores.iter().any(|score| &score.template_id != template_id) {
            return Err(RepositoryError::Conflict(format!(
                "score set for {} contains rows of another template",
                template_id.0
            )));
        }
        scores.sort_by_key(|score| score.rank);
        if scores.windows(2).any(|pair| pair[0].rank == pair[1].rank) {
            return Err(RepositoryError::Conflict(format!(
                "score set for {} repeats a rank",
                template_id.0
            )));
        }

        let mut stored = self.scores.write().await;
        stored.insert(template_id.0.clone(), scores);
        Ok(())
    }

    async fn list_for_template(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<VendorScore>, RepositoryError> {
        let stored = self.scores.read().await;
        Ok(stored.get(&template_id.0).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryAuditEventRepository {
    events: RwLock<Vec<AuditEvent>>,
}

#[async_trait::async_trait]
impl AuditEventRepository for InMemoryAuditEventRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn list_for_template(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| event.template_id.as_ref() == Some(template_id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryVendorDirectory {
    vendors: RwLock<BTreeMap<VendorId, VendorProfile>>,
}

impl InMemoryVendorDirectory {
    pub async fn insert(&self, vendor: VendorProfile) {
        self.vendors.write().await.insert(vendor.id, vendor);
    }

    pub async fn remove(&self, vendor_id: VendorId) -> Option<VendorProfile> {
        self.vendors.write().await.remove(&vendor_id)
    }
}

#[async_trait::async_trait]
impl VendorDirectory for InMemoryVendorDirectory {
    async fn get_by_id(&self, vendor_id: VendorId) -> Result<VendorProfile, CollaboratorError> {
        let vendors = self.vendors.read().await;
        vendors
            .get(&vendor_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(format!("vendor {vendor_id}")))
    }

    async fn list_all(&self) -> Result<Vec<VendorProfile>, CollaboratorError> {
        Ok(self.vendors.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use rfpdesk_core::domain::dispatch::{DispatchKey, DispatchRecord};
    use rfpdesk_core::domain::session::{AccountId, ChatSession, SessionStatus};
    use rfpdesk_core::domain::template::EmailTemplate;
    use rfpdesk_core::domain::vendor::VendorId;

    use crate::repositories::{
        DispatchRepository, InMemoryDispatchRepository, InMemorySessionRepository,
        InMemoryTemplateRepository, RepositoryError, SessionRepository, TemplateRepository,
    };

    fn owner() -> AccountId {
        AccountId("buyer@acme.test".to_string())
    }

    #[tokio::test]
    async fn in_memory_sessions_mirror_sql_guards() {
        let repo = InMemorySessionRepository::default();
        let now = Utc::now();
        let older = ChatSession::start(owner(), now - Duration::minutes(1));
        let mut newer = ChatSession::start(owner(), now);
        repo.save(older.clone()).await.expect("older");
        newer.status = SessionStatus::Confirmed;
        repo.save(newer.clone()).await.expect("newer");

        let ids = repo
            .list_for_owner(&owner())
            .await
            .expect("list")
            .into_iter()
            .map(|session| session.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![newer.id.clone(), older.id]);

        let error = repo.save(newer).await.expect_err("confirmed is final");
        assert!(matches!(error, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn in_memory_template_insert_converges_per_session() {
        let repo = InMemoryTemplateRepository::default();
        let session = ChatSession::start(owner(), Utc::now());
        let first =
            EmailTemplate::finalize(session.id.clone(), owner(), "RFP", "Body", Utc::now())
                .expect("first");
        let second =
            EmailTemplate::finalize(session.id.clone(), owner(), "Other", "Other", Utc::now())
                .expect("second");

        assert_eq!(repo.insert_for_session(first.clone()).await.expect("insert"), first);
        assert_eq!(repo.insert_for_session(second).await.expect("insert"), first);
    }

    #[tokio::test]
    async fn in_memory_dispatch_rejects_overwriting_sent() {
        let repo = InMemoryDispatchRepository::default();
        let key = DispatchKey::new(
            rfpdesk_core::domain::template::TemplateId("T-1".to_string()),
            VendorId(1),
        );
        let mut record =
            DispatchRecord::pending(key.clone(), owner(), "Vendor 1", "v1@supply.test", Utc::now());
        record.mark_sent("thr", "msg", Utc::now()).expect("sent");
        repo.save(record).await.expect("save sent");

        let stale = DispatchRecord::pending(key, owner(), "Vendor 1", "v1@supply.test", Utc::now());
        assert!(matches!(repo.save(stale).await, Err(RepositoryError::Conflict(_))));
    }
}
