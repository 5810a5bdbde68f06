//! crates/flashcard_core/src/memory.rs
//!
//! An in-process storage engine implementing every store port. Used when no database
//! is configured and as the backing store in tests. Each operation takes the single
//! table lock once, which gives the same all-or-nothing batch semantics a relational
//! store provides.

use crate::domain::{
    Collection, NewProposal, NewStudyItem, Proposal, ProposalEdit, ProposalStatus, Schedule,
    SessionId, StudyItem,
};
use crate::ports::{
    AuthSessionStore, CollectionStore, PortError, PortResult, ProposalStore, SessionCheck,
    StudyItemStore,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    proposals: Vec<Proposal>,
    collections: HashMap<Uuid, Collection>,
    items: Vec<StudyItem>,
    auth_sessions: HashMap<String, Uuid>,
}

/// Switches that make the next writes fail, for exercising failure paths.
#[derive(Default)]
struct Faults {
    proposal_inserts: AtomicBool,
    item_inserts: AtomicBool,
    status_updates: AtomicBool,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    faults: Faults,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a credential that [`AuthSessionStore::validate_auth_session`] will accept.
    pub async fn insert_auth_session(&self, token: &str, owner_id: Uuid) {
        self.tables
            .lock()
            .await
            .auth_sessions
            .insert(token.to_string(), owner_id);
    }

    /// All proposals of a session regardless of status, oldest first.
    pub async fn all_proposals(&self, session_id: &SessionId) -> Vec<Proposal> {
        self.tables
            .lock()
            .await
            .proposals
            .iter()
            .filter(|p| &p.session_id == session_id)
            .cloned()
            .collect()
    }

    pub async fn proposal_count(&self) -> usize {
        self.tables.lock().await.proposals.len()
    }

    pub fn fail_proposal_inserts(&self, fail: bool) {
        self.faults.proposal_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_item_inserts(&self, fail: bool) {
        self.faults.item_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status_updates(&self, fail: bool) {
        self.faults.status_updates.store(fail, Ordering::SeqCst);
    }

    /// A [`SessionCheck`] that reads this store on behalf of one owner.
    pub fn session_check(self: &Arc<Self>, owner_id: Uuid) -> OwnerSessionCheck {
        OwnerSessionCheck {
            store: self.clone(),
            owner_id,
        }
    }
}

fn injected(flag: &AtomicBool, what: &str) -> PortResult<()> {
    if flag.load(Ordering::SeqCst) {
        return Err(PortError::Unexpected(format!("injected {} failure", what)));
    }
    Ok(())
}

fn is_pending_for(proposal: &Proposal, owner_id: Uuid) -> bool {
    proposal.owner_id == owner_id && proposal.status == ProposalStatus::Pending
}

#[async_trait]
impl ProposalStore for InMemoryStore {
    async fn insert_batch(&self, proposals: Vec<NewProposal>) -> PortResult<Vec<Proposal>> {
        injected(&self.faults.proposal_inserts, "proposal insert")?;
        let now = Utc::now();
        let inserted: Vec<Proposal> = proposals
            .into_iter()
            .map(|p| Proposal {
                id: Uuid::new_v4(),
                owner_id: p.owner_id,
                question: p.question,
                answer: p.answer,
                image_url: p.image_url,
                domain: p.domain,
                session_id: p.session_id,
                status: ProposalStatus::Pending,
                created_at: now,
                updated_at: now,
            })
            .collect();
        self.tables
            .lock()
            .await
            .proposals
            .extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn list_by_session(
        &self,
        owner_id: Uuid,
        session_id: &SessionId,
    ) -> PortResult<Vec<Proposal>> {
        let tables = self.tables.lock().await;
        let mut found: Vec<Proposal> = tables
            .proposals
            .iter()
            .filter(|p| &p.session_id == session_id && is_pending_for(p, owner_id))
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }

    async fn list_pending(&self, owner_id: Uuid, ids: &[Uuid]) -> PortResult<Vec<Proposal>> {
        let tables = self.tables.lock().await;
        let mut found: Vec<Proposal> = tables
            .proposals
            .iter()
            .filter(|p| ids.contains(&p.id) && is_pending_for(p, owner_id))
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }

    async fn update(&self, owner_id: Uuid, id: Uuid, edit: ProposalEdit) -> PortResult<Proposal> {
        let mut tables = self.tables.lock().await;
        let proposal = tables
            .proposals
            .iter_mut()
            .find(|p| p.id == id && is_pending_for(p, owner_id))
            .ok_or_else(|| PortError::NotFound(format!("Pending proposal {} not found", id)))?;

        if let Some(question) = edit.question {
            proposal.question = question;
        }
        if let Some(answer) = edit.answer {
            proposal.answer = answer;
        }
        if let Some(image_url) = edit.image_url {
            proposal.image_url = Some(image_url);
        }
        proposal.updated_at = Utc::now();
        Ok(proposal.clone())
    }

    async fn update_domain_for_session(
        &self,
        owner_id: Uuid,
        session_id: &SessionId,
        domain: Option<&str>,
    ) -> PortResult<u64> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let mut touched = 0;
        for proposal in tables
            .proposals
            .iter_mut()
            .filter(|p| &p.session_id == session_id && is_pending_for(p, owner_id))
        {
            proposal.domain = domain.map(str::to_string);
            proposal.updated_at = now;
            touched += 1;
        }
        Ok(touched)
    }

    async fn bulk_set_status(
        &self,
        owner_id: Uuid,
        ids: &[Uuid],
        status: ProposalStatus,
    ) -> PortResult<u64> {
        injected(&self.faults.status_updates, "status update")?;
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let mut touched = 0;
        for proposal in tables
            .proposals
            .iter_mut()
            .filter(|p| ids.contains(&p.id) && is_pending_for(p, owner_id))
        {
            proposal.status = status;
            proposal.updated_at = now;
            touched += 1;
        }
        Ok(touched)
    }

    async fn bulk_delete(&self, owner_id: Uuid, ids: &[Uuid]) -> PortResult<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.proposals.len();
        tables
            .proposals
            .retain(|p| !(ids.contains(&p.id) && is_pending_for(p, owner_id)));
        Ok((before - tables.proposals.len()) as u64)
    }
}

#[async_trait]
impl CollectionStore for InMemoryStore {
    async fn get_collection(&self, collection_id: Uuid) -> PortResult<Collection> {
        self.tables
            .lock()
            .await
            .collections
            .get(&collection_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Collection {} not found", collection_id)))
    }

    async fn create_collection(&self, owner_id: Uuid, name: &str) -> PortResult<Collection> {
        let collection = Collection {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.tables
            .lock()
            .await
            .collections
            .insert(collection.id, collection.clone());
        Ok(collection)
    }
}

#[async_trait]
impl StudyItemStore for InMemoryStore {
    async fn insert_items(&self, items: Vec<NewStudyItem>) -> PortResult<Vec<StudyItem>> {
        injected(&self.faults.item_inserts, "study item insert")?;
        let mut tables = self.tables.lock().await;
        if let Some(missing) = items
            .iter()
            .find(|item| !tables.collections.contains_key(&item.collection_id))
        {
            return Err(PortError::NotFound(format!(
                "Collection {} not found",
                missing.collection_id
            )));
        }

        let now = Utc::now();
        let inserted: Vec<StudyItem> = items
            .into_iter()
            .map(|item| StudyItem {
                id: Uuid::new_v4(),
                collection_id: item.collection_id,
                question: item.question,
                answer: item.answer,
                image_url: item.image_url,
                schedule: item.schedule,
                created_at: now,
                updated_at: now,
            })
            .collect();
        tables.items.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn get_item(&self, item_id: Uuid) -> PortResult<StudyItem> {
        self.tables
            .lock()
            .await
            .items
            .iter()
            .find(|item| item.id == item_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Study item {} not found", item_id)))
    }

    async fn list_items(&self, collection_id: Uuid) -> PortResult<Vec<StudyItem>> {
        Ok(self
            .tables
            .lock()
            .await
            .items
            .iter()
            .filter(|item| item.collection_id == collection_id)
            .cloned()
            .collect())
    }

    async fn save_schedule(&self, item_id: Uuid, schedule: &Schedule) -> PortResult<StudyItem> {
        let mut tables = self.tables.lock().await;
        let item = tables
            .items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| PortError::NotFound(format!("Study item {} not found", item_id)))?;
        item.schedule = *schedule;
        item.updated_at = Utc::now();
        Ok(item.clone())
    }
}

#[async_trait]
impl AuthSessionStore for InMemoryStore {
    async fn validate_auth_session(&self, token: &str) -> PortResult<Uuid> {
        self.tables
            .lock()
            .await
            .auth_sessions
            .get(token)
            .copied()
            .ok_or(PortError::Unauthorized)
    }
}

/// Reads a session's pending proposals straight from an [`InMemoryStore`].
#[derive(Clone)]
pub struct OwnerSessionCheck {
    store: Arc<InMemoryStore>,
    owner_id: Uuid,
}

#[async_trait]
impl SessionCheck for OwnerSessionCheck {
    async fn fetch_proposals(&self, session_id: &SessionId) -> PortResult<Vec<Proposal>> {
        self.store.list_by_session(self.owner_id, session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(owner_id: Uuid, session_id: &SessionId, n: usize) -> NewProposal {
        NewProposal {
            owner_id,
            question: format!("Question number {} that is long enough to pass validation", n),
            answer: format!("Answer {}", n),
            image_url: None,
            domain: None,
            session_id: session_id.clone(),
        }
    }

    #[tokio::test]
    async fn status_changes_only_touch_pending_rows_of_the_owner() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let session = SessionId::parse("gen_store_test").unwrap();
        let inserted = store
            .insert_batch(vec![draft(owner, &session, 1), draft(owner, &session, 2)])
            .await
            .unwrap();
        let ids: Vec<Uuid> = inserted.iter().map(|p| p.id).collect();

        assert_eq!(
            store
                .bulk_set_status(stranger, &ids, ProposalStatus::Accepted)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            store
                .bulk_set_status(owner, &ids[..1], ProposalStatus::Rejected)
                .await
                .unwrap(),
            1
        );
        // A resolved proposal is never overwritten.
        assert_eq!(
            store
                .bulk_set_status(owner, &ids, ProposalStatus::Accepted)
                .await
                .unwrap(),
            1
        );

        let all = store.all_proposals(&session).await;
        assert_eq!(all[0].status, ProposalStatus::Rejected);
        assert_eq!(all[1].status, ProposalStatus::Accepted);
        assert!(store.list_by_session(owner, &session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn editing_a_resolved_proposal_is_not_found() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let session = SessionId::parse("gen_edit_test").unwrap();
        let inserted = store
            .insert_batch(vec![draft(owner, &session, 1)])
            .await
            .unwrap();
        store
            .bulk_set_status(owner, &[inserted[0].id], ProposalStatus::Accepted)
            .await
            .unwrap();

        let err = store
            .update(
                owner,
                inserted[0].id,
                ProposalEdit {
                    answer: Some("changed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn item_batch_referencing_unknown_collection_inserts_nothing() {
        let store = InMemoryStore::new();
        let collection = store.create_collection(Uuid::new_v4(), "Deck").await.unwrap();
        let schedule = crate::scheduler::Scheduler::default().initialize(Utc::now());
        let item = |collection_id| NewStudyItem {
            collection_id,
            question: "q".into(),
            answer: "a".into(),
            image_url: None,
            schedule,
        };

        let result = store
            .insert_items(vec![item(collection.id), item(Uuid::new_v4())])
            .await;

        assert!(result.is_err());
        assert!(store.list_items(collection.id).await.unwrap().is_empty());
    }
}
