//! crates/flashcard_core/src/review.rs
//!
//! The acceptance / rejection workflow. Accepting is a two-step saga: study items
//! are created first, then the source proposals are flipped to `accepted`. If the
//! first step fails nothing changes. If only the second step fails the items are
//! kept and the proposals stay `pending`, which is logged and reported but not
//! treated as a failure.

use crate::domain::{
    char_len_within, Collection, CollectionTarget, NewStudyItem, Proposal, ProposalEdit,
    ProposalStatus, SessionId, StudyItem, ANSWER_MAX_CHARS, ANSWER_MIN_CHARS,
    COLLECTION_NAME_MAX_CHARS, DOMAIN_MAX_CHARS, QUESTION_MAX_CHARS, QUESTION_MIN_CHARS,
};
use crate::error::{ServiceError, ServiceResult};
use crate::ports::{CollectionStore, ProposalStore, StudyItemStore};
use crate::scheduler::Scheduler;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outcome of an accept call.
#[derive(Debug, Clone)]
pub struct AcceptanceReport {
    pub collection_id: Uuid,
    pub items: Vec<StudyItem>,
    pub accepted_count: usize,
    /// Requested ids that were not pending proposals of the caller.
    pub skipped_ids: Vec<Uuid>,
    /// True when the items exist but the proposals could not be marked accepted.
    pub status_update_pending: bool,
}

enum ResolvedTarget {
    Existing(Collection),
    New(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectionReport {
    pub affected: u64,
    pub deleted: bool,
}

pub struct ReviewWorkflow {
    proposals: Arc<dyn ProposalStore>,
    collections: Arc<dyn CollectionStore>,
    items: Arc<dyn StudyItemStore>,
    scheduler: Arc<Scheduler>,
}

impl ReviewWorkflow {
    pub fn new(
        proposals: Arc<dyn ProposalStore>,
        collections: Arc<dyn CollectionStore>,
        items: Arc<dyn StudyItemStore>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            proposals,
            collections,
            items,
            scheduler,
        }
    }

    /// Commits every pending proposal of a session into an existing collection.
    pub async fn accept_session(
        &self,
        owner_id: Uuid,
        session_id: &SessionId,
        collection_id: Uuid,
    ) -> ServiceResult<AcceptanceReport> {
        let collection = self.owned_collection(owner_id, collection_id).await?;
        let pending = self.proposals.list_by_session(owner_id, session_id).await?;
        if pending.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "No pending proposals for session {}",
                session_id
            )));
        }
        self.commit(owner_id, &collection, pending, Vec::new()).await
    }

    /// Commits an explicit selection of pending proposals, creating the target
    /// collection first when asked to.
    pub async fn accept_selected(
        &self,
        owner_id: Uuid,
        proposal_ids: &[Uuid],
        target: CollectionTarget,
    ) -> ServiceResult<AcceptanceReport> {
        if proposal_ids.is_empty() {
            return Err(ServiceError::validation("Select at least one proposal"));
        }
        // Ownership and naming are checked before anything is read or written.
        let resolved = match target {
            CollectionTarget::Existing(id) => {
                ResolvedTarget::Existing(self.owned_collection(owner_id, id).await?)
            }
            CollectionTarget::New { name } => ResolvedTarget::New(validate_collection_name(&name)?),
        };

        let pending = self.proposals.list_pending(owner_id, proposal_ids).await?;
        if pending.is_empty() {
            return Err(ServiceError::NotFound(
                "None of the selected proposals are pending".to_string(),
            ));
        }
        let skipped: Vec<Uuid> = proposal_ids
            .iter()
            .copied()
            .filter(|id| !pending.iter().any(|p| p.id == *id))
            .collect();

        let collection = match resolved {
            ResolvedTarget::Existing(collection) => collection,
            ResolvedTarget::New(name) => {
                let created = self.collections.create_collection(owner_id, &name).await?;
                info!("Created collection {} for owner {}.", created.id, owner_id);
                created
            }
        };
        self.commit(owner_id, &collection, pending, skipped).await
    }

    /// Rejects proposals, either by marking them `rejected` or by deleting them.
    /// Repeating a rejection is a harmless no-op.
    pub async fn reject(
        &self,
        owner_id: Uuid,
        proposal_ids: &[Uuid],
        delete: bool,
    ) -> ServiceResult<RejectionReport> {
        if proposal_ids.is_empty() {
            return Ok(RejectionReport {
                affected: 0,
                deleted: delete,
            });
        }
        let affected = if delete {
            self.proposals.bulk_delete(owner_id, proposal_ids).await?
        } else {
            self.proposals
                .bulk_set_status(owner_id, proposal_ids, ProposalStatus::Rejected)
                .await?
        };
        info!(
            "Rejected {} proposals for owner {} (delete = {}).",
            affected, owner_id, delete
        );
        Ok(RejectionReport {
            affected,
            deleted: delete,
        })
    }

    /// Edits a pending proposal after re-checking the content bounds.
    pub async fn edit(
        &self,
        owner_id: Uuid,
        proposal_id: Uuid,
        edit: ProposalEdit,
    ) -> ServiceResult<Proposal> {
        let mut details = Vec::new();
        if let Some(question) = &edit.question {
            if !char_len_within(question.trim(), QUESTION_MIN_CHARS, QUESTION_MAX_CHARS) {
                details.push(format!(
                    "question must be {}-{} characters",
                    QUESTION_MIN_CHARS, QUESTION_MAX_CHARS
                ));
            }
        }
        if let Some(answer) = &edit.answer {
            if !char_len_within(answer.trim(), ANSWER_MIN_CHARS, ANSWER_MAX_CHARS) {
                details.push(format!(
                    "answer must be {}-{} characters",
                    ANSWER_MIN_CHARS, ANSWER_MAX_CHARS
                ));
            }
        }
        if edit.is_empty() {
            details.push("nothing to update".to_string());
        }
        if !details.is_empty() {
            return Err(ServiceError::validation_with("Invalid proposal edit", details));
        }

        let edit = ProposalEdit {
            question: edit.question.map(|q| q.trim().to_string()),
            answer: edit.answer.map(|a| a.trim().to_string()),
            image_url: edit.image_url,
        };
        Ok(self.proposals.update(owner_id, proposal_id, edit).await?)
    }

    /// Relabels every pending proposal of a session.
    pub async fn relabel_session(
        &self,
        owner_id: Uuid,
        session_id: &SessionId,
        domain: Option<&str>,
    ) -> ServiceResult<u64> {
        let domain = domain.map(str::trim).filter(|d| !d.is_empty());
        if domain.is_some_and(|d| d.chars().count() > DOMAIN_MAX_CHARS) {
            return Err(ServiceError::validation(format!(
                "domain must be at most {} characters",
                DOMAIN_MAX_CHARS
            )));
        }
        let touched = self
            .proposals
            .update_domain_for_session(owner_id, session_id, domain)
            .await?;
        if touched == 0 {
            return Err(ServiceError::NotFound(format!(
                "No pending proposals for session {}",
                session_id
            )));
        }
        Ok(touched)
    }

    async fn owned_collection(&self, owner_id: Uuid, collection_id: Uuid) -> ServiceResult<Collection> {
        let collection = self.collections.get_collection(collection_id).await?;
        if collection.owner_id != owner_id {
            warn!(
                "Owner {} tried to write into collection {} owned by someone else.",
                owner_id, collection_id
            );
            return Err(ServiceError::Forbidden(
                "You do not own this collection".to_string(),
            ));
        }
        Ok(collection)
    }

    async fn commit(
        &self,
        owner_id: Uuid,
        collection: &Collection,
        pending: Vec<Proposal>,
        skipped_ids: Vec<Uuid>,
    ) -> ServiceResult<AcceptanceReport> {
        let now = Utc::now();
        let source_ids: Vec<Uuid> = pending.iter().map(|p| p.id).collect();
        let drafts: Vec<NewStudyItem> = pending
            .into_iter()
            .map(|p| NewStudyItem {
                collection_id: collection.id,
                question: p.question,
                answer: p.answer,
                image_url: p.image_url,
                schedule: self.scheduler.initialize(now),
            })
            .collect();

        // Step 1: items. On failure the proposals stay pending for a retry.
        let items = self.items.insert_items(drafts).await.map_err(|e| {
            error!(
                "Failed to create study items in collection {}: {:?}",
                collection.id, e
            );
            ServiceError::from(e)
        })?;

        // Step 2: status. Failure here leaves items without accepted proposals,
        // which is preferred over the reverse.
        let status_update_pending = match self
            .proposals
            .bulk_set_status(owner_id, &source_ids, ProposalStatus::Accepted)
            .await
        {
            Ok(_) => false,
            Err(e) => {
                error!(
                    "Created {} study items in collection {} but could not mark proposals accepted: {:?}",
                    items.len(),
                    collection.id,
                    e
                );
                true
            }
        };

        info!(
            "Accepted {} proposals into collection {}.",
            items.len(),
            collection.id
        );
        Ok(AcceptanceReport {
            collection_id: collection.id,
            accepted_count: items.len(),
            items,
            skipped_ids,
            status_update_pending,
        })
    }
}

fn validate_collection_name(name: &str) -> ServiceResult<String> {
    let trimmed = name.trim();
    if !char_len_within(trimmed, 1, COLLECTION_NAME_MAX_CHARS) {
        return Err(ServiceError::validation(format!(
            "collection name must be 1-{} characters",
            COLLECTION_NAME_MAX_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewProposal, StudyStatus};
    use crate::error::ErrorCode;
    use crate::memory::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        workflow: ReviewWorkflow,
        owner: Uuid,
        session: SessionId,
        proposals: Vec<Proposal>,
    }

    async fn fixture(count: usize) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let owner = Uuid::new_v4();
        let session = SessionId::generate(owner, "source text", Utc::now());
        let drafts = (0..count)
            .map(|n| NewProposal {
                owner_id: owner,
                question: format!("What is the role of enzyme number {} in glycolysis?", n),
                answer: format!("It catalyses step {}", n),
                image_url: None,
                domain: Some("Biochemistry".into()),
                session_id: session.clone(),
            })
            .collect();
        let proposals = store.insert_batch(drafts).await.unwrap();
        let workflow = ReviewWorkflow::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(Scheduler::default()),
        );
        Fixture {
            store,
            workflow,
            owner,
            session,
            proposals,
        }
    }

    #[tokio::test]
    async fn accept_session_creates_due_items_and_resolves_proposals() {
        let f = fixture(3).await;
        let deck = f.store.create_collection(f.owner, "Deck").await.unwrap();

        let report = f
            .workflow
            .accept_session(f.owner, &f.session, deck.id)
            .await
            .unwrap();

        assert_eq!(report.accepted_count, 3);
        assert!(!report.status_update_pending);
        for item in &report.items {
            assert_eq!(item.collection_id, deck.id);
            assert_eq!(item.schedule.status, StudyStatus::Learning);
            assert_eq!(item.schedule.consecutive_correct, 0);
            assert!(item.schedule.due_date <= Utc::now());
        }
        let all = f.store.all_proposals(&f.session).await;
        assert!(all.iter().all(|p| p.status == ProposalStatus::Accepted));

        let again = f.workflow.accept_session(f.owner, &f.session, deck.id).await;
        assert_eq!(again.unwrap_err().code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn foreign_collection_is_forbidden_before_any_mutation() {
        let f = fixture(2).await;
        let theirs = f
            .store
            .create_collection(Uuid::new_v4(), "Not yours")
            .await
            .unwrap();

        let err = f
            .workflow
            .accept_session(f.owner, &f.session, theirs.id)
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert!(f.store.list_items(theirs.id).await.unwrap().is_empty());
        assert_eq!(f.store.list_by_session(f.owner, &f.session).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_item_creation_leaves_proposals_pending() {
        let f = fixture(2).await;
        let deck = f.store.create_collection(f.owner, "Deck").await.unwrap();
        f.store.fail_item_inserts(true);

        let err = f
            .workflow
            .accept_session(f.owner, &f.session, deck.id)
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::InternalError);
        let pending = f.store.list_by_session(f.owner, &f.session).await.unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn failed_status_update_keeps_items_and_reports_it() {
        let f = fixture(2).await;
        let deck = f.store.create_collection(f.owner, "Deck").await.unwrap();
        f.store.fail_status_updates(true);

        let report = f
            .workflow
            .accept_session(f.owner, &f.session, deck.id)
            .await
            .unwrap();

        assert!(report.status_update_pending);
        assert_eq!(f.store.list_items(deck.id).await.unwrap().len(), 2);
        let pending = f.store.list_by_session(f.owner, &f.session).await.unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn accept_selected_into_a_new_collection() {
        let f = fixture(3).await;
        let chosen = vec![f.proposals[0].id, f.proposals[2].id, Uuid::new_v4()];

        let report = f
            .workflow
            .accept_selected(
                f.owner,
                &chosen,
                CollectionTarget::New {
                    name: "  Glycolysis  ".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(report.accepted_count, 2);
        assert_eq!(report.skipped_ids, vec![chosen[2]]);
        let deck = f.store.get_collection(report.collection_id).await.unwrap();
        assert_eq!(deck.name, "Glycolysis");
        let remaining = f.store.list_by_session(f.owner, &f.session).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, f.proposals[1].id);
    }

    #[tokio::test]
    async fn accept_selected_with_nothing_pending_creates_no_collection() {
        let f = fixture(1).await;
        f.workflow
            .reject(f.owner, &[f.proposals[0].id], false)
            .await
            .unwrap();

        let err = f
            .workflow
            .accept_selected(
                f.owner,
                &[f.proposals[0].id],
                CollectionTarget::New { name: "Empty".into() },
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn reject_is_idempotent_in_both_modes() {
        let f = fixture(2).await;
        let first = [f.proposals[0].id];
        let second = [f.proposals[1].id];

        assert_eq!(f.workflow.reject(f.owner, &first, false).await.unwrap().affected, 1);
        assert_eq!(f.workflow.reject(f.owner, &first, false).await.unwrap().affected, 0);
        assert_eq!(f.workflow.reject(f.owner, &second, true).await.unwrap().affected, 1);
        assert_eq!(f.workflow.reject(f.owner, &second, true).await.unwrap().affected, 0);

        let all = f.store.all_proposals(&f.session).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, ProposalStatus::Rejected);
    }

    #[tokio::test]
    async fn deleting_never_touches_accepted_proposals() {
        let f = fixture(2).await;
        let deck = f.store.create_collection(f.owner, "Deck").await.unwrap();
        f.workflow
            .accept_session(f.owner, &f.session, deck.id)
            .await
            .unwrap();
        let ids: Vec<Uuid> = f.proposals.iter().map(|p| p.id).collect();

        assert_eq!(f.workflow.reject(f.owner, &ids, false).await.unwrap().affected, 0);
        assert_eq!(f.workflow.reject(f.owner, &ids, true).await.unwrap().affected, 0);

        let all = f.store.all_proposals(&f.session).await;
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|p| p.status == ProposalStatus::Accepted));
    }

    #[tokio::test]
    async fn edits_are_validated_and_only_apply_to_pending() {
        let f = fixture(1).await;
        let id = f.proposals[0].id;

        let too_short = f
            .workflow
            .edit(
                f.owner,
                id,
                ProposalEdit {
                    question: Some("short?".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(too_short.code(), ErrorCode::ValidationError);

        let updated = f
            .workflow
            .edit(
                f.owner,
                id,
                ProposalEdit {
                    answer: Some("  Hexokinase phosphorylates glucose ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.answer, "Hexokinase phosphorylates glucose");

        let other_owner = f
            .workflow
            .edit(
                Uuid::new_v4(),
                id,
                ProposalEdit {
                    answer: Some("hijack".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(other_owner.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn relabel_touches_every_pending_proposal() {
        let f = fixture(3).await;

        let touched = f
            .workflow
            .relabel_session(f.owner, &f.session, Some("Metabolism"))
            .await
            .unwrap();

        assert_eq!(touched, 3);
        let all = f.store.all_proposals(&f.session).await;
        assert!(all.iter().all(|p| p.domain.as_deref() == Some("Metabolism")));

        let too_long = "x".repeat(101);
        let err = f
            .workflow
            .relabel_session(f.owner, &f.session, Some(too_long.as_str()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }
}
