//! crates/flashcard_core/src/practice.rs
//!
//! Practice-time operations over committed study items: building the due queue of a
//! collection and recording answers through the scheduler.

use crate::domain::{Collection, StudyItem};
use crate::error::{ServiceError, ServiceResult};
use crate::ports::{CollectionStore, StudyItemStore};
use crate::scheduler::{due_queue, Scheduler};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct PracticeService {
    collections: Arc<dyn CollectionStore>,
    items: Arc<dyn StudyItemStore>,
    scheduler: Arc<Scheduler>,
}

impl PracticeService {
    pub fn new(
        collections: Arc<dyn CollectionStore>,
        items: Arc<dyn StudyItemStore>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            collections,
            items,
            scheduler,
        }
    }

    /// Items of a collection that are due at `now`, earliest-overdue first.
    pub async fn due_items(
        &self,
        owner_id: Uuid,
        collection_id: Uuid,
        now: DateTime<Utc>,
    ) -> ServiceResult<Vec<StudyItem>> {
        self.owned_collection(owner_id, collection_id).await?;
        let items = self.items.list_items(collection_id).await?;
        Ok(due_queue(&items, now).into_iter().cloned().collect())
    }

    /// Records one practice answer and persists the resulting schedule.
    pub async fn answer(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> ServiceResult<StudyItem> {
        let item = self.owned_item(owner_id, item_id).await?;
        let next = self.scheduler.advance(&item.schedule, is_correct, now);
        let saved = self.items.save_schedule(item_id, &next).await?;
        info!(
            "Item {} answered {}; interval {} -> {}, status {}.",
            item_id,
            if is_correct { "correctly" } else { "incorrectly" },
            item.schedule.interval,
            saved.schedule.interval,
            saved.schedule.status.as_str()
        );
        Ok(saved)
    }

    /// Puts an item back at the start of learning, due immediately.
    pub async fn reset(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> ServiceResult<StudyItem> {
        self.owned_item(owner_id, item_id).await?;
        let fresh = self.scheduler.initialize(now);
        Ok(self.items.save_schedule(item_id, &fresh).await?)
    }

    async fn owned_item(&self, owner_id: Uuid, item_id: Uuid) -> ServiceResult<StudyItem> {
        let item = self.items.get_item(item_id).await?;
        self.owned_collection(owner_id, item.collection_id).await?;
        Ok(item)
    }

    async fn owned_collection(&self, owner_id: Uuid, collection_id: Uuid) -> ServiceResult<Collection> {
        let collection = self.collections.get_collection(collection_id).await?;
        if collection.owner_id != owner_id {
            warn!(
                "Owner {} denied access to collection {}.",
                owner_id, collection_id
            );
            return Err(ServiceError::Forbidden(
                "You do not own this collection".to_string(),
            ));
        }
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewStudyItem, StudyStatus};
    use crate::error::ErrorCode;
    use crate::memory::InMemoryStore;
    use crate::scheduler::DoublingPolicy;
    use chrono::Duration;

    async fn seeded(threshold: u32) -> (PracticeService, Arc<InMemoryStore>, Uuid, Collection) {
        let store = Arc::new(InMemoryStore::new());
        let scheduler = Arc::new(
            Scheduler::new(Arc::new(DoublingPolicy::default()), threshold).unwrap(),
        );
        let owner = Uuid::new_v4();
        let deck = store.create_collection(owner, "Deck").await.unwrap();
        let now = Utc::now();
        store
            .insert_items(vec![NewStudyItem {
                collection_id: deck.id,
                question: "Which layer of the OSI model does TCP belong to?".into(),
                answer: "Transport".into(),
                image_url: None,
                schedule: scheduler.initialize(now - Duration::minutes(5)),
            }])
            .await
            .unwrap();
        (
            PracticeService::new(store.clone(), store.clone(), scheduler),
            store,
            owner,
            deck,
        )
    }

    #[tokio::test]
    async fn answering_moves_item_out_of_the_due_queue() {
        let (practice, _store, owner, deck) = seeded(5).await;
        let now = Utc::now();
        let due = practice.due_items(owner, deck.id, now).await.unwrap();
        assert_eq!(due.len(), 1);

        let answered = practice.answer(owner, due[0].id, true, now).await.unwrap();

        assert_eq!(answered.schedule.consecutive_correct, 1);
        assert!(answered.schedule.due_date > now);
        assert!(practice.due_items(owner, deck.id, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mastered_items_leave_the_queue_until_reset() {
        let (practice, _store, owner, deck) = seeded(2).await;
        let now = Utc::now();
        let id = practice.due_items(owner, deck.id, now).await.unwrap()[0].id;

        practice.answer(owner, id, true, now).await.unwrap();
        let mastered = practice.answer(owner, id, true, now).await.unwrap();
        assert_eq!(mastered.schedule.status, StudyStatus::Mastered);

        let far_future = now + Duration::days(400);
        assert!(practice.due_items(owner, deck.id, far_future).await.unwrap().is_empty());

        let reset = practice.reset(owner, id, now).await.unwrap();
        assert_eq!(reset.schedule.status, StudyStatus::Learning);
        assert_eq!(practice.due_items(owner, deck.id, now).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn strangers_cannot_answer_or_list() {
        let (practice, _store, owner, deck) = seeded(5).await;
        let now = Utc::now();
        let id = practice.due_items(owner, deck.id, now).await.unwrap()[0].id;
        let stranger = Uuid::new_v4();

        let list = practice.due_items(stranger, deck.id, now).await.unwrap_err();
        let answer = practice.answer(stranger, id, true, now).await.unwrap_err();

        assert_eq!(list.code(), ErrorCode::Forbidden);
        assert_eq!(answer.code(), ErrorCode::Forbidden);
    }
}
