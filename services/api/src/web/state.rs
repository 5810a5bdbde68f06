//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use flashcard_core::generation::GenerationOrchestrator;
use flashcard_core::ports::{
    AuthSessionStore, CollectionStore, FlashcardGenerationService, ProposalStore, StudyItemStore,
};
use flashcard_core::practice::PracticeService;
use flashcard_core::review::ReviewWorkflow;
use flashcard_core::scheduler::{DoublingPolicy, Scheduler, SchedulerError};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
/// Handlers are stateless; everything here is either configuration or a service
/// that defers to the storage engine for atomicity.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<dyn AuthSessionStore>,
    pub proposals: Arc<dyn ProposalStore>,
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub review: Arc<ReviewWorkflow>,
    pub practice: Arc<PracticeService>,
}

impl AppState {
    /// Wires every service onto a single storage engine.
    pub fn build<S>(
        config: Arc<Config>,
        store: Arc<S>,
        generator: Arc<dyn FlashcardGenerationService>,
    ) -> Result<Self, SchedulerError>
    where
        S: ProposalStore + CollectionStore + StudyItemStore + AuthSessionStore + 'static,
    {
        let policy = DoublingPolicy::new(config.interval_floor_days, config.interval_max_days)?;
        let scheduler = Arc::new(Scheduler::new(Arc::new(policy), config.mastery_threshold)?);

        let orchestrator = Arc::new(GenerationOrchestrator::new(
            generator,
            store.clone(),
            config.generation_timeout,
        ));
        let review = Arc::new(ReviewWorkflow::new(
            store.clone(),
            store.clone(),
            store.clone(),
            scheduler.clone(),
        ));
        let practice = Arc::new(PracticeService::new(store.clone(), store.clone(), scheduler));

        Ok(Self {
            config,
            auth: store.clone(),
            proposals: store,
            orchestrator,
            review,
            practice,
        })
    }
}
