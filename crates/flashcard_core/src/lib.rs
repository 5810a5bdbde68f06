pub mod domain;
pub mod error;
pub mod generation;
pub mod memory;
pub mod polling;
pub mod ports;
pub mod practice;
pub mod review;
pub mod scheduler;

pub use domain::{
    Collection, CollectionTarget, GenerationCandidate, GenerationOutput, GenerationResult,
    NewProposal, NewStudyItem, Proposal, ProposalEdit, ProposalStatus, Schedule, SessionId,
    StudyItem, StudyStatus,
};
pub use error::{ErrorCode, ServiceError, ServiceResult};
pub use generation::GenerationOrchestrator;
pub use polling::{spawn_poll, PollConfig, PollError, PollHandle, PollStatus};
pub use ports::{
    AuthSessionStore, CollectionStore, FlashcardGenerationService, GenerationError, PortError,
    PortResult, ProposalStore, SessionCheck, StudyItemStore,
};
pub use practice::PracticeService;
pub use review::{AcceptanceReport, RejectionReport, ReviewWorkflow};
pub use scheduler::{DoublingPolicy, IntervalPolicy, Scheduler, SchedulerError};
