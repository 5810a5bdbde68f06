//! crates/flashcard_core/src/scheduler.rs
//!
//! The spaced-repetition engine. Pure functions from a study item's schedule and an
//! answer outcome to the next schedule. No I/O.
//!
//! - A new item starts `learning`, due immediately, at the floor interval.
//! - A correct answer extends the streak and grows the interval through a pluggable
//!   [`IntervalPolicy`]; reaching the mastery threshold marks the item `mastered`.
//! - An incorrect answer resets the streak, drops the interval to the floor and
//!   demotes a mastered item back to `learning`.

use crate::domain::{Schedule, StudyItem, StudyStatus};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),
}

//=========================================================================================
// Interval Growth Policy
//=========================================================================================

/// Decides how far apart reviews are spaced as a correct streak grows.
///
/// `interval_for_streak` must be non-decreasing in `streak` and never below `floor`.
pub trait IntervalPolicy: Send + Sync + fmt::Debug {
    fn floor(&self) -> u32;

    fn interval_for_streak(&self, streak: u32) -> u32;
}

/// Doubles the interval on every step of the streak, capped at `max`.
/// With a floor of one day: 1 → 2 → 4 → 8 → 16 ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoublingPolicy {
    floor: u32,
    max: u32,
}

impl DoublingPolicy {
    pub fn new(floor: u32, max: u32) -> Result<Self, SchedulerError> {
        if floor == 0 {
            return Err(SchedulerError::InvalidConfig(
                "floor interval must be at least 1".to_string(),
            ));
        }
        if max < floor {
            return Err(SchedulerError::InvalidConfig(format!(
                "max interval {} is below the floor {}",
                max, floor
            )));
        }
        Ok(Self { floor, max })
    }
}

impl Default for DoublingPolicy {
    fn default() -> Self {
        Self { floor: 1, max: 365 }
    }
}

impl IntervalPolicy for DoublingPolicy {
    fn floor(&self) -> u32 {
        self.floor
    }

    fn interval_for_streak(&self, streak: u32) -> u32 {
        let growth = 2u32.checked_pow(streak).unwrap_or(u32::MAX);
        self.floor.saturating_mul(growth).min(self.max)
    }
}

//=========================================================================================
// Scheduler
//=========================================================================================

pub const DEFAULT_MASTERY_THRESHOLD: u32 = 5;

#[derive(Debug, Clone)]
pub struct Scheduler {
    policy: Arc<dyn IntervalPolicy>,
    mastery_threshold: u32,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            policy: Arc::new(DoublingPolicy::default()),
            mastery_threshold: DEFAULT_MASTERY_THRESHOLD,
        }
    }
}

impl Scheduler {
    pub fn new(
        policy: Arc<dyn IntervalPolicy>,
        mastery_threshold: u32,
    ) -> Result<Self, SchedulerError> {
        if mastery_threshold == 0 {
            return Err(SchedulerError::InvalidConfig(
                "mastery threshold must be at least 1".to_string(),
            ));
        }
        if policy.floor() == 0 {
            return Err(SchedulerError::InvalidConfig(
                "floor interval must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            policy,
            mastery_threshold,
        })
    }

    pub fn floor_interval(&self) -> u32 {
        self.policy.floor()
    }

    pub fn mastery_threshold(&self) -> u32 {
        self.mastery_threshold
    }

    /// Scheduling state for a freshly accepted item: due right away.
    pub fn initialize(&self, now: DateTime<Utc>) -> Schedule {
        Schedule {
            status: StudyStatus::Learning,
            due_date: now,
            interval: self.policy.floor(),
            consecutive_correct: 0,
        }
    }

    /// Computes the schedule that follows `current` after one answer.
    pub fn advance(&self, current: &Schedule, is_correct: bool, now: DateTime<Utc>) -> Schedule {
        if !is_correct {
            let floor = self.policy.floor();
            return Schedule {
                status: StudyStatus::Learning,
                due_date: add_days(now, floor),
                interval: floor,
                consecutive_correct: 0,
            };
        }

        let streak = current.consecutive_correct.saturating_add(1);
        let interval = self.policy.interval_for_streak(streak).max(current.interval);
        let status = if streak >= self.mastery_threshold {
            StudyStatus::Mastered
        } else {
            StudyStatus::Learning
        };

        Schedule {
            status,
            due_date: add_days(now, interval),
            interval,
            consecutive_correct: streak,
        }
    }

    /// Applies [`Scheduler::advance`] to a whole item.
    pub fn advance_item(&self, item: &StudyItem, is_correct: bool, now: DateTime<Utc>) -> StudyItem {
        StudyItem {
            schedule: self.advance(&item.schedule, is_correct, now),
            updated_at: now,
            ..item.clone()
        }
    }
}

fn add_days(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now.checked_add_signed(Duration::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

//=========================================================================================
// Due Queue
//=========================================================================================

pub fn is_due(schedule: &Schedule, now: DateTime<Utc>) -> bool {
    schedule.status == StudyStatus::Learning && schedule.due_date <= now
}

/// Items eligible for practice right now, earliest-overdue first.
/// Mastered items are never selected, whatever their due date.
pub fn due_queue<'a, I>(items: I, now: DateTime<Utc>) -> Vec<&'a StudyItem>
where
    I: IntoIterator<Item = &'a StudyItem>,
{
    let mut due: Vec<&StudyItem> = items
        .into_iter()
        .filter(|item| is_due(&item.schedule, now))
        .collect();
    due.sort_by_key(|item| item.schedule.due_date);
    due
}

impl Schedule {
    /// Builds a schedule from raw stored values, failing loudly on anything a
    /// scheduler could never have produced.
    pub fn from_raw(
        status: StudyStatus,
        due_date: DateTime<Utc>,
        interval: i64,
        consecutive_correct: i64,
    ) -> Result<Self, SchedulerError> {
        let interval = u32::try_from(interval).map_err(|_| {
            SchedulerError::InvalidSchedule(format!("interval {} is out of range", interval))
        })?;
        let consecutive_correct = u32::try_from(consecutive_correct).map_err(|_| {
            SchedulerError::InvalidSchedule(format!(
                "consecutive correct count {} is out of range",
                consecutive_correct
            ))
        })?;
        Ok(Self {
            status,
            due_date,
            interval,
            consecutive_correct,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()
    }

    fn item_with(schedule: Schedule) -> StudyItem {
        StudyItem {
            id: Uuid::new_v4(),
            collection_id: Uuid::new_v4(),
            question: "What does the borrow checker enforce at compile time?".to_string(),
            answer: "Aliasing XOR mutability".to_string(),
            image_url: None,
            schedule,
            created_at: at(1),
            updated_at: at(1),
        }
    }

    #[test]
    fn initialize_is_due_immediately() {
        let scheduler = Scheduler::default();
        let schedule = scheduler.initialize(at(1));

        assert_eq!(schedule.status, StudyStatus::Learning);
        assert_eq!(schedule.due_date, at(1));
        assert_eq!(schedule.interval, 1);
        assert_eq!(schedule.consecutive_correct, 0);
        assert!(is_due(&schedule, at(1)));
    }

    #[test]
    fn correct_answer_pushes_due_date_forward() {
        let scheduler = Scheduler::default();
        let initial = scheduler.initialize(at(1));

        let next = scheduler.advance(&initial, true, at(1));

        assert!(next.due_date > initial.due_date);
        assert_eq!(next.consecutive_correct, 1);
        assert_eq!(next.interval, 2);
    }

    #[test]
    fn incorrect_answer_resets_to_floor() {
        let scheduler = Scheduler::default();
        let current = Schedule {
            status: StudyStatus::Learning,
            due_date: at(1),
            interval: 1,
            consecutive_correct: 2,
        };

        let next = scheduler.advance(&current, false, at(3));

        assert_eq!(next.consecutive_correct, 0);
        assert_eq!(next.interval, scheduler.floor_interval());
        assert_eq!(next.due_date, at(3) + Duration::days(1));
    }

    #[test]
    fn reaching_threshold_masters_and_a_miss_demotes() {
        let scheduler = Scheduler::new(Arc::new(DoublingPolicy::default()), 3).unwrap();
        let mut schedule = scheduler.initialize(at(1));
        for _ in 0..3 {
            schedule = scheduler.advance(&schedule, true, at(1));
        }
        assert_eq!(schedule.status, StudyStatus::Mastered);
        assert!(!is_due(&schedule, schedule.due_date));

        let demoted = scheduler.advance(&schedule, false, at(2));
        assert_eq!(demoted.status, StudyStatus::Learning);
        assert_eq!(demoted.consecutive_correct, 0);
    }

    #[test]
    fn due_queue_orders_overdue_first_and_skips_mastered() {
        let late = item_with(Schedule {
            status: StudyStatus::Learning,
            due_date: at(2),
            interval: 1,
            consecutive_correct: 0,
        });
        let later = item_with(Schedule {
            status: StudyStatus::Learning,
            due_date: at(4),
            interval: 1,
            consecutive_correct: 0,
        });
        let mastered = item_with(Schedule {
            status: StudyStatus::Mastered,
            due_date: at(1),
            interval: 16,
            consecutive_correct: 5,
        });
        let future = item_with(Schedule {
            status: StudyStatus::Learning,
            due_date: at(20),
            interval: 8,
            consecutive_correct: 3,
        });
        let items = vec![later.clone(), mastered, future, late.clone()];

        let queue = due_queue(&items, at(10));

        let ids: Vec<Uuid> = queue.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![late.id, later.id]);
    }

    #[test]
    fn negative_stored_values_are_rejected() {
        let err = Schedule::from_raw(StudyStatus::Learning, at(1), -1, 0).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
        assert!(Schedule::from_raw(StudyStatus::Learning, at(1), 1, -3).is_err());
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        assert!(DoublingPolicy::new(0, 10).is_err());
        assert!(DoublingPolicy::new(5, 2).is_err());
        assert!(Scheduler::new(Arc::new(DoublingPolicy::default()), 0).is_err());
    }

    fn arb_schedule() -> impl Strategy<Value = Schedule> {
        (any::<bool>(), 0u32..400, 0u32..40, 0i64..1_000).prop_map(
            |(mastered, interval, streak, offset)| Schedule {
                status: if mastered {
                    StudyStatus::Mastered
                } else {
                    StudyStatus::Learning
                },
                due_date: at(1) + Duration::hours(offset),
                interval,
                consecutive_correct: streak,
            },
        )
    }

    proptest! {
        #[test]
        fn incorrect_always_clears_streak(schedule in arb_schedule()) {
            let scheduler = Scheduler::default();
            let next = scheduler.advance(&schedule, false, at(5));
            prop_assert_eq!(next.consecutive_correct, 0);
            prop_assert_eq!(next.status, StudyStatus::Learning);
            prop_assert_eq!(next.interval, scheduler.floor_interval());
        }

        #[test]
        fn correct_never_shrinks_interval(schedule in arb_schedule()) {
            let scheduler = Scheduler::default();
            let next = scheduler.advance(&schedule, true, at(5));
            prop_assert!(next.interval >= schedule.interval);
            prop_assert!(next.due_date > at(5));
            prop_assert_eq!(next.consecutive_correct, schedule.consecutive_correct + 1);
        }

        #[test]
        fn growth_is_monotonic_in_streak(streak in 0u32..64) {
            let policy = DoublingPolicy::default();
            prop_assert!(policy.interval_for_streak(streak + 1) >= policy.interval_for_streak(streak));
            prop_assert!(policy.interval_for_streak(streak) >= policy.floor());
        }

        #[test]
        fn due_queue_never_returns_ineligible(schedules in proptest::collection::vec(arb_schedule(), 0..20)) {
            let items: Vec<StudyItem> = schedules.into_iter().map(item_with).collect();
            let now = at(10);
            for item in due_queue(&items, now) {
                prop_assert_eq!(item.schedule.status, StudyStatus::Learning);
                prop_assert!(item.schedule.due_date <= now);
            }
        }
    }
}
