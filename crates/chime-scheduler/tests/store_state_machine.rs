//! Stateful property testing for the reminder store and poll cycle.
//!
//! Uses proptest-state-machine to drive a SQLite store and a scheduler through
//! random sequences of creates, updates, deletes and polls. The reference model
//! tracks:
//!
//! - Id assignment (monotonic, never reused)
//! - Every stored field of every live reminder
//! - Rescheduling and deletion when reminders fire
//! - The total number of notifications delivered

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use proptest_state_machine::{ReferenceStateMachine, StateMachineTest, prop_state_machine};
use tokio::runtime::Runtime;

use chime_scheduler::{
    DeliveryError, NewReminder, NotificationSink, Recurrence, Reminder, ReminderId,
    ReminderStore, Scheduler, SchedulerConfig, SqliteStore, StoreError, next_occurrence,
};

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn at_offset(minutes: i64) -> NaiveDateTime {
    base() + Duration::minutes(minutes)
}

/// Operations that can be performed on the store.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    Create {
        text: String,
        offset: i64,
        recurrence: Option<Recurrence>,
        interval: u32,
        end_offset: Option<i64>,
    },
    /// Move an existing reminder and change its text.
    Update { id: i64, offset: i64, text: String },
    /// Update an id that was never assigned.
    UpdateMissing,
    /// Delete any id, live or not.
    Delete { id: i64 },
    /// Run one scheduler poll at the given time.
    Poll { offset: i64 },
}

/// Reference model for the store contents.
#[derive(Clone, Debug)]
pub struct StoreModel {
    reminders: BTreeMap<i64, Reminder>,
    next_id: i64,
    delivered: usize,
}

impl Default for StoreModel {
    fn default() -> Self {
        Self {
            reminders: BTreeMap::new(),
            next_id: 1,
            delivered: 0,
        }
    }
}

fn recurrence() -> impl Strategy<Value = Option<Recurrence>> {
    prop_oneof![
        2 => Just(None),
        1 => Just(Some(Recurrence::Daily)),
        1 => Just(Some(Recurrence::Weekly)),
        1 => Just(Some(Recurrence::Monthly)),
        1 => Just(Some(Recurrence::Yearly)),
    ]
}

fn text() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

impl ReferenceStateMachine for StoreModel {
    type State = Self;
    type Transition = StoreOperation;

    fn init_state() -> BoxedStrategy<Self::State> {
        Just(Self::default()).boxed()
    }

    fn transitions(state: &Self::State) -> BoxedStrategy<Self::Transition> {
        let create = (
            text(),
            0i64..60 * 24 * 90,
            recurrence(),
            1u32..4,
            prop::option::of(0i64..60 * 24 * 365),
        )
            .prop_map(|(text, offset, recurrence, interval, end_offset)| {
                StoreOperation::Create {
                    text,
                    offset,
                    recurrence,
                    interval,
                    end_offset,
                }
            });
        let delete = (1..state.next_id + 2).prop_map(|id| StoreOperation::Delete { id });
        let poll = (0i64..60 * 24 * 400).prop_map(|offset| StoreOperation::Poll { offset });

        if state.reminders.is_empty() {
            return prop_oneof![
                4 => create,
                1 => delete,
                1 => poll,
                1 => Just(StoreOperation::UpdateMissing),
            ]
            .boxed();
        }

        let ids: Vec<i64> = state.reminders.keys().copied().collect();
        let update = (prop::sample::select(ids), 0i64..60 * 24 * 90, text())
            .prop_map(|(id, offset, text)| StoreOperation::Update { id, offset, text });

        prop_oneof![
            3 => create,
            2 => update,
            2 => delete,
            2 => poll,
            1 => Just(StoreOperation::UpdateMissing),
        ]
        .boxed()
    }

    fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
        match transition {
            StoreOperation::Create {
                text,
                offset,
                recurrence,
                interval,
                end_offset,
            } => {
                let id = state.next_id;
                state.next_id += 1;
                state.reminders.insert(
                    id,
                    Reminder {
                        id: ReminderId(id),
                        text: text.clone(),
                        due_at: at_offset(*offset),
                        recurrence: *recurrence,
                        interval: if recurrence.is_some() { *interval } else { 1 },
                        recurrence_end: end_offset.map(at_offset),
                    },
                );
            }
            StoreOperation::Update { id, offset, text } => {
                if let Some(reminder) = state.reminders.get_mut(id) {
                    reminder.due_at = at_offset(*offset);
                    reminder.text = text.clone();
                }
            }
            StoreOperation::UpdateMissing => {}
            StoreOperation::Delete { id } => {
                state.reminders.remove(id);
            }
            StoreOperation::Poll { offset } => {
                let now = at_offset(*offset);
                let due: Vec<i64> = state
                    .reminders
                    .values()
                    .filter(|r| r.due_at <= now)
                    .map(|r| r.id.0)
                    .collect();
                for id in due {
                    state.delivered += 1;
                    let reminder = &state.reminders[&id];
                    let next = reminder.recurrence.and_then(|kind| {
                        next_occurrence(
                            reminder.due_at,
                            kind,
                            reminder.interval,
                            reminder.recurrence_end,
                        )
                    });
                    match next {
                        Some(next) => {
                            if let Some(r) = state.reminders.get_mut(&id) {
                                r.due_at = next;
                            }
                        }
                        None => {
                            state.reminders.remove(&id);
                        }
                    }
                }
            }
        }
        state
    }

    fn preconditions(state: &Self::State, transition: &Self::Transition) -> bool {
        match transition {
            StoreOperation::Update { id, .. } => state.reminders.contains_key(id),
            _ => true,
        }
    }
}

#[derive(Default)]
struct CountingSink {
    delivered: Mutex<usize>,
}

#[async_trait]
impl NotificationSink for CountingSink {
    async fn deliver(&self, _message: &str) -> Result<(), DeliveryError> {
        *self.delivered.lock().unwrap() += 1;
        Ok(())
    }
}

/// Test harness wrapping a real SQLite store and scheduler.
pub struct StoreTestHarness {
    runtime: Runtime,
    store: Arc<SqliteStore>,
    sink: Arc<CountingSink>,
    scheduler: Scheduler,
}

impl StoreTestHarness {
    fn new() -> Self {
        let runtime = Runtime::new().expect("Failed to create tokio runtime");
        let store = Arc::new(SqliteStore::open_in_memory().expect("Failed to open store"));
        let sink = Arc::new(CountingSink::default());
        let scheduler = Scheduler::new(store.clone(), sink.clone(), SchedulerConfig::default())
            .expect("default config is valid");
        Self {
            runtime,
            store,
            sink,
            scheduler,
        }
    }

    fn apply_operation(&self, op: &StoreOperation) {
        match op {
            StoreOperation::Create {
                text,
                offset,
                recurrence,
                interval,
                end_offset,
            } => {
                let mut new = match recurrence {
                    Some(kind) => NewReminder::recurring(text.clone(), at_offset(*offset), *kind, *interval),
                    None => NewReminder::once(text.clone(), at_offset(*offset)),
                };
                new.recurrence_end = end_offset.map(at_offset);
                self.store.create(&new).unwrap();
            }
            StoreOperation::Update { id, offset, text } => {
                let mut reminder = self.store.get(ReminderId(*id)).unwrap().unwrap();
                reminder.due_at = at_offset(*offset);
                reminder.text = text.clone();
                self.store.update(&reminder).unwrap();
            }
            StoreOperation::UpdateMissing => {
                let ghost = NewReminder::once("ghost", base()).with_id(ReminderId(i64::MAX));
                assert!(matches!(
                    self.store.update(&ghost),
                    Err(StoreError::NotFound(_))
                ));
            }
            StoreOperation::Delete { id } => {
                self.store.delete(ReminderId(*id)).unwrap();
            }
            StoreOperation::Poll { offset } => {
                let report = self.runtime.block_on(self.scheduler.poll_once(at_offset(*offset)));
                assert_eq!(report.store_failures, 0);
                assert_eq!(report.delivery_failures, 0);
            }
        }
    }

    fn verify_invariants(&self, model: &StoreModel) {
        for (id, expected) in &model.reminders {
            let stored = self.store.get(ReminderId(*id)).unwrap();
            assert_eq!(stored.as_ref(), Some(expected));
        }

        let mut expected: Vec<&Reminder> = model.reminders.values().collect();
        expected.sort_by_key(|r| (r.due_at, r.id));
        let everything = self
            .store
            .upcoming_reminders(base() - Duration::days(1))
            .unwrap();
        assert_eq!(everything.iter().collect::<Vec<_>>(), expected);

        for reminder in &everything {
            assert!(reminder.interval >= 1);
        }

        assert_eq!(*self.sink.delivered.lock().unwrap(), model.delivered);
    }
}

impl StateMachineTest for StoreTestHarness {
    type SystemUnderTest = Self;
    type Reference = StoreModel;

    fn init_test(
        _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) -> Self::SystemUnderTest {
        Self::new()
    }

    fn apply(
        state: Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        transition: <Self::Reference as ReferenceStateMachine>::Transition,
    ) -> Self::SystemUnderTest {
        state.apply_operation(&transition);
        state.verify_invariants(ref_state);
        state
    }

    fn check_invariants(
        state: &Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) {
        state.verify_invariants(ref_state);
    }
}

prop_state_machine! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 10000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn store_state_machine_test(sequential 1..50 => StoreTestHarness);
}
