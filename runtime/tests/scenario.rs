//! End-to-end walk through an event's lifecycle.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use chrono::Duration;
use futures::future::join_all;
use roundhouse_core::{Actor, ErrorKind, RegistrationStatus, RoundStatus, UserId};
use roundhouse_runtime::{Engine, NewEvent, NewRound, RoundChanges, Selection};
use roundhouse_testing::{InMemoryStore, ManualClock, RecordingNotifier, test_time};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn small_event_from_registration_to_round_one() {
    roundhouse_testing::init_test_tracing();
    let clock = ManualClock::default();
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = Engine::builder(Arc::new(InMemoryStore::new()))
        .clock(clock.clone())
        .notifier(notifier.clone())
        .build();
    let organizer = Actor::user(UserId::new());

    let start = test_time() + Duration::days(3);
    let mut input = NewEvent::solo("Regional Qualifier", start, start + Duration::days(2));
    input.max_participants = Some(2);
    let event = engine.events().create_event(&organizer, input).await.unwrap();

    // Two concurrent registrations fill the event.
    let first_two = join_all((0..2).map(|_| {
        let (engine, event_id) = (engine.clone(), event.id);
        tokio::spawn(async move {
            engine
                .capacity()
                .register(&Actor::user(UserId::new()), event_id, None)
                .await
        })
    }))
    .await;
    let admitted: Vec<_> = first_two
        .into_iter()
        .flat_map(|joined| joined.unwrap().unwrap())
        .collect();
    assert_eq!(admitted.len(), 2);
    assert!(admitted.iter().all(|r| r.status == RegistrationStatus::Confirmed));

    let err = engine
        .capacity()
        .register(&Actor::user(UserId::new()), event.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityConflict);
    assert_eq!(err.to_string(), "Event is full. Maximum 2 participants allowed.");

    // Round 1 cannot start before its scheduled start.
    let round_start = start + Duration::hours(2);
    let round = engine
        .rounds()
        .create_round(
            &organizer,
            event.id,
            NewRound {
                name: "Round 1".to_string(),
                description: None,
                start_date: round_start,
                end_date: round_start + Duration::hours(4),
                max_participants: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(round.status, RoundStatus::Upcoming);

    let err = engine
        .rounds()
        .update_round(&organizer, event.id, 1, RoundChanges::status(RoundStatus::Ongoing))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains(&round_start.to_rfc3339()));

    clock.set(round_start);
    let round = engine
        .rounds()
        .update_round(&organizer, event.id, 1, RoundChanges::status(RoundStatus::Ongoing))
        .await
        .unwrap();
    assert_eq!(round.status, RoundStatus::Ongoing);
    assert_eq!(notifier.count("round_status_changed"), 1);

    // Admission into round 1 happened from the registration phase.
    let report = engine
        .progression()
        .advance(
            &organizer,
            event.id,
            0,
            Selection::registrations([admitted[0].id]),
        )
        .await
        .unwrap();
    assert_eq!(report.advanced, vec![admitted[0].id]);
    assert_eq!(report.eliminated, vec![admitted[1].id]);
}
