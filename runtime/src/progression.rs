//! Advancing and eliminating participants between rounds.
//!
//! `advance` is not one atomic unit across participants. Each registration
//! (and each team) is moved by its own grouped write, which re-checks that
//! the source round is still `Completed`, reserves a seat in the next round
//! when that round is bounded, and guards on the participant still sitting at
//! `from_round` and not eliminated. A participant that was already processed
//! fails that guard and is reported as skipped, so re-running `advance` after
//! a partial failure finishes the job without touching anyone twice.

use crate::Environment;
use crate::metrics::EngineMetrics;
use roundhouse_core::documents::Transaction;
use roundhouse_core::environment::Notification;
use roundhouse_core::error::{EngineError, Result};
use roundhouse_core::ids::{EventId, RegistrationId, TeamId};
use roundhouse_core::records::{
    Actor, Event, Registration, RegistrationStatus, Round, RoundStatus, Team, TeamStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const ALREADY_PROCESSED: &str = "Participant was already advanced or eliminated";

fn is_already_processed(error: &EngineError) -> bool {
    *error == EngineError::conflict(ALREADY_PROCESSED)
}

/// Who moves on from a round.
///
/// A registration is selected if its own id is listed or its team is. A team
/// advances if it is listed or a selected member of it is still competing:
/// confirmed, not eliminated, and sitting in the source round (or already
/// moved into the next one by an earlier call).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Selection {
    /// Selected registrations
    pub registrations: HashSet<RegistrationId>,
    /// Selected teams
    pub teams: HashSet<TeamId>,
}

impl Selection {
    /// Select individual registrations.
    #[must_use]
    pub fn registrations(ids: impl IntoIterator<Item = RegistrationId>) -> Self {
        Self {
            registrations: ids.into_iter().collect(),
            teams: HashSet::new(),
        }
    }

    /// Select whole teams.
    #[must_use]
    pub fn teams(ids: impl IntoIterator<Item = TeamId>) -> Self {
        Self {
            registrations: HashSet::new(),
            teams: ids.into_iter().collect(),
        }
    }

    fn includes(&self, registration: &Registration) -> bool {
        self.registrations.contains(&registration.id)
            || registration
                .team_id
                .is_some_and(|team| self.teams.contains(&team))
    }
}

/// What one `advance` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdvanceReport {
    /// Registrations moved to the next round
    pub advanced: Vec<RegistrationId>,
    /// Registrations eliminated in `from_round`
    pub eliminated: Vec<RegistrationId>,
    /// Selected registrations of the final round (nothing to move them into)
    pub finalists: Vec<RegistrationId>,
    /// Registrations already processed by an earlier call
    pub skipped: Vec<RegistrationId>,
    /// Teams moved to the next round
    pub teams_advanced: Vec<TeamId>,
    /// Teams eliminated in `from_round`
    pub teams_eliminated: Vec<TeamId>,
}

/// Where the selected participants of a round go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destination {
    /// Into this round number
    Round(u32),
    /// Nowhere: `from_round` is the declared final round
    Final,
}

fn still_competing(registration: &Registration, from_round: u32, destination: Destination) -> bool {
    let in_play = registration.current_round == from_round
        || destination == Destination::Round(registration.current_round);
    registration.status == RegistrationStatus::Confirmed
        && registration.eliminated_in_round.is_none()
        && in_play
}

enum Step {
    Advance,
    Eliminate,
}

/// Orchestrates round-to-round progression.
#[derive(Clone)]
pub struct ProgressionCoordinator {
    env: Environment,
}

impl ProgressionCoordinator {
    /// Create the coordinator.
    #[must_use]
    pub const fn new(env: Environment) -> Self {
        Self { env }
    }

    /// Advance the selected participants of `from_round` and eliminate the rest.
    ///
    /// `from_round == 0` admits confirmed registrations from the registration
    /// phase into round 1.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] unless `actor` organizes the event
    /// - [`EngineError::StateConflict`] if `from_round` is not `Completed`, or
    ///   the next round does not exist and `from_round` is not the final round
    /// - [`EngineError::Validation`] if the selection names foreign ids
    /// - [`EngineError::CapacityConflict`] if the next round cannot seat the selection
    pub async fn advance(
        &self,
        actor: &Actor,
        event_id: EventId,
        from_round: u32,
        selection: Selection,
    ) -> Result<AdvanceReport> {
        EngineMetrics::observe(
            "advance",
            self.run(actor, event_id, from_round, &selection).await,
        )
    }

    async fn run(
        &self,
        actor: &Actor,
        event_id: EventId,
        from_round: u32,
        selection: &Selection,
    ) -> Result<AdvanceReport> {
        let event = self.env.organized_event(actor, event_id).await?;
        let partition = event_id.to_string();
        let rounds: Vec<Round> = self.env.documents.list(&partition).await?;
        let destination = destination(&event, &rounds, from_round)?;

        let registrations: Vec<Registration> = self.env.documents.list(&partition).await?;
        let teams: Vec<Team> = self.env.documents.list(&partition).await?;
        check_selection(selection, &registrations, &teams)?;

        let candidates: Vec<&Registration> = registrations
            .iter()
            .filter(|r| {
                r.status == RegistrationStatus::Confirmed
                    && r.current_round == from_round
                    && r.eliminated_in_round.is_none()
            })
            .collect();

        if let Destination::Round(to_round) = destination {
            let incoming = candidates.iter().filter(|r| selection.includes(r)).count();
            if let Some(next) = rounds.iter().find(|r| r.number == to_round) {
                check_round_capacity(next, incoming)?;
            }
        }

        let mut report = AdvanceReport {
            skipped: registrations
                .iter()
                .filter(|r| selection.includes(r) && !candidates.iter().any(|c| c.id == r.id))
                .map(|r| r.id)
                .collect(),
            ..AdvanceReport::default()
        };
        let mut notifications = Vec::new();

        let outcome = self
            .process(
                &event,
                from_round,
                destination,
                selection,
                &candidates,
                &registrations,
                &teams,
                &mut report,
                &mut notifications,
            )
            .await;
        self.env.dispatcher.send_all(notifications).await;
        outcome?;

        tracing::info!(
            event_id = %event_id,
            from_round,
            advanced = report.advanced.len(),
            eliminated = report.eliminated.len(),
            finalists = report.finalists.len(),
            skipped = report.skipped.len(),
            "Round progression applied"
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn process(
        &self,
        event: &Event,
        from_round: u32,
        destination: Destination,
        selection: &Selection,
        candidates: &[&Registration],
        registrations: &[Registration],
        teams: &[Team],
        report: &mut AdvanceReport,
        notifications: &mut Vec<Notification>,
    ) -> Result<()> {
        for registration in candidates {
            let selected = selection.includes(registration);
            if selected && destination == Destination::Final {
                report.finalists.push(registration.id);
                EngineMetrics::record_progression("finalist");
                continue;
            }

            let step = if selected { Step::Advance } else { Step::Eliminate };
            match self
                .move_registration(event.id, from_round, destination, registration, &step)
                .await
            {
                Ok(()) => {},
                Err(e) if is_already_processed(&e) => {
                    report.skipped.push(registration.id);
                    EngineMetrics::record_progression("skipped");
                    continue;
                },
                Err(e) => return Err(e),
            }

            match step {
                Step::Advance => {
                    report.advanced.push(registration.id);
                    EngineMetrics::record_progression("advanced");
                    if let Destination::Round(round) = destination {
                        notifications.push(Notification::Advanced {
                            registration_id: registration.id,
                            user_id: registration.user_id,
                            round,
                        });
                    }
                },
                Step::Eliminate => {
                    report.eliminated.push(registration.id);
                    EngineMetrics::record_progression("eliminated");
                    notifications.push(Notification::Eliminated {
                        registration_id: registration.id,
                        user_id: registration.user_id,
                        round: from_round,
                    });
                },
            }
        }

        for team in teams.iter().filter(|t| {
            t.status != TeamStatus::Disbanded
                && t.confirmed_registrations > 0
                && t.current_round == from_round
                && !t.eliminated
        }) {
            let advances = selection.teams.contains(&team.id)
                || registrations.iter().any(|r| {
                    r.team_id == Some(team.id)
                        && selection.includes(r)
                        && still_competing(r, from_round, destination)
                });
            if advances && destination == Destination::Final {
                continue;
            }

            let step = if advances { Step::Advance } else { Step::Eliminate };
            match self
                .move_team(event.id, from_round, destination, team.id, &step)
                .await
            {
                Ok(()) => {},
                Err(e) if is_already_processed(&e) => continue,
                Err(e) => return Err(e),
            }
            match step {
                Step::Advance => report.teams_advanced.push(team.id),
                Step::Eliminate => report.teams_eliminated.push(team.id),
            }
        }
        Ok(())
    }

    async fn move_registration(
        &self,
        event_id: EventId,
        from_round: u32,
        destination: Destination,
        registration: &Registration,
        step: &Step,
    ) -> Result<()> {
        let partition = event_id.to_string();
        let now = self.env.clock.now();
        let mut tx = source_round_check(event_id, from_round);
        let target = match (step, destination) {
            (Step::Advance, Destination::Round(to_round)) => {
                tx = reserve_seat(tx, event_id, to_round);
                Some(to_round)
            },
            _ => None,
        };

        tx.update(
            Registration::key_for(registration.id),
            partition,
            move |registration: &mut Registration| {
                if registration.status != RegistrationStatus::Confirmed
                    || registration.current_round != from_round
                    || registration.eliminated_in_round.is_some()
                {
                    return Err(EngineError::conflict(ALREADY_PROCESSED));
                }
                match target {
                    Some(to_round) => registration.current_round = to_round,
                    None => registration.eliminated_in_round = Some(from_round),
                }
                registration.updated_at = now;
                Ok(())
            },
        )
        .commit(&self.env.documents)
        .await?;
        Ok(())
    }

    async fn move_team(
        &self,
        event_id: EventId,
        from_round: u32,
        destination: Destination,
        team_id: TeamId,
        step: &Step,
    ) -> Result<()> {
        let target = match (step, destination) {
            (Step::Advance, Destination::Round(to_round)) => Some(to_round),
            _ => None,
        };
        source_round_check(event_id, from_round)
            .update(
                Team::key_for(team_id),
                event_id.to_string(),
                move |team: &mut Team| {
                    if team.current_round != from_round || team.eliminated {
                        return Err(EngineError::conflict(ALREADY_PROCESSED));
                    }
                    match target {
                        Some(to_round) => team.current_round = to_round,
                        None => team.eliminated = true,
                    }
                    Ok(())
                },
            )
            .commit(&self.env.documents)
            .await?;
        Ok(())
    }
}

fn not_completed(from_round: u32) -> EngineError {
    EngineError::conflict(format!(
        "Round {from_round} must be completed before advancing participants"
    ))
}

/// Re-check at write time that `from_round` is still `Completed`.
fn source_round_check(event_id: EventId, from_round: u32) -> Transaction {
    let tx = Transaction::new();
    if from_round == 0 {
        return tx;
    }
    tx.check(Round::key_for(event_id, from_round), move |round: &Round| {
        if round.status == RoundStatus::Completed {
            Ok(())
        } else {
            Err(not_completed(from_round))
        }
    })
}

fn reserve_seat(tx: Transaction, event_id: EventId, to_round: u32) -> Transaction {
    tx.update(
        Round::key_for(event_id, to_round),
        event_id.to_string(),
        move |round: &mut Round| {
            check_round_capacity(round, 1)?;
            round.advanced_count += 1;
            Ok(())
        },
    )
}

fn check_round_capacity(round: &Round, incoming: usize) -> Result<()> {
    let Some(max) = round.max_participants else {
        return Ok(());
    };
    let incoming = u32::try_from(incoming).unwrap_or(u32::MAX);
    if round.advanced_count.saturating_add(incoming) > max {
        return Err(EngineError::capacity(format!(
            "Round {} is full. Maximum {max} participants allowed.",
            round.number
        )));
    }
    Ok(())
}

fn destination(event: &Event, rounds: &[Round], from_round: u32) -> Result<Destination> {
    if from_round > 0 {
        let round = rounds
            .iter()
            .find(|r| r.number == from_round)
            .ok_or_else(|| EngineError::not_found("Round", format!("{}/{from_round}", event.id)))?;
        if round.status != RoundStatus::Completed {
            return Err(not_completed(from_round));
        }
    }

    let to_round = from_round + 1;
    if rounds.iter().any(|r| r.number == to_round) {
        Ok(Destination::Round(to_round))
    } else if from_round > 0 && event.rounds_count == Some(from_round) {
        Ok(Destination::Final)
    } else {
        Err(EngineError::conflict(format!(
            "Round {to_round} does not exist; create it before advancing participants"
        )))
    }
}

fn check_selection(selection: &Selection, registrations: &[Registration], teams: &[Team]) -> Result<()> {
    let known_registrations: HashSet<RegistrationId> = registrations.iter().map(|r| r.id).collect();
    let known_teams: HashSet<TeamId> = teams.iter().map(|t| t.id).collect();

    if let Some(id) = selection
        .registrations
        .iter()
        .find(|id| !known_registrations.contains(id))
    {
        return Err(EngineError::validation(
            "registrations",
            format!("{id} is not a registration of this event"),
        ));
    }
    if let Some(id) = selection.teams.iter().find(|id| !known_teams.contains(id)) {
        return Err(EngineError::validation(
            "teams",
            format!("{id} is not a team of this event"),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{Engine, NewRound, RoundChanges};
    use chrono::Duration;
    use roundhouse_core::ErrorKind;
    use roundhouse_core::ids::UserId;
    use roundhouse_testing::{EventFixture, InMemoryStore, ManualClock, RecordingNotifier};
    use std::sync::Arc;

    struct Harness {
        engine: Engine,
        clock: ManualClock,
        notifier: Arc<RecordingNotifier>,
        organizer: Actor,
        event: Event,
    }

    async fn harness(fixture: EventFixture) -> Harness {
        let clock = ManualClock::default();
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = Engine::builder(Arc::new(InMemoryStore::new()))
            .clock(clock.clone())
            .notifier(notifier.clone())
            .build();
        let organizer = Actor::user(UserId::new());
        let event = fixture
            .organizer(organizer.user_id)
            .seed(engine.documents())
            .await
            .unwrap();
        Harness {
            engine,
            clock,
            notifier,
            organizer,
            event,
        }
    }

    impl Harness {
        /// `count` one-day rounds, two days apart.
        async fn rounds(&self, count: u32, max_participants: Option<u32>) {
            for n in 0..count {
                let start = self.event.start_time + Duration::days(2 * i64::from(n));
                self.engine
                    .rounds()
                    .create_round(
                        &self.organizer,
                        self.event.id,
                        NewRound {
                            name: format!("Round {}", n + 1),
                            description: None,
                            start_date: start,
                            end_date: start + Duration::days(1),
                            max_participants,
                        },
                    )
                    .await
                    .unwrap();
            }
        }

        async fn complete(&self, number: u32) {
            let round = self
                .engine
                .rounds()
                .get_round(self.event.id, number)
                .await
                .unwrap();
            for (at, status) in [
                (round.start_date, RoundStatus::Ongoing),
                (round.end_date, RoundStatus::Completed),
            ] {
                self.clock.set(at);
                self.engine
                    .rounds()
                    .update_round(
                        &self.organizer,
                        self.event.id,
                        number,
                        RoundChanges::status(status),
                    )
                    .await
                    .unwrap();
            }
        }

        async fn registrants(&self, count: usize) -> Vec<Registration> {
            let mut admitted = Vec::new();
            for _ in 0..count {
                let actor = Actor::user(UserId::new());
                admitted.extend(
                    self.engine
                        .capacity()
                        .register(&actor, self.event.id, None)
                        .await
                        .unwrap(),
                );
            }
            admitted
        }

        async fn advance(&self, from_round: u32, selection: Selection) -> Result<AdvanceReport> {
            self.engine
                .progression()
                .advance(&self.organizer, self.event.id, from_round, selection)
                .await
        }

        async fn registration(&self, id: RegistrationId) -> Registration {
            self.engine.capacity().get_registration(id).await.unwrap()
        }

        /// Locked two-member team, registered for the event.
        async fn registered_pair(&self, name: &str) -> (TeamId, Vec<Registration>) {
            let leader = Actor::user(UserId::new());
            let teams = self.engine.teams();
            let team = teams.create_team(&leader, self.event.id, name).await.unwrap();
            teams
                .join_with_code(&Actor::user(UserId::new()), team.invite_code.as_str())
                .await
                .unwrap();
            teams.lock(&leader, team.id).await.unwrap();
            let admitted = self
                .engine
                .capacity()
                .register(&leader, self.event.id, Some(team.id))
                .await
                .unwrap();
            (team.id, admitted)
        }
    }

    #[tokio::test]
    async fn registration_phase_feeds_round_one() {
        let h = harness(EventFixture::solo()).await;
        let people = h.registrants(3).await;
        h.rounds(2, None).await;

        let report = h
            .advance(0, Selection::registrations([people[0].id, people[1].id]))
            .await
            .unwrap();
        assert_eq!(report.advanced.len(), 2);
        assert_eq!(report.eliminated, vec![people[2].id]);

        assert_eq!(h.registration(people[0].id).await.current_round, 1);
        assert_eq!(h.registration(people[2].id).await.eliminated_in_round, Some(0));
        assert_eq!(h.notifier.count("advanced"), 2);
        assert_eq!(h.notifier.count("eliminated"), 1);
    }

    #[tokio::test]
    async fn source_round_must_be_completed() {
        let h = harness(EventFixture::solo()).await;
        h.registrants(1).await;
        h.rounds(2, None).await;

        let err = h.advance(1, Selection::default()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Round 1 must be completed before advancing participants"
        );
    }

    #[tokio::test]
    async fn missing_next_round_is_a_conflict_unless_final() {
        let h = harness(EventFixture::solo()).await;
        let people = h.registrants(2).await;
        h.rounds(1, None).await;
        h.advance(0, Selection::registrations([people[0].id, people[1].id]))
            .await
            .unwrap();
        h.complete(1).await;

        let err = h.advance(1, Selection::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[tokio::test]
    async fn final_round_leaves_finalists_in_place() {
        let h = harness(EventFixture::solo().rounds(1)).await;
        let people = h.registrants(2).await;
        h.rounds(1, None).await;
        h.advance(0, Selection::registrations([people[0].id, people[1].id]))
            .await
            .unwrap();
        h.complete(1).await;

        let report = h
            .advance(1, Selection::registrations([people[0].id]))
            .await
            .unwrap();
        assert_eq!(report.finalists, vec![people[0].id]);
        assert_eq!(report.eliminated, vec![people[1].id]);
        assert_eq!(h.registration(people[0].id).await.current_round, 1);
    }

    #[tokio::test]
    async fn rerunning_advance_changes_nothing() {
        let h = harness(EventFixture::solo()).await;
        let people = h.registrants(3).await;
        h.rounds(1, None).await;
        let selection = Selection::registrations([people[0].id]);

        h.advance(0, selection.clone()).await.unwrap();
        let again = h.advance(0, selection).await.unwrap();

        assert!(again.advanced.is_empty());
        assert!(again.eliminated.is_empty());
        assert_eq!(again.skipped, vec![people[0].id]);
        assert_eq!(h.registration(people[1].id).await.eliminated_in_round, Some(0));
        let round = h.engine.rounds().get_round(h.event.id, 1).await.unwrap();
        assert_eq!(round.advanced_count, 1);
    }

    #[tokio::test]
    async fn bounded_round_rejects_an_oversized_selection() {
        let h = harness(EventFixture::solo()).await;
        let people = h.registrants(3).await;
        h.rounds(1, Some(2)).await;

        let err = h
            .advance(0, Selection::registrations(people.iter().map(|r| r.id)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityConflict);
        assert_eq!(err.to_string(), "Round 1 is full. Maximum 2 participants allowed.");
        assert_eq!(h.registration(people[0].id).await.current_round, 0);
    }

    #[tokio::test]
    async fn foreign_ids_are_rejected() {
        let h = harness(EventFixture::solo()).await;
        h.registrants(1).await;
        h.rounds(1, None).await;

        let err = h
            .advance(0, Selection::registrations([RegistrationId::new()]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn only_the_organizer_advances() {
        let h = harness(EventFixture::solo()).await;
        h.rounds(1, None).await;
        let err = h
            .engine
            .progression()
            .advance(
                &Actor::user(UserId::new()),
                h.event.id,
                0,
                Selection::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[tokio::test]
    async fn teams_follow_their_members() {
        let h = harness(EventFixture::team(2, 2)).await;
        let (red, _) = h.registered_pair("Red").await;
        let (blue, _) = h.registered_pair("Blue").await;
        h.rounds(1, None).await;

        let report = h.advance(0, Selection::teams([red])).await.unwrap();
        assert_eq!(report.advanced.len(), 2);
        assert_eq!(report.eliminated.len(), 2);
        assert_eq!(report.teams_advanced, vec![red]);
        assert_eq!(report.teams_eliminated, vec![blue]);

        let red = h.engine.teams().get_team(red).await.unwrap();
        let blue = h.engine.teams().get_team(blue).await.unwrap();
        assert_eq!(red.current_round, 1);
        assert!(blue.eliminated);
    }

    #[tokio::test]
    async fn team_with_only_eliminated_members_selected_is_eliminated() {
        let h = harness(EventFixture::team(2, 2)).await;
        let (team_id, members) = h.registered_pair("Green").await;
        h.rounds(2, None).await;

        let report = h
            .advance(0, Selection::registrations([members[0].id]))
            .await
            .unwrap();
        assert_eq!(report.eliminated, vec![members[1].id]);
        assert_eq!(report.teams_advanced, vec![team_id]);
        h.complete(1).await;

        let report = h
            .advance(1, Selection::registrations([members[1].id]))
            .await
            .unwrap();
        assert!(report.advanced.is_empty());
        assert_eq!(report.eliminated, vec![members[0].id]);
        assert_eq!(report.skipped, vec![members[1].id]);
        assert!(report.teams_advanced.is_empty());
        assert_eq!(report.teams_eliminated, vec![team_id]);

        let team = h.engine.teams().get_team(team_id).await.unwrap();
        assert!(team.eliminated);
        assert_eq!(team.current_round, 1);
        assert_eq!(h.registration(members[0].id).await.eliminated_in_round, Some(1));
        assert_eq!(h.registration(members[1].id).await.eliminated_in_round, Some(0));
    }
}
