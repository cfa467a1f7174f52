//! Round lifecycle.
//!
//! Rounds are numbered `1..=n` with no gaps and move forward only:
//! `Upcoming -> Ongoing -> Completed`. At most one round per event is
//! `Ongoing`, a round starts only after its predecessor completed, and only
//! the highest-numbered `Upcoming` round may be deleted.
//!
//! The event document carries `round_count`, `rounds_revision` and
//! `ongoing_round`. Each write guards on these inside the same grouped write
//! as the round itself, so two concurrent creates can never both take the
//! same number and two rounds can never both become `Ongoing`.

use crate::Environment;
use crate::metrics::EngineMetrics;
use chrono::{DateTime, Utc};
use roundhouse_core::documents::Transaction;
use roundhouse_core::environment::Notification;
use roundhouse_core::error::{EngineError, Result, Validator};
use roundhouse_core::ids::EventId;
use roundhouse_core::records::{Actor, Event, Round, RoundStatus};
use serde::Deserialize;

const ROUNDS_CHANGED: &str = "The rounds of this event were changed concurrently; reload and try again";

/// Input for [`RoundStateMachine::create_round`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewRound {
    /// Display name
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Scheduled start
    pub start_date: DateTime<Utc>,
    /// Scheduled end
    pub end_date: DateTime<Utc>,
    /// Participant capacity
    #[serde(default)]
    pub max_participants: Option<u32>,
}

/// Partial update for [`RoundStateMachine::update_round`].
///
/// `status` is guarded by the forward-only rules; dates are re-validated
/// against the event window and neighbouring rounds; the remaining fields are
/// last-writer-wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoundChanges {
    /// New name
    pub name: Option<String>,
    /// New description (empty clears it)
    pub description: Option<String>,
    /// New start
    pub start_date: Option<DateTime<Utc>>,
    /// New end
    pub end_date: Option<DateTime<Utc>>,
    /// New status
    pub status: Option<RoundStatus>,
    /// New capacity
    pub max_participants: Option<u32>,
}

impl RoundChanges {
    /// Only change the status.
    #[must_use]
    pub fn status(status: RoundStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Checks a proposed window against the event and the other rounds.
///
/// `others` must not contain the round being scheduled.
fn check_schedule(
    validator: &mut Validator,
    event: &Event,
    others: &[Round],
    number: u32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) {
    validator
        .check(
            start < event.start_time,
            "start_date",
            format!(
                "must not be before the event starts ({})",
                event.start_time.to_rfc3339()
            ),
        )
        .check(
            end > event.end_time,
            "end_date",
            format!(
                "must not be after the event ends ({})",
                event.end_time.to_rfc3339()
            ),
        )
        .check(end <= start, "end_date", "must be after start_date");

    if let Some(previous) = others.iter().find(|r| r.number + 1 == number) {
        validator.check(
            start <= previous.end_date,
            "start_date",
            format!(
                "must be after round {} ends ({})",
                previous.number,
                previous.end_date.to_rfc3339()
            ),
        );
    }
    if let Some(next) = others.iter().find(|r| r.number == number + 1) {
        validator.check(
            end >= next.start_date,
            "end_date",
            format!(
                "must be before round {} starts ({})",
                next.number,
                next.start_date.to_rfc3339()
            ),
        );
    }
    if let Some(clash) = others.iter().find(|r| r.overlaps(start, end)) {
        validator.check(
            true,
            "start_date",
            format!("overlaps round {}", clash.number),
        );
    }
}

/// Checks a status transition against the clock and the sibling rounds.
fn check_transition(
    round: &Round,
    next: RoundStatus,
    now: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    siblings: &[Round],
) -> Result<()> {
    let number = round.number;
    if !round.status.can_advance_to(next) {
        return Err(EngineError::conflict(format!(
            "Round {number} cannot go back from {} to {}",
            round.status.as_str(),
            next.as_str()
        )));
    }
    match next {
        RoundStatus::Ongoing => {
            if now < start {
                return Err(EngineError::validation(
                    "status",
                    format!(
                        "Round {number} cannot start before its scheduled start time {}",
                        start.to_rfc3339()
                    ),
                ));
            }
            if let Some(other) = siblings
                .iter()
                .find(|r| r.number != number && r.status == RoundStatus::Ongoing)
            {
                return Err(EngineError::conflict(format!(
                    "Round {} is already ongoing",
                    other.number
                )));
            }
            if let Some(previous) = siblings.iter().find(|r| r.number + 1 == number) {
                if previous.status != RoundStatus::Completed {
                    return Err(previous_not_completed(previous.number, number));
                }
            }
        },
        RoundStatus::Completed => {
            if now < end {
                return Err(EngineError::validation(
                    "status",
                    format!(
                        "Round {number} cannot be completed before its scheduled end time {}",
                        end.to_rfc3339()
                    ),
                ));
            }
        },
        RoundStatus::Upcoming => {},
    }
    Ok(())
}

fn previous_not_completed(previous: u32, number: u32) -> EngineError {
    EngineError::conflict(format!(
        "Round {previous} must be completed before round {number} can start"
    ))
}

/// Owns the ordered round list of every event.
#[derive(Clone)]
pub struct RoundStateMachine {
    env: Environment,
}

impl RoundStateMachine {
    /// Create the state machine.
    #[must_use]
    pub const fn new(env: Environment) -> Self {
        Self { env }
    }

    /// Rounds of an event, in number order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the event does not exist.
    pub async fn list_rounds(&self, event_id: EventId) -> Result<Vec<Round>> {
        self.env.event(event_id).await?;
        self.env.documents.list(&event_id.to_string()).await
    }

    /// One round.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the round does not exist.
    pub async fn get_round(&self, event_id: EventId, number: u32) -> Result<Round> {
        self.env
            .documents
            .require(&Round::key_for(event_id, number))
            .await
    }

    /// Append a round.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] unless `actor` organizes the event
    /// - [`EngineError::Validation`] for a window outside the event, inverted,
    ///   touching or overlapping the previous round
    /// - [`EngineError::StateConflict`] if the declared round count is reached
    ///   or another round was created concurrently
    pub async fn create_round(
        &self,
        actor: &Actor,
        event_id: EventId,
        proposed: NewRound,
    ) -> Result<Round> {
        EngineMetrics::observe("create_round", self.create(actor, event_id, proposed).await)
    }

    async fn create(&self, actor: &Actor, event_id: EventId, proposed: NewRound) -> Result<Round> {
        let event = self.env.organized_event(actor, event_id).await?;
        let rounds: Vec<Round> = self.env.documents.list(&event_id.to_string()).await?;

        if let Some(max) = event.rounds_count {
            if event.round_count >= max {
                return Err(EngineError::conflict(format!(
                    "This event already has the maximum of {max} rounds"
                )));
            }
        }

        let number = event.round_count + 1;
        let mut validator = Validator::new();
        validator
            .check(proposed.name.trim().is_empty(), "name", "must not be empty")
            .check(
                proposed.max_participants == Some(0),
                "max_participants",
                "must be at least 1",
            );
        check_schedule(
            &mut validator,
            &event,
            &rounds,
            number,
            proposed.start_date,
            proposed.end_date,
        );
        validator.finish()?;

        let round = Round {
            event_id,
            number,
            name: proposed.name.trim().to_string(),
            description: proposed.description.filter(|d| !d.trim().is_empty()),
            start_date: proposed.start_date,
            end_date: proposed.end_date,
            status: RoundStatus::Upcoming,
            max_participants: proposed.max_participants,
            advanced_count: 0,
        };

        let seen_count = event.round_count;
        let seen_revision = event.rounds_revision;
        Transaction::new()
            .update(
                Event::key_for(event_id),
                event_id.to_string(),
                move |event: &mut Event| {
                    if event.round_count != seen_count || event.rounds_revision != seen_revision {
                        return Err(EngineError::conflict(ROUNDS_CHANGED));
                    }
                    event.round_count += 1;
                    event.rounds_revision += 1;
                    Ok(())
                },
            )
            .insert(round.clone())
            .commit(&self.env.documents)
            .await?;

        tracing::info!(event_id = %event_id, number, "Round created");
        Ok(round)
    }

    /// Change a round's status, schedule or descriptive fields.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] unless `actor` organizes the event
    /// - [`EngineError::Validation`] for an invalid schedule, a capacity
    ///   below the participants already advanced into the round, or starting
    ///   (completing) a round before its scheduled start (end)
    /// - [`EngineError::StateConflict`] for a status regression, a second
    ///   ongoing round, an unfinished predecessor, or a concurrent change
    pub async fn update_round(
        &self,
        actor: &Actor,
        event_id: EventId,
        number: u32,
        changes: RoundChanges,
    ) -> Result<Round> {
        EngineMetrics::observe(
            "update_round",
            self.update(actor, event_id, number, changes).await,
        )
    }

    #[allow(clippy::too_many_lines)]
    async fn update(
        &self,
        actor: &Actor,
        event_id: EventId,
        number: u32,
        changes: RoundChanges,
    ) -> Result<Round> {
        let event = self.env.organized_event(actor, event_id).await?;
        let round = self.get_round(event_id, number).await?;
        let siblings: Vec<Round> = self
            .env
            .documents
            .list::<Round>(&event_id.to_string())
            .await?
            .into_iter()
            .filter(|r| r.number != number)
            .collect();

        let start = changes.start_date.unwrap_or(round.start_date);
        let end = changes.end_date.unwrap_or(round.end_date);
        let reschedule = start != round.start_date || end != round.end_date;
        let status_change = changes.status.filter(|status| *status != round.status);

        let mut validator = Validator::new();
        validator
            .check(
                changes.name.as_ref().is_some_and(|n| n.trim().is_empty()),
                "name",
                "must not be empty",
            )
            .check(
                changes.max_participants == Some(0),
                "max_participants",
                "must be at least 1",
            )
            .check(
                changes
                    .max_participants
                    .is_some_and(|max| max > 0 && max < round.advanced_count),
                "max_participants",
                below_advanced(round.advanced_count),
            );
        if reschedule {
            check_schedule(&mut validator, &event, &siblings, number, start, end);
        }
        validator.finish()?;

        if let Some(next) = status_change {
            check_transition(&round, next, self.env.clock.now(), start, end, &siblings)?;
        }

        let renames = changes.name.is_some()
            || changes.description.is_some()
            || changes.max_participants.is_some();
        if !reschedule && status_change.is_none() && !renames {
            return Ok(round);
        }

        let partition = event_id.to_string();
        let mut tx = Transaction::new();

        if reschedule || status_change.is_some() {
            let seen_revision = event.rounds_revision;
            tx = tx.update(
                Event::key_for(event_id),
                partition.clone(),
                move |event: &mut Event| {
                    if reschedule {
                        if event.rounds_revision != seen_revision {
                            return Err(EngineError::conflict(ROUNDS_CHANGED));
                        }
                        event.rounds_revision += 1;
                    }
                    match status_change {
                        Some(RoundStatus::Ongoing) => {
                            if let Some(other) = event.ongoing_round.filter(|n| *n != number) {
                                return Err(EngineError::conflict(format!(
                                    "Round {other} is already ongoing"
                                )));
                            }
                            event.ongoing_round = Some(number);
                            event.current_round_number = event.current_round_number.max(number);
                        },
                        Some(RoundStatus::Completed) if event.ongoing_round == Some(number) => {
                            event.ongoing_round = None;
                        },
                        _ => {},
                    }
                    Ok(())
                },
            );
        }

        if status_change == Some(RoundStatus::Ongoing) && number > 1 {
            tx = tx.check(
                Round::key_for(event_id, number - 1),
                move |previous: &Round| {
                    if previous.status == RoundStatus::Completed {
                        Ok(())
                    } else {
                        Err(previous_not_completed(previous.number, number))
                    }
                },
            );
        }

        let seen_status = round.status;
        let round_step = tx.len();
        tx = tx.update(
            Round::key_for(event_id, number),
            partition,
            move |round: &mut Round| {
                if round.status != seen_status {
                    return Err(EngineError::conflict(format!(
                        "Round {number} changed status concurrently (now {})",
                        round.status.as_str()
                    )));
                }
                if let Some(status) = status_change {
                    round.status = status;
                }
                if reschedule {
                    round.start_date = start;
                    round.end_date = end;
                }
                if let Some(name) = changes.name {
                    round.name = name.trim().to_string();
                }
                if let Some(description) = changes.description {
                    round.description = Some(description).filter(|d| !d.trim().is_empty());
                }
                if let Some(max) = changes.max_participants {
                    if max < round.advanced_count {
                        return Err(EngineError::validation(
                            "max_participants",
                            below_advanced(round.advanced_count),
                        ));
                    }
                    round.max_participants = Some(max);
                }
                Ok(())
            },
        );

        let mut committed = self.env.documents.commit(tx).await?;
        let updated: Round = committed.take(round_step)?;

        if let Some(status) = status_change {
            tracing::info!(
                event_id = %event_id,
                number,
                from = seen_status.as_str(),
                to = status.as_str(),
                "Round status changed"
            );
            self.env
                .dispatcher
                .send(Notification::RoundStatusChanged {
                    event_id,
                    number,
                    status,
                })
                .await;
        } else {
            tracing::debug!(event_id = %event_id, number, "Round updated");
        }
        Ok(updated)
    }

    /// Delete the last round of an event while it is still `Upcoming`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] unless `actor` organizes the event
    /// - [`EngineError::StateConflict`] if the round started, is not the
    ///   highest-numbered round, or rounds changed concurrently
    pub async fn delete_round(&self, actor: &Actor, event_id: EventId, number: u32) -> Result<()> {
        EngineMetrics::observe("delete_round", self.delete(actor, event_id, number).await)
    }

    async fn delete(&self, actor: &Actor, event_id: EventId, number: u32) -> Result<()> {
        let event = self.env.organized_event(actor, event_id).await?;
        let round = self.get_round(event_id, number).await?;

        if round.status != RoundStatus::Upcoming {
            return Err(EngineError::conflict(format!(
                "Round {number} is {} and can no longer be deleted",
                round.status.as_str()
            )));
        }
        if number != event.round_count {
            return Err(EngineError::conflict(format!(
                "Only the last round (round {}) can be deleted",
                event.round_count
            )));
        }

        let partition = event_id.to_string();
        Transaction::new()
            .update(
                Event::key_for(event_id),
                partition.clone(),
                move |event: &mut Event| {
                    if event.round_count != number {
                        return Err(EngineError::conflict(format!(
                            "Only the last round (round {}) can be deleted",
                            event.round_count
                        )));
                    }
                    event.round_count -= 1;
                    event.rounds_revision += 1;
                    Ok(())
                },
            )
            .delete_if(
                Round::key_for(event_id, number),
                partition,
                move |round: &Round| {
                    if round.status == RoundStatus::Upcoming {
                        Ok(())
                    } else {
                        Err(EngineError::conflict(format!(
                            "Round {number} is {} and can no longer be deleted",
                            round.status.as_str()
                        )))
                    }
                },
            )
            .commit(&self.env.documents)
            .await?;

        tracing::info!(event_id = %event_id, number, "Round deleted");
        Ok(())
    }
}

fn below_advanced(advanced: u32) -> String {
    format!("must be at least {advanced}, the number of participants already in the round")
}
