//! Team formation, membership and locking.
//!
//! Membership changes are grouped writes over the team document and the
//! user's [`MembershipClaim`]. The team mutation re-checks status, size and
//! leadership at write time, and the claim makes "one team per user per
//! event" atomic: two users racing for the last seat can never both get in,
//! and one user racing into two teams can never end up in both.

use crate::Environment;
use crate::metrics::EngineMetrics;
use rand::seq::SliceRandom;
use roundhouse_core::documents::Transaction;
use roundhouse_core::environment::Notification;
use roundhouse_core::error::{EngineError, Result, Validator};
use roundhouse_core::ids::{EventId, InviteCode, TeamId, UserId};
use roundhouse_core::records::{Actor, InviteCodeEntry, MembershipClaim, Team, TeamStatus};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_COLLISION: &str = "Invite code already in use";
const DISBANDED: &str = "This team has been disbanded";

fn generate_code(length: usize) -> Result<InviteCode> {
    let mut rng = rand::thread_rng();
    let raw: String = (0..length)
        .filter_map(|_| CODE_ALPHABET.choose(&mut rng).copied().map(char::from))
        .collect();
    InviteCode::parse(&raw).map_err(|e| EngineError::Internal(e.to_string()))
}

fn is_code_collision(error: &EngineError) -> bool {
    *error == EngineError::conflict(CODE_COLLISION)
}

fn reserve_code(
    entry: InviteCodeEntry,
) -> impl FnOnce(Option<InviteCodeEntry>) -> Result<InviteCodeEntry> + Send + 'static {
    move |current| match current {
        Some(_) => Err(EngineError::conflict(CODE_COLLISION)),
        None => Ok(entry),
    }
}

fn who(is_self: bool) -> &'static str {
    if is_self { "You are" } else { "User is" }
}

fn require_leader(team: &Team, actor: &Actor, action: &str) -> Result<()> {
    if team.is_leader(actor.user_id) {
        Ok(())
    } else {
        Err(EngineError::forbidden(format!(
            "Only the team leader can {action}"
        )))
    }
}

/// Preconditions for adding `user`; evaluated before the write and again
/// inside it.
fn check_joinable(team: &Team, user: UserId, is_self: bool) -> Result<()> {
    match team.status {
        TeamStatus::Locked => {
            return Err(EngineError::conflict(
                "This team is locked and not accepting new members",
            ));
        },
        TeamStatus::Disbanded => return Err(EngineError::conflict(DISBANDED)),
        TeamStatus::Active => {},
    }
    if team.is_member(user) {
        return Err(EngineError::conflict(format!(
            "{} already a member of this team",
            who(is_self)
        )));
    }
    if team.size() >= team.max_size {
        return Err(EngineError::capacity(team.full_reason()));
    }
    Ok(())
}

fn check_removable(team: &Team, user: UserId) -> Result<()> {
    match team.status {
        TeamStatus::Locked => {
            return Err(EngineError::conflict(
                "Cannot change the members of a locked team",
            ));
        },
        TeamStatus::Disbanded => return Err(EngineError::conflict(DISBANDED)),
        TeamStatus::Active => {},
    }
    if team.is_leader(user) {
        return Err(EngineError::conflict(
            "The team leader cannot be removed; transfer leadership first",
        ));
    }
    if !team.is_member(user) {
        return Err(EngineError::conflict("User is not a member of this team"));
    }
    Ok(())
}

/// Point `(event, user)` at `team_id`, rejecting if it points elsewhere.
fn claim_membership(
    tx: Transaction,
    event_id: EventId,
    user_id: UserId,
    team_id: TeamId,
    is_self: bool,
) -> Transaction {
    tx.upsert(
        MembershipClaim::key_for(event_id, user_id),
        event_id.to_string(),
        move |current: Option<MembershipClaim>| match current.and_then(|c| c.team_id) {
            Some(existing) if existing == team_id => Err(EngineError::conflict(format!(
                "{} already a member of this team",
                who(is_self)
            ))),
            Some(_) => Err(EngineError::conflict(format!(
                "{} already a member of another team for this event",
                who(is_self)
            ))),
            None => Ok(MembershipClaim {
                event_id,
                user_id,
                team_id: Some(team_id),
            }),
        },
    )
}

/// Vacate `(event, user)` if it still points at `team_id`.
fn release_membership(
    tx: Transaction,
    event_id: EventId,
    user_id: UserId,
    team_id: TeamId,
) -> Transaction {
    tx.upsert(
        MembershipClaim::key_for(event_id, user_id),
        event_id.to_string(),
        move |current: Option<MembershipClaim>| {
            Ok(MembershipClaim {
                event_id,
                user_id,
                team_id: current
                    .and_then(|c| c.team_id)
                    .filter(|existing| *existing != team_id),
            })
        },
    )
}

/// Owns team creation, membership, locking and leadership.
#[derive(Clone)]
pub struct TeamRegistry {
    env: Environment,
}

impl TeamRegistry {
    /// Create the registry.
    #[must_use]
    pub const fn new(env: Environment) -> Self {
        Self { env }
    }

    /// Look up a team.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if absent.
    pub async fn get_team(&self, team_id: TeamId) -> Result<Team> {
        self.env.documents.require(&Team::key_for(team_id)).await
    }

    /// Teams of an event.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the event does not exist.
    pub async fn list_teams(&self, event_id: EventId) -> Result<Vec<Team>> {
        self.env.event(event_id).await?;
        self.env.documents.list(&event_id.to_string()).await
    }

    /// Resolve an invite code (case-insensitive) to its team.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] if the code is malformed
    /// - [`EngineError::NotFound`] if no team uses it
    pub async fn find_by_invite_code(&self, raw_code: &str) -> Result<Team> {
        let code = InviteCode::parse(raw_code)
            .map_err(|e| EngineError::validation("invite_code", e.to_string()))?;
        let entry: InviteCodeEntry = self
            .env
            .documents
            .get(&InviteCodeEntry::key_for(&code))
            .await?
            .ok_or_else(|| EngineError::not_found("Invite code", &code))?;
        let team = self.get_team(entry.team_id).await?;
        if team.invite_code != code {
            return Err(EngineError::not_found("Invite code", &code));
        }
        Ok(team)
    }

    async fn current_team_of(&self, event_id: EventId, user_id: UserId) -> Result<Option<TeamId>> {
        let claim: Option<MembershipClaim> = self
            .env
            .documents
            .get(&MembershipClaim::key_for(event_id, user_id))
            .await?;
        Ok(claim.and_then(|c| c.team_id))
    }

    /// Create a team led by `actor`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for an empty or overlong name
    /// - [`EngineError::StateConflict`] for a solo event, or if `actor`
    ///   already belongs to a team for this event
    pub async fn create_team(&self, actor: &Actor, event_id: EventId, name: &str) -> Result<Team> {
        EngineMetrics::observe("create_team", self.create(actor, event_id, name).await)
    }

    async fn create(&self, actor: &Actor, event_id: EventId, name: &str) -> Result<Team> {
        let name = name.trim().to_string();
        Validator::new()
            .check(name.is_empty(), "name", "must not be empty")
            .check(
                name.chars().count() > 100,
                "name",
                "must be at most 100 characters",
            )
            .finish()?;

        let event = self.env.event(event_id).await?;
        if !event.is_team_event() {
            return Err(EngineError::conflict("This event does not allow teams"));
        }
        if self.current_team_of(event_id, actor.user_id).await?.is_some() {
            return Err(EngineError::conflict(
                "You are already a member of a team for this event",
            ));
        }

        let now = self.env.clock.now();
        let team_id = TeamId::new();
        for attempt in 1..=self.env.config.invite_code_attempts {
            let code = generate_code(self.env.config.invite_code_length)?;
            let team = Team {
                id: team_id,
                event_id,
                name: name.clone(),
                leader_id: actor.user_id,
                members: vec![actor.user_id],
                max_size: event.max_team_size,
                status: TeamStatus::Active,
                invite_code: code.clone(),
                current_round: 0,
                eliminated: false,
                score: None,
                rank: None,
                active_registrations: 0,
                confirmed_registrations: 0,
                created_at: now,
            };
            let entry = InviteCodeEntry {
                code: code.clone(),
                team_id,
                event_id,
            };

            let result = claim_membership(Transaction::new(), event_id, actor.user_id, team_id, true)
                .insert(team.clone())
                .upsert(
                    InviteCodeEntry::key_for(&code),
                    event_id.to_string(),
                    reserve_code(entry),
                )
                .commit(&self.env.documents)
                .await;

            match result {
                Ok(_) => {
                    tracing::info!(
                        event_id = %event_id,
                        team_id = %team_id,
                        leader = %actor.user_id,
                        "Team created"
                    );
                    return Ok(team);
                },
                Err(e) if is_code_collision(&e) => {
                    tracing::debug!(attempt, "Invite code collision, regenerating");
                },
                Err(e) => return Err(e),
            }
        }
        Err(EngineError::Internal(
            "could not generate a unique invite code".to_string(),
        ))
    }

    /// Join the team that owns `raw_code`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] for an unknown code
    /// - [`EngineError::StateConflict`] if the team is locked or disbanded,
    ///   or `actor` already belongs to this or another team
    /// - [`EngineError::CapacityConflict`] if the team is full when the write runs
    pub async fn join_with_code(&self, actor: &Actor, raw_code: &str) -> Result<Team> {
        EngineMetrics::observe("join_team", self.join(actor, raw_code).await)
    }

    async fn join(&self, actor: &Actor, raw_code: &str) -> Result<Team> {
        let team = self.find_by_invite_code(raw_code).await?;
        check_joinable(&team, actor.user_id, true)?;
        if self
            .current_team_of(team.event_id, actor.user_id)
            .await?
            .is_some()
        {
            return Err(EngineError::conflict(
                "You are already a member of another team for this event",
            ));
        }
        self.admit(&team, actor.user_id, true).await
    }

    /// Leader adds `user_id` directly.
    ///
    /// # Errors
    ///
    /// As [`TeamRegistry::join_with_code`], plus [`EngineError::Authorization`]
    /// unless `actor` leads the team.
    pub async fn add_member(&self, actor: &Actor, team_id: TeamId, user_id: UserId) -> Result<Team> {
        EngineMetrics::observe("add_member", self.add(actor, team_id, user_id).await)
    }

    async fn add(&self, actor: &Actor, team_id: TeamId, user_id: UserId) -> Result<Team> {
        let team = self.get_team(team_id).await?;
        require_leader(&team, actor, "add members")?;
        check_joinable(&team, user_id, false)?;
        self.admit(&team, user_id, false).await
    }

    async fn admit(&self, team: &Team, user_id: UserId, is_self: bool) -> Result<Team> {
        let team_id = team.id;
        let mut committed = claim_membership(
            Transaction::new(),
            team.event_id,
            user_id,
            team_id,
            is_self,
        )
        .update(
            Team::key_for(team_id),
            team.event_id.to_string(),
            move |team: &mut Team| {
                check_joinable(team, user_id, is_self)?;
                team.members.push(user_id);
                Ok(())
            },
        )
        .commit(&self.env.documents)
        .await?;
        let team: Team = committed.take(1)?;

        tracing::info!(team_id = %team_id, user_id = %user_id, size = team.size(), "Member joined team");
        self.env
            .dispatcher
            .send(Notification::TeamJoined { team_id, user_id })
            .await;
        Ok(team)
    }

    /// Remove a member; the leader removes anyone else, members remove themselves.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] for anyone else
    /// - [`EngineError::StateConflict`] for the leader, a non-member, or a
    ///   locked or disbanded team
    pub async fn remove_member(
        &self,
        actor: &Actor,
        team_id: TeamId,
        user_id: UserId,
    ) -> Result<Team> {
        EngineMetrics::observe("remove_member", self.remove(actor, team_id, user_id).await)
    }

    async fn remove(&self, actor: &Actor, team_id: TeamId, user_id: UserId) -> Result<Team> {
        let team = self.get_team(team_id).await?;
        let may_remove = |team: &Team| team.is_leader(actor.user_id) || actor.user_id == user_id;
        if !may_remove(&team) {
            return Err(EngineError::forbidden(
                "Only the team leader can remove other members",
            ));
        }
        check_removable(&team, user_id)?;

        let actor_id = actor.user_id;
        let tx = Transaction::new().update(
            Team::key_for(team_id),
            team.event_id.to_string(),
            move |team: &mut Team| {
                if !(team.is_leader(actor_id) || actor_id == user_id) {
                    return Err(EngineError::forbidden(
                        "Only the team leader can remove other members",
                    ));
                }
                check_removable(team, user_id)?;
                team.members.retain(|member| *member != user_id);
                Ok(())
            },
        );
        let mut committed = release_membership(tx, team.event_id, user_id, team_id)
            .commit(&self.env.documents)
            .await?;
        let team: Team = committed.take(0)?;

        tracing::info!(team_id = %team_id, user_id = %user_id, "Member left team");
        self.env
            .dispatcher
            .send(Notification::TeamMemberRemoved { team_id, user_id })
            .await;
        Ok(team)
    }

    /// Freeze membership so the team can register.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] unless `actor` leads the team
    /// - [`EngineError::StateConflict`] if already locked, disbanded, or
    ///   smaller than the event's minimum team size
    pub async fn lock(&self, actor: &Actor, team_id: TeamId) -> Result<Team> {
        EngineMetrics::observe("lock_team", self.lock_team(actor, team_id).await)
    }

    async fn lock_team(&self, actor: &Actor, team_id: TeamId) -> Result<Team> {
        let team = self.get_team(team_id).await?;
        require_leader(&team, actor, "lock the team")?;
        let min = self.env.event(team.event_id).await?.min_team_size;

        let actor = *actor;
        let team = self
            .env
            .documents
            .update(
                Team::key_for(team_id),
                team.event_id.to_string(),
                move |team: &mut Team| {
                    require_leader(team, &actor, "lock the team")?;
                    match team.status {
                        TeamStatus::Locked => return Err(EngineError::conflict("Team is already locked")),
                        TeamStatus::Disbanded => return Err(EngineError::conflict(DISBANDED)),
                        TeamStatus::Active => {},
                    }
                    if team.size() < min {
                        return Err(EngineError::conflict(format!(
                            "A team needs at least {min} members to lock ({}/{min})",
                            team.size()
                        )));
                    }
                    team.status = TeamStatus::Locked;
                    Ok(())
                },
            )
            .await?;

        tracing::info!(team_id = %team_id, size = team.size(), "Team locked");
        Ok(team)
    }

    /// Reopen membership.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] unless `actor` leads the team
    /// - [`EngineError::StateConflict`] if not locked, or while any
    ///   registration for the team is pending, confirmed or waitlisted
    pub async fn unlock(&self, actor: &Actor, team_id: TeamId) -> Result<Team> {
        EngineMetrics::observe("unlock_team", self.unlock_team(actor, team_id).await)
    }

    async fn unlock_team(&self, actor: &Actor, team_id: TeamId) -> Result<Team> {
        let team = self.get_team(team_id).await?;
        require_leader(&team, actor, "unlock the team")?;

        let actor = *actor;
        let team = self
            .env
            .documents
            .update(
                Team::key_for(team_id),
                team.event_id.to_string(),
                move |team: &mut Team| {
                    require_leader(team, &actor, "unlock the team")?;
                    if team.status != TeamStatus::Locked {
                        return Err(EngineError::conflict("Team is not locked"));
                    }
                    if team.active_registrations > 0 {
                        return Err(EngineError::conflict(
                            "Cannot unlock a team with active registrations",
                        ));
                    }
                    team.status = TeamStatus::Active;
                    Ok(())
                },
            )
            .await?;

        tracing::info!(team_id = %team_id, "Team unlocked");
        Ok(team)
    }

    /// Hand leadership to another member.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] unless `actor` leads the team
    /// - [`EngineError::StateConflict`] if `new_leader` is not a member or
    ///   the team is disbanded
    pub async fn transfer_leadership(
        &self,
        actor: &Actor,
        team_id: TeamId,
        new_leader: UserId,
    ) -> Result<Team> {
        EngineMetrics::observe(
            "transfer_leadership",
            self.transfer(actor, team_id, new_leader).await,
        )
    }

    async fn transfer(&self, actor: &Actor, team_id: TeamId, new_leader: UserId) -> Result<Team> {
        let team = self.get_team(team_id).await?;
        require_leader(&team, actor, "transfer leadership")?;

        let actor = *actor;
        let team = self
            .env
            .documents
            .update(
                Team::key_for(team_id),
                team.event_id.to_string(),
                move |team: &mut Team| {
                    require_leader(team, &actor, "transfer leadership")?;
                    if team.status == TeamStatus::Disbanded {
                        return Err(EngineError::conflict(DISBANDED));
                    }
                    if !team.is_member(new_leader) {
                        return Err(EngineError::conflict(
                            "The new leader must already be a member of the team",
                        ));
                    }
                    team.leader_id = new_leader;
                    Ok(())
                },
            )
            .await?;

        tracing::info!(team_id = %team_id, leader = %new_leader, "Team leadership transferred");
        self.env
            .dispatcher
            .send(Notification::TeamLeaderChanged {
                team_id,
                leader_id: new_leader,
            })
            .await;
        Ok(team)
    }

    /// Disband the team and release every member.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] unless `actor` leads the team
    /// - [`EngineError::StateConflict`] if already disbanded, while any
    ///   registration for the team is confirmed, or if membership changed
    ///   concurrently
    pub async fn disband(&self, actor: &Actor, team_id: TeamId) -> Result<Team> {
        EngineMetrics::observe("disband_team", self.disband_team(actor, team_id).await)
    }

    async fn disband_team(&self, actor: &Actor, team_id: TeamId) -> Result<Team> {
        let team = self.get_team(team_id).await?;
        require_leader(&team, actor, "disband the team")?;
        if team.status == TeamStatus::Disbanded {
            return Err(EngineError::conflict(DISBANDED));
        }

        let actor = *actor;
        let seen_members = team.members.clone();
        let mut tx = Transaction::new().update(
            Team::key_for(team_id),
            team.event_id.to_string(),
            move |team: &mut Team| {
                require_leader(team, &actor, "disband the team")?;
                if team.status == TeamStatus::Disbanded {
                    return Err(EngineError::conflict(DISBANDED));
                }
                if team.confirmed_registrations > 0 {
                    return Err(EngineError::conflict(
                        "Cannot disband a team with confirmed registrations",
                    ));
                }
                if team.members != seen_members {
                    return Err(EngineError::conflict(
                        "Team membership changed concurrently; reload and try again",
                    ));
                }
                team.status = TeamStatus::Disbanded;
                Ok(())
            },
        );
        for member in &team.members {
            tx = release_membership(tx, team.event_id, *member, team_id);
        }
        let mut committed = tx.commit(&self.env.documents).await?;
        let team: Team = committed.take(0)?;

        tracing::info!(team_id = %team_id, members = team.size(), "Team disbanded");
        self.env
            .dispatcher
            .send(Notification::TeamDisbanded { team_id })
            .await;
        Ok(team)
    }

    /// Replace the team's invite code; the old code stops working.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] unless `actor` leads the team
    /// - [`EngineError::StateConflict`] if the team is disbanded or the code
    ///   changed concurrently
    pub async fn regenerate_invite_code(&self, actor: &Actor, team_id: TeamId) -> Result<Team> {
        EngineMetrics::observe(
            "regenerate_invite_code",
            self.regenerate(actor, team_id).await,
        )
    }

    async fn regenerate(&self, actor: &Actor, team_id: TeamId) -> Result<Team> {
        let team = self.get_team(team_id).await?;
        require_leader(&team, actor, "change the invite code")?;
        if team.status == TeamStatus::Disbanded {
            return Err(EngineError::conflict(DISBANDED));
        }

        let partition = team.event_id.to_string();
        for attempt in 1..=self.env.config.invite_code_attempts {
            let code = generate_code(self.env.config.invite_code_length)?;
            let old = team.invite_code.clone();
            let replacement = code.clone();
            let actor = *actor;
            let entry = InviteCodeEntry {
                code: code.clone(),
                team_id,
                event_id: team.event_id,
            };

            let result = Transaction::new()
                .update(
                    Team::key_for(team_id),
                    partition.clone(),
                    move |team: &mut Team| {
                        require_leader(team, &actor, "change the invite code")?;
                        if team.invite_code != old {
                            return Err(EngineError::conflict(
                                "The invite code was changed concurrently",
                            ));
                        }
                        team.invite_code = replacement;
                        Ok(())
                    },
                )
                .delete_if(
                    InviteCodeEntry::key_for(&team.invite_code),
                    partition.clone(),
                    move |entry: &InviteCodeEntry| {
                        if entry.team_id == team_id {
                            Ok(())
                        } else {
                            Err(EngineError::conflict(
                                "The invite code was changed concurrently",
                            ))
                        }
                    },
                )
                .upsert(
                    InviteCodeEntry::key_for(&code),
                    partition.clone(),
                    reserve_code(entry),
                )
                .commit(&self.env.documents)
                .await;

            match result {
                Ok(mut committed) => {
                    tracing::info!(team_id = %team_id, "Invite code regenerated");
                    return committed.take(0);
                },
                Err(e) if is_code_collision(&e) => {
                    tracing::debug!(attempt, "Invite code collision, regenerating");
                },
                Err(e) => return Err(e),
            }
        }
        Err(EngineError::Internal(
            "could not generate a unique invite code".to_string(),
        ))
    }

    /// Record an organizer-assigned score and rank (last writer wins).
    ///
    /// # Errors
    ///
    /// - [`EngineError::Authorization`] unless `actor` organizes the event
    /// - [`EngineError::Validation`] for a non-finite score or a zero rank
    pub async fn set_standing(
        &self,
        actor: &Actor,
        team_id: TeamId,
        score: Option<f64>,
        rank: Option<u32>,
    ) -> Result<Team> {
        EngineMetrics::observe(
            "set_standing",
            self.standing(actor, team_id, score, rank).await,
        )
    }

    async fn standing(
        &self,
        actor: &Actor,
        team_id: TeamId,
        score: Option<f64>,
        rank: Option<u32>,
    ) -> Result<Team> {
        Validator::new()
            .check(
                score.is_some_and(|s| !s.is_finite()),
                "score",
                "must be a finite number",
            )
            .check(rank == Some(0), "rank", "must be at least 1")
            .finish()?;
        let team = self.get_team(team_id).await?;
        self.env.organized_event(actor, team.event_id).await?;

        self.env
            .documents
            .update(
                Team::key_for(team_id),
                team.event_id.to_string(),
                move |team: &mut Team| {
                    team.score = score;
                    team.rank = rank;
                    Ok(())
                },
            )
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::Engine;
    use roundhouse_core::ErrorKind;
    use roundhouse_core::records::Event;
    use roundhouse_testing::{EventFixture, InMemoryStore, RecordingNotifier, test_clock};
    use std::sync::Arc;

    struct Harness {
        engine: Engine,
        notifier: Arc<RecordingNotifier>,
        organizer: Actor,
        event: Event,
    }

    async fn harness(fixture: EventFixture) -> Harness {
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = Engine::builder(Arc::new(InMemoryStore::new()))
            .clock(test_clock())
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
            notifier,
            organizer,
            event,
        }
    }

    fn user() -> Actor {
        Actor::user(UserId::new())
    }

    impl Harness {
        fn teams(&self) -> &TeamRegistry {
            self.engine.teams()
        }

        /// Team with a fresh leader and `extra` more members.
        async fn team_of(&self, extra: usize) -> (Actor, Team) {
            let leader = user();
            let mut team = self
                .teams()
                .create_team(&leader, self.event.id, "Night Owls")
                .await
                .unwrap();
            for _ in 0..extra {
                team = self
                    .teams()
                    .join_with_code(&user(), team.invite_code.as_str())
                    .await
                    .unwrap();
            }
            (leader, team)
        }
    }

    #[tokio::test]
    async fn creator_leads_a_fresh_team() {
        let h = harness(EventFixture::team(2, 4)).await;
        let (leader, team) = h.team_of(0).await;

        assert_eq!(team.members, vec![leader.user_id]);
        assert!(team.is_leader(leader.user_id));
        assert_eq!(team.status, TeamStatus::Active);
        assert_eq!(team.max_size, 4);
        assert_eq!(team.invite_code.as_str().len(), 6);
    }

    #[tokio::test]
    async fn solo_events_have_no_teams() {
        let h = harness(EventFixture::solo()).await;
        let err = h
            .teams()
            .create_team(&user(), h.event.id, "Solo")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[tokio::test]
    async fn one_team_per_user_per_event() {
        let h = harness(EventFixture::team(2, 4)).await;
        let (leader, _) = h.team_of(0).await;
        let (_, other) = h.team_of(0).await;

        let err = h
            .teams()
            .create_team(&leader, h.event.id, "Second")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        let err = h
            .teams()
            .join_with_code(&leader, other.invite_code.as_str())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "You are already a member of another team for this event"
        );
    }

    #[tokio::test]
    async fn invite_codes_are_case_insensitive() {
        let h = harness(EventFixture::team(2, 4)).await;
        let (_, team) = h.team_of(0).await;
        let lower = format!("  {} ", team.invite_code.as_str().to_ascii_lowercase());

        let joined = h.teams().join_with_code(&user(), &lower).await.unwrap();
        assert_eq!(joined.size(), 2);
        assert_eq!(h.notifier.count("team_joined"), 1);
    }

    #[tokio::test]
    async fn full_team_rejects_with_the_size_in_the_reason() {
        let h = harness(EventFixture::team(2, 3)).await;
        let (_, team) = h.team_of(2).await;

        let err = h
            .teams()
            .join_with_code(&user(), team.invite_code.as_str())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityConflict);
        assert_eq!(err.to_string(), "This team is full (3/3 members)");
    }

    #[tokio::test]
    async fn locking_needs_the_minimum_size() {
        let h = harness(EventFixture::team(3, 4)).await;
        let (leader, team) = h.team_of(1).await;

        let err = h.teams().lock(&leader, team.id).await.unwrap_err();
        assert_eq!(err.to_string(), "A team needs at least 3 members to lock (2/3)");

        h.teams()
            .join_with_code(&user(), team.invite_code.as_str())
            .await
            .unwrap();
        let locked = h.teams().lock(&leader, team.id).await.unwrap();
        assert_eq!(locked.status, TeamStatus::Locked);

        let err = h
            .teams()
            .join_with_code(&user(), team.invite_code.as_str())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[tokio::test]
    async fn only_the_leader_locks() {
        let h = harness(EventFixture::team(1, 4)).await;
        let (_, team) = h.team_of(1).await;
        let member = Actor::user(team.members[1]);

        let err = h.teams().lock(&member, team.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[tokio::test]
    async fn leader_cannot_be_removed_but_members_can_leave() {
        let h = harness(EventFixture::team(1, 4)).await;
        let (leader, team) = h.team_of(1).await;
        let member = Actor::user(team.members[1]);

        let err = h
            .teams()
            .remove_member(&leader, team.id, leader.user_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        let err = h
            .teams()
            .remove_member(&member, team.id, leader.user_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let team = h
            .teams()
            .remove_member(&member, team.id, member.user_id)
            .await
            .unwrap();
        assert_eq!(team.members, vec![leader.user_id]);

        // The claim was released, so the former member may start a new team.
        h.teams()
            .create_team(&member, h.event.id, "Fresh Start")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn leadership_moves_only_to_members() {
        let h = harness(EventFixture::team(1, 4)).await;
        let (leader, team) = h.team_of(1).await;
        let member = team.members[1];

        let err = h
            .teams()
            .transfer_leadership(&leader, team.id, UserId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        let team = h
            .teams()
            .transfer_leadership(&leader, team.id, member)
            .await
            .unwrap();
        assert!(team.is_leader(member));
        assert!(team.is_member(leader.user_id));

        let err = h.teams().lock(&leader, team.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[tokio::test]
    async fn disbanding_releases_every_member() {
        let h = harness(EventFixture::team(1, 4)).await;
        let (leader, team) = h.team_of(2).await;

        let team = h.teams().disband(&leader, team.id).await.unwrap();
        assert_eq!(team.status, TeamStatus::Disbanded);

        for member in &team.members {
            h.teams()
                .create_team(&Actor::user(*member), h.event.id, "Regrouped")
                .await
                .unwrap();
        }
        let err = h
            .teams()
            .join_with_code(&user(), team.invite_code.as_str())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), DISBANDED);
        assert_eq!(h.notifier.count("team_disbanded"), 1);
    }

    #[tokio::test]
    async fn regenerated_code_replaces_the_old_one() {
        let h = harness(EventFixture::team(1, 4)).await;
        let (leader, team) = h.team_of(0).await;

        let updated = h
            .teams()
            .regenerate_invite_code(&leader, team.id)
            .await
            .unwrap();
        assert_ne!(updated.invite_code, team.invite_code);

        let err = h
            .teams()
            .find_by_invite_code(team.invite_code.as_str())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            h.teams()
                .find_by_invite_code(updated.invite_code.as_str())
                .await
                .unwrap()
                .id,
            team.id
        );
    }

    #[tokio::test]
    async fn standing_is_organizer_only() {
        let h = harness(EventFixture::team(1, 4)).await;
        let (leader, team) = h.team_of(0).await;

        let err = h
            .teams()
            .set_standing(&leader, team.id, Some(10.0), Some(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let team = h
            .teams()
            .set_standing(&h.organizer, team.id, Some(97.5), Some(1))
            .await
            .unwrap();
        assert_eq!(team.score, Some(97.5));
        assert_eq!(team.rank, Some(1));
    }

    #[tokio::test]
    async fn malformed_codes_are_validation_errors() {
        let h = harness(EventFixture::team(1, 4)).await;
        let err = h.teams().join_with_code(&user(), "no-dashes").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
