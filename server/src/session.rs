//! Authoritative match state shared by every connection
//!
//! [`GameSession`] owns the roster, seats, round counter and win history
//! behind one mutex. Every public method takes the lock for the length of an
//! in-memory update and releases it before returning, so callers can never
//! hold it across network I/O and concurrent operations observe a total order.
//!
//! Round semantics: `round` is 0 until the second player is admitted, then
//! starts at 1 and advances by one for every resolved attack. Round `n` is
//! therefore the `n`th shot of the match, which is also how
//! [`TurnPolicy::Alternate`] decides whose turn it is.
//!
//! Epochs: every time a match is cleared the session's epoch advances. Admissions
//! report the epoch they joined, so the command channel can tell players of a
//! cleared match apart from players who already joined the next one.

use crate::config::TurnPolicy;
use crate::player::{resolve_attack, Participant, ValidationError};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Cell, Mark, ObservationGrid, SeatNames, Snapshot, FLEET_SIZE};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Notify;

/// Lifecycle stage of the current match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    AwaitingSecondPlayer,
    Active,
    Concluded,
}

/// Reasons a session operation is refused without changing state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0:?} is not seated in an active match")]
    UnknownAttacker(String),
    #[error("the match is over; reset to play again")]
    MatchConcluded,
    #[error("out of turn: waiting for {expected}")]
    OutOfTurn { expected: String },
}

/// Result of a successful admission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmitOutcome {
    /// A full match was cleared to make room for this player
    pub forced_reset: bool,
    /// Seat mapping, present when this admission started the match
    pub seats: Option<SeatNames>,
    /// Epoch of the match the player joined
    pub epoch: u64,
}

/// Result of a resolved attack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackOutcome {
    pub mark: Mark,
    /// The attacker's whole observation grid after the shot
    pub grid: ObservationGrid,
    /// Round counter after the shot
    pub round: u32,
    /// Set when this shot won the match; reported for exactly one attack per match
    pub winner: Option<String>,
}

struct SessionState {
    participants: Vec<Participant>,
    /// Indices into `participants` for seats A and B
    seats: Option<[usize; 2]>,
    round: u32,
    started: bool,
    winner_declared: bool,
    win_history: Vec<String>,
    epoch: u64,
    /// Epoch created by a viewer reset the players have not been told about
    pending_reset: Option<u64>,
    turn_policy: TurnPolicy,
    rng: StdRng,
}

impl SessionState {
    fn clear_match(&mut self) {
        self.participants.clear();
        self.seats = None;
        self.round = 0;
        self.started = false;
        self.winner_declared = false;
        self.epoch += 1;
    }

    /// Records the winner in the history the first time one exists
    fn declare_winner(&mut self) -> Option<String> {
        if self.winner_declared {
            return None;
        }
        let winner = self.winner()?.name().to_string();
        self.winner_declared = true;
        self.win_history.push(winner.clone());
        info!("Game over, winner: {}", winner);
        Some(winner)
    }

    fn winner(&self) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.hit_count() >= FLEET_SIZE)
    }

    fn phase(&self) -> Phase {
        match self.participants.len() {
            0 => Phase::Empty,
            1 => Phase::AwaitingSecondPlayer,
            _ if self.winner().is_some() => Phase::Concluded,
            _ => Phase::Active,
        }
    }

    fn seat_names(&self) -> Option<SeatNames> {
        self.seats.map(|[a, b]| SeatNames {
            a: self.participants[a].name().to_string(),
            b: self.participants[b].name().to_string(),
        })
    }

    /// The loser of the previous match takes seat A; otherwise a coin flip
    fn assign_seats(&mut self) {
        let previous_winner = self.win_history.last().and_then(|winner| {
            self.participants
                .iter()
                .position(|p| p.name() == winner.as_str())
        });

        let seat_a = match previous_winner {
            Some(winner) => 1 - winner,
            None => {
                if self.rng.gen_bool(0.5) {
                    0
                } else {
                    1
                }
            }
        };
        self.seats = Some([seat_a, 1 - seat_a]);
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.participants.iter().position(|p| p.name() == name)
    }
}

/// The single match instance shared by the player and viewer channels
pub struct GameSession {
    state: Mutex<SessionState>,
    reset_signal: Notify,
}

impl GameSession {
    /// Creates an empty session
    ///
    /// `seed` fixes the seat shuffle for reproducible runs.
    pub fn new(turn_policy: TurnPolicy, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            state: Mutex::new(SessionState {
                participants: Vec::with_capacity(2),
                seats: None,
                round: 0,
                started: false,
                winner_declared: false,
                win_history: Vec::new(),
                epoch: 0,
                pending_reset: None,
                turn_policy,
                rng,
            }),
            reset_signal: Notify::new(),
        }
    }

    // A panic while holding the guard cannot leave the roster half-written
    // (every mutation is a single push, clear or slot write), so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validates and admits a player in one step
    pub fn register(&self, name: &str, cells: &[i64]) -> Result<AdmitOutcome, SessionError> {
        let participant = Participant::register(name, cells)?;
        self.admit(participant)
    }

    /// Adds a validated participant to the roster
    ///
    /// A third admission clears the finished or running match first. The
    /// second admission starts the match and assigns seats.
    pub fn admit(&self, participant: Participant) -> Result<AdmitOutcome, SessionError> {
        let mut state = self.lock();

        let forced_reset = state.participants.len() >= 2;
        if forced_reset {
            warn!(
                "Roster full, clearing previous match to admit {}",
                participant.name()
            );
            state.clear_match();
        }

        if state.index_of(participant.name()).is_some() {
            return Err(ValidationError::DuplicateName(participant.name().to_string()).into());
        }

        info!("Admitted player {}", participant.name());
        state.participants.push(participant);

        let seats = if state.participants.len() == 2 {
            state.started = true;
            state.round = 1;
            state.assign_seats();
            let seats = state.seat_names();
            if let Some(seats) = &seats {
                info!("Match started: A = {}, B = {}", seats.a, seats.b);
            }
            seats
        } else {
            None
        };

        Ok(AdmitOutcome {
            forced_reset,
            seats,
            epoch: state.epoch,
        })
    }

    /// Fires `attacker` at `cell` on the opponent's board
    ///
    /// A shot that completes the 16th hit also declares the winner before the
    /// lock is released, so no reset can slip between the win and its record.
    pub fn attack(&self, attacker: &str, cell: Cell) -> Result<AttackOutcome, SessionError> {
        let mut state = self.lock();

        let unknown = || SessionError::UnknownAttacker(attacker.to_string());
        if state.participants.len() < 2 {
            return Err(unknown());
        }
        let attacker_idx = state.index_of(attacker).ok_or_else(unknown)?;
        let defender_idx = 1 - attacker_idx;

        if state.winner().is_some() {
            return Err(SessionError::MatchConcluded);
        }

        if state.turn_policy == TurnPolicy::Alternate {
            if let Some([seat_a, seat_b]) = state.seats {
                let expected = if state.round % 2 == 1 { seat_a } else { seat_b };
                if expected != attacker_idx {
                    return Err(SessionError::OutOfTurn {
                        expected: state.participants[expected].name().to_string(),
                    });
                }
            }
        }

        let (first, second) = state.participants.split_at_mut(1);
        let (attacker_ref, defender_ref) = if attacker_idx == 0 {
            (&mut first[0], &second[0])
        } else {
            (&mut second[0], &first[0])
        };
        let mark = resolve_attack(attacker_ref, defender_ref, cell);
        let grid = attacker_ref.observations().clone();

        state.round += 1;
        debug!(
            "{} fired at {} against {}: {:?} (round {})",
            attacker,
            cell,
            state.participants[defender_idx].name(),
            mark,
            state.round
        );

        let winner = state.declare_winner();

        Ok(AttackOutcome {
            mark,
            grid,
            round: state.round,
            winner,
        })
    }

    /// Name of the player who has found all 16 opposing cells, if any
    pub fn check_winner(&self) -> Option<String> {
        self.lock().winner().map(|p| p.name().to_string())
    }

    /// Returns the winner the first time one exists in this match
    ///
    /// The winner is appended to the win history at the same moment, so a
    /// match is recorded and announced exactly once.
    ///
    /// [`attack`](Self::attack) declares the winner of the shot that ends a
    /// match, so after that shot this returns `None`.
    pub fn declare_winner(&self) -> Option<String> {
        self.lock().declare_winner()
    }

    /// Clears the match; the win history is kept
    ///
    /// Returns the epoch of the next match. Players who joined an earlier
    /// epoch belong to the match that was just cleared.
    pub fn reset(&self) -> u64 {
        let mut state = self.lock();
        state.clear_match();
        info!("Game reset, now at epoch {}", state.epoch);
        state.epoch
    }

    /// Resets on behalf of the viewer channel and queues a notice for the command channel
    ///
    /// Wakes whoever is waiting in [`reset_requested`](Self::reset_requested).
    pub fn request_reset(&self) -> u64 {
        let epoch = {
            let mut state = self.lock();
            state.clear_match();
            state.pending_reset = Some(state.epoch);
            state.epoch
        };
        info!("Game reset requested by viewer channel, now at epoch {}", epoch);
        self.reset_signal.notify_one();
        epoch
    }

    /// Consumes a pending viewer-initiated reset, returning the epoch it created
    pub fn take_reset_request(&self) -> Option<u64> {
        self.lock().pending_reset.take()
    }

    /// Resolves after [`request_reset`](Self::request_reset) has been called
    ///
    /// A request made while nobody waits is remembered, so the next call
    /// returns immediately.
    pub async fn reset_requested(&self) {
        self.reset_signal.notified().await;
    }

    /// Forgets every recorded winner
    pub fn clear_history(&self) {
        self.lock().win_history.clear();
    }

    /// Current round and seat mapping
    pub fn round_info(&self) -> (u32, Option<SeatNames>) {
        let state = self.lock();
        (state.round, state.seat_names())
    }

    /// Consistent summary of the match for viewers
    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();

        let ordered: Vec<&Participant> = match state.seats {
            Some([a, b]) => vec![&state.participants[a], &state.participants[b]],
            None => state.participants.iter().collect(),
        };
        let name = |i: usize| ordered.get(i).map(|p| p.name().to_string());
        let score = |i: usize| ordered.get(i).map_or(0, |p| p.hit_count());

        Snapshot {
            player1_score: score(0),
            player2_score: score(1),
            player1_name: name(0).unwrap_or_default(),
            player2_name: name(1).unwrap_or_default(),
            game_round: state.round,
            winner: state.winner().map(|p| p.name().to_string()),
            winner_history: state.win_history.clone(),
        }
    }

    /// Current lifecycle stage, derived from the roster and the hit counts
    pub fn phase(&self) -> Phase {
        self.lock().phase()
    }

    /// Round counter: 0 before the match starts, then one more per resolved attack
    pub fn round(&self) -> u32 {
        self.lock().round
    }

    /// Whether two players have been seated since the last reset
    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    /// Number of times a match has been cleared
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Current participants in admission order
    pub fn player_names(&self) -> Vec<String> {
        self.lock()
            .participants
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Hits recorded by `name`, or `None` if no such participant is seated
    pub fn hit_count(&self, name: &str) -> Option<usize> {
        let state = self.lock();
        state
            .index_of(name)
            .map(|i| state.participants[i].hit_count())
    }

    /// Winners of past matches, oldest first
    pub fn win_history(&self) -> Vec<String> {
        self.lock().win_history.clone()
    }
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new(TurnPolicy::Free, None)
    }
}
