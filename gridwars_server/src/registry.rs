// Session and match registries.
//
// Both registries are plain owned collections. They are held by the
// `Dispatcher` and mutated only from its single consumer thread, so there is
// no internal locking; other threads reach them by enqueuing a command.
//
// `Match` wraps a `MatchEngine` with everything that is about the
// participants rather than the board: who plays, who is ready, whose turn it
// is, the move log, and the strings the protocol needs at match start and end
// (GAME_INITIALIZE payloads, GAME_REPORT payloads, the EXECUTE_PROCEDURE
// logging directive).
//
// Turn handling is split in two on purpose: `play` applies a move for the
// current mover and never touches the turn, `advance_turn` hands the turn
// over. The dispatcher checks for a terminal position in between.

use std::collections::BTreeMap;

use gridwars_protocol::{MatchId, SessionId};
use rand::Rng;

use crate::engine::{FourInARow, InvalidMove, MatchEngine, Seat};

/// ACTION_REQUEST payload when no move has been played yet.
pub const NO_PREVIOUS_MOVE: &str = "-1";

/// Move-log rendering for a match without moves.
pub const NO_MOVES_RECORDED: &str = "No Moves Recorded";

/// Move count past which a validation match counts as a passed protocol
/// test.
pub const VALIDATION_MOVES: usize = 5;

/// Debug or live (competition) mode, as toggled through the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Debug,
    Live,
}

impl Mode {
    /// Wire encoding: 1 is live, anything else is debug.
    pub fn from_flag(flag: i64) -> Mode {
        if flag == 1 { Mode::Live } else { Mode::Debug }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Debug => "debug",
            Mode::Live => "live",
        }
    }
}

/// A connected participant: a wire bot or a bridge human proxy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub busy: bool,
    pub match_id: Option<MatchId>,
    pub mode: Mode,
    pub language: String,
}

impl Session {
    pub fn new(id: SessionId, mode: Mode, language: impl Into<String>) -> Self {
        Self {
            id,
            busy: false,
            match_id: None,
            mode,
            language: language.into(),
        }
    }

    /// Bind the session to a match.
    pub fn engage(&mut self, match_id: MatchId) {
        self.busy = true;
        self.match_id = Some(match_id);
    }

    /// Return the session to the idle pool.
    pub fn release(&mut self) {
        self.busy = false;
        self.match_id = None;
    }
}

/// Every connected participant, keyed by session id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session. Returns `false` (and leaves the registry
    /// untouched) if the id is already present.
    pub fn insert(&mut self, session: Session) -> bool {
        if self.sessions.contains_key(&session.id) {
            return false;
        }
        self.sessions.insert(session.id, session);
        true
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Mark a session idle. No-op for unknown ids (including the scripted
    /// validation opponent).
    pub fn release(&mut self, id: SessionId) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.release();
        }
    }

    /// Idle wire bots, in id order.
    pub fn idle_bots(&self) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|s| s.id.is_wire() && !s.busy)
            .map(|s| s.id)
            .collect()
    }

    /// Bridge-only human proxies, in id order.
    pub fn human_proxies(&self) -> Vec<SessionId> {
        self.sessions
            .keys()
            .copied()
            .filter(|id| id.is_bridge())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// How a finished match ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Won(SessionId),
    Draw,
}

impl Outcome {
    /// Winner id for reports and the logging directive; `0` for a draw.
    pub fn winner_id(self) -> SessionId {
        match self {
            Outcome::Won(id) => id,
            Outcome::Draw => SessionId(0),
        }
    }
}

/// One match between two participants (or one bot and the scripted mover).
pub struct Match {
    pub id: MatchId,
    pub participant_a: SessionId,
    pub participant_b: SessionId,
    ready_a: bool,
    ready_b: bool,
    first_mover: SessionId,
    current_mover: SessionId,
    move_log: Vec<String>,
    winner: Option<Outcome>,
    pub rated: bool,
    engine: Box<dyn MatchEngine>,
}

impl Match {
    /// Create a match. A validation match (`participant_b` scripted) always
    /// starts with `participant_a` and is unrated; otherwise the first mover
    /// is picked uniformly at random.
    pub fn new<R: Rng + ?Sized>(
        id: MatchId,
        participant_a: SessionId,
        participant_b: SessionId,
        engine: Box<dyn MatchEngine>,
        rng: &mut R,
    ) -> Self {
        let validation = participant_b.is_scripted();
        let first_mover = if validation || rng.random_bool(0.5) {
            participant_a
        } else {
            participant_b
        };
        Self {
            id,
            participant_a,
            participant_b,
            ready_a: false,
            ready_b: false,
            first_mover,
            current_mover: first_mover,
            move_log: Vec::new(),
            winner: None,
            rated: !validation,
            engine,
        }
    }

    /// Protocol self-test against the scripted mover.
    pub fn is_validation(&self) -> bool {
        self.participant_b.is_scripted()
    }

    pub fn involves(&self, id: SessionId) -> bool {
        id == self.participant_a || id == self.participant_b
    }

    /// The other participant, or `None` if `id` does not play in this match.
    pub fn opponent_of(&self, id: SessionId) -> Option<SessionId> {
        if id == self.participant_a {
            Some(self.participant_b)
        } else if id == self.participant_b {
            Some(self.participant_a)
        } else {
            None
        }
    }

    /// Participants that have a session (excludes the scripted mover).
    pub fn real_participants(&self) -> impl Iterator<Item = SessionId> {
        [self.participant_a, self.participant_b]
            .into_iter()
            .filter(|id| !id.is_scripted())
    }

    pub fn set_ready(&mut self, id: SessionId) {
        if id == self.participant_a {
            self.ready_a = true;
        } else if id == self.participant_b {
            self.ready_b = true;
        }
    }

    /// Both participants echoed GAME_INITIALIZE; the scripted mover is
    /// always ready.
    pub fn all_ready(&self) -> bool {
        self.ready_a && (self.ready_b || self.is_validation())
    }

    pub fn first_mover(&self) -> SessionId {
        self.first_mover
    }

    pub fn second_mover(&self) -> SessionId {
        if self.first_mover == self.participant_a {
            self.participant_b
        } else {
            self.participant_a
        }
    }

    pub fn current_mover(&self) -> SessionId {
        self.current_mover
    }

    fn seat_of(&self, id: SessionId) -> Seat {
        if id == self.first_mover {
            Seat::First
        } else {
            Seat::Second
        }
    }

    pub fn move_count(&self) -> usize {
        self.move_log.len()
    }

    pub fn moves(&self) -> &[String] {
        &self.move_log
    }

    /// Last recorded move, or the "no previous move" sentinel.
    pub fn last_move(&self) -> &str {
        self.move_log
            .last()
            .map_or(NO_PREVIOUS_MOVE, String::as_str)
    }

    /// Apply a move for the current mover. Does not advance the turn.
    pub fn play(&mut self, token: &str) -> Result<(), InvalidMove> {
        let seat = self.seat_of(self.current_mover);
        self.engine.apply(seat, token)?;
        self.move_log.push(token.trim().to_string());
        Ok(())
    }

    /// Hand the turn to the other participant.
    pub fn advance_turn(&mut self) {
        self.current_mover = if self.current_mover == self.participant_a {
            self.participant_b
        } else {
            self.participant_a
        };
    }

    /// Play a uniformly random legal move for the current mover and advance
    /// the turn. Used for the scripted side of a validation match. Returns
    /// the move played, or `None` if the board has no legal move left.
    pub fn play_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<String> {
        let legal = self.engine.legal_moves();
        if legal.is_empty() {
            return None;
        }
        let token = legal[rng.random_range(0..legal.len())].clone();
        self.play(&token).ok()?;
        self.advance_turn();
        Some(token)
    }

    /// A validation match that has seen enough moves to prove the bot speaks
    /// the protocol.
    pub fn validation_passed(&self) -> bool {
        self.is_validation() && self.move_count() > VALIDATION_MOVES
    }

    /// Terminal check for the move just played by the current mover. Never
    /// changes whose turn it is.
    pub fn outcome(&mut self) -> Option<Outcome> {
        if self.winner.is_none() {
            let mover = self.current_mover;
            if self.engine.has_won(self.seat_of(mover)) {
                self.winner = Some(Outcome::Won(mover));
            } else if self.engine.is_full() {
                self.winner = Some(Outcome::Draw);
            }
        }
        self.winner
    }

    /// Comma-separated move log.
    pub fn game_data(&self) -> String {
        if self.move_log.is_empty() {
            NO_MOVES_RECORDED.to_string()
        } else {
            self.move_log.join(",")
        }
    }

    /// GAME_INITIALIZE payload for validation and scheduled matches: the
    /// match id.
    pub fn initialize_payload(&self) -> String {
        self.id.to_string()
    }

    /// GAME_INITIALIZE payload for bridge-started matches: the recipient's
    /// color and the opponent's id.
    pub fn initialize_payload_for(&self, id: SessionId) -> String {
        let color = if id == self.first_mover { "red" } else { "black" };
        let opponent = self.opponent_of(id).unwrap_or(SessionId::UNKNOWN);
        format!("{color}:{opponent}")
    }

    /// GAME_REPORT payload for one recipient.
    pub fn report_for(&self, id: SessionId) -> String {
        let winner = self.winner.map_or(SessionId(0), Outcome::winner_id);
        format!(
            "{}:{}:{}:{}:{}",
            id,
            self.first_mover,
            self.second_mover(),
            winner,
            self.game_data()
        )
    }

    /// Opaque EXECUTE_PROCEDURE directive the switch uses to log the match.
    pub fn log_directive(&self) -> String {
        let winner = self.winner.map_or(SessionId(0), Outcome::winner_id);
        format!(
            "insert_gamedata:{},{},{},'{}',0,0,'',{}",
            winner,
            self.first_mover,
            self.second_mover(),
            self.game_data(),
            u8::from(self.rated)
        )
    }
}

/// Active matches keyed by id.
pub struct MatchRegistry {
    matches: BTreeMap<MatchId, Match>,
    next_id: u64,
    engine_factory: fn() -> Box<dyn MatchEngine>,
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchRegistry {
    /// Registry whose matches use the four-in-a-row engine.
    pub fn new() -> Self {
        Self::with_engine(|| Box::new(FourInARow::new()))
    }

    /// Registry with a custom engine per match.
    pub fn with_engine(engine_factory: fn() -> Box<dyn MatchEngine>) -> Self {
        Self {
            matches: BTreeMap::new(),
            next_id: 1,
            engine_factory,
        }
    }

    /// Create and store a new match, returning its id.
    pub fn create<R: Rng + ?Sized>(
        &mut self,
        participant_a: SessionId,
        participant_b: SessionId,
        rng: &mut R,
    ) -> MatchId {
        let id = MatchId(self.next_id);
        self.next_id += 1;
        let game = Match::new(
            id,
            participant_a,
            participant_b,
            (self.engine_factory)(),
            rng,
        );
        self.matches.insert(id, game);
        id
    }

    pub fn get(&self, id: MatchId) -> Option<&Match> {
        self.matches.get(&id)
    }

    pub fn get_mut(&mut self, id: MatchId) -> Option<&mut Match> {
        self.matches.get_mut(&id)
    }

    pub fn remove(&mut self, id: MatchId) -> Option<Match> {
        self.matches.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn duplicate_session_is_rejected() {
        let mut sessions = SessionRegistry::new();
        assert!(sessions.insert(Session::new(SessionId(4), Mode::Debug, "null")));
        assert!(!sessions.insert(Session::new(SessionId(4), Mode::Live, "null")));
        assert_eq!(sessions.get(SessionId(4)).unwrap().mode, Mode::Debug);
    }

    #[test]
    fn idle_bots_skip_busy_and_humans() {
        let mut sessions = SessionRegistry::new();
        for id in [3, 1, 2, -1] {
            sessions.insert(Session::new(SessionId(id), Mode::Live, "null"));
        }
        sessions.get_mut(SessionId(2)).unwrap().engage(MatchId(9));
        assert_eq!(sessions.idle_bots(), vec![SessionId(1), SessionId(3)]);
        assert_eq!(sessions.human_proxies(), vec![SessionId(-1)]);
    }

    #[test]
    fn validation_match_starts_with_bot() {
        let mut matches = MatchRegistry::new();
        let id = matches.create(SessionId(5), SessionId::SCRIPTED, &mut rng());
        let game = matches.get(id).unwrap();
        assert!(game.is_validation());
        assert!(!game.rated);
        assert_eq!(game.current_mover(), SessionId(5));
        assert_eq!(game.last_move(), NO_PREVIOUS_MOVE);
    }

    #[test]
    fn match_ids_are_monotonic() {
        let mut matches = MatchRegistry::new();
        let a = matches.create(SessionId(1), SessionId(2), &mut rng());
        let b = matches.create(SessionId(3), SessionId(4), &mut rng());
        matches.remove(a);
        let c = matches.create(SessionId(1), SessionId(2), &mut rng());
        assert!(a < b && b < c);
    }

    #[test]
    fn first_mover_is_random_for_rated_matches() {
        let mut rng = rng();
        let mut firsts = std::collections::BTreeSet::new();
        for n in 0..64 {
            let game = Match::new(
                MatchId(n),
                SessionId(1),
                SessionId(2),
                Box::new(FourInARow::new()),
                &mut rng,
            );
            assert!(game.rated);
            firsts.insert(game.first_mover());
        }
        assert_eq!(firsts.len(), 2);
    }

    #[test]
    fn ready_requires_both_unless_validation() {
        let mut matches = MatchRegistry::new();
        let id = matches.create(SessionId(1), SessionId(2), &mut rng());
        let game = matches.get_mut(id).unwrap();
        game.set_ready(SessionId(2));
        assert!(!game.all_ready());
        game.set_ready(SessionId(1));
        assert!(game.all_ready());

        let solo = matches.create(SessionId(3), SessionId::SCRIPTED, &mut rng());
        let solo = matches.get_mut(solo).unwrap();
        assert!(!solo.all_ready());
        solo.set_ready(SessionId(3));
        assert!(solo.all_ready());
    }

    #[test]
    fn turn_parity_follows_move_log() {
        let mut matches = MatchRegistry::new();
        let id = matches.create(SessionId(1), SessionId(2), &mut rng());
        let game = matches.get_mut(id).unwrap();
        let first = game.first_mover();
        let second = game.second_mover();
        for column in ["1", "2", "3", "4", "5", "6"] {
            let expected = if game.move_count() % 2 == 0 {
                first
            } else {
                second
            };
            assert_eq!(game.current_mover(), expected);
            assert!(game.involves(game.current_mover()));
            game.play(column).unwrap();
            assert_eq!(game.outcome(), None);
            game.advance_turn();
        }
        assert_eq!(game.game_data(), "1,2,3,4,5,6");
        assert_eq!(game.last_move(), "6");
    }

    #[test]
    fn invalid_move_keeps_state() {
        let mut matches = MatchRegistry::new();
        let id = matches.create(SessionId(1), SessionId(2), &mut rng());
        let game = matches.get_mut(id).unwrap();
        let mover = game.current_mover();
        assert!(game.play("nine").is_err());
        assert_eq!(game.move_count(), 0);
        assert_eq!(game.current_mover(), mover);
    }

    #[test]
    fn validation_passes_after_six_moves_without_terminal() {
        let mut rng = rng();
        let mut matches = MatchRegistry::new();
        let id = matches.create(SessionId(8), SessionId::SCRIPTED, &mut rng);
        let game = matches.get_mut(id).unwrap();
        for _ in 0..3 {
            assert!(!game.validation_passed());
            game.play("4").unwrap();
            assert_eq!(game.outcome(), None);
            game.advance_turn();
            assert_eq!(game.current_mover(), SessionId::SCRIPTED);
            game.play_random(&mut rng).unwrap();
            assert_eq!(game.current_mover(), SessionId(8));
        }
        assert_eq!(game.move_count(), 6);
        assert!(game.validation_passed());
    }

    #[test]
    fn win_produces_report_and_directive() {
        let mut matches = MatchRegistry::new();
        let id = matches.create(SessionId(1), SessionId(2), &mut rng());
        let game = matches.get_mut(id).unwrap();
        let first = game.first_mover();
        let second = game.second_mover();
        let mut outcome = None;
        for column in ["1", "2", "1", "2", "1", "2", "1"] {
            game.play(column).unwrap();
            outcome = game.outcome();
            if outcome.is_some() {
                break;
            }
            game.advance_turn();
        }
        assert_eq!(outcome, Some(Outcome::Won(first)));
        assert_eq!(game.current_mover(), first);
        assert_eq!(
            game.report_for(second),
            format!("{second}:{first}:{second}:{first}:1,2,1,2,1,2,1")
        );
        assert_eq!(
            game.log_directive(),
            format!("insert_gamedata:{first},{first},{second},'1,2,1,2,1,2,1',0,0,'',1")
        );
    }

    #[test]
    fn full_board_is_a_draw_with_winner_zero() {
        let mut matches = MatchRegistry::new();
        let id = matches.create(SessionId(1), SessionId(2), &mut rng());
        let game = matches.get_mut(id).unwrap();
        let first = game.first_mover();
        let second = game.second_mover();

        let pair = [1, 2, 1, 2, 1, 2, 2, 1, 2, 1, 2, 1];
        let mut columns: Vec<String> = Vec::new();
        for offset in [0, 2, 4] {
            columns.extend(pair.iter().map(|c| (c + offset).to_string()));
        }
        columns.extend(std::iter::repeat_n("7".to_string(), 6));

        let mut outcome = None;
        for (turn, column) in columns.iter().enumerate() {
            game.play(column).unwrap();
            outcome = game.outcome();
            if outcome.is_some() {
                assert_eq!(turn, 41, "game ended early");
                break;
            }
            game.advance_turn();
        }
        assert_eq!(outcome, Some(Outcome::Draw));

        let moves = columns.join(",");
        assert_eq!(
            game.report_for(first),
            format!("{first}:{first}:{second}:0:{moves}")
        );
        assert_eq!(
            game.log_directive(),
            format!("insert_gamedata:0,{first},{second},'{moves}',0,0,'',1")
        );
    }

    #[test]
    fn bridge_initialize_payload_names_color_and_opponent() {
        let mut matches = MatchRegistry::new();
        let id = matches.create(SessionId(6), SessionId(-6), &mut rng());
        let game = matches.get(id).unwrap();
        let first = game.first_mover();
        let second = game.second_mover();
        assert_eq!(
            game.initialize_payload_for(first),
            format!("red:{second}")
        );
        assert_eq!(
            game.initialize_payload_for(second),
            format!("black:{first}")
        );
        assert_eq!(game.initialize_payload(), id.to_string());
    }
}
