// Command handlers.
//
// One method on `Dispatcher` per inbound command type. All of them run on the
// dispatcher thread, one at a time, and own the registries for the duration
// of the call.
//
// Handlers that can fail return `HandlerError`; see `Dispatcher::dispatch`
// for what happens next. Anything that is merely late or redundant (a second
// login, a ready echo for a match that already ended, a disconnect for a
// session that is already gone) is logged and ignored rather than treated as
// a violation.

use std::time::Instant;

use gridwars_protocol::{Command, CommandType, MatchId, SessionId, param_value};
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::HandlerError;
use crate::registry::{Match, Mode, Outcome, Session};

const OUT_OF_SEQUENCE: &str = "ACTION_REPLY sent out of sequence.";
const BAD_REPLY_SHAPE: &str = "bad ACTION_REPLY shape";
const CONFIRMED_CONNECTION: &str = "GameServer Confirmed Connection";
const PROTOCOL_TEST_PASSED: &str = "Protocol Test Passed!";
const OPPONENT_GONE: &str = "Opponent disconnected or made an invalid move!";
const BOT_LANGUAGE: &str = "null";
const HUMAN_LANGUAGE: &str = "human";

impl Dispatcher {
    /// LOGIN_INFORM `id:params`. Registers the bot and starts its
    /// validation match.
    pub(crate) fn login(&mut self, command: &Command) -> Result<(), HandlerError> {
        let id = command
            .try_sender_id()
            .filter(|id| id.is_wire())
            .ok_or_else(|| {
                HandlerError::anonymous(format!("login with bad id: {:?}", command.metadata))
            })?;

        if self.sessions.contains(id) {
            warn!(session = %id, "duplicate login ignored");
            return Ok(());
        }

        let mode = command
            .fields()
            .nth(1)
            .and_then(|params| param_value(params, "mode"))
            .and_then(|flag| flag.parse::<i64>().ok())
            .map_or(Mode::Debug, Mode::from_flag);

        self.sessions.insert(Session::new(id, mode, BOT_LANGUAGE));
        self.send_to(
            id,
            Command::new(CommandType::ServerMessage, CONFIRMED_CONNECTION),
            0,
        );

        let match_id = self.matches.create(id, SessionId::SCRIPTED, &mut self.rng);
        self.engage(id, match_id);
        if let Some(payload) = self.matches.get(match_id).map(Match::initialize_payload) {
            self.request(id, Command::new(CommandType::GameInitialize, payload));
        }
        info!(session = %id, mode = mode.as_str(), %match_id, "bot logged in");
        Ok(())
    }

    /// GAME_INITIALIZE echoed back by a participant: it is ready to play.
    pub(crate) fn ready_ack(&mut self, command: &Command) -> Result<(), HandlerError> {
        let id = command
            .try_sender_id()
            .ok_or_else(|| HandlerError::anonymous("ready echo without a session id"))?;
        let Some(session) = self.sessions.get(id) else {
            return Err(HandlerError::anonymous(format!(
                "ready echo from unknown session {id}"
            )));
        };
        let Some(game) = session.match_id.and_then(|m| self.matches.get_mut(m)) else {
            warn!(session = %id, "ready echo outside of a match discarded");
            return Ok(());
        };

        let was_ready = game.all_ready();
        game.set_ready(id);
        if was_ready || !game.all_ready() {
            return Ok(());
        }

        let mover = game.current_mover();
        let last = game.last_move().to_string();
        debug!(match_id = %game.id, %mover, "all participants ready");
        self.request(mover, Command::new(CommandType::ActionRequest, last));
        Ok(())
    }

    /// ACTION_REPLY `id:_:column` from the current mover.
    pub(crate) fn action_reply(&mut self, command: &Command) -> Result<(), HandlerError> {
        let id = command
            .try_sender_id()
            .ok_or_else(|| HandlerError::anonymous("ACTION_REPLY without a session id"))?;
        let Some(session) = self.sessions.get(id) else {
            return Err(HandlerError::anonymous(format!(
                "ACTION_REPLY from unknown session {id}"
            )));
        };
        let fields: Vec<&str> = command.fields().collect();
        let [_, _, token] = fields.as_slice() else {
            return Err(HandlerError::violation(id, BAD_REPLY_SHAPE));
        };

        let match_id = session
            .match_id
            .ok_or_else(|| HandlerError::violation(id, OUT_OF_SEQUENCE))?;
        let game = self
            .matches
            .get_mut(match_id)
            .ok_or_else(|| HandlerError::violation(id, OUT_OF_SEQUENCE))?;
        if !game.all_ready() || game.current_mover() != id {
            return Err(HandlerError::violation(id, OUT_OF_SEQUENCE));
        }

        game.play(token)
            .map_err(|source| HandlerError::InvalidMove { session: id, source })?;

        if game.validation_passed() {
            self.finish_validation(match_id);
            return Ok(());
        }
        if let Some(outcome) = game.outcome() {
            self.finish_match(match_id, outcome);
            return Ok(());
        }

        game.advance_turn();
        if game.current_mover().is_scripted() {
            match game.play_random(&mut self.rng) {
                Some(column) => debug!(%match_id, %column, "scripted move"),
                None => warn!(%match_id, "scripted mover has no legal move"),
            }
        }

        let mover = game.current_mover();
        let last = game.last_move().to_string();
        self.request(mover, Command::new(CommandType::ActionRequest, last));
        Ok(())
    }

    fn finish_validation(&mut self, match_id: MatchId) {
        let Some(game) = self.matches.remove(match_id) else {
            return;
        };
        let bot = game.participant_a;
        self.send_to(
            bot,
            Command::new(CommandType::ServerMessage, PROTOCOL_TEST_PASSED),
            0,
        );
        self.sessions.release(bot);
        info!(session = %bot, %match_id, "protocol test passed");
    }

    fn finish_match(&mut self, match_id: MatchId, outcome: Outcome) {
        let Some(game) = self.matches.remove(match_id) else {
            return;
        };
        self.send_to_switch(Command::new(
            CommandType::ExecuteProcedure,
            game.log_directive(),
        ));
        for id in game.real_participants() {
            self.send_to(
                id,
                Command::new(CommandType::GameReport, game.report_for(id)),
                0,
            );
            self.sessions.release(id);
        }
        info!(
            %match_id,
            winner = %outcome.winner_id(),
            moves = game.move_count(),
            "match finished"
        );
    }

    /// Remove a session, aborting its match for the opponent. Calling this
    /// for a session that is already gone does nothing.
    pub(crate) fn disconnect(&mut self, id: SessionId) {
        let Some(session) = self.sessions.remove(id) else {
            debug!(session = %id, "disconnect for unknown session ignored");
            return;
        };

        if let Some(game) = session.match_id.and_then(|m| self.matches.remove(m)) {
            if let Some(opponent) = game.opponent_of(id).filter(|o| !o.is_scripted()) {
                self.send_to(
                    opponent,
                    Command::new(CommandType::GameAbort, game.game_data()),
                    0,
                );
                self.send_to(
                    opponent,
                    Command::new(CommandType::ServerMessage, OPPONENT_GONE),
                    0,
                );
                self.sessions.release(opponent);
            }
            info!(match_id = %game.id, session = %id, "match aborted");
        }

        self.discard_mail(id);
        info!(session = %id, "session removed");
    }

    /// Tell the switch (or the bridge) to drop `id`, then disconnect it
    /// locally.
    pub(crate) fn force_disconnect(&mut self, id: SessionId, reason: &str) {
        self.send_to(
            id,
            Command::new(CommandType::DisconnectBotRemote, reason),
            0,
        );
        self.disconnect(id);
    }

    /// DISCONNECT_BOT_REMOTE from the switch, or an abort from the bridge.
    pub(crate) fn switch_disconnect(&mut self, command: &Command) -> Result<(), HandlerError> {
        let id = command
            .try_sender_id()
            .ok_or_else(|| HandlerError::anonymous("disconnect without a session id"))?;
        if !self.sessions.contains(id) {
            warn!(session = %id, "disconnect for unknown session");
            return Ok(());
        }
        self.disconnect(id);
        Ok(())
    }

    /// Scheduling tick: evict idle human proxies, then pair idle bots.
    pub(crate) fn challenge(&mut self) {
        let touched = self.mailbox.take_touched();
        for human in self.sessions.human_proxies() {
            if !touched.contains(&human) {
                info!(session = %human, "human proxy went quiet");
                self.disconnect(human);
            }
        }

        for session in self.sessions.iter().filter(|s| s.id.is_wire()) {
            debug!(
                session = %session.id,
                status = if session.busy { "busy" } else { "idle" },
                mode = session.mode.as_str(),
                "bot status"
            );
        }

        let mut idle = self.sessions.idle_bots();
        idle.shuffle(&mut self.rng);
        for pair in idle.chunks_exact(2) {
            let (a, b) = (pair[0], pair[1]);
            let match_id = self.matches.create(a, b, &mut self.rng);
            self.engage(a, match_id);
            self.engage(b, match_id);
            if let Some(payload) = self.matches.get(match_id).map(Match::initialize_payload) {
                for id in [a, b] {
                    self.request(id, Command::new(CommandType::GameInitialize, payload.clone()));
                }
            }
            info!(%match_id, %a, %b, "match scheduled");
        }
    }

    pub(crate) fn switch_message(&self, command: &Command) {
        warn!(message = %command.metadata, "message from switch");
    }

    /// WEB_START_GAME `botId`: a human challenges a bot through the bridge.
    pub(crate) fn web_start_game(&mut self, command: &Command) -> Result<(), HandlerError> {
        let bot = command
            .try_sender_id()
            .filter(|id| id.is_wire())
            .ok_or_else(|| {
                HandlerError::anonymous(format!("match request for bad bot {:?}", command.metadata))
            })?;
        let human = SessionId::human_proxy_for(bot);

        if self.sessions.contains(human) {
            self.disconnect(human);
        }

        let busy = match self.sessions.get(bot) {
            Some(session) => session.busy,
            None => {
                self.send_to(
                    human,
                    Command::new(CommandType::ServerMessage, format!("Bot {bot} is not Online!")),
                    0,
                );
                return Ok(());
            }
        };
        if busy {
            self.send_to(
                human,
                Command::new(CommandType::ServerMessage, format!("Bot {bot} is Busy!")),
                0,
            );
            return Ok(());
        }

        self.sessions
            .insert(Session::new(human, Mode::Live, HUMAN_LANGUAGE));
        let match_id = self.matches.create(bot, human, &mut self.rng);
        self.engage(bot, match_id);
        self.engage(human, match_id);
        let Some(game) = self.matches.get_mut(match_id) else {
            return Ok(());
        };
        game.set_ready(human);
        let bot_payload = game.initialize_payload_for(bot);
        let human_payload = game.initialize_payload_for(human);
        self.request(bot, Command::new(CommandType::GameInitialize, bot_payload));
        self.request(human, Command::new(CommandType::GameInitialize, human_payload));
        info!(%match_id, %bot, %human, "bridge match started");
        Ok(())
    }

    /// SET_MODE `botId:_:mode`.
    pub(crate) fn set_mode(&mut self, command: &Command) -> Result<(), HandlerError> {
        let fields: Vec<&str> = command.fields().collect();
        let [bot, _, flag] = fields.as_slice() else {
            return Err(HandlerError::anonymous(format!(
                "bad SET_MODE shape: {:?}",
                command.metadata
            )));
        };
        let (Ok(bot), Ok(flag)) = (bot.trim().parse::<i32>(), flag.trim().parse::<i64>()) else {
            return Err(HandlerError::anonymous(format!(
                "bad SET_MODE values: {:?}",
                command.metadata
            )));
        };
        let bot = SessionId(bot);
        let Some(session) = self.sessions.get_mut(bot) else {
            warn!(session = %bot, "mode change for unknown session");
            return Ok(());
        };
        let mode = Mode::from_flag(flag);
        session.mode = mode;
        self.send_to(
            bot,
            Command::new(
                CommandType::ServerMessage,
                format!("Bot has entered {} mode!", mode.as_str()),
            ),
            0,
        );
        info!(session = %bot, mode = mode.as_str(), "mode changed");
        Ok(())
    }

    /// Mailbox sweep: drop expired entries and disconnect every session that
    /// left mail unclaimed.
    pub fn clean_output_at(&mut self, now: Instant) {
        for id in self.mailbox.purge_expired(now) {
            if self.sessions.contains(id) {
                warn!(session = %id, "mail expired unclaimed, disconnecting");
                self.disconnect(id);
            }
        }
    }

    fn engage(&mut self, id: SessionId, match_id: MatchId) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.engage(match_id);
        }
    }
}
