//! Math challenge rounds.
//!
//! The operator types the trigger keyword on the server console; the console
//! thread draws two operands and hands the challenge to the broadcaster, which
//! owns the round from then on. Guesses reach the same broadcaster as events,
//! so a guess is always checked against whichever round was current when the
//! broadcaster got to it.

use std::{
    io::BufRead,
    thread::{self, JoinHandle},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info, warn};

use crate::event::{Event, EventSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Challenge {
    pub a: u32,
    pub b: u32,
}

impl Challenge {
    pub fn new(a: u32, b: u32) -> Self {
        Self { a, b }
    }

    /// Draws both operands from `0..max_operand`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, max_operand: u32) -> Self {
        let bound = max_operand.max(1);
        Self::new(rng.gen_range(0..bound), rng.gen_range(0..bound))
    }

    pub fn expected_sum(&self) -> i64 {
        i64::from(self.a) + i64::from(self.b)
    }

    pub fn announcement(&self) -> String {
        format!("New math game: {} + {} = ?", self.a, self.b)
    }
}

pub fn winner_announcement(name: &str) -> String {
    format!("The game is over! The winner is {name}")
}

/// The round currently in play, if any. Owned by the broadcaster.
#[derive(Debug, Default)]
pub struct GameState {
    current: Option<Challenge>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any unfinished round.
    pub fn start(&mut self, challenge: Challenge) {
        self.current = Some(challenge);
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Ends the round and returns `true` when `value` is the answer.
    pub fn try_win(&mut self, value: i64) -> bool {
        match self.current {
            Some(challenge) if challenge.expected_sum() == value => {
                self.current = None;
                true
            }
            _ => false,
        }
    }
}

/// A chat line counts as a guess only if the whole line is an integer.
pub fn parse_guess(line: &str) -> Option<i64> {
    line.parse().ok()
}

/// Operator input loop. Runs on its own thread because console reads block.
pub struct Console {
    keyword: String,
    max_operand: u32,
    rng: StdRng,
}

impl Console {
    pub fn new(keyword: impl Into<String>, max_operand: u32) -> Self {
        Self::with_rng(keyword, max_operand, StdRng::from_entropy())
    }

    pub fn with_rng(keyword: impl Into<String>, max_operand: u32, rng: StdRng) -> Self {
        Self {
            keyword: keyword.into(),
            max_operand,
            rng,
        }
    }

    /// Returns a new challenge when `line` is the trigger keyword.
    pub fn on_line(&mut self, line: &str) -> Option<Challenge> {
        if line.trim_end_matches(['\r', '\n']) != self.keyword {
            return None;
        }
        Some(Challenge::random(&mut self.rng, self.max_operand))
    }

    /// Reads `input` until EOF, forwarding each new challenge to the broadcaster.
    pub fn run<R: BufRead>(mut self, input: R, events: &EventSender) {
        for line in input.lines() {
            let line = match line {
                Ok(line) => line,
                Err(error) => {
                    warn!(?error, "console input failed");
                    break;
                }
            };

            let Some(challenge) = self.on_line(&line) else {
                debug!(line, "ignoring console line");
                continue;
            };

            info!(a = challenge.a, b = challenge.b, "starting math game");
            if events.blocking_send(Event::StartChallenge(challenge)).is_err() {
                break;
            }
        }
        debug!("console input closed");
    }

    pub fn spawn<R>(self, input: R, events: EventSender) -> std::io::Result<JoinHandle<()>>
    where
        R: BufRead + Send + 'static,
    {
        thread::Builder::new()
            .name("relay-console".into())
            .spawn(move || self.run(input, &events))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn random_operands_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let challenge = Challenge::random(&mut rng, 10);
            assert!(challenge.a < 10 && challenge.b < 10);
        }
    }

    #[test]
    fn correct_guess_wins_once() {
        let mut game = GameState::new();
        game.start(Challenge::new(17, 20));
        assert!(!game.try_win(36));
        assert!(game.try_win(37));
        assert!(!game.is_active());
        assert!(!game.try_win(37));
    }

    #[test]
    fn no_round_means_no_winner() {
        let mut game = GameState::new();
        assert!(!game.try_win(0));
    }

    #[test]
    fn only_whole_integers_are_guesses() {
        assert_eq!(parse_guess("37"), Some(37));
        assert_eq!(parse_guess("-4"), Some(-4));
        assert_eq!(parse_guess("37 "), None);
        assert_eq!(parse_guess("thirty seven"), None);
        assert_eq!(parse_guess(""), None);
    }

    #[test]
    fn console_ignores_lines_other_than_keyword() {
        let mut console = Console::with_rng("game", 1000, StdRng::seed_from_u64(1));
        assert!(console.on_line("games").is_none());
        assert!(console.on_line("hello").is_none());
        assert!(console.on_line("game").is_some());
    }

    #[test]
    fn console_forwards_one_challenge_per_keyword() {
        let (tx, mut rx) = mpsc::channel(8);
        let console = Console::with_rng("go", 50, StdRng::seed_from_u64(3));
        let input = Cursor::new("noise\ngo\nmore noise\ngo\n");

        console
            .spawn(input, EventSender::new(tx))
            .expect("spawn console")
            .join()
            .expect("console thread");

        let mut started = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                Event::StartChallenge(challenge) => {
                    assert!(challenge.a < 50 && challenge.b < 50);
                    started += 1;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(started, 2);
    }
}
