//! The GTP command loop.
//!
//! Implements the text protocol surface: `=`/`?` response framing with
//! optional command ids, and the command set the engine supports. Time
//! control and SGF commands are intentionally absent.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::info;

use games_go::GoPosition;
use sente_core::{Color, Move, Position};
use sente_search::{info_line, uniform_result, BatchedNetwork, EvalFn, Network, PassFlags, UctSearch};

use crate::config::{central, Config};

type Engine = UctSearch<GoPosition, BatchedNetwork<GoPosition>>;

const COMMANDS: &[&str] = &[
    "protocol_version",
    "name",
    "version",
    "known_command",
    "list_commands",
    "quit",
    "boardsize",
    "clear_board",
    "komi",
    "play",
    "genmove",
    "undo",
    "showboard",
    "analyze",
];

pub struct Gtp {
    config: Config,
    engine: Engine,
    boardsize: usize,
    komi: f32,
}

fn make_engine(config: &Config, boardsize: usize, komi: f32) -> Result<Engine> {
    let game = GoPosition::new(boardsize, komi);
    let eval: EvalFn<GoPosition> = Arc::new(|position, _symmetry| Ok(uniform_result(position)));
    let network = BatchedNetwork::new(
        eval,
        central().network.batch_size,
        Duration::from_millis(central().network.batch_wait_ms),
    );
    network.resize_cache(central().network.cache_bytes)?;
    Ok(UctSearch::new(game, network, config.search_options())?)
}

fn parse_color(text: &str) -> Result<Color> {
    match text.to_ascii_lowercase().as_str() {
        "b" | "black" => Ok(Color::Black),
        "w" | "white" => Ok(Color::White),
        other => Err(anyhow!("invalid color '{other}'")),
    }
}

impl Gtp {
    pub fn new(config: Config) -> Result<Self> {
        let boardsize = config.boardsize;
        let komi = config.komi;
        let engine = make_engine(&config, boardsize, komi)?;
        Ok(Self {
            config,
            engine,
            boardsize,
            komi,
        })
    }

    /// Read commands from `input` until `quit` or end of stream.
    pub fn run(&mut self, input: impl BufRead, mut output: impl Write) -> Result<()> {
        for line in input.lines() {
            let line = line?;
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let mut tokens = line.split_whitespace();
            let first = match tokens.next() {
                Some(first) => first,
                None => continue,
            };
            let (id, command) = match first.parse::<u32>() {
                Ok(id) => match tokens.next() {
                    Some(command) => (Some(id), command),
                    None => {
                        respond(&mut output, None, Err(anyhow!("missing command")))?;
                        continue;
                    }
                },
                Err(_) => (None, first),
            };
            let args: Vec<&str> = tokens.collect();

            if command == "quit" {
                respond(&mut output, id, Ok(String::new()))?;
                break;
            }
            let result = self.dispatch(command, &args);
            respond(&mut output, id, result)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, command: &str, args: &[&str]) -> Result<String> {
        match command {
            "protocol_version" => Ok("2".into()),
            "name" => Ok("sente".into()),
            "version" => Ok(env!("CARGO_PKG_VERSION").into()),
            "known_command" => {
                let name = args.first().copied().unwrap_or("");
                Ok(COMMANDS.contains(&name).to_string())
            }
            "list_commands" => Ok(COMMANDS.join("\n")),
            "boardsize" => {
                let size: usize = args
                    .first()
                    .and_then(|a| a.parse().ok())
                    .ok_or_else(|| anyhow!("syntax error"))?;
                if !(2..=games_go::MAX_SIZE).contains(&size) {
                    return Err(anyhow!("unacceptable size"));
                }
                self.boardsize = size;
                self.engine = make_engine(&self.config, size, self.komi)?;
                Ok(String::new())
            }
            "clear_board" => {
                self.engine = make_engine(&self.config, self.boardsize, self.komi)?;
                Ok(String::new())
            }
            "komi" => {
                let komi: f32 = args
                    .first()
                    .and_then(|a| a.parse().ok())
                    .ok_or_else(|| anyhow!("syntax error"))?;
                self.komi = komi;
                self.engine.game_mut().set_komi(komi);
                Ok(String::new())
            }
            "play" => {
                let (color, vertex) = match args {
                    [color, vertex, ..] => (parse_color(color)?, *vertex),
                    _ => return Err(anyhow!("syntax error")),
                };
                let mv = Move::from_text(vertex, self.boardsize)
                    .map_err(|_| anyhow!("invalid vertex"))?;
                if mv == Move::Resign {
                    return Err(anyhow!("invalid vertex"));
                }
                let game = self.engine.game_mut();
                game.set_to_move(color);
                game.play(mv).map_err(|_| anyhow!("illegal move"))?;
                if matches!(mv, Move::Play(_)) && game.superko() {
                    game.undo();
                    return Err(anyhow!("illegal move"));
                }
                Ok(String::new())
            }
            "genmove" => {
                let color = parse_color(args.first().copied().unwrap_or(""))?;
                let mv = self.engine.think(color, PassFlags::default());
                if mv != Move::Resign {
                    self.engine
                        .game_mut()
                        .play(mv)
                        .map_err(|e| anyhow!("search returned unplayable move: {e}"))?;
                }
                info!(%color, %mv, "generated move");
                Ok(mv.to_string())
            }
            "undo" => {
                if self.engine.game_mut().undo() {
                    Ok(String::new())
                } else {
                    Err(anyhow!("cannot undo"))
                }
            }
            "showboard" => Ok(format!("\n{}", self.engine.game().render())),
            "analyze" => Ok(info_line(&self.engine.analysis())),
            _ => Err(anyhow!("unknown command")),
        }
    }
}

fn respond(output: &mut impl Write, id: Option<u32>, result: Result<String>) -> Result<()> {
    let (prefix, text) = match result {
        Ok(text) => ('=', text),
        Err(error) => ('?', error.to_string()),
    };
    match id {
        Some(id) => write!(output, "{prefix}{id} {text}")?,
        None => write!(output, "{prefix} {text}")?,
    }
    write!(output, "\n\n")?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        use clap::Parser;
        Config::parse_from([
            "sente-gtp",
            "--boardsize",
            "5",
            "--threads",
            "1",
            "--playouts",
            "8",
            "--time-for-move-ms",
            "5000",
        ])
    }

    fn run_session(commands: &str) -> String {
        let mut gtp = Gtp::new(test_config()).unwrap();
        let mut out = Vec::new();
        gtp.run(commands.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn protocol_basics() {
        let out = run_session("protocol_version\nname\nquit\n");
        assert!(out.starts_with("= 2\n\n"));
        assert!(out.contains("= sente\n\n"));
    }

    #[test]
    fn ids_are_echoed() {
        let out = run_session("7 protocol_version\nquit\n");
        assert!(out.starts_with("=7 2\n\n"));
    }

    #[test]
    fn unknown_commands_fail() {
        let out = run_session("frobnicate\nquit\n");
        assert!(out.starts_with("? unknown command\n\n"));
    }

    #[test]
    fn known_command_answers_both_ways() {
        let out = run_session("known_command play\nknown_command frobnicate\nquit\n");
        assert!(out.contains("= true"));
        assert!(out.contains("= false"));
    }

    #[test]
    fn play_and_undo_roundtrip() {
        let out = run_session("play b C3\nundo\nundo\nquit\n");
        // Second undo has nothing left to take back.
        assert!(out.contains("= \n\n"));
        assert!(out.contains("? cannot undo"));
    }

    #[test]
    fn play_rejects_occupied_vertex() {
        let out = run_session("play b C3\nplay w C3\nquit\n");
        assert!(out.contains("? illegal move"));
    }

    #[test]
    fn genmove_produces_a_legal_answer() {
        let out = run_session("genmove b\nquit\n");
        let reply = out
            .lines()
            .find(|l| l.starts_with("= "))
            .expect("a genmove response");
        let vertex = reply.trim_start_matches("= ").trim();
        assert!(Move::from_text(vertex, 5).is_ok());
    }

    #[test]
    fn comments_are_ignored() {
        let out = run_session("# just a comment\nprotocol_version\nquit\n");
        assert!(out.starts_with("= 2\n\n"));
    }
}
