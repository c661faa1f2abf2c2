pub mod commands;
pub mod config;

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use manga_core::log::{LogConfig, LogLevel};
use serde::Serialize;

use crate::commands::EdgeState;
use crate::config::EdgeConfig;

const USAGE: &str = "usage: manga-edge [--config FILE] <command> [arg]

commands:
  stats <slug>        aggregated interactions of a series
  log                 log actions read from stdin as {seriesSlug, actions}
  process             fold pending logs into the aggregates
  pages <id>          page files of a chapter post
  views <id>          view count of a post
  posts [page]        one page of the account's posts
  all-posts           every post of the account
  comments            every comment, newest first
  delete-comment      delete {seriesSlug, chapterNumber, commentId} from stdin
  batch-delete        delete [{seriesSlug, commentId}] from stdin
  purge               drop the cached pages of {seriesSlug, chapterNumber} from stdin
  purge-all           drop every cached proxy entry";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Stats(String),
    Log,
    Process,
    Pages(String),
    Views(String),
    Posts(u32),
    AllPosts,
    Comments,
    DeleteComment,
    BatchDelete,
    Purge,
    PurgeAll,
}

impl Command {
    fn reads_body(&self) -> bool {
        matches!(self, Command::Log | Command::DeleteComment | Command::BatchDelete | Command::Purge)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config: Option<PathBuf>,
    pub command: Command,
}

pub fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut config = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(USAGE.to_string()),
            "--config" => {
                let path = iter.next().ok_or_else(|| "--config needs a file".to_string())?;
                config = Some(PathBuf::from(path));
            }
            _ => rest.push(arg.as_str()),
        }
    }

    let command = match rest.as_slice() {
        ["stats", slug] => Command::Stats(slug.to_string()),
        ["log"] => Command::Log,
        ["process"] => Command::Process,
        ["pages", id] => Command::Pages(id.to_string()),
        ["views", id] => Command::Views(id.to_string()),
        ["posts"] => Command::Posts(1),
        ["posts", page] => Command::Posts(page.parse().map_err(|_| format!("invalid page {page:?}"))?),
        ["all-posts"] => Command::AllPosts,
        ["comments"] => Command::Comments,
        ["delete-comment"] => Command::DeleteComment,
        ["batch-delete"] => Command::BatchDelete,
        ["purge"] => Command::Purge,
        ["purge-all"] => Command::PurgeAll,
        _ => return Err(USAGE.to_string()),
    };
    Ok(Invocation { config, command })
}

fn to_json<T: Serialize>(value: Result<T, String>) -> Result<String, String> {
    value.and_then(|value| serde_json::to_string_pretty(&value).map_err(|err| err.to_string()))
}

/// Run one command against `state`. `body` is only consulted by commands that take one.
pub fn execute(state: &EdgeState, command: &Command, body: &str) -> Result<String, String> {
    match command {
        Command::Stats(slug) => to_json(commands::series_stats(state, slug)),
        Command::Log => to_json(commands::log_action(state, body)),
        Command::Process => to_json(commands::process_logs(state)),
        Command::Pages(id) => to_json(commands::chapter_pages(state, id)),
        Command::Views(id) => to_json(commands::views(state, id)),
        Command::Posts(page) => to_json(commands::posts_page(state, *page)),
        Command::AllPosts => to_json(commands::all_posts(state)),
        Command::Comments => to_json(commands::admin_comments(state)),
        Command::DeleteComment => to_json(commands::admin_delete_comment(state, body)),
        Command::BatchDelete => to_json(commands::admin_batch_delete(state, body)),
        Command::Purge => to_json(commands::purge_cache(state, body)),
        Command::PurgeAll => to_json(commands::purge_proxy_cache(state)),
    }
}

pub fn run() -> ExitCode {
    let mut log_config = LogConfig::default().with_prefix("edge");
    if cfg!(debug_assertions) {
        log_config.console_level = LogLevel::DEBUG;
    }
    if let Err(err) = manga_core::log::init(log_config) {
        eprintln!("failed to initialise logging: {err:#}");
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match parse_args(&args) {
        Ok(invocation) => invocation,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    let config = EdgeConfig::load(invocation.config.as_deref());
    let state = match EdgeState::open(&config) {
        Ok(state) => state,
        Err(err) => {
            eprintln!("failed to open edge state: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let mut body = String::new();
    if invocation.command.reads_body() {
        if let Err(err) = std::io::stdin().read_to_string(&mut body) {
            eprintln!("failed to read request body: {err}");
            return ExitCode::FAILURE;
        }
    }

    match execute(&state, &invocation.command, &body) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn parses_commands_and_config() {
        let parsed = parse_args(&args(&["--config", "edge.toml", "stats", "one_piece"])).expect("parsed");
        assert_eq!(parsed.config, Some(PathBuf::from("edge.toml")));
        assert_eq!(parsed.command, Command::Stats("one_piece".to_string()));

        assert_eq!(parse_args(&args(&["posts"])).expect("parsed").command, Command::Posts(1));
        assert_eq!(parse_args(&args(&["posts", "3"])).expect("parsed").command, Command::Posts(3));
        assert!(Command::Purge.reads_body());
        assert!(!Command::Process.reads_body());
    }

    #[test]
    fn rejects_unknown_or_incomplete_commands() {
        let cases: [&[&str]; 5] = [&["stats"], &["posts", "two"], &["dance"], &["--config"], &[]];
        for bad in cases {
            assert!(parse_args(&args(bad)).is_err(), "{bad:?}");
        }
    }
}
