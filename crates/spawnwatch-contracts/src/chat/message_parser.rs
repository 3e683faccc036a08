use super::command_registry::{
    CommandAction, CommandSpec, COMMAND_PREFIX, NAME_ARG_COMMANDS, NO_ARG_COMMANDS,
};

const CAUGHT_MARKER: &str = "caught a";
const LEVEL_WORD: &str = "level";
const CONFIRMATION_MARKER: &str = "congratulations";
const SPAWN_TITLES: &[&str] = &["wild pokémon has appeared", "wild pokemon has appeared"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCommand {
    pub action: CommandAction,
    pub argument: Option<String>,
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<CommandAction> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

/// Parses `!command [argument]`. Unknown commands, and name commands without a
/// name, are `None`.
pub fn parse_command(text: &str) -> Option<ChatCommand> {
    let tail = text.trim().strip_prefix(COMMAND_PREFIX)?;
    let command_len = tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .count();
    if command_len == 0 {
        return None;
    }
    let command = tail[..command_len].to_ascii_lowercase();
    let remainder = &tail[command_len..];
    if !remainder.is_empty() && !remainder.starts_with(char::is_whitespace) {
        return None;
    }
    let arg = remainder.trim();

    if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
        return Some(ChatCommand {
            action,
            argument: None,
        });
    }
    if let Some(action) = find_action(&command, NAME_ARG_COMMANDS) {
        if arg.is_empty() {
            return None;
        }
        return Some(ChatCommand {
            action,
            argument: Some(arg.to_string()),
        });
    }
    None
}

pub fn is_spawn_title(title: &str) -> bool {
    let lowered = title.to_lowercase();
    SPAWN_TITLES.iter().any(|marker| lowered.contains(marker))
}

pub fn is_catch_confirmation(content: &str) -> bool {
    content.to_lowercase().contains(CONFIRMATION_MARKER)
}

/// Best-effort name extraction from a catch confirmation such as
/// `"Congratulations @ash! You caught a Level 12 Pikachu!"`.
///
/// Matches `caught a`/`caught an`, an optional `Level <n>`, then a run of
/// ASCII letters. Returns `None` when nothing name-like follows.
pub fn extract_caught_name(text: &str) -> Option<String> {
    // ASCII lowering keeps byte offsets aligned with `text`.
    let lowered = text.to_ascii_lowercase();
    lowered
        .match_indices(CAUGHT_MARKER)
        .find_map(|(idx, _)| name_after_marker(&text[idx + CAUGHT_MARKER.len()..]))
}

fn name_after_marker(rest: &str) -> Option<String> {
    let rest = match rest.strip_prefix(['n', 'N']) {
        Some(tail) if tail.starts_with(char::is_whitespace) => tail,
        _ => rest,
    };
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start();
    let rest = skip_level_prefix(rest).unwrap_or(rest);
    let name = rest
        .chars()
        .take_while(|ch| ch.is_ascii_alphabetic())
        .collect::<String>();
    (!name.is_empty()).then_some(name)
}

fn skip_level_prefix(text: &str) -> Option<&str> {
    let head = text.get(..LEVEL_WORD.len())?;
    if !head.eq_ignore_ascii_case(LEVEL_WORD) {
        return None;
    }
    let tail = &text[LEVEL_WORD.len()..];
    if !tail.starts_with(char::is_whitespace) {
        return None;
    }
    let tail = tail.trim_start();
    let digits = tail.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let tail = &tail[digits..];
    if !tail.starts_with(char::is_whitespace) {
        return None;
    }
    Some(tail.trim_start())
}
