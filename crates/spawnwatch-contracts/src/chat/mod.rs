mod command_registry;
mod message_parser;

pub use command_registry::{CommandAction, COMMAND_PREFIX, HELP_COMMANDS};
pub use message_parser::{
    extract_caught_name, is_catch_confirmation, is_spawn_title, parse_command, ChatCommand,
};
