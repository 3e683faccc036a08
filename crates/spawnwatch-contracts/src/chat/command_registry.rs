#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandAction {
    Help,
    Setup,
    ListKnown,
    NameInfo,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: CommandAction,
}

pub const COMMAND_PREFIX: char = '!';

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help-pokemon",
        action: CommandAction::Help,
    },
    CommandSpec {
        command: "setup",
        action: CommandAction::Setup,
    },
    CommandSpec {
        command: "known",
        action: CommandAction::ListKnown,
    },
];

pub(crate) const NAME_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "pokeinfo",
    action: CommandAction::NameInfo,
}];

pub const HELP_COMMANDS: &[(&str, &str)] = &[
    ("!help-pokemon", "Display this help message"),
    ("!setup", "Set up the bot in this channel (administrators only)"),
    ("!known", "List every Pokemon the bot has learned"),
    ("!pokeinfo <name>", "Show how often a Pokemon was learned and when it was first seen"),
];
