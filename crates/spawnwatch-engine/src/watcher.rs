use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use spawnwatch_contracts::chat::{
    extract_caught_name, is_catch_confirmation, is_spawn_title, parse_command, ChatCommand,
    CommandAction, HELP_COMMANDS,
};
use spawnwatch_contracts::events::{JournalWriter, SpawnEvent};
use tracing::{debug, error, info, warn};

use crate::fetch::ImageSource;
use crate::store::{Identification, IdentificationStore, LearnOutcome};

const MSG_DETECTED_UNKNOWN: &str =
    "I detected a Pokemon but couldn't identify it. I'll learn from your correct guess!";

/// A chat message as delivered by the gateway relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel_id: String,
    pub author_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embed_title: Option<String>,
    #[serde(default)]
    pub embed_image_url: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub channel_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchJob {
    Identify {
        channel_id: String,
        location: String,
    },
    Learn {
        channel_id: String,
        location: String,
        name: String,
    },
    Respond(Reply),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherSettings {
    /// Author id of the game bot whose spawns and confirmations are watched.
    pub game_bot_id: String,
    /// Our own author id; messages from it are ignored.
    pub self_id: Option<String>,
}

/// Routes chat messages to the identification store.
///
/// [`accept`](Self::accept) classifies a message and updates the per-channel
/// pending image; it is cheap and must be called in arrival order.
/// [`run`](Self::run) does the fetching and store work and may be called
/// from several threads at once.
pub struct SpawnWatcher<S> {
    store: IdentificationStore,
    source: S,
    settings: WatcherSettings,
    pending: Mutex<HashMap<String, String>>,
    journal: Option<JournalWriter>,
}

impl<S: ImageSource> SpawnWatcher<S> {
    pub fn new(store: IdentificationStore, source: S, settings: WatcherSettings) -> Self {
        Self {
            store,
            source,
            settings,
            pending: Mutex::new(HashMap::new()),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: JournalWriter) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn store(&self) -> &IdentificationStore {
        &self.store
    }

    pub fn pending_image(&self, channel_id: &str) -> Option<String> {
        self.pending().get(channel_id).cloned()
    }

    pub fn accept(&self, message: &InboundMessage) -> Option<WatchJob> {
        if self.settings.self_id.as_deref() == Some(message.author_id.as_str()) {
            return None;
        }
        if let Some(command) = parse_command(&message.content) {
            return Some(WatchJob::Respond(self.respond_to_command(message, command)));
        }
        if message.author_id != self.settings.game_bot_id {
            return None;
        }

        if let Some(image_url) = message.embed_image_url.as_deref() {
            let title = message.embed_title.as_deref().unwrap_or("");
            if image_url.trim().is_empty() || !is_spawn_title(title) {
                return None;
            }
            info!(channel_id = %message.channel_id, "detected a spawn");
            self.pending()
                .insert(message.channel_id.clone(), image_url.to_string());
            return Some(WatchJob::Identify {
                channel_id: message.channel_id.clone(),
                location: image_url.to_string(),
            });
        }

        if !is_catch_confirmation(&message.content) {
            return None;
        }
        let Some(name) = extract_caught_name(&message.content) else {
            debug!(channel_id = %message.channel_id, "confirmation without a recognizable name");
            return None;
        };
        let Some(location) = self.pending().remove(&message.channel_id) else {
            debug!(channel_id = %message.channel_id, pokemon = %name, "confirmation without a pending spawn");
            return None;
        };
        info!(channel_id = %message.channel_id, pokemon = %name, "detected a catch confirmation");
        Some(WatchJob::Learn {
            channel_id: message.channel_id.clone(),
            location,
            name,
        })
    }

    pub fn run(&self, job: WatchJob) -> Option<Reply> {
        match job {
            WatchJob::Respond(reply) => Some(reply),
            WatchJob::Identify {
                channel_id,
                location,
            } => {
                let identification = match self.source.fetch(&location) {
                    Ok(bytes) => self.store.identify(&bytes),
                    Err(err) => {
                        warn!(%channel_id, error = %err, "could not fetch spawn image");
                        Identification {
                            name: None,
                            message: err.to_string(),
                        }
                    }
                };
                let content = match identification.name {
                    Some(name) => {
                        self.journal(SpawnEvent::SpawnIdentified {
                            channel_id: channel_id.clone(),
                            location,
                            name,
                        });
                        identification.message
                    }
                    None => {
                        self.journal(SpawnEvent::SpawnUnrecognized {
                            channel_id: channel_id.clone(),
                            location,
                            reason: identification.message,
                        });
                        MSG_DETECTED_UNKNOWN.to_string()
                    }
                };
                Some(Reply {
                    channel_id,
                    content,
                })
            }
            WatchJob::Learn {
                channel_id,
                location,
                name,
            } => {
                let outcome = match self.source.fetch(&location) {
                    Ok(bytes) => self.store.learn(&bytes, &name),
                    Err(err) => LearnOutcome {
                        success: false,
                        message: err.to_string(),
                    },
                };
                if !outcome.success {
                    error!(%channel_id, pokemon = %name, reason = %outcome.message, "failed to learn pokemon");
                    self.journal(SpawnEvent::LearnFailed {
                        channel_id,
                        location,
                        name,
                        reason: outcome.message,
                    });
                    return None;
                }
                info!(%channel_id, pokemon = %name, "learned pokemon");
                self.journal(SpawnEvent::NameLearned {
                    channel_id: channel_id.clone(),
                    location,
                    name: name.clone(),
                });
                Some(Reply {
                    channel_id,
                    content: format!("I've learned that was a {name}! I'll remember it next time."),
                })
            }
        }
    }

    fn respond_to_command(&self, message: &InboundMessage, command: ChatCommand) -> Reply {
        let content = match command.action {
            CommandAction::Help => help_text(),
            CommandAction::Setup => {
                if message.is_admin {
                    info!(channel_id = %message.channel_id, "bot set up in channel");
                    format!(
                        "Pokemon Identifier Bot is now set up in <#{}>!",
                        message.channel_id
                    )
                } else {
                    "You need administrator permissions to run `!setup`.".to_string()
                }
            }
            CommandAction::ListKnown => {
                let names = self.store.known_names();
                if names.is_empty() {
                    "I haven't learned any Pokemon yet.".to_string()
                } else {
                    format!("I know {} Pokemon: {}", names.len(), names.join(", "))
                }
            }
            CommandAction::NameInfo => {
                let name = command.argument.unwrap_or_default();
                match self.store.name_info(&name) {
                    Some(record) => format!(
                        "{name}: learned {} time(s), first seen {}.",
                        record.count, record.first_seen
                    ),
                    None => format!("I haven't learned {name} yet."),
                }
            }
        };
        Reply {
            channel_id: message.channel_id.clone(),
            content,
        }
    }

    fn journal(&self, event: SpawnEvent) {
        let Some(journal) = &self.journal else {
            return;
        };
        if let Err(err) = journal.record(&event) {
            warn!(path = %journal.path().display(), kind = event.kind(), error = %err, "failed to write journal entry");
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn help_text() -> String {
    let mut text = String::from(
        "**Pokemon Identifier Bot**\n\n\
         This bot automatically detects when a Pokemon spawns and attempts to identify it.\n\
         It also learns from correct guesses automatically!\n\n\
         **Commands:**\n",
    );
    for (command, description) in HELP_COMMANDS {
        text.push_str(&format!("`{command}` - {description}\n"));
    }
    text
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::error::WatchError;
    use crate::fixtures::png_bytes;

    const GAME_BOT: &str = "716390085896962058";
    const SELF_ID: &str = "42";

    struct StubSource {
        images: HashMap<String, Vec<u8>>,
    }

    impl ImageSource for StubSource {
        fn fetch(&self, location: &str) -> Result<Vec<u8>, WatchError> {
            self.images
                .get(location)
                .cloned()
                .ok_or_else(|| WatchError::ImageUnavailable(format!("no stub for {location}")))
        }
    }

    fn watcher(dir: &std::path::Path) -> anyhow::Result<SpawnWatcher<StubSource>> {
        let mut images = HashMap::new();
        images.insert("img://a".to_string(), png_bytes(1)?);
        images.insert("img://b".to_string(), png_bytes(2)?);
        Ok(SpawnWatcher::new(
            IdentificationStore::open(dir.join("db.json")),
            StubSource { images },
            WatcherSettings {
                game_bot_id: GAME_BOT.to_string(),
                self_id: Some(SELF_ID.to_string()),
            },
        ))
    }

    fn spawn(channel: &str, url: &str) -> InboundMessage {
        InboundMessage {
            channel_id: channel.to_string(),
            author_id: GAME_BOT.to_string(),
            content: String::new(),
            embed_title: Some("A wild pokémon has appeared!".to_string()),
            embed_image_url: Some(url.to_string()),
            is_admin: false,
        }
    }

    fn confirmation(channel: &str, content: &str) -> InboundMessage {
        InboundMessage {
            channel_id: channel.to_string(),
            author_id: GAME_BOT.to_string(),
            content: content.to_string(),
            embed_title: None,
            embed_image_url: None,
            is_admin: false,
        }
    }

    fn user_message(content: &str, is_admin: bool) -> InboundMessage {
        InboundMessage {
            channel_id: "c1".to_string(),
            author_id: "1001".to_string(),
            content: content.to_string(),
            embed_title: None,
            embed_image_url: None,
            is_admin,
        }
    }

    fn run_accepted(
        watcher: &SpawnWatcher<StubSource>,
        message: &InboundMessage,
    ) -> Option<Reply> {
        watcher.accept(message).and_then(|job| watcher.run(job))
    }

    #[test]
    fn spawn_confirm_respawn_cycle() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let watcher = watcher(temp.path())?;

        let first = run_accepted(&watcher, &spawn("c1", "img://a"));
        assert_eq!(
            first.map(|reply| reply.content),
            Some(MSG_DETECTED_UNKNOWN.to_string())
        );
        assert_eq!(watcher.pending_image("c1").as_deref(), Some("img://a"));

        let job = watcher.accept(&confirmation(
            "c1",
            "Congratulations <@1001>! You caught a Level 5 Bulbasaur!",
        ));
        assert_eq!(
            job,
            Some(WatchJob::Learn {
                channel_id: "c1".to_string(),
                location: "img://a".to_string(),
                name: "Bulbasaur".to_string(),
            })
        );
        assert_eq!(watcher.pending_image("c1"), None);
        let learned = job.and_then(|job| watcher.run(job));
        assert_eq!(
            learned.map(|reply| reply.content),
            Some("I've learned that was a Bulbasaur! I'll remember it next time.".to_string())
        );

        let again = run_accepted(&watcher, &spawn("c1", "img://a"));
        assert_eq!(
            again,
            Some(Reply {
                channel_id: "c1".to_string(),
                content: "I think this is a Bulbasaur!".to_string(),
            })
        );
        Ok(())
    }

    #[test]
    fn pending_images_are_tracked_per_channel() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let watcher = watcher(temp.path())?;

        watcher.accept(&spawn("c1", "img://a"));
        watcher.accept(&spawn("c2", "img://b"));
        let job = watcher.accept(&confirmation(
            "c2",
            "Congratulations! You caught a Level 9 Eevee!",
        ));
        assert_eq!(
            job,
            Some(WatchJob::Learn {
                channel_id: "c2".to_string(),
                location: "img://b".to_string(),
                name: "Eevee".to_string(),
            })
        );
        assert_eq!(watcher.pending_image("c1").as_deref(), Some("img://a"));
        assert_eq!(watcher.pending_image("c2"), None);
        Ok(())
    }

    #[test]
    fn confirmation_without_name_keeps_pending_image() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let watcher = watcher(temp.path())?;

        watcher.accept(&spawn("c1", "img://a"));
        assert_eq!(
            watcher.accept(&confirmation("c1", "Congratulations on 100 catches!")),
            None
        );
        assert_eq!(watcher.pending_image("c1").as_deref(), Some("img://a"));
        Ok(())
    }

    #[test]
    fn confirmation_without_pending_image_is_ignored() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let watcher = watcher(temp.path())?;
        assert_eq!(
            watcher.accept(&confirmation("c1", "Congratulations! You caught a Pidgey!")),
            None
        );
        assert!(watcher.store().known_names().is_empty());
        Ok(())
    }

    #[test]
    fn ignores_other_authors_self_and_non_spawn_embeds() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let watcher = watcher(temp.path())?;

        let mut impostor = spawn("c1", "img://a");
        impostor.author_id = "1001".to_string();
        assert_eq!(watcher.accept(&impostor), None);

        let mut own = user_message("!help-pokemon", false);
        own.author_id = SELF_ID.to_string();
        assert_eq!(watcher.accept(&own), None);

        let mut fled = spawn("c1", "img://a");
        fled.embed_title = Some("The wild pokémon fled.".to_string());
        fled.content = "Congratulations! You caught a Pidgey!".to_string();
        assert_eq!(watcher.accept(&fled), None);
        assert_eq!(watcher.pending_image("c1"), None);
        Ok(())
    }

    #[test]
    fn failed_learn_sends_no_reply_and_clears_pending() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let journal_path = temp.path().join("events.jsonl");
        let watcher = watcher(temp.path())?.with_journal(JournalWriter::new(&journal_path));

        watcher.accept(&spawn("c1", "img://missing"));
        let reply = run_accepted(
            &watcher,
            &confirmation("c1", "Congratulations! You caught a Level 2 Ditto!"),
        );
        assert_eq!(reply, None);
        assert_eq!(watcher.pending_image("c1"), None);
        assert!(watcher.store().known_names().is_empty());

        let content = std::fs::read_to_string(&journal_path)?;
        let last: Value = serde_json::from_str(content.lines().last().unwrap_or("{}"))?;
        assert_eq!(last["type"], Value::String("learn_failed".to_string()));
        assert_eq!(last["name"], Value::String("Ditto".to_string()));
        Ok(())
    }

    #[test]
    fn journal_records_identify_and_learn() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let journal_path = temp.path().join("events.jsonl");
        let watcher = watcher(temp.path())?.with_journal(JournalWriter::new(&journal_path));

        run_accepted(&watcher, &spawn("c1", "img://b"));
        run_accepted(
            &watcher,
            &confirmation("c1", "Congratulations! You caught a Level 3 Rattata!"),
        );
        run_accepted(&watcher, &spawn("c1", "img://b"));

        let content = std::fs::read_to_string(&journal_path)?;
        let types = content
            .lines()
            .map(|line| {
                serde_json::from_str::<Value>(line)
                    .ok()
                    .and_then(|value| value["type"].as_str().map(str::to_string))
                    .unwrap_or_default()
            })
            .collect::<Vec<String>>();
        assert_eq!(
            types,
            vec!["spawn_unrecognized", "name_learned", "spawn_identified"]
        );
        Ok(())
    }

    #[test]
    fn commands_answer_from_the_store() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let watcher = watcher(temp.path())?;

        let help = run_accepted(&watcher, &user_message("!help-pokemon", false))
            .map(|reply| reply.content)
            .unwrap_or_default();
        assert!(help.contains("`!known`"));
        assert!(help.contains("`!pokeinfo <name>`"));

        let empty = run_accepted(&watcher, &user_message("!known", false));
        assert_eq!(
            empty.map(|reply| reply.content),
            Some("I haven't learned any Pokemon yet.".to_string())
        );

        assert!(watcher.store().learn(&png_bytes(1)?, "Psyduck").success);
        assert!(watcher.store().learn(&png_bytes(2)?, "Psyduck").success);

        let known = run_accepted(&watcher, &user_message("!known", false));
        assert_eq!(
            known.map(|reply| reply.content),
            Some("I know 1 Pokemon: Psyduck".to_string())
        );

        let info = run_accepted(&watcher, &user_message("!pokeinfo Psyduck", false))
            .map(|reply| reply.content)
            .unwrap_or_default();
        assert!(info.starts_with("Psyduck: learned 2 time(s), first seen "));

        let missing = run_accepted(&watcher, &user_message("!pokeinfo Mew", false));
        assert_eq!(
            missing.map(|reply| reply.content),
            Some("I haven't learned Mew yet.".to_string())
        );
        Ok(())
    }

    #[test]
    fn setup_requires_admin() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let watcher = watcher(temp.path())?;

        let refused = run_accepted(&watcher, &user_message("!setup", false));
        assert_eq!(
            refused.map(|reply| reply.content),
            Some("You need administrator permissions to run `!setup`.".to_string())
        );
        let accepted = run_accepted(&watcher, &user_message("!setup", true));
        assert_eq!(
            accepted.map(|reply| reply.content),
            Some("Pokemon Identifier Bot is now set up in <#c1>!".to_string())
        );
        Ok(())
    }

    #[test]
    fn inbound_message_defaults_optional_fields() -> anyhow::Result<()> {
        let message: InboundMessage =
            serde_json::from_str(r#"{"channel_id": "c9", "author_id": "7"}"#)?;
        assert_eq!(message.content, "");
        assert_eq!(message.embed_image_url, None);
        assert!(!message.is_admin);
        Ok(())
    }
}
