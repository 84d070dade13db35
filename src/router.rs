use std::sync::Arc;

use tracing::debug;

use crate::handlers;
use crate::platform::IncomingMessage;
use crate::translator::Translate;

pub type CommandHandler = fn(&IncomingMessage) -> String;

/// Where an incoming message goes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Route {
    Command(&'static str),
    Text,
}

/// Maps command names to handlers, sending everything else to the translator.
pub struct Router {
    commands: Vec<(&'static str, CommandHandler)>,
    translator: Arc<dyn Translate>,
}

impl Router {
    pub fn new(translator: Arc<dyn Translate>) -> Self {
        Self {
            commands: Vec::new(),
            translator,
        }
    }

    /// Router with `/start` and `/help` registered.
    pub fn with_default_commands(translator: Arc<dyn Translate>) -> Self {
        Self::new(translator)
            .command("start", handlers::start)
            .command("help", handlers::help)
    }

    pub fn command(mut self, name: &'static str, handler: CommandHandler) -> Self {
        self.commands.push((name, handler));
        self
    }

    /// Pick a route from the message shape.
    ///
    /// `/name`, `/name args` and `/name@bot_username args` select a registered
    /// command. Unknown commands and commands addressed to another bot are
    /// plain text.
    pub fn route(&self, text: &str, bot_username: Option<&str>) -> Route {
        let Some(rest) = text.strip_prefix('/') else {
            return Route::Text;
        };

        // A command ends at the first char that can't appear in a name or mention
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '@'))
            .unwrap_or(rest.len());
        let word = &rest[..end];
        let (name, addressee) = match word.split_once('@') {
            Some((name, addressee)) => (name, Some(addressee)),
            None => (word, None),
        };

        if let Some(addressee) = addressee {
            let ours = bot_username.is_some_and(|me| me.eq_ignore_ascii_case(addressee));
            if !ours {
                return Route::Text;
            }
        }

        self.commands
            .iter()
            .map(|(registered, _)| *registered)
            .find(|registered| *registered == name)
            .map_or(Route::Text, Route::Command)
    }

    fn lookup(&self, name: &str) -> Option<CommandHandler> {
        self.commands
            .iter()
            .find(|(registered, _)| *registered == name)
            .map(|(_, handler)| *handler)
    }

    /// Compute the reply for one message.
    pub async fn handle(&self, msg: &IncomingMessage, bot_username: Option<&str>) -> String {
        let route = self.route(&msg.text, bot_username);
        debug!("Routing message in chat {} to {:?}", msg.chat_id, route);

        if let Route::Command(name) = route {
            if let Some(handler) = self.lookup(name) {
                return handler(msg);
            }
        }
        handlers::translate_reply(self.translator.as_ref(), msg).await
    }
}
