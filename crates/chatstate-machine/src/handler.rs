//! # Handler Routing
//!
//! A handler is a [`Route`] paired with a callback. A state dispatches an
//! update to every handler whose route matches, in registration order.
//!
//! Routes are keyed by update shape:
//!
//! - [`Route::Command`]: `/name` or `/name@bot_username`, with the rest of
//!   the text passed on as `args`.
//! - [`Route::Text`] / [`Route::TextWhere`]: any message text, optionally
//!   filtered by a predicate.
//! - [`Route::Callback`]: inline keyboard presses.
//! - [`Route::Update`]: every update.

use std::sync::Arc;

use chatstate_core::Update;

use crate::registry::StateRegistry;
use crate::state::State;

/// Predicate over message text.
pub type TextPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Callback invoked for a matching update.
pub type HandlerFn = dyn Fn(&HandlerContext<'_>) -> anyhow::Result<()> + Send + Sync;

/// What a handler listens for.
#[derive(Clone)]
pub enum Route {
    /// Every update.
    Update,
    /// Any update with message text.
    Text,
    /// Message text accepted by the predicate.
    TextWhere(TextPredicate),
    /// A bot command, without the leading slash.
    Command(String),
    /// A callback query.
    Callback,
}

impl Route {
    /// Match this route against an update.
    ///
    /// Returns `None` if the route does not match, otherwise the handler
    /// arguments: the text after the command for [`Route::Command`], the
    /// callback data for [`Route::Callback`], the message text for text
    /// routes, and nothing for [`Route::Update`].
    pub fn matches<'u>(&self, update: &'u Update, bot_username: Option<&str>) -> Option<Option<&'u str>> {
        match self {
            Self::Update => Some(None),
            Self::Text => update.text().map(Some),
            Self::TextWhere(predicate) => update.text().filter(|t| predicate(*t)).map(Some),
            Self::Command(name) => {
                let text = update.text()?;
                parse_command(text, bot_username)
                    .filter(|(command, _)| *command == name.as_str())
                    .map(|(_, args)| Some(args))
            }
            Self::Callback => update
                .callback_query
                .as_ref()
                .map(|query| query.data.as_deref()),
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Update => f.write_str("Update"),
            Self::Text => f.write_str("Text"),
            Self::TextWhere(_) => f.write_str("TextWhere(..)"),
            Self::Command(name) => write!(f, "Command(/{name})"),
            Self::Callback => f.write_str("Callback"),
        }
    }
}

/// Split `/command@bot args` into `("command", "args")`.
///
/// A `@bot` suffix is accepted only if it names `bot_username`
/// (case-insensitively) or no username is configured.
pub fn parse_command<'t>(text: &'t str, bot_username: Option<&str>) -> Option<(&'t str, &'t str)> {
    let rest = text.strip_prefix('/')?;
    let (head, args) = match rest.find(char::is_whitespace) {
        Some(pos) => (&rest[..pos], rest[pos..].trim_start()),
        None => (rest, ""),
    };
    let command = match head.split_once('@') {
        Some((command, target)) => {
            if let Some(username) = bot_username {
                if !target.eq_ignore_ascii_case(username) {
                    return None;
                }
            }
            command
        }
        None => head,
    };
    if command.is_empty() {
        return None;
    }
    Some((command, args))
}

/// Everything a handler callback gets to see.
pub struct HandlerContext<'a> {
    /// The update being dispatched.
    pub update: &'a Update,
    /// The registry the update is processed by; use it to transition.
    pub registry: &'a StateRegistry,
    /// The state whose handler is running (ALL for always-on handlers).
    pub state: &'a Arc<State>,
    /// Route-specific arguments, see [`Route::matches`].
    pub args: Option<&'a str>,
}

impl HandlerContext<'_> {
    /// The route arguments, or the empty string.
    pub fn args(&self) -> &str {
        self.args.unwrap_or_default()
    }
}

/// A route with its callback.
pub struct Handler {
    route: Route,
    callback: Box<HandlerFn>,
}

impl Handler {
    /// Create a handler.
    pub fn new<F>(route: Route, callback: F) -> Self
    where
        F: Fn(&HandlerContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            route,
            callback: Box::new(callback),
        }
    }

    /// The route this handler listens on.
    pub fn route(&self) -> &Route {
        &self.route
    }

    pub(crate) fn call(&self, ctx: &HandlerContext<'_>) -> anyhow::Result<()> {
        (self.callback)(ctx)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler").field("route", &self.route).finish_non_exhaustive()
    }
}
