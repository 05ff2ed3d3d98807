//! # Demo Conversation Flow
//!
//! A small registration dialogue used by `chatstate replay`:
//!
//! ```text
//! DEFAULT ──/start──▶ ASK_NAME ──text──▶ CONFIRM ──yes──▶ DEFAULT
//!                         ▲                  │
//!                         └───────no─────────┘
//! ALL: /cancel ─▶ DEFAULT, /state ─▶ report the current state
//! ```
//!
//! Handlers do not talk to a transport; replies go to an [`Outbox`].

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;

use chatstate_machine::{HandlerContext, MachineConfig, StateRegistry};

/// A reply produced by a demo handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub chat_id: Option<i64>,
    pub text: String,
}

/// Collects replies in order.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    replies: Arc<Mutex<Vec<Reply>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply to the chat of the update being handled.
    pub fn reply(&self, ctx: &HandlerContext<'_>, text: impl Into<String>) {
        let chat_id = ctx.update.conversation_key().chat.map(|c| c.get());
        self.replies.lock().push(Reply {
            chat_id,
            text: text.into(),
        });
    }

    /// Remove and return every queued reply.
    pub fn drain(&self) -> Vec<Reply> {
        std::mem::take(&mut *self.replies.lock())
    }
}

fn is_plain_text(text: &str) -> bool {
    !text.starts_with('/')
}

fn is_yes(text: &str) -> bool {
    matches!(text.trim().to_ascii_lowercase().as_str(), "yes" | "y")
}

fn is_no(text: &str) -> bool {
    matches!(text.trim().to_ascii_lowercase().as_str(), "no" | "n")
}

/// Build the demo registry, sending replies to `outbox`.
pub fn build_registry(config: MachineConfig, outbox: &Outbox) -> anyhow::Result<StateRegistry> {
    let registry = StateRegistry::with_config("demo", config);
    let ask_name = registry.register_state("ASK_NAME", None)?;
    let confirm = registry.register_state("CONFIRM", None)?;

    let out = outbox.clone();
    registry.default_state().on_command("start", move |ctx| {
        ctx.registry.set("ASK_NAME", None)?;
        out.reply(ctx, "Hi! What's your name?");
        Ok(())
    });

    let out = outbox.clone();
    ask_name.on_text_where(is_plain_text, move |ctx| {
        let name = ctx.args().trim().to_string();
        if name.is_empty() {
            out.reply(ctx, "Please tell me your name.");
            return Ok(());
        }
        out.reply(ctx, format!("Is \"{name}\" correct? (yes/no)"));
        ctx.registry.set("CONFIRM", Some(json!({ "name": name })))?;
        Ok(())
    });

    let out = outbox.clone();
    confirm.on_text_where(is_yes, move |ctx| {
        let name = ctx
            .state
            .data()
            .and_then(|data| data.get("name").and_then(|n| n.as_str().map(str::to_string)))
            .ok_or_else(|| anyhow::anyhow!("CONFIRM entered without a name"))?;
        ctx.registry.set(None::<&str>, None)?;
        out.reply(ctx, format!("Nice to meet you, {name}!"));
        Ok(())
    });

    let out = outbox.clone();
    confirm.on_text_where(is_no, move |ctx| {
        ctx.registry.set("ASK_NAME", None)?;
        out.reply(ctx, "Okay, what's your name then?");
        Ok(())
    });

    let out = outbox.clone();
    confirm.on_text_where(
        |t| is_plain_text(t) && !is_yes(t) && !is_no(t),
        move |ctx| {
            out.reply(ctx, "Please answer yes or no.");
            Ok(())
        },
    );

    let out = outbox.clone();
    registry.all_state().on_command("cancel", move |ctx| {
        ctx.registry.set(None::<&str>, None)?;
        out.reply(ctx, "Cancelled.");
        Ok(())
    });

    let out = outbox.clone();
    registry.all_state().on_command("state", move |ctx| {
        let current = ctx.registry.current();
        out.reply(ctx, format!("You are in state {}.", current.name()));
        Ok(())
    });

    Ok(registry)
}
