//! Main menu and conversation management.

use chrono::Local;
use dialoguer::{Confirm, Input, Select};

use super::{run_session, theme, App};
use crate::message::{ConversationId, Role};
use crate::store::{ConversationStore, ConversationSummary};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuAction {
    NewChat,
    Continue,
    Recents,
    Manage,
    Quit,
}

impl MenuAction {
    const fn label(self) -> &'static str {
        match self {
            Self::NewChat => "New Chat",
            Self::Continue => "Continue",
            Self::Recents => "Recents",
            Self::Manage => "Manage",
            Self::Quit => "Quit",
        }
    }

    /// Entries offered given whether any conversation exists.
    fn available(has_conversations: bool) -> Vec<Self> {
        if has_conversations {
            vec![Self::NewChat, Self::Continue, Self::Recents, Self::Manage, Self::Quit]
        } else {
            vec![Self::NewChat, Self::Quit]
        }
    }
}

/// Run the main menu until the user quits.
///
/// # Errors
///
/// Returns error if a prompt fails or the database cannot be read
pub async fn main_menu(app: &App) -> Result<()> {
    loop {
        let stats = app.store.stats()?;
        let actions = MenuAction::available(stats.total > 0);
        let labels: Vec<&str> = actions.iter().map(|a| a.label()).collect();

        let Some(idx) = Select::new()
            .with_prompt("Main Menu")
            .items(&labels)
            .default(0)
            .interact_opt()?
        else {
            return Ok(());
        };

        let outcome = match actions[idx] {
            MenuAction::NewChat => new_chat(app).await,
            MenuAction::Continue => continue_chat(app).await,
            MenuAction::Recents => print_recent(&app.store, app.config.display.recent_limit),
            MenuAction::Manage => manage(&app.store, app.config.display.recent_limit),
            MenuAction::Quit => return Ok(()),
        };

        // Prompt failures end the program; anything else is reported and the menu returns.
        if let Err(e) = outcome {
            if matches!(e, crate::Error::Prompt(_)) {
                return Err(e);
            }
            theme::error(&e.to_string());
        }
    }
}

async fn new_chat(app: &App) -> Result<()> {
    let title: String = Input::new()
        .with_prompt("Title")
        .allow_empty(true)
        .interact_text()?;
    let id = app.store.create_conversation(&title)?;
    run_session(app, id).await
}

async fn continue_chat(app: &App) -> Result<()> {
    let conversations = app.store.recent_conversations(app.config.display.recent_limit)?;
    if let Some(id) = pick_conversation(&conversations, "Select a conversation to continue")? {
        run_session(app, id).await?;
    }
    Ok(())
}

fn describe(summary: &ConversationSummary) -> String {
    let last = summary
        .last_message_at
        .unwrap_or(summary.created_at)
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M");
    format!(
        "{}  {}",
        summary.title,
        theme::dim(&format!("{} msgs, last: {last}", summary.message_count))
    )
}

fn pick_conversation(
    conversations: &[ConversationSummary],
    prompt: &str,
) -> Result<Option<ConversationId>> {
    let mut labels: Vec<String> = conversations.iter().map(describe).collect();
    labels.push("← Back".to_string());

    let choice = Select::new()
        .with_prompt(prompt)
        .items(&labels)
        .default(0)
        .interact_opt()?;
    Ok(choice.and_then(|idx| conversations.get(idx).map(|c| c.id)))
}

/// Print the most recently active conversations.
///
/// # Errors
///
/// Returns error if the database cannot be read
pub fn print_recent(store: &ConversationStore, limit: usize) -> Result<()> {
    let conversations = store.recent_conversations(limit)?;
    println!();
    if conversations.is_empty() {
        theme::info("No conversations yet");
        return Ok(());
    }
    theme::heading("Recent conversations");
    for summary in &conversations {
        println!("  {} {}", theme::highlight(&format!("#{}", summary.id)), describe(summary));
    }
    println!();
    Ok(())
}

fn manage(store: &ConversationStore, limit: usize) -> Result<()> {
    loop {
        let conversations = store.recent_conversations(limit)?;
        if conversations.is_empty() {
            return Ok(());
        }
        let Some(id) = pick_conversation(&conversations, "Select conversation to manage")? else {
            return Ok(());
        };

        let operation = Select::new()
            .with_prompt("What would you like to do?")
            .items(&["View messages", "Delete conversation", "Go back"])
            .default(0)
            .interact_opt()?;

        match operation {
            Some(0) => view_messages(store, id)?,
            Some(1) => delete(store, id)?,
            _ => {}
        }
    }
}

fn view_messages(store: &ConversationStore, id: ConversationId) -> Result<()> {
    let Some(summary) = store.conversation(id)? else {
        theme::error("Conversation not found");
        return Ok(());
    };
    let messages = store.messages(id)?;

    println!();
    theme::heading(&summary.title);
    theme::subheading(&format!("{} messages", messages.len()));
    println!();
    for message in &messages {
        match message.role {
            Role::User => println!("|> {}", message.content),
            Role::Assistant => println!("{}", theme::bot(&format!("AI: {}", message.content))),
            Role::System => println!("{}", theme::dim(&message.content)),
        }
        println!();
    }

    let _: String = Input::new()
        .with_prompt("Press enter to continue")
        .allow_empty(true)
        .interact_text()?;
    Ok(())
}

fn delete(store: &ConversationStore, id: ConversationId) -> Result<()> {
    let Some(summary) = store.conversation(id)? else {
        theme::error("Conversation not found");
        return Ok(());
    };

    let confirmed = Confirm::new()
        .with_prompt(format!("Are you sure you want to delete \"{}\"?", summary.title))
        .default(false)
        .interact()?;

    if confirmed {
        if store.delete_conversation(id)? {
            theme::success(&format!("Deleted conversation: {}", summary.title));
        } else {
            theme::error("Failed to delete conversation");
        }
    }
    Ok(())
}
