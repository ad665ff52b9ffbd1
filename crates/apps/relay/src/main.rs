//! Relay - A console inbox viewer for the chatbot dashboard
//!
//! Connects to the hosted backend, loads the tag vocabulary and the filtered
//! conversation list, and prints it. With `--open` it also prints one
//! conversation's messages, and `--follow` keeps printing new ones.

use anyhow::{Context, Result, bail};
use chat::gateway::{AuthProvider, PollingFeed, RestGateway};
use chat::models::{ConversationId, Message, TagId};
use chat::realtime::SubscriptionManager;
use chat::store::{ActiveFilter, ConversationStore, LogNotifier, SortOrder};
use chat::BackendCredentials;
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Browse chatbot conversations from the terminal")]
struct Args {
    /// Conversation filter: all, active, starred, urgent or closed
    #[arg(short, long, default_value = "all")]
    filter: ActiveFilter,

    /// List the oldest conversations first
    #[arg(long)]
    oldest: bool,

    /// Only show conversations carrying this tag (by name, repeatable)
    #[arg(short, long = "tag")]
    tags: Vec<String>,

    /// Print the messages of this conversation
    #[arg(long)]
    open: Option<String>,

    /// Keep the opened conversation live and print messages as they arrive
    #[arg(long, requires = "open")]
    follow: bool,

    /// Seconds between checks for new messages while following
    #[arg(long, default_value_t = 2)]
    poll_interval: u64,

    /// Credentials file instead of ~/.config/relay/backend.json
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Sign in with this email before loading
    #[arg(long, requires = "password")]
    email: Option<String>,

    #[arg(long, requires = "email")]
    password: Option<String>,
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn load_credentials(path: Option<&PathBuf>) -> Result<BackendCredentials> {
    if let Some(path) = path {
        return BackendCredentials::from_file(path);
    }
    BackendCredentials::load().inspect_err(|_| {
        if let Some(path) = BackendCredentials::default_credentials_path() {
            warn!(
                "To configure backend access, either:\n\
                 1. Place your project credentials at: {}\n\
                 2. Or set environment variables: RELAY_BACKEND_URL and RELAY_BACKEND_ANON_KEY",
                path.display()
            );
        }
    })
}

fn run(args: Args) -> Result<()> {
    let credentials = load_credentials(args.credentials.as_ref())?;
    let gateway = Arc::new(RestGateway::new(&credentials)?);

    if let (Some(email), Some(password)) = (&args.email, &args.password) {
        gateway
            .sign_in_with_password(email, password)
            .context("Sign-in failed")?;
    }
    match gateway.current_user()? {
        Some(user) => info!("Browsing as {}", user.email.as_deref().unwrap_or(user.id.as_str())),
        None => info!("Browsing anonymously"),
    }

    let store = Arc::new(ConversationStore::new(
        gateway.clone(),
        gateway.clone(),
        Arc::new(LogNotifier),
    ));

    let selected = resolve_tags(&store, &args.tags)?;

    // Each setter re-queries; the last one leaves the final list in place
    if args.oldest {
        store.set_sort_order(SortOrder::Oldest);
    }
    store.set_selected_tags(selected);
    store.set_active_filter(args.filter);

    if let Some(message) = store.error() {
        bail!("Failed to load conversations: {}", message);
    }

    let conversations = store.conversations();
    println!("{} conversation(s) [{}]", conversations.len(), args.filter);
    for item in &conversations {
        let c = &item.conversation;
        let tags: Vec<&str> = item.tags.iter().map(|t| t.name.as_str()).collect();
        println!(
            "{} {} {:<36} {:<32} {}{}",
            if c.is_read { " " } else { "•" },
            if c.is_starred { "★" } else { " " },
            c.id.as_str(),
            c.display_title(),
            c.last_message_at.format("%Y-%m-%d %H:%M"),
            if tags.is_empty() {
                String::new()
            } else {
                format!("  [{}]", tags.join(", "))
            }
        );
    }

    if let Some(id) = &args.open {
        let id = ConversationId::new(id.as_str());
        let feed = PollingFeed::new(gateway.clone())
            .with_interval(Duration::from_secs(args.poll_interval.max(1)));
        let live = SubscriptionManager::new(Arc::new(feed), store.clone());
        live.open(&id)?;
        if let Some(message) = store.error() {
            bail!("Failed to load conversation {}: {}", id, message);
        }
        println!();
        if let Some(current) = store.current_conversation() {
            println!("== {} ==", current.conversation.display_title());
        }
        let messages = store.messages();
        for message in &messages {
            print_message(message);
        }

        if args.follow {
            let printed = Mutex::new(messages.len());
            let _printer = store.observe(move |state| {
                let Ok(mut printed) = printed.lock() else {
                    return;
                };
                if state.messages.len() > *printed {
                    state.messages[*printed..].iter().for_each(print_message);
                    *printed = state.messages.len();
                }
            });
            info!("Following {}; press Ctrl-C to stop", id);
            loop {
                std::thread::park();
            }
        }
        live.close();
    }

    Ok(())
}

/// Map `--tag` names to ids using the freshly loaded tag vocabulary
fn resolve_tags(store: &ConversationStore, names: &[String]) -> Result<Vec<TagId>> {
    store.fetch_tags();
    if let Some(message) = store.error() {
        bail!("Failed to load tags: {}", message);
    }
    let tags = store.tags();
    names
        .iter()
        .map(|name| {
            tags.iter()
                .find(|t| t.name.eq_ignore_ascii_case(name))
                .map(|t| t.id.clone())
                .with_context(|| format!("Unknown tag: {}", name))
        })
        .collect()
}

fn print_message(message: &Message) {
    let who = if message.is_from_user() { "agent" } else { "bot" };
    println!("[{}] {:>5}: {}", message.time_label(), who, message.content);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat::gateway::{InMemoryBackend, Table};

    fn store_over(backend: &Arc<InMemoryBackend>) -> ConversationStore {
        ConversationStore::new(backend.clone(), backend.clone(), Arc::new(LogNotifier))
    }

    #[test]
    fn test_resolve_tags_by_name() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = store_over(&backend);
        store.create_tag("Urgent", "red");
        store.create_tag("vip", "gold");

        let ids = resolve_tags(&store, &["urgent".to_string(), "VIP".to_string()]).unwrap();
        let tags = store.tags();
        assert_eq!(ids.len(), 2);
        assert!(tags.iter().any(|t| t.name == "Urgent" && t.id == ids[0]));
        assert!(tags.iter().any(|t| t.name == "vip" && t.id == ids[1]));

        let err = resolve_tags(&store, &["billing".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "Unknown tag: billing");
    }

    #[test]
    fn test_resolve_tags_reports_load_failure() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = store_over(&backend);
        store.create_tag("urgent", "red");
        backend.fail_next(Table::Tags, "permission denied for table tags");

        let err = resolve_tags(&store, &["urgent".to_string()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to load tags: permission denied for table tags"
        );
    }
}
