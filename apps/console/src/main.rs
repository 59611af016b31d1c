use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use parley_chats::{
    ChatEvent, ContentType, ConversationOrder, CreateConversationRequest, MessageContent,
    MessageDirection, RemoteEvent, RemoteMessage, TypingEvent,
};
use parley_config::load as load_config;
use parley_runtime::{telemetry, ChatServices};
use parley_users::User;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley chat core (console by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive console (default)
    Console,
    /// Run a scripted conversation against the loopback transport
    Demo,
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Console) {
        Commands::Console => run_console().await,
        Commands::Demo => run_demo().await,
        Commands::ShowConfig => show_config(),
    }
}

async fn start_services() -> anyhow::Result<ChatServices> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    let config = load_config().context("failed to load configuration")?;

    ChatServices::initialise(&config)
        .await
        .context("failed to initialise chat services")
}

fn show_config() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    println!("{config:#?}");
    Ok(())
}

/// Print notable session events as they happen
fn spawn_event_printer(services: &ChatServices) -> JoinHandle<()> {
    let mut events = services.session.events();
    let session = services.session.clone();

    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    println!("  (skipped {skipped} events)");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match event {
                ChatEvent::MessageAdded { message, .. }
                    if message.direction == MessageDirection::Incoming =>
                {
                    let sender = session
                        .get_user(&message.sender_id)
                        .map(|user| user.display_name)
                        .unwrap_or(message.sender_id);
                    println!("  <{sender}> {}", message.content.preview(80));
                }
                ChatEvent::MessageStatusChanged {
                    message_id,
                    current,
                    ..
                } => {
                    println!("  [{message_id}] {current:?}");
                }
                ChatEvent::TypingChanged {
                    user_id, is_typing, ..
                } => {
                    if let Some(user) = session.get_user(&user_id) {
                        if is_typing {
                            println!("  {} is typing...", user.display_name);
                        } else {
                            println!("  {} stopped typing", user.display_name);
                        }
                    }
                }
                ChatEvent::ParticipantRemoved {
                    conversation_id,
                    user_id,
                } => {
                    println!("  {user_id} left {conversation_id}");
                }
                _ => {}
            }
        }
    })
}

async fn run_console() -> anyhow::Result<()> {
    let services = start_services().await?;

    info!("starting interactive console");

    let printer = spawn_event_printer(&services);

    println!("Parley Interactive Console");
    println!("Type '/help' for commands; plain text is sent to the open conversation");
    println!("Use Ctrl+C or '/quit' to exit");
    println!("---");

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();

    loop {
        print!("> ");
        std::io::Write::flush(&mut std::io::stdout())?;

        line.clear();
        let bytes_read = tokio::select! {
            read = reader.read_line(&mut line) => read?,
            _ = parley_runtime::shutdown_signal() => 0,
        };
        if bytes_read == 0 {
            break; // EOF
        }

        let command = line.trim();
        if command.is_empty() {
            continue;
        }

        match handle_command(&services, command).await {
            Ok(true) => {}
            Ok(false) => {
                println!("Goodbye!");
                break;
            }
            Err(error) => println!("error: {error:#}"),
        }
    }

    printer.abort();
    services.shutdown().await;
    Ok(())
}

/// Run one console line. Returns `Ok(false)` when the console should exit.
async fn handle_command(services: &ChatServices, command: &str) -> anyhow::Result<bool> {
    let session = &services.session;

    if !command.starts_with('/') {
        let message = session
            .send_to_active(MessageContent::text(command), ContentType::TextPlain)
            .await?;
        println!("  sent [{}]", message.id);
        return Ok(true);
    }

    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    let rest = rest.trim();
    let args: Vec<&str> = rest.split_whitespace().collect();

    match name {
        "/quit" | "/exit" | "/q" => return Ok(false),
        "/help" | "/h" => {
            println!("Available commands:");
            println!("  /help, /h                  - Show this help");
            println!("  /users, /u                 - List known users");
            println!("  /adduser <id> <name>       - Register a user");
            println!("  /conversations, /c         - List conversations, most recent first");
            println!("  /new <user>...             - Start a conversation with users");
            println!("  /open <id>                 - Make a conversation active");
            println!("  /say <text>                - Send to the active conversation");
            println!("  /type [text]               - Update the draft and signal typing");
            println!("  /incoming <user> <text>    - Simulate a remote message");
            println!("  /remote-typing <user>      - Simulate a remote typing signal");
            println!("  /fail [n]                  - Fail the next n deliveries");
            println!("  /retry <message-id>        - Retry a failed message");
            println!("  /seen <message-id>         - Mark a message as seen");
            println!("  /messages, /m              - Show the active conversation");
            println!("  /quit, /exit, /q           - Exit console");
        }
        "/users" | "/u" => {
            let local = session.current_user().map(|user| user.id);
            for user in session.users().list() {
                let marker = if local.as_deref() == Some(user.id.as_str()) { "*" } else { " " };
                println!(
                    " {marker} {}: {} ({})",
                    user.id,
                    user.display_name,
                    String::from(user.presence)
                );
            }
        }
        "/adduser" => {
            let (id, name) = rest
                .split_once(' ')
                .context("usage: /adduser <id> <display name>")?;
            let user = session.register_user(User::new(id, name.trim()))?;
            println!("  registered {}", user.id);
        }
        "/conversations" | "/c" => {
            let conversations = session.conversations(ConversationOrder::RecentActivity);
            if conversations.is_empty() {
                println!("No conversations yet");
            }
            let active = session.active_conversation().map(|conversation| conversation.id);
            for conversation in conversations {
                let marker = if active.as_deref() == Some(conversation.id.as_str()) { "*" } else { " " };
                let label = match &conversation.title {
                    Some(title) => title.clone(),
                    None => conversation.participant_ids().join(", "),
                };
                let preview = conversation
                    .last_message()
                    .map(|message| message.content.preview(40))
                    .unwrap_or_default();
                println!(
                    " {marker} {}: {label} [{} unread] {preview}",
                    conversation.id, conversation.unread_count
                );
            }
        }
        "/new" => {
            anyhow::ensure!(!args.is_empty(), "usage: /new <user>...");
            let local = session.current_user().context("no current user")?;
            let participants = std::iter::once(local.id.as_str()).chain(args.iter().copied());
            let conversation =
                session.create_conversation(CreateConversationRequest::new(participants))?;
            session.set_active_conversation(&conversation.id)?;
            println!("  opened {}", conversation.id);
        }
        "/open" => {
            let id = args.first().context("usage: /open <conversation-id>")?;
            session.set_active_conversation(id)?;
            println!("  opened {id}");
        }
        "/say" => {
            anyhow::ensure!(!rest.is_empty(), "usage: /say <text>");
            let message = session
                .send_to_active(MessageContent::text(rest), ContentType::TextPlain)
                .await?;
            println!("  sent [{}]", message.id);
        }
        "/type" => match session.compose(rest).await {
            Some(outcome) => println!("  typing: {outcome:?}"),
            None => println!("  draft saved (no active conversation)"),
        },
        "/incoming" => {
            let (sender, text) = rest
                .split_once(' ')
                .context("usage: /incoming <user> <text>")?;
            let conversation = session
                .active_conversation()
                .context("no active conversation")?;
            services.transport.inject(RemoteEvent::Message(RemoteMessage::text(
                conversation.id,
                sender,
                text.trim(),
            )));
        }
        "/remote-typing" => {
            let sender = args.first().context("usage: /remote-typing <user>")?;
            let conversation = session
                .active_conversation()
                .context("no active conversation")?;
            services
                .transport
                .inject(RemoteEvent::Typing(TypingEvent::new(conversation.id, *sender, true)));
        }
        "/fail" => {
            let count = match args.first() {
                Some(value) => value.parse().context("count must be a number")?,
                None => 1,
            };
            services.transport.fail_next(count);
            println!("  next {count} deliveries will fail");
        }
        "/retry" => {
            let message_id = args.first().context("usage: /retry <message-id>")?;
            let conversation = session
                .active_conversation()
                .context("no active conversation")?;
            session.retry_message(&conversation.id, message_id).await?;
            println!("  retrying [{message_id}]");
        }
        "/seen" => {
            let message_id = args.first().context("usage: /seen <message-id>")?;
            let conversation = session
                .active_conversation()
                .context("no active conversation")?;
            let change = session.mark_seen(&conversation.id, message_id)?;
            println!("  {:?}", change.current());
        }
        "/messages" | "/m" => {
            let messages = session.current_messages();
            if messages.is_empty() {
                println!("No messages");
            }
            for message in messages {
                let sender = session
                    .get_user(&message.sender_id)
                    .map(|user| user.display_name)
                    .unwrap_or_else(|| message.sender_id.clone());
                println!(
                    "  {} [{}] {:<12} {:?}: {}",
                    message.created_at.format("%H:%M:%S"),
                    message.id,
                    sender,
                    message.status,
                    message.content.preview(60)
                );
            }
            if let Some(indicator) = session.typing_indicator() {
                println!("  {}", indicator.label());
            }
        }
        _ => {
            println!("Unknown command: {command}");
            println!("Type '/help' for available commands");
        }
    }

    Ok(true)
}

async fn run_demo() -> anyhow::Result<()> {
    let services = start_services().await?;
    let session = &services.session;

    info!("running scripted demo");

    let printer = spawn_event_printer(&services);
    let local = session.current_user().context("no current user")?;
    session.register_user(User::new("ben", "Ben"))?;
    let conversation = session.create_conversation(
        CreateConversationRequest::new([local.id.as_str(), "ben"]).with_title("Demo"),
    )?;
    session.set_active_conversation(&conversation.id)?;

    session.compose("hello").await;
    session
        .send_to_active(MessageContent::text("hello"), ContentType::TextPlain)
        .await?;
    session.compose("").await;

    services.transport.fail_next(1);
    let failed = session
        .send_to_active(MessageContent::text("this one bounces"), ContentType::TextPlain)
        .await?;
    session.wait_idle().await;
    session.retry_message(&conversation.id, &failed.id).await?;

    session
        .handle_remote(RemoteEvent::Typing(TypingEvent::new(&conversation.id, "ben", true)))
        .await?;
    session
        .handle_remote(RemoteEvent::Message(
            RemoteMessage::text(&conversation.id, "ben", "hi there").with_external_id("demo-1"),
        ))
        .await?;
    session.wait_idle().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();

    let snapshot = session.store().get(&conversation.id)?;
    println!("Conversation {} ({} messages)", snapshot.id, snapshot.messages.len());
    for message in &snapshot.messages {
        println!(
            "  {:<6} {:?} {:?}: {}",
            message.sender_id,
            message.direction,
            message.status,
            message.content.preview(60)
        );
    }

    services.shutdown().await;
    Ok(())
}
