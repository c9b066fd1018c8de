use std::{process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand, ValueEnum};
use voice_social::{
    components::{
        app::{AppComponents, CustomComponents},
        configuration::{Config, ConfigArgs},
        health::PASS,
        notifier::{Notice, Notifier},
        tracing::init_telemetry,
    },
    domain::{
        error::CommonError,
        matching::{MatchOutcome, MatchingState},
        message::ExpiryRule,
    },
    service::{
        conversations::load_conversations,
        friend_requests::{
            accept_request, load_friends_list, reject_request, remove_friend, send_request,
            set_nickname, FriendsListState,
        },
        friends_list::FriendsListService,
        matching::MatchingService,
        messages::{mark_listened, send_voice_message, NewVoiceMessage},
        profile::update_username,
    },
};

#[derive(Parser, Debug)]
#[clap(name = "voice-social", version, about = "Friends, voice messages and matching")]
struct Cli {
    #[clap(flatten)]
    config: ConfigArgs,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List friends
    Friends,
    /// List pending friend requests
    Requests,
    /// List conversations, one per friend or sender
    Conversations,
    /// Send a friend request
    Add { username: String },
    /// Accept a friend request
    Accept { request_id: String },
    /// Reject a friend request
    Reject { request_id: String },
    /// Remove a friend from your list
    Remove { friend_id: String },
    /// Set or clear the nickname of a friend
    Nickname {
        friend_id: String,
        nickname: Option<String>,
    },
    /// Change your username
    Username { username: String },
    /// Send a recorded voice message to a friend
    Send {
        recipient_id: String,
        media_url: String,
        #[clap(long, value_enum, default_value = "view")]
        expiry: ExpiryKind,
        /// Seconds for `time`, plays for `playback`
        #[clap(long)]
        expiry_value: Option<i64>,
    },
    /// Mark a received message as listened
    Listen { message_id: String },
    /// Look for a random partner
    Match,
    /// Follow friend request and friendship changes until interrupted
    Watch,
    /// Check the backend and realtime endpoints
    Health,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExpiryKind {
    Time,
    Playback,
    View,
}

impl ExpiryKind {
    fn into_rule(self, value: Option<i64>) -> Result<ExpiryRule, CommonError> {
        let (expiry_type, value) = match self {
            ExpiryKind::Time => ("time", value),
            ExpiryKind::Playback => ("playback", value),
            ExpiryKind::View => ("view", None),
        };
        ExpiryRule::from_columns(expiry_type, value)
    }
}

/// Prints alerts as they happen.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        println!("* {notice}");
    }
}

fn print_friends_list(state: &FriendsListState) {
    println!("Incoming requests:");
    for request in &state.incoming {
        println!("  {}  from {}", request.id, request.from_user_id);
    }
    println!("Outgoing requests:");
    for request in &state.outgoing {
        println!("  {}  to {}", request.id, request.to_user_id);
    }
    println!("Friends:");
    for friendship in &state.friends {
        match friendship.nickname() {
            Some(nickname) => println!("  {} ({})", friendship.friend_id, nickname),
            None => println!("  {}", friendship.friend_id),
        }
    }
}

async fn run(command: Command, app: AppComponents) -> Result<(), CommonError> {
    let ctx = app.social_context();

    match command {
        Command::Friends => {
            for friendship in load_friends_list(&ctx).await?.friends {
                let name = friendship.nickname().unwrap_or(&friendship.friend_id);
                println!("{}  {}", friendship.friend_id, name);
            }
        }
        Command::Requests => {
            let state = load_friends_list(&ctx).await?;
            print_friends_list(&FriendsListState {
                friends: vec![],
                ..state
            });
        }
        Command::Conversations => {
            for item in load_conversations(&ctx).await?.into_items() {
                let marker = if item.unread { "●" } else { " " };
                println!(
                    "{marker} {}  {}  {}",
                    item.display_name, item.preview, item.counterpart_id
                );
            }
        }
        Command::Add { username } => {
            let request = send_request(&ctx, &username).await?;
            println!("Friend request {} sent to {username}", request.id);
        }
        Command::Accept { request_id } => {
            accept_request(&ctx, &request_id).await?;
        }
        Command::Reject { request_id } => {
            reject_request(&ctx, &request_id).await?;
            println!("Friend request {request_id} rejected");
        }
        Command::Remove { friend_id } => {
            remove_friend(&ctx, &friend_id).await?;
            println!("{friend_id} removed from your friends");
        }
        Command::Nickname {
            friend_id,
            nickname,
        } => {
            let friendship = set_nickname(&ctx, &friend_id, nickname.as_deref()).await?;
            match friendship.nickname() {
                Some(nickname) => println!("{friend_id} is now {nickname}"),
                None => println!("Nickname of {friend_id} cleared"),
            }
        }
        Command::Username { username } => {
            update_username(&ctx, &username).await?;
            println!("Your username is now {username}");
        }
        Command::Send {
            recipient_id,
            media_url,
            expiry,
            expiry_value,
        } => {
            let message = send_voice_message(
                &ctx,
                NewVoiceMessage {
                    recipient_id: Some(recipient_id),
                    media_url,
                    expiry: expiry.into_rule(expiry_value)?,
                },
            )
            .await?;
            println!("Message {} sent", message.id);
        }
        Command::Listen { message_id } => {
            let message = mark_listened(&ctx, &message_id).await?;
            println!(
                "{}  played {} time(s)",
                message.media_url.unwrap_or_default(),
                message.play_count
            );
        }
        Command::Match => {
            let matching = MatchingService::new(ctx);
            let handle = matching.start().await?;
            if let MatchingState::Searching { .. } = handle.state() {
                println!("Looking for someone to talk to...");
            }
            match handle.outcome().await {
                MatchOutcome::Matched(_) => {}
                MatchOutcome::TimedOut => println!("Nobody is around right now, try again later"),
                MatchOutcome::Cancelled => println!("Search cancelled"),
            }
        }
        Command::Watch => {
            let service = FriendsListService::start(ctx, app.change_feed.as_ref()).await?;
            print_friends_list(&service.snapshot().await);

            let mut reloads = service.reloads();
            loop {
                tokio::select! {
                    changed = reloads.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        println!();
                        print_friends_list(&service.snapshot().await);
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            service.stop().await;
        }
        Command::Health => {
            let statuses = app.health.calculate_status().await;
            let mut names: Vec<_> = statuses.keys().cloned().collect();
            names.sort();
            for name in names {
                println!("{name}: {}", statuses[&name].status);
            }
            if statuses.values().any(|status| status.status != PASS) {
                return Err(CommonError::Unknown("Some components are down".to_owned()));
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_telemetry();

    let cli = Cli::parse();
    let config = match Config::new(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Couldn't read the configuration: {err}");
            return ExitCode::FAILURE;
        }
    };
    log::info!("Running in {} env", config.env);

    let custom = CustomComponents {
        notifier: Some(Arc::new(ConsoleNotifier)),
        ..Default::default()
    };
    let result = match AppComponents::new(config, Some(custom)).await {
        Ok(app) => run(cli.command, app).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err.user_message());
            ExitCode::FAILURE
        }
    }
}
