use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{ChannelState, ChatClient, ClientEvent, DurableSessionStore};
use shared::{protocol::Message, text::clock_label};
use storage::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

mod config;

#[derive(Parser, Debug)]
#[command(name = "chat-desktop", about = "Terminal client for the direct-messaging server")]
struct Args {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(database_url) = args.database_url {
        settings.database_url = database_url;
    }

    let database_url = config::normalize_database_url(&settings.database_url);
    info!(server_url = %settings.server_url, %database_url, "starting chat client");
    let storage = Storage::new(&database_url).await?;
    storage.health_check().await?;

    let client = ChatClient::new(
        settings.server_url.clone(),
        Arc::new(DurableSessionStore::new(storage.clone())),
    );

    let mut events = client.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            render_event(event);
        }
    });

    match client.restore_session().await {
        Ok(Some(session)) => {
            println!("logged in as {} (user {})", session.username, session.user_id)
        }
        Ok(None) => println!("no saved session; /login or /register to get started"),
        Err(err) => eprintln!("session restore failed: {err}"),
    }
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with('/') {
            if let Err(err) = client.send_message(line).await {
                eprintln!("send failed: {err}");
            }
            continue;
        }

        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();
        match command {
            "/login" => match rest.as_slice() {
                [username, password] => match client.login(username, password).await {
                    Ok(session) => println!("logged in as {}", session.username),
                    Err(err) => eprintln!("login failed: {err}"),
                },
                _ => println!("usage: /login <username> <password>"),
            },
            "/register" => match rest.as_slice() {
                [username, password, confirm] => {
                    match client.register(username, password, confirm).await {
                        Ok(session) => println!("registered as {}", session.username),
                        Err(err) => eprintln!("registration failed: {err}"),
                    }
                }
                _ => println!("usage: /register <username> <password> <confirm>"),
            },
            "/friends" => {
                if let Err(err) = client.refresh_friends().await {
                    eprintln!("friend list refresh failed: {err}");
                }
            }
            "/requests" => match client.list_friend_requests().await {
                Ok(requests) if requests.is_empty() => println!("no pending friend requests"),
                Ok(requests) => {
                    for request in requests {
                        println!("  [{}] {}", request.id, request.username);
                    }
                }
                Err(err) => eprintln!("request list failed: {err}"),
            },
            "/accept" => match parse_id(&rest) {
                Some(id) => {
                    if let Err(err) = client
                        .accept_friend_request(shared::domain::RequestId(id))
                        .await
                    {
                        eprintln!("accept failed: {err}");
                    }
                }
                None => println!("usage: /accept <request-id>"),
            },
            "/reject" => match parse_id(&rest) {
                Some(id) => {
                    if let Err(err) = client
                        .reject_friend_request(shared::domain::RequestId(id))
                        .await
                    {
                        eprintln!("reject failed: {err}");
                    }
                }
                None => println!("usage: /reject <request-id>"),
            },
            "/add" => match rest.as_slice() {
                [username] => match client.send_friend_request(username).await {
                    Ok(()) => println!("friend request sent to {username}"),
                    Err(err) => eprintln!("friend request failed: {err}"),
                },
                _ => println!("usage: /add <username>"),
            },
            "/search" => {
                let query = rest.join(" ");
                match client.search_users(&query).await {
                    Ok(matches) if matches.is_empty() => println!("no users found"),
                    Ok(matches) => {
                        for user in matches {
                            println!("  {}", user.username);
                        }
                    }
                    Err(err) => eprintln!("search failed: {err}"),
                }
            }
            "/open" => match rest.as_slice() {
                [username] => match find_friend(&client, username).await {
                    Some(friend) => {
                        println!("--- conversation with {} ---", friend.username);
                        if let Err(err) = client.select_conversation(friend).await {
                            eprintln!("failed to open conversation: {err}");
                        }
                    }
                    None => println!("no friend named {username}"),
                },
                _ => println!("usage: /open <username>"),
            },
            "/remove" => match rest.as_slice() {
                [username] => match find_friend(&client, username).await {
                    Some(friend) => {
                        if let Err(err) = client.remove_friend(friend.id).await {
                            eprintln!("remove failed: {err}");
                        }
                    }
                    None => println!("no friend named {username}"),
                },
                _ => println!("usage: /remove <username>"),
            },
            "/theme" => match toggle_theme(&storage).await {
                Ok(theme) => println!("theme: {theme}"),
                Err(err) => eprintln!("theme toggle failed: {err}"),
            },
            "/logout" => match client.logout().await {
                Ok(()) => println!("logged out"),
                Err(err) => eprintln!("logout failed: {err}"),
            },
            "/help" => print_help(),
            "/quit" => break,
            other => println!("unknown command {other}; /help lists commands"),
        }
    }

    Ok(())
}

fn print_help() {
    println!("commands:");
    println!("  /login <username> <password>");
    println!("  /register <username> <password> <confirm>");
    println!("  /friends                 reload the friend list");
    println!("  /requests                list pending friend requests");
    println!("  /accept <request-id>     accept a friend request");
    println!("  /reject <request-id>     reject a friend request");
    println!("  /add <username>          send a friend request");
    println!("  /search <query>          search for users");
    println!("  /open <username>         open a conversation");
    println!("  /remove <username>       remove a friend");
    println!("  /theme                   toggle dark/light theme");
    println!("  /logout, /quit, /help");
    println!("anything else is sent to the open conversation");
}

fn parse_id(rest: &[&str]) -> Option<i64> {
    match rest {
        [raw] => raw.parse().ok(),
        _ => None,
    }
}

async fn find_friend(client: &ChatClient, username: &str) -> Option<shared::protocol::Friend> {
    client
        .friends()
        .await
        .into_iter()
        .find(|f| f.username == username)
}

async fn toggle_theme(storage: &Storage) -> Result<&'static str> {
    let next = storage.load_theme().await?.toggled();
    storage.save_theme(next).await?;
    Ok(next.as_str())
}

fn render_event(event: ClientEvent) {
    match event {
        ClientEvent::FriendsUpdated(friends) => {
            if friends.is_empty() {
                println!("(no friends yet)");
                return;
            }
            println!("friends:");
            for friend in friends {
                if friend.unread_count > 0 {
                    println!("  {} ({} unread)", friend.username, friend.unread_count);
                } else {
                    println!("  {}", friend.username);
                }
            }
        }
        ClientEvent::RequestBadgeUpdated(count) => {
            if count > 0 {
                println!("{count} pending friend request(s); /requests to review");
            }
        }
        ClientEvent::ThreadReplaced(messages) => {
            for message in &messages {
                println!("{}", format_message(message));
            }
        }
        ClientEvent::ThreadAppended(message) => println!("{}", format_message(&message)),
        ClientEvent::ChannelState(state) => match state {
            ChannelState::Connected => println!("* live updates connected"),
            ChannelState::Disconnected => println!("* live updates disconnected, retrying"),
            ChannelState::Connecting => {}
        },
        ClientEvent::Error(message) => eprintln!("! {message}"),
    }
}

fn format_message(message: &Message) -> String {
    format!(
        "[{}] {}: {}",
        clock_label(&message.created_at),
        message.sender_name,
        message.message
    )
}
