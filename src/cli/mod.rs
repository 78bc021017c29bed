//! Terminal front end.

pub mod render;

use std::time::Duration;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::backend::auth::OAuthProvider;
use crate::backend::diagnostics;
use crate::context::AppContext;
use crate::entities::{Room, RoomStatus};
use crate::error::AppError;
use crate::services::{
    AuthService, ChatService, PlayerService, ProfileForm, ProfileService, RoomService,
};

#[derive(Parser)]
#[command(name = "mafia-nights", version, about = "Play Mafia with friends from the terminal")]
pub struct Cli {
    /// Disable ANSI colors
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an account with e-mail and password
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MAFIA_PASSWORD")]
        password: String,
        /// Defaults to the password
        #[arg(long)]
        confirm: Option<String>,
        #[arg(long)]
        username: Option<String>,
    },
    /// Sign in with e-mail and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MAFIA_PASSWORD")]
        password: String,
    },
    /// Text a one-time code to a phone number
    LoginPhone { phone: String },
    /// Sign in with the code from `login-phone`
    VerifyOtp { phone: String, code: String },
    /// Sign in through Google or Apple in the browser
    LoginOauth {
        #[arg(default_value = "google")]
        provider: String,
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },
    Logout,
    Whoami,
    /// Show the profile, or set it when any field is given
    Profile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        age: Option<String>,
        /// male, female, other or prefer_not_to_say
        #[arg(long)]
        gender: Option<String>,
        /// char1 (Warrior), char2 (Mage), char3 (Rogue) or char4 (Knight)
        #[arg(long)]
        avatar: Option<String>,
    },
    /// List open rooms
    Rooms {
        /// Keep the list updated until Ctrl+C
        #[arg(long)]
        watch: bool,
    },
    CreateRoom {
        name: String,
        #[arg(long)]
        max_players: Option<i32>,
        /// Also take a seat
        #[arg(long)]
        join: bool,
    },
    /// Take a seat in a room by join code
    Join { code: String },
    /// Give up your seat (room code or id)
    Leave { room: String },
    /// Post a chat message (room code or id)
    Say {
        room: String,
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },
    /// Show a room live; lines typed on stdin are sent as chat
    Watch { room: String },
    /// Host only: change the room status
    SetStatus { room: String, status: String },
    /// Host only: delete the room
    CloseRoom { room: String },
    /// Check the backend setup
    Diagnose,
}

/// # Errors
///
/// Returns the first error of the command; the caller prints it.
pub async fn run(cli: Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let color = !cli.no_color;
    match cli.command {
        Command::Signup {
            email,
            password,
            confirm,
            username,
        } => {
            let confirm = confirm.unwrap_or_else(|| password.clone());
            match AuthService::sign_up(ctx, &email, &password, &confirm, username.as_deref()).await?
            {
                Some(identity) => println!("Signed up as {}", identity.display_name),
                None => println!("Check {email} for a confirmation link, then log in."),
            }
        }
        Command::Login { email, password } => {
            let identity = AuthService::sign_in(ctx, &email, &password).await?;
            println!("Signed in as {}", identity.display_name);
            suggest_profile(ctx).await;
        }
        Command::LoginPhone { phone } => {
            let phone = AuthService::send_phone_code(ctx, &phone).await?;
            println!("Code sent to {phone}. Run `mafia-nights verify-otp {phone} <code>`.");
        }
        Command::VerifyOtp { phone, code } => {
            let identity = AuthService::verify_phone_code(ctx, &phone, &code).await?;
            println!("Signed in as {}", identity.display_name);
            suggest_profile(ctx).await;
        }
        Command::LoginOauth {
            provider,
            timeout_secs,
        } => {
            let Some(provider) = OAuthProvider::from_str(&provider) else {
                bail!("unknown provider `{provider}`; use google or apple");
            };
            let pending = AuthService::begin_oauth(ctx, provider).await?;
            println!("Open this URL to sign in with {provider}:\n\n  {}\n", pending.url);
            let identity =
                AuthService::finish_oauth(ctx, pending, Duration::from_secs(timeout_secs)).await?;
            println!("Signed in as {}", identity.display_name);
            suggest_profile(ctx).await;
        }
        Command::Logout => {
            AuthService::sign_out(ctx).await?;
            println!("Signed out");
        }
        Command::Whoami => match ctx.identity().await {
            Some(identity) => println!("{} ({})", identity.display_name, identity.user_id),
            None => println!("Not signed in"),
        },
        Command::Profile {
            username,
            name,
            age,
            gender,
            avatar,
        } => {
            if username.is_none()
                && name.is_none()
                && age.is_none()
                && gender.is_none()
                && avatar.is_none()
            {
                show_profile(ctx).await?;
            } else {
                let current = ctx.profile().await;
                let fallback = |field: Option<String>, existing: Option<String>| {
                    field.or(existing).unwrap_or_default()
                };
                let username = fallback(username, current.as_ref().and_then(|p| p.username.clone()));
                let name = fallback(name, current.as_ref().and_then(|p| p.name.clone()));
                let age = fallback(age, current.as_ref().and_then(|p| p.age.map(|a| a.to_string())));
                let gender = fallback(
                    gender,
                    current
                        .as_ref()
                        .and_then(|p| p.gender.map(|g| g.as_str().to_string())),
                );
                let avatar = fallback(avatar, current.as_ref().and_then(|p| p.avatar.clone()));
                let profile = ProfileService::save(
                    ctx,
                    ProfileForm {
                        username: &username,
                        name: &name,
                        age: &age,
                        gender: &gender,
                        avatar: &avatar,
                    },
                )
                .await?;
                println!(
                    "Profile saved for {}",
                    profile.username.as_deref().unwrap_or_default()
                );
            }
        }
        Command::Rooms { watch } => {
            if watch {
                watch_lobby(ctx).await?;
            } else {
                let rooms = RoomService::list_waiting_rooms(ctx).await?;
                print!("{}", render::render_lobby(&rooms));
            }
        }
        Command::CreateRoom {
            name,
            max_players,
            join,
        } => {
            let room = RoomService::create_room(ctx, &name, max_players).await?;
            println!("Created {} with code {}", room.name, room.code);
            if join {
                PlayerService::join(ctx, &room).await?;
                println!("You are seated.");
            }
        }
        Command::Join { code } => {
            let (room, _) = RoomService::join_by_code(ctx, &code).await?;
            println!("Joined {} [{}]", room.name, room.code);
        }
        Command::Leave { room } => {
            let room = resolve_room(ctx, &room).await?;
            PlayerService::leave(ctx, room.id).await?;
            println!("Left {}", room.name);
        }
        Command::Say { room, message } => {
            let room = resolve_room(ctx, &room).await?;
            ChatService::send(ctx, room.id, &message.join(" ")).await?;
        }
        Command::Watch { room } => {
            let room = resolve_room(ctx, &room).await?;
            watch_room(ctx, &room, color).await?;
        }
        Command::SetStatus { room, status } => {
            let Some(status) = RoomStatus::from_str(&status) else {
                bail!("status must be waiting, playing or finished");
            };
            let room = resolve_room(ctx, &room).await?;
            let room = RoomService::set_status(ctx, room.id, status).await?;
            println!("{} is now {}", room.name, room.status);
        }
        Command::CloseRoom { room } => {
            let room = resolve_room(ctx, &room).await?;
            RoomService::close_room(ctx, room.id).await?;
            println!("Closed {}", room.name);
        }
        Command::Diagnose => diagnose(ctx).await?,
    }
    Ok(())
}

/// A room id, or the join code of a waiting room.
async fn resolve_room(ctx: &AppContext, reference: &str) -> Result<Room, AppError> {
    match Uuid::parse_str(reference.trim()) {
        Ok(room_id) => RoomService::get_room(ctx, room_id).await,
        Err(_) => RoomService::find_by_code(ctx, reference).await,
    }
}

async fn suggest_profile(ctx: &AppContext) {
    if !ctx.profile().await.is_some_and(|p| p.is_complete()) {
        println!("Set up your profile with `mafia-nights profile --username ...`.");
    }
}

async fn show_profile(ctx: &AppContext) -> anyhow::Result<()> {
    let Some(profile) = ProfileService::load(ctx).await? else {
        println!("No profile yet.");
        return Ok(());
    };
    let field = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
    println!("username: {}", field(profile.username));
    println!("name:     {}", field(profile.name));
    println!("age:      {}", field(profile.age.map(|a| a.to_string())));
    println!("gender:   {}", field(profile.gender.map(|g| g.as_str().to_string())));
    println!("avatar:   {}", field(profile.avatar));
    Ok(())
}

async fn diagnose(ctx: &AppContext) -> anyhow::Result<()> {
    let config = ctx.config();
    println!("backend:   {}", config.supabase_url);
    println!("sync mode: {:?}", config.sync_mode);
    let status = diagnostics::check_game_setup(ctx.client())
        .await
        .context("setup check failed")?;
    println!("setup:     {}", status.status);
    if let Some(message) = &status.message {
        println!("           {message}");
    }
    if status.is_error() {
        bail!("the game tables are not installed on this backend");
    }
    Ok(())
}

fn clear_screen() {
    print!("\x1b[2J\x1b[H");
}

async fn watch_lobby(ctx: &AppContext) -> anyhow::Result<()> {
    let handle = ctx.watch_lobby().await?;
    let mut rx = handle.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = rx.borrow_and_update().clone();
                clear_screen();
                match (&view.state, &view.status) {
                    (Some(rooms), _) => print!("{}", render::render_lobby(rooms)),
                    (None, status) => println!("{status}"),
                }
            }
        }
    }
    Ok(())
}

/// Live room view. Viewing never takes a seat; lines typed on stdin are posted as chat.
async fn watch_room(ctx: &AppContext, room: &Room, color: bool) -> anyhow::Result<()> {
    let handle = ctx.watch_room(room.id).await?;
    let viewer = ctx.identity().await.map(|identity| identity.user_id);
    let mut rx = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = rx.borrow_and_update().clone();
                clear_screen();
                print!("{}", render::render_room(&view, viewer, Utc::now(), color));
                if viewer.is_some() {
                    println!("\nType a message and press Enter. Ctrl+C to quit.");
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(text)) => {
                    match ChatService::send(ctx, room.id, &text).await {
                        Ok(_) => handle.refresh(),
                        Err(e) => eprintln!("{e}"),
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin closed");
                    stdin_open = false;
                }
            },
        }
    }
    Ok(())
}
