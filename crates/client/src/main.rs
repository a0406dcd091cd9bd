//! Roomchat Client - terminal entry point
//!
//! `roomchat <room-id>` joins a room, prints its recent history, then
//! streams new messages while sending each line read from stdin.

use anyhow::{bail, Context};
use futures_util::StreamExt;
use roomchat_client::{
    rooms::DEFAULT_PAGE_SIZE, ApiClient, AuthService, ChatSocket, ClientConfig, RoomService,
    SessionStore, Storage,
};
use roomchat_shared::{LoginRequest, Message, NewMessage};
use tokio::io::{AsyncBufReadExt, BufReader};

const QUIT: &str = "/quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    roomchat_client::logging::init("roomchat_client=info");

    let Some(room_id) = std::env::args().nth(1) else {
        bail!("usage: roomchat <room-id>");
    };

    let config = ClientConfig::from_env().context("invalid configuration")?;
    let storage = match &config.storage_dir {
        Some(dir) => Storage::new(dir),
        None => Storage::default_location()?,
    };
    roomchat_client::log_debug!("Session storage: {}", storage.dir().display());
    let api = ApiClient::new().with_base_url(config.base_url.clone());
    let auth = AuthService::new(api, SessionStore::new(storage));

    if !auth.is_authenticated() {
        let email = std::env::var("ROOMCHAT_EMAIL").context("not signed in and ROOMCHAT_EMAIL is not set")?;
        let password =
            std::env::var("ROOMCHAT_PASSWORD").context("not signed in and ROOMCHAT_PASSWORD is not set")?;
        auth.login(&LoginRequest { email, password })
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message("Login failed")))?;
    }
    let (Some(user), Some(token)) = (auth.current_user(), auth.token()) else {
        bail!("no stored session");
    };

    let rooms = RoomService::new(auth.authorized());
    rooms
        .join_room(&room_id, &user.user_id)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message("Could not join room")))?;
    match rooms.messages(&room_id, 0, DEFAULT_PAGE_SIZE).await {
        Ok(history) => history.iter().for_each(print_message),
        Err(e) => roomchat_client::log_warn!("Could not load history for {}: {}", room_id, e),
    }

    let socket = ChatSocket::new(config);
    socket.connect(&token).await.context("failed to connect")?;
    let Some(mut incoming) = socket.room_messages(&room_id) else {
        bail!("failed to connect: connection dropped before subscribing");
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            message = incoming.next() => match message {
                Some(message) => print_message(&message),
                None => {
                    eprintln!("connection lost");
                    break;
                }
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line == QUIT {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                if !socket.send_message(&room_id, &NewMessage::new(user.name.as_str(), line)) {
                    eprintln!("message cannot be sent");
                }
            }
        }
    }

    socket.unsubscribe_from_room(&room_id);
    socket.disconnect();
    Ok(())
}

fn print_message(message: &Message) {
    match &message.timestamp {
        Some(at) => println!("[{at}] {}: {}", message.sender, message.content),
        None => println!("{}: {}", message.sender, message.content),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use roomchat_client::ConnectError;

    #[test]
    fn connect_failure_is_reported_once() {
        let result: Result<(), ConnectError> = Err(ConnectError::MaxRetriesExceeded {
            attempts: 3,
            last: "could not open socket: connection refused".to_string(),
        });
        let err = result.context("failed to connect").unwrap_err();
        let report = format!("{err:#}");
        assert_eq!(report.matches("connection refused").count(), 1, "{report}");
        assert!(report.starts_with("failed to connect: "), "{report}");
    }
}
