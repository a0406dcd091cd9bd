//! Room endpoints: create, list, membership changes and message history.

use roomchat_shared::{ApiError, Message, Room, RoomUserRequest};

use crate::api_client::ApiClient;

const ROOMS_PATH: &str = "/api/v1/rooms";

pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone)]
pub struct RoomService {
    api: ApiClient,
}

impl RoomService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn create_room(&self, room_id: &str, user_id: &str) -> Result<Room, ApiError> {
        self.api
            .post_json(ROOMS_PATH, &room_user(room_id, user_id))
            .await
    }

    pub async fn list_rooms(&self) -> Result<Vec<Room>, ApiError> {
        self.api.get_json(ROOMS_PATH).await
    }

    pub async fn join_room(&self, room_id: &str, user_id: &str) -> Result<Room, ApiError> {
        self.membership("join", room_id, user_id).await
    }

    pub async fn leave_room(&self, room_id: &str, user_id: &str) -> Result<Room, ApiError> {
        self.membership("leave", room_id, user_id).await
    }

    pub async fn promote_user(&self, room_id: &str, user_id: &str) -> Result<Room, ApiError> {
        self.membership("promote", room_id, user_id).await
    }

    pub async fn demote_user(&self, room_id: &str, user_id: &str) -> Result<Room, ApiError> {
        self.membership("demote", room_id, user_id).await
    }

    /// One page of a room's history, oldest first.
    pub async fn messages(&self, room_id: &str, page: u32, size: u32) -> Result<Vec<Message>, ApiError> {
        let mut messages: Vec<Message> = self.api.get_json(&messages_path(room_id, page, size)).await?;
        for message in &mut messages {
            if message.room_id.is_empty() {
                message.room_id = room_id.to_string();
            }
        }
        Ok(messages)
    }

    async fn membership(&self, action: &str, room_id: &str, user_id: &str) -> Result<Room, ApiError> {
        self.api
            .post_json(&format!("{ROOMS_PATH}/{action}"), &room_user(room_id, user_id))
            .await
    }
}

fn room_user(room_id: &str, user_id: &str) -> RoomUserRequest {
    RoomUserRequest {
        room_id: room_id.to_string(),
        user_id: user_id.to_string(),
    }
}

fn messages_path(room_id: &str, page: u32, size: u32) -> String {
    format!(
        "{ROOMS_PATH}/{}/messages?page={page}&size={size}",
        urlencoding::encode(room_id)
    )
}
