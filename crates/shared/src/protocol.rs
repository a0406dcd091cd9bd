//! STOMP 1.2 frame codec and the broker destinations used for rooms.

use std::fmt;

use crate::error::FrameError;

/// Broker topic prefix; one topic per room.
pub const ROOM_TOPIC_PREFIX: &str = "/topic/room/";
/// Application destination prefix for publishing into a room.
pub const ROOM_SEND_PREFIX: &str = "/app/sendMessage/";

pub const HEADER_ACCEPT_VERSION: &str = "accept-version";
pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_CONTENT_LENGTH: &str = "content-length";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_DESTINATION: &str = "destination";
pub const HEADER_HEART_BEAT: &str = "heart-beat";
pub const HEADER_HOST: &str = "host";
pub const HEADER_ID: &str = "id";
pub const HEADER_MESSAGE: &str = "message";
pub const HEADER_SUBSCRIPTION: &str = "subscription";

/// Topic that carries a room's messages.
pub fn room_topic(room_id: &str) -> String {
    format!("{ROOM_TOPIC_PREFIX}{room_id}")
}

/// Destination that publishes into a room.
pub fn room_send_destination(room_id: &str) -> String {
    format!("{ROOM_SEND_PREFIX}{room_id}")
}

/// Room id of a room topic, if `destination` is one.
pub fn room_from_topic(destination: &str) -> Option<&str> {
    destination.strip_prefix(ROOM_TOPIC_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // client
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // server
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            _ => return None,
        })
    }

    /// CONNECT and CONNECTED frames carry raw header values.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of a header. When a header repeats, the first one wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// `CONNECT` frame authenticating with a bearer token.
    pub fn connect(host: &str, token: &str) -> Self {
        Frame::new(Command::Connect)
            .with_header(HEADER_ACCEPT_VERSION, "1.2,1.1,1.0")
            .with_header(HEADER_HOST, host)
            .with_header(HEADER_HEART_BEAT, "0,0")
            .with_header(HEADER_AUTHORIZATION, format!("Bearer {token}"))
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .with_header(HEADER_ID, id)
            .with_header(HEADER_DESTINATION, destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).with_header(HEADER_ID, id)
    }

    /// `SEND` frame with a JSON body.
    pub fn send_json(destination: &str, body: String) -> Self {
        Frame::new(Command::Send)
            .with_header(HEADER_DESTINATION, destination)
            .with_header(HEADER_CONTENT_TYPE, "application/json")
            .with_body(body)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    /// Serialize to wire text, NUL-terminated. A `content-length` header is
    /// added for non-empty bodies unless already present.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.header(HEADER_CONTENT_LENGTH).is_none() {
            out.push_str(&format!("{HEADER_CONTENT_LENGTH}:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode every frame in `input`, failing on the first bad one. Bare
    /// EOLs between frames are heart-beats and are skipped.
    pub fn decode_all(input: &str) -> Result<Vec<Frame>, FrameError> {
        Frame::decode_each(input).collect()
    }

    /// Decode the frames in `input` one at a time. A bad frame yields its
    /// error and decoding resumes after the next NUL.
    pub fn decode_each(input: &str) -> Frames<'_> {
        Frames { rest: input }
    }
}

/// Iterator returned by [`Frame::decode_each`].
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    rest: &'a str,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest.trim_start_matches(['\n', '\r']);
        if rest.is_empty() {
            self.rest = rest;
            return None;
        }
        match decode_one(rest) {
            Ok((frame, remaining)) => {
                self.rest = remaining;
                Some(Ok(frame))
            }
            Err(e) => {
                self.rest = rest.find('\0').map_or("", |end| &rest[end + 1..]);
                Some(Err(e))
            }
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        if let Some(dest) = self.header(HEADER_DESTINATION) {
            write!(f, " {dest}")?;
        }
        Ok(())
    }
}

fn decode_one(input: &str) -> Result<(Frame, &str), FrameError> {
    let (command_line, mut rest) = split_line(input).ok_or(FrameError::Incomplete)?;
    let command = Command::parse(command_line)
        .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;
    let escaped = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let (line, after) = split_line(rest).ok_or(FrameError::Incomplete)?;
        rest = after;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if escaped {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(n, _)| n == HEADER_CONTENT_LENGTH)
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| FrameError::InvalidContentLength(v.clone()))
        })
        .transpose()?;

    let (body, remaining) = match content_length {
        Some(len) => {
            let body = rest.get(..len).ok_or(FrameError::Incomplete)?;
            let after = &rest[len..];
            let remaining = after.strip_prefix('\0').ok_or(FrameError::MissingNul)?;
            (body, remaining)
        }
        None => {
            let end = rest.find('\0').ok_or(FrameError::MissingNul)?;
            (&rest[..end], &rest[end + 1..])
        }
    };

    Ok((
        Frame {
            command,
            headers,
            body: body.to_string(),
        },
        remaining,
    ))
}

/// Split off one line, accepting both `\n` and `\r\n` endings.
fn split_line(input: &str) -> Option<(&str, &str)> {
    let idx = input.find('\n')?;
    let line = &input[..idx];
    Some((line.strip_suffix('\r').unwrap_or(line), &input[idx + 1..]))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_destinations() {
        assert_eq!(room_topic("room1"), "/topic/room/room1");
        assert_eq!(room_send_destination("room1"), "/app/sendMessage/room1");
        assert_eq!(room_from_topic("/topic/room/room1"), Some("room1"));
        assert_eq!(room_from_topic("/queue/other"), None);
    }

    #[test]
    fn connect_frame_keeps_raw_header_values() {
        let text = Frame::connect("localhost", "abc").encode();
        assert!(text.starts_with("CONNECT\n"));
        assert!(text.contains("Authorization:Bearer abc\n"));
        assert!(text.contains("accept-version:1.2,1.1,1.0\n"));
        assert!(text.ends_with("\n\n\0"));
    }

    #[test]
    fn send_frame_adds_content_length() {
        let body = r#"{"sender":"alice","content":"yo","roomId":"room1"}"#;
        let text = Frame::send_json("/app/sendMessage/room1", body.to_string()).encode();
        assert_eq!(
            text,
            format!(
                "SEND\ndestination:/app/sendMessage/room1\ncontent-type:application/json\ncontent-length:{}\n\n{}\0",
                body.len(),
                body
            )
        );
    }

    #[test]
    fn decodes_broker_message_frame() {
        let text = "MESSAGE\ndestination:/topic/room/room1\ncontent-type:application/json\nsubscription:sub-0\nmessage-id:abc-1\ncontent-length:31\n\n{\"sender\":\"bob\",\"content\":\"hi\"}\0";
        let frames = Frame::decode_all(text).unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header(HEADER_SUBSCRIPTION), Some("sub-0"));
        assert_eq!(frame.body, r#"{"sender":"bob","content":"hi"}"#);
    }

    #[test]
    fn skips_heart_beats_between_frames() {
        let text = "\n\r\nRECEIPT\nreceipt-id:1\n\n\0\nCONNECTED\nversion:1.2\n\n\0\n";
        let frames = Frame::decode_all(text).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, Command::Receipt);
        assert_eq!(frames[1].command, Command::Connected);
        assert_eq!(frames[1].header("version"), Some("1.2"));
        assert!(Frame::decode_all("\n\n").unwrap().is_empty());
    }

    #[test]
    fn header_escaping_survives_the_wire() {
        let frame = Frame::new(Command::Send)
            .with_header(HEADER_DESTINATION, "/app/sendMessage/a:b")
            .with_header("note", "line1\nline2\\");
        let text = frame.encode();
        assert!(text.contains("destination:/app/sendMessage/a\\cb\n"));
        let decoded = Frame::decode_all(&text).unwrap();
        assert_eq!(decoded, vec![frame]);
    }

    #[test]
    fn bad_frame_does_not_hide_its_neighbours() {
        let text = "MESSAGE\nsubscription:sub-0\n\nfirst\0GARBAGE\n\n\0\nMESSAGE\nsubscription:sub-0\n\nsecond\0";
        let results: Vec<_> = Frame::decode_each(text).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().body, "first");
        assert_eq!(
            results[1],
            Err(FrameError::UnknownCommand("GARBAGE".to_string()))
        );
        assert_eq!(results[2].as_ref().unwrap().body, "second");

        assert!(Frame::decode_all(text).is_err());
        let truncated: Vec<_> = Frame::decode_each("MESSAGE\nx:\\t\n\nno nul").collect();
        assert_eq!(truncated.len(), 1);
    }

    #[test]
    fn content_length_allows_nul_in_body() {
        let text = "MESSAGE\ncontent-length:3\n\na\0b\0";
        let frames = Frame::decode_all(text).unwrap();
        assert_eq!(frames[0].body, "a\0b");
    }

    #[test]
    fn rejects_malformed_frames() {
        assert_eq!(
            Frame::decode_all("HELLO\n\n\0"),
            Err(FrameError::UnknownCommand("HELLO".to_string()))
        );
        assert_eq!(
            Frame::decode_all("MESSAGE\nno-colon\n\n\0"),
            Err(FrameError::MalformedHeader("no-colon".to_string()))
        );
        assert_eq!(
            Frame::decode_all("MESSAGE\nsubscription:sub-0\n\nbody"),
            Err(FrameError::MissingNul)
        );
        assert_eq!(
            Frame::decode_all("MESSAGE\nx:bad\\t\n\n\0"),
            Err(FrameError::InvalidEscape("bad\\t".to_string()))
        );
        assert_eq!(Frame::decode_all("MESSAGE\nsubscription"), Err(FrameError::Incomplete));
    }
}
