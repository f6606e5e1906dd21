//! STOMP 1.2 text frames.

use std::fmt::Write as _;

use crate::error::FrameError;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    fn parse(line: &str) -> Result<Self, FrameError> {
        Ok(match line {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }

    /// CONNECT and CONNECTED carry their headers verbatim.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// A single STOMP frame. Header order is preserved; when a header repeats,
/// the first occurrence is the one that counts.
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

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to wire form, NUL terminator included. A `content-length`
    /// header is added for non-empty bodies unless one is already present.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            let _ = writeln!(out, "content-length:{}", self.body.len());
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode the first frame in `input`.
    ///
    /// Leading EOLs are heart-beats and are skipped. Returns `Ok(None)` when
    /// nothing but heart-beats is present, otherwise the frame and the number
    /// of bytes consumed.
    pub fn decode(input: &str) -> Result<Option<(Frame, usize)>, FrameError> {
        let start = input.len() - input.trim_start_matches(&['\r', '\n'][..]).len();
        let rest = &input[start..];
        if rest.is_empty() {
            return Ok(None);
        }

        let mut pos = 0;
        let command_line = next_line(rest, &mut pos).ok_or(FrameError::Unterminated)?;
        if command_line.is_empty() {
            return Err(FrameError::MissingCommand);
        }
        let command = Command::parse(command_line)?;

        let mut headers = Vec::new();
        loop {
            let line = next_line(rest, &mut pos).ok_or(FrameError::Unterminated)?;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| FrameError::InvalidContentLength(v.clone()))
            })
            .transpose()?;

        let body_start = pos;
        let body_end = match content_length {
            Some(len) => {
                let end = body_start
                    .checked_add(len)
                    .ok_or_else(|| FrameError::InvalidContentLength(len.to_string()))?;
                if rest.len() <= end {
                    return Err(FrameError::Unterminated);
                }
                if !rest.is_char_boundary(end) || rest.as_bytes()[end] != 0 {
                    return Err(FrameError::InvalidContentLength(len.to_string()));
                }
                end
            }
            None => body_start + rest[body_start..].find('\0').ok_or(FrameError::Unterminated)?,
        };

        let frame = Frame {
            command,
            headers,
            body: rest[body_start..body_end].to_string(),
        };
        Ok(Some((frame, start + body_end + 1)))
    }

    /// Decode every frame in `input`, ignoring heart-beats between them.
    pub fn decode_all(input: &str) -> Result<Vec<Frame>, FrameError> {
        let mut frames = Vec::new();
        let mut offset = 0;
        while let Some((frame, used)) = Self::decode(&input[offset..])? {
            frames.push(frame);
            offset += used;
        }
        Ok(frames)
    }
}

/// Read up to the next LF, dropping an optional trailing CR.
fn next_line<'a>(input: &'a str, pos: &mut usize) -> Option<&'a str> {
    let rest = &input[*pos..];
    let end = rest.find('\n')?;
    *pos += end + 1;
    Some(rest[..end].strip_suffix('\r').unwrap_or(&rest[..end]))
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
}

fn unescape(raw: &str) -> Result<String, FrameError> {
    if !raw.contains('\\') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
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
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_send_with_content_length() {
        let frame = Frame::new(Command::Send)
            .header("destination", "/app/chat/send")
            .body(r#"{"roomId":1,"content":"안녕"}"#);
        let wire = frame.encode();
        assert!(wire.starts_with("SEND\ndestination:/app/chat/send\ncontent-length:"));
        assert!(wire.ends_with("\"}\0"));
        let len: usize = frame.body.len();
        assert!(wire.contains(&format!("content-length:{len}\n\n")));
    }

    #[test]
    fn empty_body_has_no_content_length() {
        let wire = Frame::new(Command::Send).header("destination", "/app/ping").encode();
        assert_eq!(wire, "SEND\ndestination:/app/ping\n\n\0");
    }

    #[test]
    fn decodes_message_and_reports_consumed_bytes() {
        let wire = "MESSAGE\r\nsubscription:sub-0\r\ndestination:/topic/room/5\r\n\r\nhello\0\n";
        let (frame, used) = Frame::decode(wire).unwrap().unwrap();
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("subscription"), Some("sub-0"));
        assert_eq!(frame.body, "hello");
        assert_eq!(&wire[used..], "\n");
    }

    #[test]
    fn content_length_allows_nul_in_body() {
        let wire = "MESSAGE\ncontent-length:3\n\na\0b\0";
        let (frame, _) = Frame::decode(wire).unwrap().unwrap();
        assert_eq!(frame.body, "a\0b");
    }

    #[test]
    fn heartbeats_alone_decode_to_nothing() {
        assert_eq!(Frame::decode("\n").unwrap(), None);
        assert_eq!(Frame::decode("\r\n\n").unwrap(), None);
        assert_eq!(Frame::decode("").unwrap(), None);
    }

    #[test]
    fn decode_all_skips_heartbeats_between_frames() {
        let wire = "\nRECEIPT\nreceipt-id:1\n\n\0\n\nMESSAGE\nsubscription:sub-1\n\n{}\0";
        let frames = Frame::decode_all(wire).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, Command::Receipt);
        assert_eq!(frames[1].body, "{}");
    }

    #[test]
    fn header_escaping_round_trips_except_on_connect() {
        let frame = Frame::new(Command::Message).header("x:key", "a\nb\\c");
        let wire = frame.encode();
        assert!(wire.contains("x\\ckey:a\\nb\\\\c\n"));
        let (decoded, _) = Frame::decode(&wire).unwrap().unwrap();
        assert_eq!(decoded.get("x:key"), Some("a\nb\\c"));

        let connect = Frame::new(Command::Connect).header("host", "localhost:8080").encode();
        assert!(connect.contains("host:localhost:8080\n"));
        let (decoded, _) = Frame::decode(&connect).unwrap().unwrap();
        assert_eq!(decoded.get("host"), Some("localhost:8080"));
    }

    #[test]
    fn first_repeated_header_wins() {
        let wire = "MESSAGE\nfoo:1\nfoo:2\n\n\0";
        let (frame, _) = Frame::decode(wire).unwrap().unwrap();
        assert_eq!(frame.get("foo"), Some("1"));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(
            Frame::decode("HELLO\n\n\0").unwrap_err(),
            FrameError::UnknownCommand("HELLO".into())
        );
        assert_eq!(Frame::decode("MESSAGE\nbody").unwrap_err(), FrameError::Unterminated);
        assert_eq!(Frame::decode("MESSAGE\n\nbody").unwrap_err(), FrameError::Unterminated);
        assert!(matches!(
            Frame::decode("MESSAGE\nnocolon\n\n\0").unwrap_err(),
            FrameError::MalformedHeader(_)
        ));
        assert!(matches!(
            Frame::decode("MESSAGE\nbad:\\t\n\n\0").unwrap_err(),
            FrameError::InvalidEscape(_)
        ));
        assert!(matches!(
            Frame::decode("MESSAGE\ncontent-length:x\n\n\0").unwrap_err(),
            FrameError::InvalidContentLength(_)
        ));
        assert_eq!(
            Frame::decode("MESSAGE\ncontent-length:18446744073709551615\n\nabc\0").unwrap_err(),
            FrameError::InvalidContentLength("18446744073709551615".into())
        );
    }
}
