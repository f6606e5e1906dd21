use chat_common::RoomId;

/// One line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Say(String),
    OpenRoom(RoomId),
    ListRooms,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Say(line.to_string());
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("room"), Some(id)) => Input::OpenRoom(RoomId::from(id)),
        (Some("rooms"), None) => Input::ListRooms,
        (Some("quit" | "exit"), None) => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse("/room 42"), Input::OpenRoom(RoomId::from(42)));
        assert_eq!(parse("/rooms"), Input::ListRooms);
        assert_eq!(parse(" /quit "), Input::Quit);
        assert_eq!(parse("/room"), Input::Unknown("/room".into()));
    }

    #[test]
    fn everything_else_is_a_message() {
        assert_eq!(parse("  hello  "), Input::Say("hello".into()));
        assert_eq!(parse("   "), Input::Empty);
    }
}
