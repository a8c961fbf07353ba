//! Line grammar of the client protocol.
//!
//! Commands are `|`-separated fields led by a verb, e.g. `LOGIN|alice|pw`.
//! A verb is only recognised when a `|` follows it; anything else is
//! passthrough. The last field of each command keeps any further `|`
//! characters, which matters for file payloads.

use std::fmt;

/// Target kind of a `FILE` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTarget<'a> {
    Dm,
    Room,
    Unknown(&'a str),
}

impl<'a> From<&'a str> for FileTarget<'a> {
    fn from(kind: &'a str) -> Self {
        match kind {
            "dm" => FileTarget::Dm,
            "room" => FileTarget::Room,
            other => FileTarget::Unknown(other),
        }
    }
}

/// A classified inbound line, borrowing from the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand<'a> {
    Signup {
        username: &'a str,
        password: &'a str,
    },
    Login {
        username: &'a str,
        password: &'a str,
    },
    FindUser {
        id: &'a str,
    },
    File {
        target: FileTarget<'a>,
        name: &'a str,
        filename: &'a str,
        data: &'a str,
    },
    /// `FILE|` with fewer than four fields.
    MalformedFile,
    Hello {
        username: &'a str,
    },
    Join {
        room: &'a str,
    },
    Leave {
        room: &'a str,
    },
    Passthrough,
}

impl<'a> ClientCommand<'a> {
    pub fn parse(line: &'a str) -> Self {
        let Some((verb, rest)) = line.split_once('|') else {
            return ClientCommand::Passthrough;
        };

        match verb {
            "SIGNUP" => {
                let (username, password) = split_pair(rest);
                ClientCommand::Signup { username, password }
            }
            "LOGIN" => {
                let (username, password) = split_pair(rest);
                ClientCommand::Login { username, password }
            }
            "FIND_USER" => ClientCommand::FindUser {
                id: first_field(rest),
            },
            "FILE" => {
                let mut fields = rest.splitn(4, '|');
                match (fields.next(), fields.next(), fields.next(), fields.next()) {
                    (Some(kind), Some(name), Some(filename), Some(data)) => ClientCommand::File {
                        target: FileTarget::from(kind),
                        name,
                        filename,
                        data,
                    },
                    _ => ClientCommand::MalformedFile,
                }
            }
            "HELLO" => ClientCommand::Hello {
                username: first_field(rest),
            },
            "JOIN" => ClientCommand::Join {
                room: first_field(rest),
            },
            "LEAVE" => ClientCommand::Leave {
                room: first_field(rest),
            },
            _ => ClientCommand::Passthrough,
        }
    }
}

fn first_field(rest: &str) -> &str {
    rest.split('|').next().unwrap_or_default()
}

fn split_pair(rest: &str) -> (&str, &str) {
    rest.split_once('|').unwrap_or((rest, ""))
}

/// Strips one trailing `\n` or `\r\n` from an inbound frame.
pub fn trim_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// The `HELLO` line sent to the backend on a successful `LOGIN`.
pub fn hello_line(username: &str) -> String {
    format!("HELLO|{username}")
}

/// Lines originated by the gateway itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayReply {
    SignupSuccess {
        username: String,
        id: String,
    },
    LoginSuccess {
        username: String,
        id: String,
    },
    UserFound {
        id: String,
        username: String,
    },
    FileFrom {
        sender: String,
        filename: String,
        data: String,
    },
    RoomFileFrom {
        room: String,
        sender: String,
        filename: String,
        data: String,
    },
    Error(String),
}

impl GatewayReply {
    pub fn error(reason: impl Into<String>) -> Self {
        GatewayReply::Error(reason.into())
    }
}

impl fmt::Display for GatewayReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayReply::SignupSuccess { username, id } => {
                write!(f, "SIGNUP_SUCCESS|{username}|{id}")
            }
            GatewayReply::LoginSuccess { username, id } => {
                write!(f, "LOGIN_SUCCESS|{username}|{id}")
            }
            GatewayReply::UserFound { id, username } => write!(f, "USER_FOUND|{id}|{username}"),
            GatewayReply::FileFrom {
                sender,
                filename,
                data,
            } => write!(f, "FILE_FROM|{sender}|{filename}|{data}"),
            GatewayReply::RoomFileFrom {
                room,
                sender,
                filename,
                data,
            } => write!(f, "ROOM_FILE_FROM|{room}|{sender}|{filename}|{data}"),
            GatewayReply::Error(reason) => write!(f, "ERROR||{reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_auth_commands() {
        assert_eq!(
            ClientCommand::parse("SIGNUP|alice|pw"),
            ClientCommand::Signup {
                username: "alice",
                password: "pw"
            }
        );
        assert_eq!(
            ClientCommand::parse("LOGIN|alice"),
            ClientCommand::Login {
                username: "alice",
                password: ""
            }
        );
        assert_eq!(
            ClientCommand::parse("LOGIN|alice|p|w"),
            ClientCommand::Login {
                username: "alice",
                password: "p|w"
            }
        );
        assert_eq!(
            ClientCommand::parse("FIND_USER|123456"),
            ClientCommand::FindUser { id: "123456" }
        );
    }

    #[test]
    fn file_data_keeps_pipes() {
        assert_eq!(
            ClientCommand::parse("FILE|room|r|f.txt|AA|BB"),
            ClientCommand::File {
                target: FileTarget::Room,
                name: "r",
                filename: "f.txt",
                data: "AA|BB"
            }
        );
        assert_eq!(
            ClientCommand::parse("FILE|fax|bob|f.txt|"),
            ClientCommand::File {
                target: FileTarget::Unknown("fax"),
                name: "bob",
                filename: "f.txt",
                data: ""
            }
        );
        assert_eq!(ClientCommand::parse("FILE|dm|bob"), ClientCommand::MalformedFile);
    }

    #[test]
    fn snoop_commands_take_first_field() {
        assert_eq!(
            ClientCommand::parse("HELLO|alice"),
            ClientCommand::Hello { username: "alice" }
        );
        assert_eq!(
            ClientCommand::parse("JOIN|lobby|"),
            ClientCommand::Join { room: "lobby" }
        );
        assert_eq!(
            ClientCommand::parse("LEAVE|lobby|"),
            ClientCommand::Leave { room: "lobby" }
        );
        assert_eq!(ClientCommand::parse("JOIN|"), ClientCommand::Join { room: "" });
    }

    #[test]
    fn everything_else_passes_through() {
        for line in ["MSG|bob|hi", "LIST||", "EXIT||", "SIGNUP", "HELLO", "", "garbage"] {
            assert_eq!(ClientCommand::parse(line), ClientCommand::Passthrough, "{line}");
        }
    }

    #[test]
    fn reply_formatting() {
        assert_eq!(
            GatewayReply::SignupSuccess {
                username: "alice".into(),
                id: "123456".into()
            }
            .to_string(),
            "SIGNUP_SUCCESS|alice|123456"
        );
        assert_eq!(
            GatewayReply::RoomFileFrom {
                room: "r".into(),
                sender: "b".into(),
                filename: "f.txt".into(),
                data: "AAAA".into()
            }
            .to_string(),
            "ROOM_FILE_FROM|r|b|f.txt|AAAA"
        );
        assert_eq!(GatewayReply::error("nope").to_string(), "ERROR||nope");
        assert_eq!(hello_line("alice"), "HELLO|alice");
    }

    #[test]
    fn trims_line_endings() {
        assert_eq!(trim_line_ending("LIST||\r\n"), "LIST||");
        assert_eq!(trim_line_ending("LIST||\n"), "LIST||");
        assert_eq!(trim_line_ending("LIST||"), "LIST||");
    }
}
