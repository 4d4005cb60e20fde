/*!
The router command mini-language accepted by the config agent.

One command per line, lines terminated by `;` or newline:

```text
ADD CONTACT <node_eid> <start>-<end> <bitrate> <cla_name>:<cla_address> [<eid>,<eid>,...]
REMOVE CONTACT <node_eid> <start>
ADD NODE <node_eid> <eid>,<eid>,...
REMOVE NODE <node_eid>
RESET
```

`<start>` and `<end>` are Unix timestamps in seconds, or `+N` for N
seconds from now.  `<bitrate>` is in bytes per second.
*/

use super::*;
use thiserror::Error;

/// A command applied to the routing table by the bundle processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterCommand {
    AddContact {
        node: Eid,
        from: time::OffsetDateTime,
        to: time::OffsetDateTime,
        bitrate: u64,
        cla_name: String,
        cla_address: String,
        endpoints: Vec<String>,
    },
    RemoveContact {
        node: Eid,
        from: time::OffsetDateTime,
    },
    AddNode {
        node: Eid,
        endpoints: Vec<String>,
    },
    RemoveNode {
        node: Eid,
    },
    Reset,
}

/// Errors from command parsing.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command keyword is not recognized.
    #[error("Unknown command \"{0}\"")]
    UnknownCommand(String),

    /// The command is missing a required field.
    #[error("Command is missing its {0}")]
    MissingField(&'static str),

    /// A numeric field failed to parse.
    #[error("Invalid {0}: {1}")]
    InvalidNumber(&'static str, String),

    /// A time window is empty or reversed.
    #[error("Contact window {0}-{1} is empty")]
    EmptyWindow(i64, i64),

    /// The EID failed to parse.
    #[error(transparent)]
    InvalidEid(#[from] tern_bpv7::eid::EidError),

    /// The command text is not valid UTF-8.
    #[error("Command text is not valid UTF-8")]
    InvalidUtf8,
}

fn parse_time(token: &str, now: time::OffsetDateTime) -> Result<time::OffsetDateTime, CommandError> {
    if let Some(relative) = token.strip_prefix('+') {
        let secs: i64 = relative
            .parse()
            .map_err(|_| CommandError::InvalidNumber("relative time", token.to_string()))?;
        Ok(now + time::Duration::seconds(secs))
    } else {
        let secs: i64 = token
            .parse()
            .map_err(|_| CommandError::InvalidNumber("timestamp", token.to_string()))?;
        time::OffsetDateTime::from_unix_timestamp(secs)
            .map_err(|_| CommandError::InvalidNumber("timestamp", token.to_string()))
    }
}

fn parse_endpoints(token: Option<&str>) -> Vec<String> {
    token
        .map(|t| {
            t.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_line(line: &str, now: time::OffsetDateTime) -> Result<RouterCommand, CommandError> {
    let mut tokens = line.split_whitespace();
    let verb = tokens.next().ok_or(CommandError::MissingField("verb"))?;
    match (verb, tokens.next()) {
        ("RESET", None) => Ok(RouterCommand::Reset),
        ("ADD", Some("CONTACT")) => {
            let node: Eid = tokens
                .next()
                .ok_or(CommandError::MissingField("node EID"))?
                .parse()?;
            let window = tokens
                .next()
                .ok_or(CommandError::MissingField("contact window"))?;
            let (start, end) = window
                .split_once('-')
                .ok_or(CommandError::MissingField("contact window"))?;
            let from = parse_time(start, now)?;
            let to = parse_time(end, now)?;
            if to <= from {
                return Err(CommandError::EmptyWindow(
                    from.unix_timestamp(),
                    to.unix_timestamp(),
                ));
            }
            let bitrate = tokens
                .next()
                .ok_or(CommandError::MissingField("bitrate"))?;
            let bitrate = bitrate
                .parse()
                .map_err(|_| CommandError::InvalidNumber("bitrate", bitrate.to_string()))?;
            let cla = tokens
                .next()
                .ok_or(CommandError::MissingField("CLA address"))?;
            let (cla_name, cla_address) = cla
                .split_once(':')
                .ok_or(CommandError::MissingField("CLA address"))?;
            Ok(RouterCommand::AddContact {
                node,
                from,
                to,
                bitrate,
                cla_name: cla_name.to_string(),
                cla_address: cla_address.to_string(),
                endpoints: parse_endpoints(tokens.next()),
            })
        }
        ("REMOVE", Some("CONTACT")) => {
            let node: Eid = tokens
                .next()
                .ok_or(CommandError::MissingField("node EID"))?
                .parse()?;
            let from = parse_time(
                tokens.next().ok_or(CommandError::MissingField("start"))?,
                now,
            )?;
            Ok(RouterCommand::RemoveContact { node, from })
        }
        ("ADD", Some("NODE")) => {
            let node: Eid = tokens
                .next()
                .ok_or(CommandError::MissingField("node EID"))?
                .parse()?;
            Ok(RouterCommand::AddNode {
                node,
                endpoints: parse_endpoints(tokens.next()),
            })
        }
        ("REMOVE", Some("NODE")) => {
            let node: Eid = tokens
                .next()
                .ok_or(CommandError::MissingField("node EID"))?
                .parse()?;
            Ok(RouterCommand::RemoveNode { node })
        }
        _ => Err(CommandError::UnknownCommand(line.trim().to_string())),
    }
}

/// Parses a command payload: one command per `;`- or newline-terminated
/// line, empty lines ignored.
pub fn parse(payload: &[u8]) -> Result<Vec<RouterCommand>, CommandError> {
    let text = core::str::from_utf8(payload).map_err(|_| CommandError::InvalidUtf8)?;
    let now = time::OffsetDateTime::now_utc();
    text.split(|c| c == ';' || c == '\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| parse_line(line, now))
        .collect()
}
