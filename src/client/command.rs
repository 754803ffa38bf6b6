//! Operator commands read by the subscriber.
//!
//! ```text
//! subscribe <topic> <0|1>    1 turns on store-and-forward
//! unsubscribe <topic>
//! exit
//! ```

use std::str::FromStr;

use crate::transport::value::validate_topic;
use crate::utils::error::CommandError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Subscribe {
        topic: String,
        store_and_forward: bool,
    },
    Unsubscribe {
        topic: String,
    },
    Exit,
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();

        let command = match words.next().ok_or(CommandError::Empty)? {
            "exit" => Command::Exit,
            "subscribe" => {
                let topic = topic(words.next())?;
                let store_and_forward = match words.next() {
                    Some("0") => false,
                    Some("1") => true,
                    Some(other) => return Err(CommandError::InvalidFlag(other.to_string())),
                    None => return Err(CommandError::MissingFlag),
                };
                Command::Subscribe {
                    topic,
                    store_and_forward,
                }
            }
            "unsubscribe" => Command::Unsubscribe {
                topic: topic(words.next())?,
            },
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        if let Some(extra) = words.next() {
            return Err(CommandError::UnexpectedArgument(extra.to_string()));
        }
        Ok(command)
    }
}

fn topic(word: Option<&str>) -> Result<String, CommandError> {
    let topic = word.ok_or(CommandError::MissingTopic)?;
    validate_topic(topic)?;
    Ok(topic.to_string())
}
