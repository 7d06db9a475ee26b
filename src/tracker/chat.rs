// Answers to the status requests typed by the participants in the chat.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::tracker::notify::Outbox;
use crate::tracker::*;

// ******** Incoming updates, in the shape returned by the chat API *********

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: i64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: i64,
    pub from: ChatUser,
    pub text: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ChatUpdate {
    pub update_id: i64,
    pub message: Option<ChatMessage>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
struct UpdatesResponse {
    result: Vec<ChatUpdate>,
}

/// Reads the pending updates. A missing inbox means that nothing was received.
pub fn read_inbox(path: &Path) -> TrackerResult<Vec<ChatUpdate>> {
    let p = path.display().to_string();
    if !path.exists() {
        debug!("read_inbox: no inbox at {}", p);
        return Ok(vec![]);
    }
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path: p.clone() })?;
    let response: UpdatesResponse =
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path: p })?;
    info!("read_inbox: {} updates", response.result.len());
    Ok(response.result)
}

// ******** Message log *********

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingMessages {
    /// Id of the last chat message that was answered.
    pub telegram_chat: i64,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatLogEntry {
    pub incoming_msg: IncomingMessages,
}

/// Messages already handled, per chat id. Persisted after every change.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageLog {
    chats: BTreeMap<String, ChatLogEntry>,
}

impl MessageLog {
    /// Opens the log, creating an empty one if the file does not exist yet.
    pub fn load(path: &Path) -> TrackerResult<MessageLog> {
        let p = path.display().to_string();
        if !path.exists() {
            info!("MessageLog::load: creating {}", p);
            let log = MessageLog::default();
            log.save(path)?;
            return Ok(log);
        }
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path: p.clone() })?;
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path: p })
    }

    pub fn save(&self, path: &Path) -> TrackerResult<()> {
        let p = path.display().to_string();
        let js = serde_json::to_string(self).context(SerializingJsonSnafu { path: p.clone() })?;
        fs::write(path, js).context(WritingOutputSnafu { path: p })
    }

    pub fn last_handled(&self, chat_id: i64) -> Option<i64> {
        self.chats
            .get(&chat_id.to_string())
            .map(|e| e.incoming_msg.telegram_chat)
    }

    /// Records the last handled message of a chat, leaving the other entries untouched.
    pub fn record_handled(&mut self, chat_id: i64, message_id: i64, path: &Path) -> TrackerResult<()> {
        let entry = self.chats.entry(chat_id.to_string()).or_default();
        entry.incoming_msg.telegram_chat = message_id;
        self.save(path)
    }
}

// ******** Requests *********

/// A request the bot knows how to answer.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct StatusRequest {
    pub key: String,
    pub description: String,
    pub response: String,
}

/// The fixed set of requests, in the order they are listed to the participants.
pub fn status_requests(
    experiment_name: &str,
    last_vote: Option<&DateTime<FixedOffset>>,
) -> Vec<StatusRequest> {
    let help_msg = format!(
        "Welcome to the {} experiment. This telegram bot \
         will be used to automatically send you messages about your progress \
         during the experiment. In addition you can chat with the bot and \
         ask a predefined set of questions.\n\n\
         Type and send \"help\" if you want to know the list of available \
         commands you can ask bo the Bot\n\n\
         Please remember that the Bot won't be able to answer any other \
         request. Hence, please contact the research team via the designated \
         telegram group. There might be a delay of a few minutes between \
         the time you type and send a request and the time you receive and answer. \
         Thank you once again for participating in the {} experiment.",
        experiment_name, experiment_name
    );
    let keys = ["help", "last vote", "/start"];
    vec![
        StatusRequest {
            key: "help".to_string(),
            description: "Returns list of available requests".to_string(),
            response: format!("List of available requests: {}", keys.join(", ")),
        },
        StatusRequest {
            key: "last vote".to_string(),
            description: "Returns the date and time of the last fitbit response".to_string(),
            response: match last_vote {
                Some(ts) => ts.format(REPORT_TIME_FORMAT).to_string(),
                None => "Error".to_string(),
            },
        },
        StatusRequest {
            key: "/start".to_string(),
            description: "Message when the user initiate a conversation with the Bot".to_string(),
            response: help_msg,
        },
    ]
}

/// The messages sent back for a request.
pub fn answer_request(requests: &[StatusRequest], text: &str) -> Vec<String> {
    let text = text.trim().to_lowercase();
    match requests.iter().find(|r| r.key == text) {
        Some(r) => vec![
            format!("You have asked the bot for {}:", r.key),
            r.response.clone(),
        ],
        None => {
            let mut res =
                vec!["The bot cannot answer this request. List of available requests:".to_string()];
            res.extend(
                requests
                    .iter()
                    .map(|r| format!("{}: {}", r.key, r.description)),
            );
            res
        }
    }
}

/// Answers the requests of one participant received since the last run.
///
/// Returns the number of messages answered.
pub fn process_chat(
    chat_id: i64,
    requests: &[StatusRequest],
    updates: &[ChatUpdate],
    log: &mut MessageLog,
    log_path: &Path,
    outbox: &mut dyn Outbox,
) -> TrackerResult<usize> {
    let msgs_user: Vec<&ChatMessage> = updates
        .iter()
        .filter_map(|u| u.message.as_ref())
        .filter(|m| m.from.id == chat_id)
        .collect();

    let last_handled = match log.last_handled(chat_id) {
        Some(id) => id,
        None => {
            let oldest = msgs_user.first().map(|m| m.message_id - 1).unwrap_or(0);
            debug!("process_chat: {}: initialising log at {}", chat_id, oldest);
            log.record_handled(chat_id, oldest, log_path)?;
            oldest
        }
    };
    debug!("process_chat: {}: last handled message {}", chat_id, last_handled);

    let mut answered = 0;
    for msg in msgs_user.iter().filter(|m| m.message_id > last_handled) {
        let text = match &msg.text {
            Some(t) => t,
            None => {
                error!("Message {} from {} has no text", msg.message_id, chat_id);
                continue;
            }
        };
        info!("Bot received a new message from {}: {}", chat_id, text);
        for reply in answer_request(requests, text) {
            outbox.send_text(chat_id, &reply)?;
        }
        log.record_handled(chat_id, msg.message_id, log_path)?;
        answered += 1;
    }
    Ok(answered)
}
