use serde::Deserialize;
use serde_json::Value;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const UNRECOGNIZED_EVENT: &str = "Unrecognized Control Message Type";

// -----------------------------------------------------------------------------
// ----- EventKind -------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    #[serde(alias = "channel-new")]
    ChannelCreated,

    #[serde(alias = "channel-update")]
    ChannelUpdated,

    #[serde(alias = "channel-delete")]
    ChannelDeleted,

    #[serde(alias = "message-new")]
    MessageCreated,

    #[serde(alias = "message-update")]
    MessageUpdated,

    #[serde(alias = "message-delete")]
    MessageDeleted,

    #[default]
    #[serde(other)]
    Unknown,
}

// -----------------------------------------------------------------------------
// ----- EventNotification -----------------------------------------------------

/// A backend event as published on the queue.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventNotification {
    #[serde(rename = "type", default)]
    pub kind: EventKind,

    #[serde(default)]
    pub channel: Option<Value>,

    #[serde(rename = "channelID", default)]
    pub channel_id: Option<Value>,

    #[serde(default)]
    pub message: Option<Value>,

    #[serde(rename = "messageID", default)]
    pub message_id: Option<Value>,

    #[serde(rename = "userIDs", default)]
    pub user_ids: Option<Vec<i64>>,
}

impl EventNotification {
    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Text written to each recipient's socket.
    ///
    /// Created and updated events carry the entity, deleted events its id.
    pub fn render(&self) -> String {
        let field = match self.kind {
            EventKind::ChannelCreated | EventKind::ChannelUpdated => &self.channel,
            EventKind::ChannelDeleted => &self.channel_id,
            EventKind::MessageCreated | EventKind::MessageUpdated => &self.message,
            EventKind::MessageDeleted => &self.message_id,
            EventKind::Unknown => return UNRECOGNIZED_EVENT.to_string(),
        };

        match field {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    /// Absent or empty `userIDs` means everyone.
    pub fn is_broadcast(&self) -> bool {
        self.user_ids.as_ref().is_none_or(|ids| ids.is_empty())
    }

    pub fn is_recipient(&self, principal: i64) -> bool {
        match &self.user_ids {
            Some(ids) if !ids.is_empty() => ids.contains(&principal),
            _ => true,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
