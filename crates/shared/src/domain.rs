use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PortalError;

macro_rules! text_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

text_newtype!(GroupId);
text_newtype!(RoomId);

/// Identity of a remote chat as seen by the bridge.
///
/// Group chats are shared by every local user and carry no receiver. One-to-one
/// chats are keyed by the remote user's UUID and scoped to the local user that
/// owns the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "snake_case",
    try_from = "UncheckedPortalKey"
)]
pub enum PortalKey {
    Group { chat_id: GroupId },
    Private { recipient: Uuid, receiver: String },
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum UncheckedPortalKey {
    Group { chat_id: GroupId },
    Private { recipient: Uuid, receiver: String },
}

impl TryFrom<UncheckedPortalKey> for PortalKey {
    type Error = PortalError;

    fn try_from(value: UncheckedPortalKey) -> Result<Self, Self::Error> {
        match value {
            UncheckedPortalKey::Group { chat_id } => Ok(Self::Group { chat_id }),
            UncheckedPortalKey::Private {
                recipient,
                receiver,
            } => Self::private(recipient, receiver),
        }
    }
}

impl PortalKey {
    pub fn group(chat_id: impl Into<GroupId>) -> Self {
        Self::Group {
            chat_id: chat_id.into(),
        }
    }

    pub fn private(recipient: Uuid, receiver: impl Into<String>) -> Result<Self, PortalError> {
        let receiver = receiver.into();
        if receiver.is_empty() {
            return Err(PortalError::InvalidKey(format!(
                "private chat with {recipient} needs a non-empty receiver"
            )));
        }
        Ok(Self::Private {
            recipient,
            receiver,
        })
    }

    /// Rejects a private key built by hand with an empty receiver, which would
    /// be stored and read back as a group key.
    pub fn validate(&self) -> Result<(), PortalError> {
        match self {
            Self::Private {
                recipient,
                receiver,
            } if receiver.is_empty() => Err(PortalError::InvalidKey(format!(
                "private chat with {recipient} needs a non-empty receiver"
            ))),
            _ => Ok(()),
        }
    }

    /// Text form of the chat identifier as stored in the `chat_id` column.
    pub fn chat_id_text(&self) -> String {
        match self {
            Self::Group { chat_id } => chat_id.0.clone(),
            Self::Private { recipient, .. } => recipient.to_string(),
        }
    }

    pub fn receiver(&self) -> &str {
        match self {
            Self::Group { .. } => "",
            Self::Private { receiver, .. } => receiver,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private { .. })
    }
}

impl fmt::Display for PortalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group { chat_id } => write!(f, "group:{chat_id}"),
            Self::Private {
                recipient,
                receiver,
            } => write!(f, "private:{recipient}@{receiver}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portal {
    pub key: PortalKey,
    pub mxid: Option<RoomId>,
    pub name: Option<String>,
    pub encrypted: bool,
}

impl Portal {
    /// A portal that has been observed but not bridged to a room yet.
    pub fn pending(key: PortalKey, name: Option<String>) -> Self {
        Self {
            key,
            mxid: None,
            name,
            encrypted: false,
        }
    }

    pub fn has_room(&self) -> bool {
        self.mxid.is_some()
    }
}
