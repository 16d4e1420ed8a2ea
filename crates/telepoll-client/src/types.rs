//! Update and identity records delivered by the Bot API.
//!
//! The engine only ever interprets `update_id`; the rest of an update is
//! carried through untouched so consumers can pick out whatever payload
//! fields they care about.

use serde::{Deserialize, Serialize};

/// A single incoming update.
///
/// Updates arrive in batches sorted ascending by `update_id` and are
/// delivered to the consumer in that order, at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Monotonically increasing sequence number assigned by the server.
    pub update_id: i64,

    /// The update payload, keyed by category name (`message`,
    /// `callback_query`, ...). Exactly one category key is present per
    /// update; the value is the raw record for that category.
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl Update {
    /// The category of this update, if the payload carries a known one.
    pub fn kind(&self) -> Option<UpdateKind> {
        self.payload.keys().find_map(|key| UpdateKind::from_wire(key))
    }
}

/// Identity record returned by the `getMe` probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

/// Update categories the poller can subscribe to via `allowed_updates`.
///
/// An empty allow-list means the server sends every category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    BusinessConnection,
    BusinessMessage,
    EditedBusinessMessage,
    DeletedBusinessMessages,
    MessageReaction,
    MessageReactionCount,
    InlineQuery,
    ChosenInlineResult,
    CallbackQuery,
    ShippingQuery,
    PreCheckoutQuery,
    PurchasedPaidMedia,
    Poll,
    PollAnswer,
    MyChatMember,
    ChatMember,
    ChatJoinRequest,
    ChatBoost,
    RemovedChatBoost,
}

impl UpdateKind {
    /// The wire name used in query parameters and payload keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Message => "message",
            UpdateKind::EditedMessage => "edited_message",
            UpdateKind::ChannelPost => "channel_post",
            UpdateKind::EditedChannelPost => "edited_channel_post",
            UpdateKind::BusinessConnection => "business_connection",
            UpdateKind::BusinessMessage => "business_message",
            UpdateKind::EditedBusinessMessage => "edited_business_message",
            UpdateKind::DeletedBusinessMessages => "deleted_business_messages",
            UpdateKind::MessageReaction => "message_reaction",
            UpdateKind::MessageReactionCount => "message_reaction_count",
            UpdateKind::InlineQuery => "inline_query",
            UpdateKind::ChosenInlineResult => "chosen_inline_result",
            UpdateKind::CallbackQuery => "callback_query",
            UpdateKind::ShippingQuery => "shipping_query",
            UpdateKind::PreCheckoutQuery => "pre_checkout_query",
            UpdateKind::PurchasedPaidMedia => "purchased_paid_media",
            UpdateKind::Poll => "poll",
            UpdateKind::PollAnswer => "poll_answer",
            UpdateKind::MyChatMember => "my_chat_member",
            UpdateKind::ChatMember => "chat_member",
            UpdateKind::ChatJoinRequest => "chat_join_request",
            UpdateKind::ChatBoost => "chat_boost",
            UpdateKind::RemovedChatBoost => "removed_chat_boost",
        }
    }

    /// Parse a wire name back into a category.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|kind| kind.as_str() == name)
    }

    /// Every category the API supports.
    pub fn all() -> &'static [UpdateKind] {
        &[
            UpdateKind::Message,
            UpdateKind::EditedMessage,
            UpdateKind::ChannelPost,
            UpdateKind::EditedChannelPost,
            UpdateKind::BusinessConnection,
            UpdateKind::BusinessMessage,
            UpdateKind::EditedBusinessMessage,
            UpdateKind::DeletedBusinessMessages,
            UpdateKind::MessageReaction,
            UpdateKind::MessageReactionCount,
            UpdateKind::InlineQuery,
            UpdateKind::ChosenInlineResult,
            UpdateKind::CallbackQuery,
            UpdateKind::ShippingQuery,
            UpdateKind::PreCheckoutQuery,
            UpdateKind::PurchasedPaidMedia,
            UpdateKind::Poll,
            UpdateKind::PollAnswer,
            UpdateKind::MyChatMember,
            UpdateKind::ChatMember,
            UpdateKind::ChatJoinRequest,
            UpdateKind::ChatBoost,
            UpdateKind::RemovedChatBoost,
        ]
    }

    /// The categories most bots care about.
    pub fn common() -> &'static [UpdateKind] {
        &[
            UpdateKind::Message,
            UpdateKind::EditedMessage,
            UpdateKind::CallbackQuery,
            UpdateKind::InlineQuery,
            UpdateKind::ChosenInlineResult,
        ]
    }

    /// Parse a comma-separated list of wire names, e.g. from an
    /// environment variable. Whitespace is trimmed; unknown names are
    /// skipped with a warning.
    pub fn parse_list(value: &str) -> Vec<UpdateKind> {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(|part| {
                let kind = UpdateKind::from_wire(part);
                if kind.is_none() {
                    tracing::warn!(name = part, "ignoring unknown update category");
                }
                kind
            })
            .collect()
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
