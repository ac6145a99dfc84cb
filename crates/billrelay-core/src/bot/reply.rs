//! Transport independent bot output

use super::callback::Callback;
use super::messages;

/// An inline button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Label shown to the user
    pub label: String,
    /// Action sent back when pressed
    pub callback: Callback,
}

impl Button {
    /// Create a button
    pub fn new(label: impl Into<String>, callback: Callback) -> Self {
        Self {
            label: label.into(),
            callback,
        }
    }
}

/// Keyboard attached to a sent message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Markup {
    /// Leave the current keyboard as is
    #[default]
    None,
    /// Show the main reply keyboard
    MainMenu,
    /// Hide the reply keyboard
    RemoveKeyboard,
    /// Inline buttons, row by row
    Inline(Vec<Vec<Button>>),
}

/// One thing the transport has to do in response to an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Send a message
    Text {
        /// Message text
        text: String,
        /// Keyboard
        markup: Markup,
    },
    /// Send a message that is deleted later by [`Reply::DeletePrompt`]
    Prompt {
        /// Message text
        text: String,
    },
    /// Replace the message the pressed button belongs to
    Edit {
        /// New text
        text: String,
        /// New inline buttons
        buttons: Vec<Vec<Button>>,
    },
    /// Delete the incoming message
    DeleteIncoming,
    /// Delete the last [`Reply::Prompt`] of the chat
    DeletePrompt,
}

impl Reply {
    /// Plain message
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            markup: Markup::None,
        }
    }

    /// Message with a keyboard
    pub fn with_markup(text: impl Into<String>, markup: Markup) -> Self {
        Self::Text {
            text: text.into(),
            markup,
        }
    }

    /// Edit without buttons
    pub fn edit(text: impl Into<String>) -> Self {
        Self::Edit {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    /// Edit with buttons
    pub fn edit_with(text: impl Into<String>, buttons: Vec<Vec<Button>>) -> Self {
        Self::Edit {
            text: text.into(),
            buttons,
        }
    }

    /// Text of the reply, if it carries any
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } | Self::Prompt { text } | Self::Edit { text, .. } => Some(text),
            Self::DeleteIncoming | Self::DeletePrompt => None,
        }
    }
}

/// Labels of the main reply keyboard, row by row
pub fn main_menu_rows() -> Vec<Vec<&'static str>> {
    vec![
        vec![messages::BTN_BALANCE, messages::BTN_NOTIFICATIONS],
        vec![messages::BTN_HELP],
    ]
}

/// Buttons of the notifications menu
pub fn notifications_menu() -> Vec<Vec<Button>> {
    vec![
        vec![Button::new(messages::BTN_SET_NOTIFICATION, Callback::SetNotification)],
        vec![Button::new(messages::BTN_MY_NOTIFICATIONS, Callback::ListNotifications)],
        vec![Button::new(messages::BTN_DELETE, Callback::DeleteMenu)],
    ]
}

/// Single back button
pub fn back_row() -> Vec<Button> {
    vec![Button::new(messages::BTN_BACK, Callback::Back)]
}
