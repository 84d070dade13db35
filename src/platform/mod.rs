pub mod telegram;

/// A text message received from the chat platform
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Platform-specific chat ID as string
    pub chat_id: String,
    /// Platform-specific user ID as string, absent for channel posts
    pub user_id: Option<String>,
    /// The message text
    pub text: String,
}

#[cfg(test)]
impl IncomingMessage {
    pub fn test(text: &str) -> Self {
        Self {
            chat_id: "42".to_string(),
            user_id: Some("7".to_string()),
            text: text.to_string(),
        }
    }
}
