use crate::model::Message;

/// History size forwarded to the generation API.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// The last `n` messages, or all of them when there are fewer.
///
/// Borrowed view; the stored conversation keeps its full history.
pub fn recent_messages(messages: &[Message], n: usize) -> &[Message] {
    if messages.len() <= n {
        messages
    } else {
        &messages[messages.len() - n..]
    }
}
