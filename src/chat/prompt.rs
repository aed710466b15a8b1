use super::message::Message;

pub const SYSTEM_FRAMING: &str = "You are NeuroBuddy, a warm and attentive wellness intake \
assistant. Listen carefully, ask one gentle follow-up question at a time, and never offer a \
diagnosis. Keep replies short and supportive.";

pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(Message::prompt_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// System framing followed by the transcript, which already ends with the current user turn.
pub fn chat_prompt(messages: &[Message]) -> String {
    format!("{}\n\n{}", SYSTEM_FRAMING, render_transcript(messages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_prompt_lists_every_turn_in_order() {
        let messages = vec![
            Message::assistant("Hello! How can I assist you today?"),
            Message::user("I feel tired"),
        ];
        let prompt = chat_prompt(&messages);

        assert!(prompt.starts_with(SYSTEM_FRAMING));
        assert!(prompt.ends_with(
            "assistant: Hello! How can I assist you today?\nuser: I feel tired"
        ));
    }
}
