use crate::chat::Session;
use crate::chat::prompt::render_transcript;

pub const REPORT_SECTIONS: [&str; 7] = [
    "Session Overview",
    "Key Discussion Points",
    "Emotional Assessment",
    "Behavioral Observations",
    "Risk Assessment",
    "Recommendations",
    "Follow-up Plan",
];

const REPORT_INSTRUCTIONS: &str = "You are preparing a clinical intake summary from a \
conversation between a user and the NeuroBuddy assistant. Write the report in markdown using \
exactly these section headers, in this order:";

pub fn report_prompt(session: &Session) -> String {
    let headers = REPORT_SECTIONS
        .iter()
        .map(|section| format!("## {}", section))
        .collect::<Vec<_>>()
        .join("\n");
    let emotion = session.final_emotion();

    format!(
        "{}\n\n{}\n\nTranscript:\n{}\n\nFacial affect observed during intake: {} ({:.0}% confidence)",
        REPORT_INSTRUCTIONS,
        headers,
        render_transcript(session.messages()),
        emotion.label,
        emotion.confidence * 100.0
    )
}
