//! Agent instructions and greetings.

pub const PERSONA: &str = include_str!("../../assets/persona.md");

pub const REALTIME_VOICE: &str = "Aoede";
pub const REALTIME_TEMPERATURE: f32 = 0.1;

pub const GREETING_INSTRUCTIONS: &str =
    "Greet the user warmly and offer your assistance. Keep it brief and friendly.";

pub const FALLBACK_GREETING: &str = "Hello! I'm your AI assistant. How can I help you today?";

/// Persona plus who the student is and what we remember about them.
pub fn session_instructions(
    persona: &str,
    display_name: Option<&str>,
    memory_context: &str,
) -> String {
    let mut instructions = persona.trim_end().to_string();
    if let Some(name) = display_name {
        instructions.push_str(&format!("\n\nThe student's name is {name}."));
    }
    if !memory_context.is_empty() {
        instructions.push_str(
            "\n\nUse these notes from earlier sessions to personalise the conversation. \
Do not read them out verbatim.\n\n",
        );
        instructions.push_str(memory_context);
    }
    instructions
}

/// Returning students get a greeting that picks up where they left off.
pub fn greeting_instructions(display_name: Option<&str>, has_memory: bool) -> String {
    match (display_name, has_memory) {
        (Some(name), true) => format!(
            "Greet {name} warmly as a returning student, briefly mention something from your \
previous sessions, and offer your assistance. Keep it brief and friendly."
        ),
        (Some(name), false) => format!(
            "Greet {name} warmly and offer your assistance. Keep it brief and friendly."
        ),
        (None, _) => GREETING_INSTRUCTIONS.to_string(),
    }
}
