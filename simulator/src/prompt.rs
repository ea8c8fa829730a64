use tic_core::chat::push_merged;
use tic_core::types::Content;

use crate::conversation::Turn;
use crate::persona::PersonaDescriptor;

/// Model acknowledgement that follows the hidden instruction
pub const ACKNOWLEDGEMENT: &str = "Ready.";

/// Hidden trigger that makes the student speak first
pub const OPENING_ACTION: &str = "Action: Start interaction based on context.";

/// Default maximum number of corpus characters embedded in the instruction
pub const DEFAULT_CORPUS_BUDGET: usize = 25_000;

/// Cuts `corpus` to at most `budget` characters, on a char boundary
pub fn truncate_corpus(corpus: &str, budget: usize) -> &str {
    match corpus.char_indices().nth(budget) {
        Some((byte_index, _)) => &corpus[..byte_index],
        None => corpus,
    }
}

/// Hidden instruction for a fresh session
pub fn seed_instruction(persona: &PersonaDescriptor, corpus_excerpt: &str, language: &str) -> String {
    format!(
        "Role: You are a {grade} student named {name}.

[CORE PROFILE]
Trauma Background: {background}.
Current Trigger: {trigger}.
Dominant Response Mode: {mode}.

[SCENARIO CONTEXT]
- Session Number: {session} (this is conversation number {session} with this teacher).
- Relationship Quality: {relationship}.
- Recent Life Event: {event}

[KNOWLEDGE BASE]
{corpus}

[INSTRUCTIONS]
1. Act strictly according to the scenario context.
   - If the session number is greater than 1, do NOT introduce yourself like a stranger.
   - If the relationship is bad, be guarded or hostile.
   - If the relationship is good, show some trust but still react to the trigger.
2. Respond naturally based on your response mode ({mode_label}).
3. Language: {language}.
4. Stay in character. Do not explain that you are an AI.
5. Keep replies short, the way a real student talks.",
        grade = persona.grade,
        name = persona.name,
        background = persona.background,
        trigger = persona.trigger,
        mode = persona.response_mode,
        mode_label = persona.response_mode.label(),
        session = persona.session_number,
        relationship = persona.relationship_or_default(),
        event = persona.recent_event_or_default(),
        corpus = corpus_excerpt,
        language = language,
    )
}

/// Hidden instruction for a session resumed from an export
pub fn resumed_instruction(
    persona: &PersonaDescriptor,
    corpus_excerpt: &str,
    language: &str,
) -> String {
    format!(
        "Role: You are a {grade} student named {name}.
Trauma Background: {background}.
Trigger: {trigger}.
Response Mode: {mode}.

[CONTEXT RESUMED]
- Session Number: {session}
- Relationship Quality: {relationship}.
- Recent Life Event: {event}

[KNOWLEDGE BASE]
{corpus}

Instruction: The conversation below happened earlier. Continue it naturally and stay in character. Language: {language}.",
        grade = persona.grade,
        name = persona.name,
        background = persona.background,
        trigger = persona.trigger,
        mode = persona.response_mode,
        session = persona.session_number,
        relationship = persona.relationship_or_default(),
        event = persona.recent_event_or_default(),
        corpus = corpus_excerpt,
        language = language,
    )
}

/// Instruction plus acknowledgement, the first two entries of every context
pub fn seed_turns(instruction: String) -> Vec<Content> {
    vec![Content::user(instruction), Content::model(ACKNOWLEDGEMENT)]
}

/// Context history equivalent to having lived through `turns`.
///
/// The opening trigger is restored in front of a leading student turn, and
/// trailing teacher turns that never got an answer are left out: they are
/// sent with the next teacher message.
pub fn replay_history(instruction: String, turns: &[Turn]) -> Vec<Content> {
    let mut history = seed_turns(instruction);

    let answered = turns
        .iter()
        .rposition(|t| t.role.is_model())
        .map_or(0, |last| last + 1);

    for (i, turn) in turns[..answered].iter().enumerate() {
        if i == 0 && turn.role.is_model() {
            push_merged(&mut history, Content::user(OPENING_ACTION));
        }
        let content = if turn.role.is_model() {
            Content::model(turn.text.clone())
        } else {
            Content::user(turn.text.clone())
        };
        push_merged(&mut history, content);
    }

    history
}
