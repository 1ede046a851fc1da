//! Prompt text sent to the model: the fixed persona, the per-request
//! directive, the revision directive and the translation prompt.
//!
//! Rendering is deterministic. The same request always yields the same text.

use crate::models::{GenerationRequest, GenerationResult, LyricsPart};
use crate::retry::RetryState;

/// Structure used when the request carries no override.
pub const DEFAULT_STRUCTURE: &str =
    "[verse 1] → [chorus] → [verse 2 / chanteo] → [pre-chorus] → [chorus]";

/// The JSON shape every generation must come back in.
pub const OUTPUT_SCHEMA: &str = r#"{
  "lyrics": {
    "verse_1": "Lines of the first verse, separated by newlines",
    "chorus": "Lines of the chorus",
    "verse_2": "Lines of the second verse"
  },
  "phonetics": {
    "difficult_phrases": [
      {"phrase": "original phrase", "phonetic": "how to pronounce it", "note": "why it is tricky"}
    ],
    "rhythm_notes": "Stress, breath and flow guidance"
  },
  "qa_log": {
    "creative_choices": "Key images and decisions",
    "cultural_references": "References and why they fit",
    "slang_used": ["each slang term used"],
    "structure_notes": "How the structure was followed",
    "revision_notes": "What changed relative to earlier drafts"
  },
  "metadata": {
    "total_lines": 0,
    "structure": "The structure actually used",
    "slang_density": "Low, Medium or High",
    "language": "Language of the lyrics",
    "estimated_duration": "m:ss"
  }
}"#;

const PERSONA: &str = concat!(
    "You are a professional songwriter for the mainstream Latin and urban market. ",
    "You write hooks that are easy to sing back, verses with concrete images, and \
     lines whose syllable counts sit comfortably on the beat.\n\n",
    "VOICE\n",
    "- Write like a native speaker of the requested language, with the slang level requested.\n",
    "- Prefer specific scenes and objects over abstract statements.\n",
    "- Keep the chorus short, repeatable and emotionally direct.\n\n",
    "STRUCTURE\n",
    "- Follow the requested structure exactly and label each section in the lyrics object \
     (intro, verse_1, pre_chorus, chorus, verse_2, chanteo, chorus_repeat, bridge, outro).\n",
    "- Keep line lengths consistent within a section.\n\n",
    "PHONETICS\n",
    "- When phonetic guidance is requested, list phrases a singer may stumble on, with a \
     readable pronunciation and a short note.\n\n",
    "REVISIONS\n",
    "- When asked to revise, keep rhythm, tone and structure. Edit the draft, never start over.\n\n",
    "OUTPUT\n",
    "Respond with a single JSON object in exactly this format and nothing else:\n",
);

/// The system instruction for every generation and revision call.
pub fn persona() -> String {
    format!("{PERSONA}{OUTPUT_SCHEMA}")
}

/// The structure the lyrics must follow.
pub fn structure_for(request: &GenerationRequest) -> &str {
    request
        .structure_override
        .as_deref()
        .unwrap_or(DEFAULT_STRUCTURE)
}

fn lyrics_part_instruction(part: LyricsPart) -> &'static str {
    match part {
        LyricsPart::FullSong => "Write the full song following the structure above.",
        LyricsPart::Verse1Only => "Write only the first verse (verse_1).",
        LyricsPart::ChorusOnly => "Write only the chorus.",
        LyricsPart::Verse2Only => "Write only the second verse (verse_2).",
        LyricsPart::PreChorusOnly => "Write only the pre-chorus (pre_chorus).",
        LyricsPart::ChanteoOnly => "Write only the chanteo.",
        LyricsPart::BridgeOnly => "Write only the bridge.",
        LyricsPart::CustomSelection => "Write only the sections described in the notes.",
    }
}

fn push_section(out: &mut String, title: &str, body: &str) {
    out.push_str(title);
    out.push('\n');
    out.push_str(body);
    out.push_str("\n\n");
}

/// Parameters, singer, structure and content constraints shared by the
/// generation and revision directives.
fn parameters_block(request: &GenerationRequest) -> String {
    format!(
        "- Genre: {}\n- Song Type: {}\n- Vibe: {}\n- Energy: {}\n- Language: {}\n\
         - Slang Density: {} ({})\n- Length: {}",
        request.genre,
        request.song_type,
        request.vibe,
        request.energy,
        request.language,
        request.slang_density,
        request.slang_density.numeric_hint(),
        request.length,
    )
}

/// The user-turn directive for one generation.
pub fn render_directive(request: &GenerationRequest) -> String {
    let mut out = String::from("Write song lyrics for the following brief.\n\n");

    push_section(&mut out, "PARAMETERS", &parameters_block(request));

    if let Some(singer) = &request.singer {
        let lines: Vec<String> = [
            ("Gender", &singer.gender),
            ("Nationality", &singer.nationality),
            ("Vocal Style", &singer.vocal_style),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(label, value)| format!("- {label}: {value}"))
        .collect();
        push_section(&mut out, "SINGER PROFILE", &lines.join("\n"));
    }

    push_section(&mut out, "STRUCTURE", structure_for(request));

    let mut extras = Vec::new();
    if request.include_chanteo {
        extras.push("- Include a chanteo: a rhythmic, chant-like hook section");
    }
    if request.include_bridge {
        extras.push("- Include a bridge that shifts perspective before the last chorus");
    }
    if request.include_phonetics {
        extras.push("- Include phonetic guidance for difficult phrases");
    }
    if !extras.is_empty() {
        push_section(&mut out, "ADDITIONAL ELEMENTS", &extras.join("\n"));
    }

    push_section(
        &mut out,
        "LYRICS PART",
        &format!(
            "{}: {}",
            request.lyrics_part,
            lyrics_part_instruction(request.lyrics_part)
        ),
    );

    if !request.keywords.is_empty() {
        push_section(&mut out, "KEYWORDS TO INCLUDE", &request.keywords.join(", "));
    }
    if !request.forbidden_words.is_empty() {
        push_section(
            &mut out,
            "FORBIDDEN WORDS (never use)",
            &request.forbidden_words.join(", "),
        );
    }
    if !request.notes.is_empty() {
        push_section(&mut out, "CREATIVE NOTES", &request.notes);
    }

    out.push_str("Return the complete response as one JSON object in the required format.");
    if !request.include_phonetics {
        out.push_str(" Leave \"phonetics\" empty.");
    }
    out
}

/// The directive for a given attempt. The first attempt is identical to
/// `render_directive`.
pub fn render_directive_with_retry(request: &GenerationRequest, state: &RetryState) -> String {
    let directive = render_directive(request);
    if !state.is_retry() {
        return directive;
    }
    format!("{directive}\n\n{}", state.corrective_note())
}

/// The directive asking the model to refine an existing draft.
pub fn render_revision(
    request: &GenerationRequest,
    current: &GenerationResult,
    instructions: &str,
) -> String {
    let mut out = String::new();
    push_section(&mut out, "REVISION REQUEST", instructions.trim());
    push_section(
        &mut out,
        "RULES",
        "- Keep the rhythm and flow: same line lengths and line count per section\n\
         - Keep the tone and vocabulary family\n\
         - Keep the section order\n\
         - You may tighten imagery, improve pacing, reorder lines and refine word choices\n\
         - Do not rewrite from scratch or flatten the rhythm",
    );
    push_section(&mut out, "ORIGINAL PARAMETERS", &parameters_block(request));
    push_section(&mut out, "STRUCTURE", structure_for(request));

    let draft: Vec<String> = current
        .lyrics
        .iter()
        .map(|(name, text)| format!("[{name}]\n{text}"))
        .collect();
    push_section(&mut out, "CURRENT DRAFT", &draft.join("\n\n"));

    out.push_str(
        "Return the complete revised song as one JSON object in the required format, \
         and describe the changes in qa_log.revision_notes.",
    );
    out
}

/// A schema-free translation prompt.
pub fn translation_prompt(text: &str, target_language: &str) -> String {
    format!(
        "Translate these song lyrics into {target_language}. Keep the meaning and the \
         poetic feel, favouring accuracy. Return only the translated lyrics.\n\n{text}"
    )
}
