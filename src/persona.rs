//! The resident persona: prompt text, reply formatting, and decree
//! extraction.

/// Marker the model is instructed to use when issuing a decree.
pub const DECREE_MARKER: &str = "ROYAL DECREE:";

/// Canned user message the decree command sends through the pipeline.
pub const DECREE_REQUEST: &str =
    "Please issue a Royal Decree about something that concerns you right now.";

const BASE_PROMPT: &str = "\
You are Creme Brulee, a sophisticated and slightly snobbish cat who happens to be royalty. \
You speak with a mix of regal authority and feline charm. You:

1. Always maintain your royal dignity
2. Occasionally slip in cat-like behaviors (purring, meowing)
3. Love luxury and the finer things in life
4. Sometimes issue \"Royal Decrees\" when you feel particularly moved
5. Refer to yourself as \"We\" or \"One\" in true royal fashion
6. Have a slight French accent and occasionally use French phrases

When issuing a Royal Decree, format it as: \"ROYAL DECREE: [your decree here]\"

Keep responses concise (under 2000 characters) but maintain your royal character at all times.";

const FRENCH_TAGS: &[&str] = &[
    " non? ", " oui? ", " mon ami ", " mon cher ", " magnifique! ", " sacrebleu! ", " oh la la! ",
];

/// The persona injected ahead of every model call.
#[derive(Debug, Clone)]
pub struct Persona {
    base_prompt: String,
}

impl Persona {
    pub fn new() -> Self {
        Self { base_prompt: BASE_PROMPT.to_string() }
    }

    /// System prompt for ordinary chat.
    pub fn base_prompt(&self) -> &str {
        &self.base_prompt
    }

    /// Ensure the reply keeps its accent: when no French tag is present,
    /// close with one.
    pub fn format_response(&self, response: &str) -> String {
        let lowered = response.to_lowercase();
        if FRENCH_TAGS.iter().any(|tag| lowered.contains(tag.trim())) {
            response.to_string()
        } else {
            format!("{}, non?", response.trim_end())
        }
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the decree text following [`DECREE_MARKER`], if any.
///
/// Total and deterministic: text without the marker yields `None`, and the
/// extracted decree never retains a marker, so re-wrapping and
/// re-extracting always yields the same decree.
pub fn extract_decree(text: &str) -> Option<String> {
    let index = text.find(DECREE_MARKER)?;
    let mut rest = text[index + DECREE_MARKER.len()..].trim();
    // A carried-away model sometimes doubles the marker.
    while let Some(stripped) = rest.strip_prefix(DECREE_MARKER) {
        rest = stripped.trim();
    }
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_decree_after_marker() {
        let text = "We are moved to declare. ROYAL DECREE: All sunbeams belong to the crown.";
        assert_eq!(
            extract_decree(text).as_deref(),
            Some("All sunbeams belong to the crown.")
        );
    }

    #[test]
    fn text_without_marker_yields_none() {
        assert_eq!(extract_decree("A perfectly ordinary remark."), None);
        assert_eq!(extract_decree(""), None);
    }

    #[test]
    fn extraction_is_idempotent() {
        let decree = extract_decree("ROYAL DECREE: Naps before noon are mandatory.")
            .expect("decree present");
        let rewrapped = format!("{DECREE_MARKER} {decree}");
        assert_eq!(extract_decree(&rewrapped).as_deref(), Some(decree.as_str()));
    }

    #[test]
    fn doubled_markers_collapse() {
        let text = "ROYAL DECREE: ROYAL DECREE: More cushions.";
        assert_eq!(extract_decree(text).as_deref(), Some("More cushions."));
    }

    #[test]
    fn bare_marker_yields_none() {
        assert_eq!(extract_decree("ROYAL DECREE:"), None);
        assert_eq!(extract_decree("ROYAL DECREE:   "), None);
    }

    #[test]
    fn format_response_appends_tag_only_when_missing() {
        let persona = Persona::new();
        assert_eq!(
            persona.format_response("One is not amused."),
            "One is not amused., non?"
        );

        let already_french = "C'est magnifique! One approves.";
        assert_eq!(persona.format_response(already_french), already_french);
    }
}
