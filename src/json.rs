use regex::Regex;
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("fenced block pattern"));

/// Pulls the JSON payload out of free-form model output.
///
/// A fenced code block wins. Otherwise the text between the first `{` or `[`
/// and the last matching closer is returned. If neither applies the input
/// is handed back untouched so the JSON parser can report the problem.
pub fn extract_json_block(text: &str) -> &str {
    if let Some(content) = FENCED_BLOCK
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|content| content.as_str())
        .filter(|content| !content.is_empty())
    {
        return content.trim();
    }

    let start = match (text.find('{'), text.find('[')) {
        (Some(brace), Some(bracket)) => brace.min(bracket),
        (Some(brace), None) => brace,
        (None, Some(bracket)) => bracket,
        (None, None) => return text,
    };

    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    match text.rfind(closer) {
        Some(end) if end > start => text[start..=end].trim(),
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_fenced_block() {
        let text = "Here you go:\n```json\n{\"triplets\": []}\n```\nAnything else? {oops}";
        assert_eq!(extract_json_block(text), "{\"triplets\": []}");
    }

    #[test]
    fn accepts_untagged_fence() {
        let text = "```\n[1, 2]\n```";
        assert_eq!(extract_json_block(text), "[1, 2]");
    }

    #[test]
    fn falls_back_to_outer_braces() {
        let text = "Reasoning first... {\"result\": {\"nodes\": []}} trailing words";
        assert_eq!(extract_json_block(text), "{\"result\": {\"nodes\": []}}");
    }

    #[test]
    fn picks_whichever_opener_comes_first() {
        let text = "chain of thought\n[{\"hasAgent\": {}}]\nthat's all";
        assert_eq!(extract_json_block(text), "[{\"hasAgent\": {}}]");
    }

    #[test]
    fn returns_input_when_nothing_matches() {
        assert_eq!(extract_json_block("no json here"), "no json here");
        assert_eq!(extract_json_block("} backwards {"), "} backwards {");
    }
}
