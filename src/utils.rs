/// Converts a URL or path into a safe local filename.
pub fn sanitize_filename(reference: &str) -> String {
    let mut name = reference
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .to_string();
    name = name.replace(['/', ':', '?', '&', '=', '#', '%', '\\'], "_");

    if name.chars().count() > 100 {
        name = name.chars().take(100).collect();
    }
    if name.is_empty() {
        "file".to_string()
    } else {
        name
    }
}

/// Turns a URL segment or file stem into a readable title:
/// "getting-started" becomes "Getting Started".
pub fn prettify_stem(stem: &str) -> String {
    let words: Vec<String> = stem
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        "Untitled".to_string()
    } else {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_protocol_and_separators() {
        assert_eq!(
            sanitize_filename("https://example.com/img/logo.png"),
            "example.com_img_logo.png"
        );
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "a/".repeat(200);
        assert_eq!(sanitize_filename(&long).len(), 100);
    }

    #[test]
    fn test_prettify_stem_title_cases_words() {
        assert_eq!(prettify_stem("getting-started"), "Getting Started");
        assert_eq!(prettify_stem("api_reference"), "Api Reference");
        assert_eq!(prettify_stem(""), "Untitled");
    }
}
