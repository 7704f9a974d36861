//! Starter buffers for freshly created rooms.

use codesync_protocol::LanguageTag;

const JAVASCRIPT: &str = "// Welcome to CodeSync! 🚀\nconsole.log(\"Hello, World!\");";

const PYTHON: &str = "# Welcome to CodeSync! 🚀\nprint(\"Hello, World!\")";

const HTML: &str = "<!DOCTYPE html>\n<html>\n<head>\n  <title>CodeSync</title>\n</head>\n<body>\n  <h1>Hello, World!</h1>\n</body>\n</html>";

/// Returns the buffer a new room starts with for `language`.
pub fn default_buffer(language: LanguageTag) -> &'static str {
    match language {
        LanguageTag::JavaScript => JAVASCRIPT,
        LanguageTag::Python => PYTHON,
        LanguageTag::Html => HTML,
    }
}
