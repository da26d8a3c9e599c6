//! Error-forwarding snippet injected into every sandboxed document.

use super::message::IFRAME_ERROR_TYPE;

/// Installs `error` and `unhandledrejection` listeners that post
/// `{ type, error }` to the embedding window.
pub fn snippet() -> String {
    format!(
        r#"<script>
(function () {{
  function report(text) {{
    try {{
      window.parent.postMessage({{ type: "{tag}", error: String(text) }}, "*");
    }} catch (_) {{}}
  }}
  window.addEventListener("error", function (e) {{
    var msg = e && e.message ? e.message : String(e);
    if (e && e.lineno) {{ msg += " at line " + e.lineno; }}
    report(msg);
  }});
  window.addEventListener("unhandledrejection", function (e) {{
    var r = e && e.reason;
    report("Unhandled promise rejection: " + (r && r.message ? r.message : String(r)));
  }});
}})();
</script>
"#,
        tag = IFRAME_ERROR_TYPE
    )
}

/// Insert the snippet right before the first `</head>`, or at the very start
/// when the document has no head.
pub fn inject(html: &str) -> String {
    let snippet = snippet();
    match find_ascii_case_insensitive(html, "</head>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + snippet.len());
            out.push_str(&html[..pos]);
            out.push_str(&snippet);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{}{}", snippet, html),
    }
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}
