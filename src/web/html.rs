use crate::inspector::ImageInfo;

const INDEX: &str = include_str!("templates/index.html");
const IMAGE_DETAILS: &str = include_str!("templates/image_details.html");

pub fn index() -> String {
    INDEX.to_string()
}

pub fn image_details(info: &ImageInfo) -> String {
    render(
        IMAGE_DETAILS,
        &[
            ("Name", escape(info.name())),
            ("Size", escape(info.size())),
            ("Layers", info.layers().to_string()),
        ],
    )
}

/// Fill `{{Key}}` placeholders in a single pass over `template`. Substituted
/// values are never scanned again. Unknown placeholders are left as they are.
fn render(template: &str, fields: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let field = after
            .find("}}")
            .and_then(|end| fields.iter().find(|(key, _)| *key == &after[..end]).map(|(_, value)| (end, value)));
        match field {
            Some((end, value)) => {
                out.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
