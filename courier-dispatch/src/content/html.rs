//! Image and signature blocks spliced into rendered bodies.

/// Byte range of the first `<p ...>...</p>` element, matched case-insensitively.
fn first_paragraph(html: &str) -> Option<(usize, usize)> {
    let lower = html.to_ascii_lowercase();
    let mut from = 0;

    while let Some(found) = lower[from..].find("<p") {
        let start = from + found;
        let tag_rest = &lower[start + 2..];
        let is_paragraph = tag_rest
            .chars()
            .next()
            .is_some_and(|c| c == '>' || c.is_ascii_whitespace());

        if is_paragraph {
            let open_end = start + 2 + tag_rest.find('>')? + 1;
            let close = lower[open_end..].find("</p>")?;
            return Some((start, open_end + close + "</p>".len()));
        }
        from = start + 2;
    }

    None
}

/// Insert a centred image after the first paragraph, or at the top when the
/// body has none. Bodies that already reference `image_url` are unchanged.
#[must_use]
pub fn inject_image(html: &str, image_url: &str) -> String {
    if image_url.is_empty() || html.contains(image_url) {
        return html.to_string();
    }

    let block = format!(
        r#"<div style="text-align: center; margin: 20px 0;"><img src="{image_url}" style="max-width: 100%; height: auto;" alt="Template image" /></div>"#
    );

    match first_paragraph(html) {
        Some((_, end)) => {
            let mut output = String::with_capacity(html.len() + block.len());
            output.push_str(&html[..end]);
            output.push_str(&block);
            output.push_str(&html[end..]);
            output
        }
        None => block + html,
    }
}

/// Append a signature image below the body unless it is already present.
#[must_use]
pub fn inject_signature(html: &str, signature_url: &str) -> String {
    if signature_url.is_empty() || html.contains(signature_url) {
        return html.to_string();
    }

    format!(
        r#"{html}<div style="margin-top: 30px; padding-top: 20px; border-top: 1px solid #eee; text-align: right;"><img src="{signature_url}" style="max-width: 200px; height: auto;" alt="Signature" /></div>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE: &str = "https://cdn.example.com/banner.png";

    #[test]
    fn image_goes_after_first_paragraph() {
        let html = r#"<P class="lead">Olá</P><p>Segundo</p>"#;
        let out = inject_image(html, IMAGE);

        assert!(out.starts_with(r#"<P class="lead">Olá</P><div style="text-align: center;"#));
        assert!(out.ends_with("<p>Segundo</p>"));
        assert_eq!(out.matches(IMAGE).count(), 1);
    }

    #[test]
    fn image_is_prepended_without_paragraphs() {
        let out = inject_image("<pre>x</pre><div>body</div>", IMAGE);
        assert!(out.starts_with("<div style=\"text-align: center;"));
        assert!(out.ends_with("<pre>x</pre><div>body</div>"));
    }

    #[test]
    fn image_already_present_is_left_alone() {
        let html = format!(r#"<p>hi</p><img src="{IMAGE}">"#);
        assert_eq!(inject_image(&html, IMAGE), html);
        assert_eq!(inject_image("<p>hi</p>", ""), "<p>hi</p>");
    }

    #[test]
    fn signature_is_appended_once() {
        let url = "https://cdn.example.com/sig.png";
        let once = inject_signature("<p>Atenciosamente</p>", url);

        assert!(once.starts_with("<p>Atenciosamente</p><div"));
        assert!(once.contains("text-align: right"));
        assert_eq!(inject_signature(&once, url), once);
    }
}
