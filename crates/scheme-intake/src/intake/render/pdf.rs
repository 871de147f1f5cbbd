use std::fmt::Write as _;

use super::layout::{FontWeight, Page, PageGeometry};

const REGULAR_FONT: &str = "F1";
const BOLD_FONT: &str = "F2";

/// Serialize laid-out pages into a minimal PDF 1.4 document using the base-14 Helvetica faces.
pub(crate) fn encode(pages: &[Page], geometry: &PageGeometry) -> Vec<u8> {
    let mut objects: Vec<String> = Vec::new();
    let page_count = pages.len();
    let first_page_object = 5;

    let kids = (0..page_count)
        .map(|index| format!("{} 0 R", first_page_object + index * 2))
        .collect::<Vec<_>>()
        .join(" ");

    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    objects.push(format!(
        "<< /Type /Pages /Kids [{kids}] /Count {page_count} >>"
    ));
    objects.push(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    );
    objects.push(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_string(),
    );

    for (index, page) in pages.iter().enumerate() {
        let content_object = first_page_object + index * 2 + 1;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.0} {:.0}] \
             /Resources << /Font << /{REGULAR_FONT} 3 0 R /{BOLD_FONT} 4 0 R >> >> \
             /Contents {content_object} 0 R >>",
            geometry.width, geometry.height
        ));

        let stream = content_stream(page);
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}\nendstream",
            stream.len()
        ));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        let _ = write!(out, "{} 0 obj\n{body}\nendobj\n", index + 1);
    }

    let xref_offset = out.len();
    let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(out, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    );

    out.into_bytes()
}

fn content_stream(page: &Page) -> String {
    let mut stream = String::new();
    for item in &page.items {
        let font = match item.weight {
            FontWeight::Regular => REGULAR_FONT,
            FontWeight::Bold => BOLD_FONT,
        };
        let _ = writeln!(
            stream,
            "BT /{font} {:.1} Tf {:.2} {:.2} Td ({}) Tj ET",
            item.size,
            item.x,
            item.y,
            escape(&item.text)
        );
    }
    stream
}

/// Characters `escape` replaces with `?`.
pub(crate) fn substituted_glyphs(text: &str) -> usize {
    text.chars().filter(|ch| !matches!(ch, ' '..='~')).count()
}

/// Escape a PDF literal string. Glyphs outside printable ASCII have no WinAnsi slot we rely on.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' | ')' | '\\' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            ' '..='~' => escaped.push(ch),
            _ => escaped.push('?'),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::super::layout::{paginate, PageGeometry};
    use super::*;

    #[test]
    fn escape_handles_delimiters_and_non_ascii() {
        assert_eq!(escape("a(b)c\\d"), "a\\(b\\)c\\\\d");
        assert_eq!(escape("ಕನ್ನಡ x"), "????? x");
    }

    #[test]
    fn substituted_glyphs_counts_what_escape_replaces() {
        assert_eq!(substituted_glyphs("Lakshmi Devi (OBC)"), 0);
        assert_eq!(substituted_glyphs("ಕನ್ನಡ x"), 5);
        assert_eq!(substituted_glyphs("José"), 1);
    }

    #[test]
    fn encoded_document_declares_every_page_and_a_valid_xref() {
        let geometry = PageGeometry::default();
        let fields = (0..80)
            .map(|index| (format!("Item {index}"), "value".to_string()))
            .collect();
        let pages = paginate("Application", &fields, &geometry);
        let bytes = encode(&pages, &geometry);
        let text = String::from_utf8(bytes).expect("ascii output");

        assert!(text.starts_with("%PDF-1.4\n"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains(&format!("/Count {}", pages.len())));
        assert_eq!(text.matches("/Type /Page ").count(), pages.len());

        let startxref = text
            .rsplit("startxref\n")
            .next()
            .and_then(|tail| tail.lines().next())
            .and_then(|line| line.parse::<usize>().ok())
            .expect("startxref offset");
        assert!(text[startxref..].starts_with("xref\n"));

        let catalog_offset = text.find("1 0 obj").expect("catalog object");
        assert!(text.contains(&format!("{catalog_offset:010} 00000 n ")));
    }
}
