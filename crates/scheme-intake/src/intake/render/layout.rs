use tracing::warn;

use super::flatten::FlatFields;

/// A4 portrait page with a fixed two column label/value table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub label_width: f32,
    pub gutter: f32,
    pub value_width: f32,
    pub font_size: f32,
    pub title_size: f32,
    pub line_height: f32,
    pub entry_spacing: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            width: 595.0,
            height: 842.0,
            margin: 50.0,
            label_width: 170.0,
            gutter: 15.0,
            value_width: 310.0,
            font_size: 10.0,
            title_size: 14.0,
            line_height: 14.0,
            entry_spacing: 6.0,
        }
    }
}

impl PageGeometry {
    /// Helvetica averages roughly half an em per glyph.
    fn chars_per_line(&self, column_width: f32) -> usize {
        ((column_width / (self.font_size * 0.5)).floor() as usize).max(1)
    }

    fn top(&self) -> f32 {
        self.height - self.margin
    }

    fn lines_per_page(&self) -> usize {
        (((self.height - 2.0 * self.margin) / self.line_height).floor() as usize).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Regular,
    Bold,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub weight: FontWeight,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<PlacedText>,
}

/// Lay fields out top to bottom, starting a new page before any entry that would not fit.
pub fn paginate(title: &str, fields: &FlatFields, geometry: &PageGeometry) -> Vec<Page> {
    let mut pages = Vec::new();
    let mut page = Page::default();
    let mut cursor = geometry.top();

    page.items.push(PlacedText {
        x: geometry.margin,
        y: cursor - geometry.title_size,
        size: geometry.title_size,
        weight: FontWeight::Bold,
        text: title.to_string(),
    });
    cursor -= geometry.title_size + geometry.line_height;

    let label_chars = geometry.chars_per_line(geometry.label_width);
    let value_chars = geometry.chars_per_line(geometry.value_width);
    let value_x = geometry.margin + geometry.label_width + geometry.gutter;

    for (label, value) in fields {
        let mut label_lines = wrap(label, label_chars);
        let mut value_lines = wrap(value, value_chars);
        let max_lines = geometry.lines_per_page();
        let clipped_label = truncate_lines(&mut label_lines, max_lines);
        let clipped_value = truncate_lines(&mut value_lines, max_lines);
        if clipped_label || clipped_value {
            warn!(field = %label, max_lines, "field longer than one page was cut off");
        }

        let rows = label_lines.len().max(value_lines.len());
        let height = rows as f32 * geometry.line_height;

        if cursor - height < geometry.margin && !page.items.is_empty() {
            pages.push(std::mem::take(&mut page));
            cursor = geometry.top();
        }

        for (row, line) in label_lines.into_iter().enumerate() {
            page.items.push(PlacedText {
                x: geometry.margin,
                y: cursor - geometry.font_size - row as f32 * geometry.line_height,
                size: geometry.font_size,
                weight: FontWeight::Bold,
                text: line,
            });
        }
        for (row, line) in value_lines.into_iter().enumerate() {
            page.items.push(PlacedText {
                x: value_x,
                y: cursor - geometry.font_size - row as f32 * geometry.line_height,
                size: geometry.font_size,
                weight: FontWeight::Regular,
                text: line,
            });
        }

        cursor -= height + geometry.entry_spacing;
    }

    pages.push(page);
    pages
}

/// Greedy word wrap; words longer than a line are hard split.
pub(crate) fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let word: String = word.into_iter().collect();
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        lines.push(current);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Entries never span pages, so anything past one page of lines is dropped and marked.
fn truncate_lines(lines: &mut Vec<String>, max_lines: usize) -> bool {
    if lines.len() <= max_lines {
        return false;
    }
    lines.truncate(max_lines);
    if let Some(last) = lines.last_mut() {
        last.push_str(" ...");
    }
    true
}
