use anyhow::{Context, Result, bail};
use quick_xml::{Writer, events::BytesText};
use std::{borrow::Cow, fmt};

/// Excel worksheet limits.
pub const MAX_ROW: u32 = 1_048_576;
pub const MAX_COL: u32 = 16_384;

/// A value written into a single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Empty,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Bool(true) => f.write_str("TRUE"),
            CellValue::Bool(false) => f.write_str("FALSE"),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

/// Parses an A1-style coordinate into a 1-based `(column, row)` pair.
///
/// Column letters are case-insensitive; absolute markers (`$A$1`) are not accepted.
pub fn parse_coord(coord: &str) -> Result<(u32, u32)> {
    let row_start = coord
        .find(|c: char| c.is_ascii_digit())
        .with_context(|| format!("invalid cell coordinate `{coord}` – no digits found"))?;
    let (letters, digits) = coord.split_at(row_start);
    if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_alphabetic()) {
        bail!("invalid column in cell coordinate `{coord}`");
    }

    let col = letters
        .bytes()
        .try_fold(0u32, |acc, b| {
            acc.checked_mul(26)?
                .checked_add((b.to_ascii_uppercase() - b'A' + 1) as u32)
        })
        .filter(|c| *c <= MAX_COL)
        .with_context(|| format!("column out of range in `{coord}`"))?;
    let row: u32 = digits
        .parse()
        .with_context(|| format!("invalid row number in cell coordinate `{coord}`"))?;
    if row == 0 || row > MAX_ROW {
        bail!("row out of range in `{coord}`");
    }
    Ok((col, row))
}

/// Converts a 1-based column index to Excel column letters (1 -> "A", 27 -> "AA").
pub fn col_to_letters(col: u32) -> String {
    let mut idx = col.saturating_sub(1);
    let mut s = String::new();
    loop {
        let rem = idx % 26;
        s.insert(0, (b'A' + rem as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    s
}

/// Serialises one `<c>` element. `style` is the `s` attribute carried over from the replaced cell.
pub(crate) fn cell_xml(coord: &str, value: &CellValue, style: Option<&str>) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    let mut c_elem = writer.create_element("c").with_attribute(("r", coord));
    if let Some(s) = style {
        c_elem = c_elem.with_attribute(("s", s));
    }

    match value {
        CellValue::Empty => {
            c_elem.write_empty()?;
        }
        CellValue::Number(n) => {
            let text = n.to_string();
            c_elem.write_inner_content(|w| {
                w.create_element("v")
                    .write_text_content(BytesText::new(&text))?;
                Ok(())
            })?;
        }
        CellValue::Bool(b) => {
            c_elem
                .with_attribute(("t", "b"))
                .write_inner_content(|w| {
                    w.create_element("v")
                        .write_text_content(BytesText::new(if *b { "1" } else { "0" }))?;
                    Ok(())
                })?;
        }
        CellValue::Text(s) => {
            // Inline strings keep sharedStrings.xml untouched.
            let padded = s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace);
            c_elem
                .with_attribute(("t", "inlineStr"))
                .write_inner_content(|w| {
                    w.create_element("is").write_inner_content(|w2| {
                        let mut t = w2.create_element("t");
                        if padded {
                            t = t.with_attribute(("xml:space", "preserve"));
                        }
                        t.write_text_content(BytesText::new(&encode_text(s)))?;
                        Ok(())
                    })?;
                    Ok(())
                })?;
        }
    }
    Ok(writer.into_inner())
}

/// Characters XML 1.0 cannot carry; Excel stores them as `_xHHHH_`.
fn is_unencodable(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{B}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}')
}

/// `true` when `s` starts with a literal `_xHHHH_` that a reader would decode.
fn starts_with_escape(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 7 && b[1] == b'x' && b[2..6].iter().all(u8::is_ascii_hexdigit) && b[6] == b'_'
}

/// Encodes text for `<t>`: control characters become `_xHHHH_`, and the
/// underscore of an existing `_xHHHH_` becomes `_x005F_` so it reads back literally.
pub(crate) fn encode_text(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_unencodable) && !s.contains("_x") {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 8);
    for (i, c) in s.char_indices() {
        if is_unencodable(c) {
            out.push_str(&format!("_x{:04X}_", c as u32));
        } else if c == '_' && starts_with_escape(&s[i..]) {
            out.push_str("_x005F_");
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}
