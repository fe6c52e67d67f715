mod calc_part;
mod cell;
mod files_part;
mod protection;

pub use cell::{CellValue, col_to_letters, parse_coord};
pub use files_part::active_sheet_index;
pub use protection::hash_password;

use anyhow::{Context, Result, bail};
use quick_xml::{Reader, Writer, events::BytesStart, events::Event};
use std::sync::Arc;

/// `XlsxEditor` edits one worksheet of an existing XLSX archive in place.
///
/// Only the worksheet XML is held in a mutable buffer; every other part of the
/// archive (styles, shared strings, drawings, ...) is copied verbatim on save.
/// Cloning is cheap for the archive itself (shared by `Arc`) and deep for the
/// sheet, so a pristine editor can be cloned once per output.
#[derive(Clone)]
pub struct XlsxEditor {
    src: Arc<[u8]>,
    sheet_path: String,
    sheet_xml: Vec<u8>,
    /// Set once a cell value has changed.
    edited: bool,
}

impl XlsxEditor {
    /// Path of the edited worksheet inside the archive (e.g. `xl/worksheets/sheet1.xml`).
    pub fn sheet_path(&self) -> &str {
        &self.sheet_path
    }

    /// Current worksheet XML.
    pub fn sheet_xml(&self) -> &[u8] {
        &self.sheet_xml
    }

    /// Sets the value of a specific cell in the sheet.
    ///
    /// Updates an existing cell or creates it, creating the row as well when needed.
    /// Rows and cells stay sorted, which Excel requires to open the file without
    /// "recovered records" errors. The style index (`s`) of a replaced cell is kept.
    ///
    /// # Arguments
    /// * `coord` - The cell coordinate (e.g., "A1", "B2").
    /// * `value` - The value to store; `&str`/`String` are written as text, `f64` as a number.
    ///
    /// # Returns
    /// A `Result` indicating success or an `anyhow::Error` if the coordinate is invalid
    /// or the sheet XML is malformed.
    pub fn set_cell<V: Into<CellValue>>(&mut self, coord: &str, value: V) -> Result<()> {
        let (col, row_num) = parse_coord(coord)?;
        let coord = format!("{}{}", col_to_letters(col), row_num);
        write_cell(&mut self.sheet_xml, &coord, col, row_num, &value.into())?;
        widen_dimension(&mut self.sheet_xml, col, row_num)?;
        self.edited = true;
        Ok(())
    }
}

// ── sheet XML surgery ───────────────────────────────────────────────

/// Byte span of one element inside a buffer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ElementSpan {
    pub start: usize,
    /// End of the start tag; equals `end` for an empty element.
    pub open_end: usize,
    pub end: usize,
    pub empty: bool,
    /// The `s` attribute, if any.
    pub style: Option<String>,
}

impl ElementSpan {
    /// Start of the closing tag (the content lies in `open_end..inner_end`).
    pub fn inner_end(&self, xml: &[u8]) -> usize {
        if self.empty {
            return self.open_end;
        }
        memchr::memmem::rfind(&xml[self.open_end..self.end], b"</")
            .map(|p| self.open_end + p)
            .unwrap_or(self.end)
    }
}

/// Where a keyed child lives, or where it should be inserted.
#[derive(Debug, PartialEq)]
pub(crate) enum Slot {
    Found(ElementSpan),
    Missing { at: usize },
}

pub(crate) fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes().with_checks(false).flatten().find_map(|a| {
        (a.key.as_ref() == key).then(|| String::from_utf8_lossy(&a.value).into_owned())
    })
}

/// Finds a direct child of the root element by local name.
pub(crate) fn find_element(xml: &[u8], local: &[u8]) -> Result<Option<ElementSpan>> {
    let mut reader = Reader::from_reader(xml);
    let mut depth = 0usize;
    loop {
        let before = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(e) if depth == 1 => {
                let open_end = reader.buffer_position() as usize;
                reader.read_to_end(e.name())?;
                if e.local_name().as_ref() == local {
                    return Ok(Some(ElementSpan {
                        start: before,
                        open_end,
                        end: reader.buffer_position() as usize,
                        empty: false,
                        style: attr_value(&e, b"s"),
                    }));
                }
            }
            Event::Start(_) => depth += 1,
            Event::Empty(e) if depth == 1 && e.local_name().as_ref() == local => {
                let end = reader.buffer_position() as usize;
                return Ok(Some(ElementSpan {
                    start: before,
                    open_end: end,
                    end,
                    empty: true,
                    style: attr_value(&e, b"s"),
                }));
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Locates the child `tag` whose index equals `target` inside `parent`.
///
/// Children must be sorted by index (rows by `r`, cells by column). A child
/// without an explicit index follows its predecessor.
pub(crate) fn locate_child(
    xml: &[u8],
    parent: &ElementSpan,
    tag: &[u8],
    target: u32,
    index_of: impl Fn(&BytesStart<'_>) -> Option<u32>,
) -> Result<Slot> {
    let base = parent.open_end;
    let inner = &xml[base..parent.inner_end(xml)];
    let mut reader = Reader::from_reader(inner);
    let mut implicit = 0u32;
    loop {
        let before = base + reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == tag => {
                let idx = index_of(&e).unwrap_or(implicit + 1);
                implicit = idx;
                if idx > target {
                    return Ok(Slot::Missing { at: before });
                }
                let open_end = base + reader.buffer_position() as usize;
                reader.read_to_end(e.name())?;
                if idx == target {
                    return Ok(Slot::Found(ElementSpan {
                        start: before,
                        open_end,
                        end: base + reader.buffer_position() as usize,
                        empty: false,
                        style: attr_value(&e, b"s"),
                    }));
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == tag => {
                let idx = index_of(&e).unwrap_or(implicit + 1);
                implicit = idx;
                if idx > target {
                    return Ok(Slot::Missing { at: before });
                }
                if idx == target {
                    let end = base + reader.buffer_position() as usize;
                    return Ok(Slot::Found(ElementSpan {
                        start: before,
                        open_end: end,
                        end,
                        empty: true,
                        style: attr_value(&e, b"s"),
                    }));
                }
            }
            Event::Eof => return Ok(Slot::Missing { at: base + inner.len() }),
            _ => {}
        }
    }
}

/// Parses the start tag of `span`; the flag tells whether the element is empty.
fn start_tag<'a>(xml: &'a [u8], span: &ElementSpan) -> Result<(BytesStart<'a>, bool)> {
    let mut reader = Reader::from_reader(&xml[span.start..span.open_end]);
    match reader.read_event()? {
        Event::Start(e) => Ok((e, false)),
        Event::Empty(e) => Ok((e, true)),
        _ => bail!("no start tag at byte {}", span.start),
    }
}

/// Sets `key="value"` on the element at `span`, replacing any previous value.
pub(crate) fn set_attribute(xml: &mut Vec<u8>, span: &ElementSpan, key: &str, value: &str) -> Result<()> {
    let (old, empty) = start_tag(xml, span)?;
    let mut tag = BytesStart::new(String::from_utf8_lossy(old.name().as_ref()).into_owned());
    tag.extend_attributes(
        old.attributes()
            .with_checks(false)
            .flatten()
            .filter(|a| a.key.as_ref() != key.as_bytes()),
    );
    tag.push_attribute((key, value));

    let mut writer = Writer::new(Vec::new());
    writer.write_event(if empty { Event::Empty(tag) } else { Event::Start(tag) })?;
    xml.splice(span.start..span.open_end, writer.into_inner());
    Ok(())
}

/// Removes the direct children of the root named `local` that `remove` accepts.
/// Returns `None` when nothing matched.
pub(crate) fn strip_children(
    xml: &[u8],
    local: &[u8],
    remove: impl Fn(&BytesStart<'_>) -> bool,
) -> Result<Option<Vec<u8>>> {
    let mut reader = Reader::from_reader(xml);
    let mut depth = 0usize;
    let mut cuts = Vec::new();
    loop {
        let before = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(e) if depth == 1 => {
                reader.read_to_end(e.name())?;
                if e.local_name().as_ref() == local && remove(&e) {
                    cuts.push(before..reader.buffer_position() as usize);
                }
            }
            Event::Start(_) => depth += 1,
            Event::Empty(e) if depth == 1 && e.local_name().as_ref() == local && remove(&e) => {
                cuts.push(before..reader.buffer_position() as usize);
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }
    if cuts.is_empty() {
        return Ok(None);
    }

    let mut out = Vec::with_capacity(xml.len());
    let mut pos = 0;
    for cut in cuts {
        out.extend_from_slice(&xml[pos..cut.start]);
        pos = cut.end;
    }
    out.extend_from_slice(&xml[pos..]);
    Ok(Some(out))
}

/// Grows `<dimension ref>` so it covers `(col, row)`. A missing or unreadable ref is left alone.
pub(crate) fn widen_dimension(xml: &mut Vec<u8>, col: u32, row: u32) -> Result<()> {
    let Some(dim) = find_element(xml, b"dimension")? else {
        return Ok(());
    };
    let Some(reference) = attr_value(&start_tag(xml, &dim)?.0, b"ref") else {
        return Ok(());
    };
    let corners = reference
        .split(':')
        .map(parse_coord)
        .collect::<Result<Vec<_>>>();
    let Ok(corners) = corners else {
        return Ok(());
    };
    let (Some(&first), Some(&last)) = (corners.first(), corners.last()) else {
        return Ok(());
    };

    let (lo_col, hi_col) = (first.0.min(last.0), first.0.max(last.0));
    let (lo_row, hi_row) = (first.1.min(last.1), first.1.max(last.1));
    if (lo_col..=hi_col).contains(&col) && (lo_row..=hi_row).contains(&row) {
        return Ok(());
    }

    let top_left = format!("{}{}", col_to_letters(lo_col.min(col)), lo_row.min(row));
    let bottom_right = format!("{}{}", col_to_letters(hi_col.max(col)), hi_row.max(row));
    set_attribute(xml, &dim, "ref", &format!("{top_left}:{bottom_right}"))
}

/// Rewrites `<tag …/>` as `<tag …></tag>` so children can be inserted.
pub(crate) fn expand_empty(xml: &mut Vec<u8>, span: &ElementSpan) -> ElementSpan {
    let tag = &xml[span.start..span.end];
    let name_len = tag[1..]
        .iter()
        .position(|b| b.is_ascii_whitespace() || *b == b'/' || *b == b'>')
        .unwrap_or(tag.len() - 1);
    let name = tag[1..1 + name_len].to_vec();

    let mut replacement = xml[span.start..span.end - 2].to_vec(); // drop "/>"
    replacement.push(b'>');
    let open_end = span.start + replacement.len();
    replacement.extend_from_slice(b"</");
    replacement.extend_from_slice(&name);
    replacement.push(b'>');
    let end = span.start + replacement.len();

    xml.splice(span.start..span.end, replacement);
    ElementSpan {
        start: span.start,
        open_end,
        end,
        empty: false,
        style: span.style.clone(),
    }
}

fn row_index(e: &BytesStart<'_>) -> Option<u32> {
    attr_value(e, b"r").and_then(|r| r.parse().ok())
}

fn cell_col(e: &BytesStart<'_>) -> Option<u32> {
    attr_value(e, b"r").and_then(|r| parse_coord(&r).ok()).map(|(c, _)| c)
}

/// Writes one cell into worksheet XML. `coord` must be the normalised form of `(col, row_num)`.
pub(crate) fn write_cell(
    xml: &mut Vec<u8>,
    coord: &str,
    col: u32,
    row_num: u32,
    value: &CellValue,
) -> Result<()> {
    if let CellValue::Number(n) = value {
        if !n.is_finite() {
            bail!("cannot store non-finite number {n} in {coord}");
        }
    }

    let mut data = find_element(xml, b"sheetData")?.context("<sheetData> not found")?;
    if data.empty {
        data = expand_empty(xml, &data);
    }

    let row = match locate_child(xml, &data, b"row", row_num, row_index)? {
        Slot::Found(span) if span.empty => expand_empty(xml, &span),
        Slot::Found(span) => span,
        Slot::Missing { at } => {
            let open = format!("<row r=\"{row_num}\">");
            let new_row = format!("{open}</row>");
            xml.splice(at..at, new_row.bytes());
            ElementSpan {
                start: at,
                open_end: at + open.len(),
                end: at + new_row.len(),
                empty: false,
                style: None,
            }
        }
    };

    match locate_child(xml, &row, b"c", col, cell_col)? {
        Slot::Found(span) => {
            let cell = cell::cell_xml(coord, value, span.style.as_deref())?;
            xml.splice(span.start..span.end, cell);
        }
        Slot::Missing { at } => {
            let cell = cell::cell_xml(coord, value, None)?;
            xml.splice(at..at, cell);
        }
    }
    Ok(())
}
