use crate::{XlsxEditor, attr_value, calc_part::recalc_parts};
use ::zip as zip_crate;
use anyhow::{Context, Result, bail};
use quick_xml::{Reader, events::BytesStart, events::Event};
use std::{
    fs,
    io::{Cursor, Read, Seek, Write},
    path::Path,
    sync::Arc,
};
use tempfile::NamedTempFile;

pub(crate) type Archive<'a> = zip_crate::ZipArchive<Cursor<&'a [u8]>>;

pub(crate) const WORKBOOK: &str = "xl/workbook.xml";
pub(crate) const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
pub(crate) const CONTENT_TYPES: &str = "[Content_Types].xml";

/// Work with files
impl XlsxEditor {
    /// Opens the sheet that Excel shows first (`<workbookView activeTab>`).
    pub fn open_active<P: AsRef<Path>>(src: P) -> Result<Self> {
        let bytes = read_archive(src.as_ref())?;
        let workbook_xml = read_entry(&mut archive(&bytes)?, WORKBOOK)?;
        Self::from_bytes(bytes, active_tab(&workbook_xml) + 1)
    }

    /// Builds an editor over sheet `sheet_id` (1‑based, in tab order) of an archive in memory.
    pub(crate) fn from_bytes(src: impl Into<Arc<[u8]>>, sheet_id: usize) -> Result<Self> {
        let src: Arc<[u8]> = src.into();
        let mut zip = archive(&src)?;

        // ── workbook.xml + rels: resolve the part name of the sheet ─────
        let workbook_xml = read_entry(&mut zip, WORKBOOK)?;
        let rels_xml = read_entry(&mut zip, WORKBOOK_RELS)?;

        let sheets = sheet_entries(&workbook_xml);
        let (name, rid) = sheet_id
            .checked_sub(1)
            .and_then(|i| sheets.get(i))
            .with_context(|| format!("sheet #{sheet_id} not found ({} sheets)", sheets.len()))?;
        let target = relationship_target(&rels_xml, |e| {
            attr_value(e, b"Id").as_deref() == Some(rid.as_str())
        })
        .with_context(|| format!("relationship {rid} for sheet `{name}` not found"))?;
        let sheet_path = part_path(&target);

        // ── sheet#.xml ───────────────────────────────────────────────
        let sheet_xml = read_entry(&mut zip, &sheet_path)?;
        drop(zip);

        Ok(Self {
            src,
            sheet_path,
            sheet_xml,
            edited: false,
        })
    }

    /// Saves the edited workbook to `dst`, replacing any existing file.
    ///
    /// The archive is written to a temporary file next to `dst` and renamed into
    /// place, so a failed save never leaves a truncated workbook behind.
    pub fn save<P: AsRef<Path>>(&self, dst: P) -> Result<()> {
        let dst = dst.as_ref();
        let dir = match dst.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("cannot create a temporary file in {}", dir.display()))?;
        let tmp = self.write_to(tmp)?;
        tmp.persist(dst)
            .with_context(|| format!("cannot write {}", dst.display()))?;
        Ok(())
    }

    /// Writes the archive into `out`: every entry is copied raw except the edited sheet.
    ///
    /// Once a cell has been set, cached formula results are stale: the workbook is
    /// flagged for a full recalculation on load and its calculation chain is left out.
    pub fn write_to<W: Write + Seek>(&self, out: W) -> Result<W> {
        let mut zin = archive(&self.src)?;
        let recalc = if self.edited {
            recalc_parts(&mut zin)?
        } else {
            Default::default()
        };
        let mut zout = zip_crate::ZipWriter::new(out);

        let opt: zip_crate::write::FileOptions<'_, ()> = zip_crate::write::FileOptions::default()
            .compression_method(zip_crate::CompressionMethod::Deflated)
            .compression_level(Some(1));

        for i in 0..zin.len() {
            let file = zin.by_index_raw(i)?;
            let name = file.name().to_owned();
            if recalc.drops(&name) {
                continue;
            }

            let body = if name == self.sheet_path {
                Some(self.sheet_xml.as_slice())
            } else {
                recalc.replacement(&name)
            };
            match body {
                Some(body) => {
                    drop(file);
                    zout.start_file(name, opt)?;
                    zout.write_all(body)?;
                }
                None => zout.raw_copy_file(file)?,
            }
        }

        Ok(zout.finish()?)
    }
}

/// Returns the 0-based tab index of the workbook's active sheet.
pub fn active_sheet_index<P: AsRef<Path>>(src: P) -> Result<usize> {
    let bytes = read_archive(src.as_ref())?;
    let workbook_xml = read_entry(&mut archive(&bytes)?, WORKBOOK)?;
    let count = sheet_entries(&workbook_xml).len();
    if count == 0 {
        bail!("workbook has no sheets");
    }
    Ok(active_tab(&workbook_xml).min(count - 1))
}

fn read_archive(path: &Path) -> Result<Arc<[u8]>> {
    let bytes = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    Ok(bytes.into())
}

fn archive(bytes: &[u8]) -> Result<Archive<'_>> {
    zip_crate::ZipArchive::new(Cursor::new(bytes)).context("not an XLSX (zip) archive")
}

pub(crate) fn read_entry(zip: &mut Archive<'_>, name: &str) -> Result<Vec<u8>> {
    let mut entry = zip
        .by_name(name)
        .with_context(|| format!("{name} not found"))?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Archive path of a part referenced from `xl/_rels/workbook.xml.rels`.
pub(crate) fn part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(abs) => abs.to_owned(),
        None => format!("xl/{target}"),
    }
}

/// `(name, r:id)` of every `<sheet>` in workbook.xml, in tab order.
fn sheet_entries(workbook_xml: &[u8]) -> Vec<(String, String)> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(true);

    let mut sheets = Vec::new();
    while let Ok(ev) = reader.read_event() {
        match ev {
            Event::Empty(ref e) | Event::Start(ref e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rid = None;
                for a in e.attributes().with_checks(false).flatten() {
                    let v = String::from_utf8_lossy(&a.value).into_owned();
                    match a.key.as_ref() {
                        b"name" => name = Some(v),
                        // r:id, whatever the prefix
                        _ if a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id" => {
                            rid = Some(v)
                        }
                        _ => {}
                    }
                }
                if let (Some(n), Some(r)) = (name, rid) {
                    sheets.push((n, r));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    sheets
}

/// `Target` of the first `<Relationship>` accepted by `matches`.
pub(crate) fn relationship_target(
    rels_xml: &[u8],
    matches: impl Fn(&BytesStart<'_>) -> bool,
) -> Option<String> {
    let mut reader = Reader::from_reader(rels_xml);
    reader.config_mut().trim_text(true);

    while let Ok(ev) = reader.read_event() {
        match ev {
            Event::Empty(ref e) | Event::Start(ref e)
                if e.local_name().as_ref() == b"Relationship" && matches(e) =>
            {
                return attr_value(e, b"Target");
            }
            Event::Eof => break,
            _ => {}
        }
    }
    None
}

fn active_tab(workbook_xml: &[u8]) -> usize {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(true);

    while let Ok(ev) = reader.read_event() {
        match ev {
            Event::Empty(ref e) | Event::Start(ref e)
                if e.local_name().as_ref() == b"workbookView" =>
            {
                return attr_value(e, b"activeTab")
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(0);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    0
}
