use crate::{XlsxEditor, find_element};
use anyhow::{Context, Result};

/// Legacy Excel sheet-protection hash (the 16-bit value stored in `sheetProtection/@password`).
///
/// This is an obfuscation, not a cryptographic hash: it only keeps the sheet from
/// being edited casually in Excel or LibreOffice.
pub fn hash_password(password: &str) -> String {
    let mut hash: u16 = 0;
    let mut len: u16 = 0;
    for (i, ch) in password.encode_utf16().enumerate() {
        let rot = ((i + 1) % 15) as u32;
        let c = u32::from(ch) & 0x7FFF;
        let rotated = ((c << rot) | (c >> (15 - rot))) & 0x7FFF;
        hash ^= rotated as u16;
        len = len.wrapping_add(1);
    }
    hash ^= len;
    hash ^= 0xCE4B;
    format!("{hash:04X}")
}

impl XlsxEditor {
    /// Protects the sheet with `password`, replacing any protection already present.
    ///
    /// `<sheetProtection>` goes right after `<sheetData>` (or `<sheetCalcPr>` when the
    /// sheet has one), which is where the schema expects it.
    pub fn protect_sheet(&mut self, password: &str) -> Result<()> {
        let tag = format!(
            r#"<sheetProtection password="{}" sheet="1" objects="1" scenarios="1"/>"#,
            hash_password(password)
        );

        if let Some(existing) = find_element(&self.sheet_xml, b"sheetProtection")? {
            self.sheet_xml
                .splice(existing.start..existing.end, tag.into_bytes());
            return Ok(());
        }

        let anchor = match find_element(&self.sheet_xml, b"sheetCalcPr")? {
            Some(calc) => calc,
            None => {
                find_element(&self.sheet_xml, b"sheetData")?.context("<sheetData> not found")?
            }
        };
        self.sheet_xml
            .splice(anchor.end..anchor.end, tag.into_bytes());
        Ok(())
    }

    /// Whether the sheet carries an active `<sheetProtection>` element.
    pub fn is_protected(&self) -> bool {
        let Ok(Some(span)) = find_element(&self.sheet_xml, b"sheetProtection") else {
            return false;
        };
        let tag = &self.sheet_xml[span.start..span.open_end];
        memchr::memmem::find(tag, br#"sheet="1""#).is_some()
            || memchr::memmem::find(tag, br#"sheet="true""#).is_some()
    }
}
