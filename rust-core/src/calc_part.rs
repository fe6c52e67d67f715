use crate::{
    attr_value,
    files_part::{
        Archive, CONTENT_TYPES, WORKBOOK, WORKBOOK_RELS, part_path, read_entry,
        relationship_target,
    },
    find_element, set_attribute, strip_children,
};
use anyhow::{Context, Result};
use quick_xml::events::BytesStart;

/// Archive entries that change when cell values change.
#[derive(Debug, Default)]
pub(crate) struct RecalcParts {
    replaced: Vec<(String, Vec<u8>)>,
    dropped: Vec<String>,
}

impl RecalcParts {
    pub fn replacement(&self, name: &str) -> Option<&[u8]> {
        self.replaced
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, body)| body.as_slice())
    }

    pub fn drops(&self, name: &str) -> bool {
        self.dropped.iter().any(|n| n == name)
    }
}

/// Sets `fullCalcOnLoad` in workbook.xml and removes `calcChain.xml` with its
/// relationship and content-type override.
pub(crate) fn recalc_parts(zip: &mut Archive<'_>) -> Result<RecalcParts> {
    let mut parts = RecalcParts::default();

    let mut workbook_xml = read_entry(zip, WORKBOOK)?;
    force_full_calc(&mut workbook_xml)?;
    parts.replaced.push((WORKBOOK.to_owned(), workbook_xml));

    let rels_xml = read_entry(zip, WORKBOOK_RELS)?;
    let Some(target) = relationship_target(&rels_xml, is_calc_chain) else {
        return Ok(parts);
    };
    let chain = part_path(&target);
    if let Some(rels) = strip_children(&rels_xml, b"Relationship", is_calc_chain)? {
        parts.replaced.push((WORKBOOK_RELS.to_owned(), rels));
    }

    if let Ok(types_xml) = read_entry(zip, CONTENT_TYPES) {
        let part_name = format!("/{chain}");
        let stripped = strip_children(&types_xml, b"Override", |e| {
            attr_value(e, b"PartName").as_deref() == Some(part_name.as_str())
        })?;
        if let Some(types) = stripped {
            parts.replaced.push((CONTENT_TYPES.to_owned(), types));
        }
    }

    parts.dropped.push(chain);
    Ok(parts)
}

fn is_calc_chain(e: &BytesStart<'_>) -> bool {
    attr_value(e, b"Type").is_some_and(|t| t.ends_with("/calcChain"))
}

/// Children of `<workbook>` that may precede `<calcPr>`, last first.
const CALC_PR_PREDECESSORS: [&[u8]; 4] = [b"definedNames", b"externalReferences", b"functionGroups", b"sheets"];

pub(crate) fn force_full_calc(workbook_xml: &mut Vec<u8>) -> Result<()> {
    if let Some(calc) = find_element(workbook_xml, b"calcPr")? {
        return set_attribute(workbook_xml, &calc, "fullCalcOnLoad", "1");
    }

    let mut anchor = None;
    for tag in CALC_PR_PREDECESSORS {
        anchor = find_element(workbook_xml, tag)?;
        if anchor.is_some() {
            break;
        }
    }
    let anchor = anchor.context("<sheets> not found in workbook.xml")?;

    let prefix = element_prefix(&workbook_xml[anchor.start..anchor.open_end]);
    let calc = format!(r#"<{prefix}calcPr fullCalcOnLoad="1"/>"#);
    workbook_xml.splice(anchor.end..anchor.end, calc.into_bytes());
    Ok(())
}

/// Namespace prefix of a start tag, colon included (`"x:"` for `<x:sheets>`).
fn element_prefix(start_tag: &[u8]) -> String {
    let name = start_tag[1..]
        .split(|b| b.is_ascii_whitespace() || *b == b'/' || *b == b'>')
        .next()
        .unwrap_or_default();
    match memchr::memchr(b':', name) {
        Some(i) => String::from_utf8_lossy(&name[..=i]).into_owned(),
        None => String::new(),
    }
}
