// styles.xml: date cell formats for patched workbooks

use std::collections::{BTreeMap, BTreeSet};

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::sheet_xml::with_attr;

/// Number format given to every date written into a template.
pub const DATE_FORMAT: &str = "m/d/yyyy";

/// First id available for custom number formats.
const FIRST_CUSTOM_NUM_FMT: u32 = 164;

fn xml_err(e: impl std::fmt::Display) -> String {
    format!("styles XML error: {e}")
}

/// What the first pass learns about the stylesheet.
#[derive(Debug, Default)]
struct StyleSheetInfo {
    /// Attributes of each `<xf>` under `<cellXfs>`, in index order.
    cell_xfs: Vec<Vec<(String, String)>>,
    has_cell_xfs: bool,
    has_num_fmts: bool,
    num_fmt_count: usize,
    highest_num_fmt: Option<u32>,
    /// Existing id whose format code is already `DATE_FORMAT`.
    date_num_fmt: Option<u32>,
}

fn attrs(e: &BytesStart) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|a| {
            (
                String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                String::from_utf8_lossy(&a.value).into_owned(),
            )
        })
        .collect()
}

fn scan(xml: &str) -> Result<StyleSheetInfo, String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut info = StyleSheetInfo::default();
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"numFmts" => {
                info.has_num_fmts = true;
            }
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"numFmt" => {
                let fields = attrs(e);
                let id = fields.iter().find(|(k, _)| k == "numFmtId").and_then(|(_, v)| v.parse::<u32>().ok());
                let code = fields.iter().find(|(k, _)| k == "formatCode").map(|(_, v)| v.as_str());
                info.num_fmt_count += 1;
                if let Some(id) = id {
                    info.highest_num_fmt = info.highest_num_fmt.max(Some(id));
                    if code == Some(DATE_FORMAT) {
                        info.date_num_fmt = Some(id);
                    }
                }
            }
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"cellXfs" => {
                info.has_cell_xfs = true;
                in_cell_xfs = true;
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if in_cell_xfs && e.local_name().as_ref() == b"xf" => {
                info.cell_xfs.push(attrs(e));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(info)
}

fn set(fields: &mut Vec<(String, String)>, key: &str, value: &str) {
    match fields.iter_mut().find(|(k, _)| k == key) {
        Some(field) => field.1 = value.to_string(),
        None => fields.push((key.to_string(), value.to_string())),
    }
}

fn element(name: &str, fields: &[(String, String)]) -> BytesStart<'static> {
    let mut e = BytesStart::new(name.to_string());
    for (k, v) in fields {
        e.push_attribute((k.as_str(), v.as_str()));
    }
    e
}

/// Add one date cell format per base style.
///
/// Each new `<xf>` copies the attributes of its base (font, fill, border,
/// alignment flags) and swaps in the `m/d/yyyy` number format, so a date
/// written into a styled cell keeps the look of that cell. Returns the new
/// stylesheet and base style -> new style index.
pub fn add_date_styles(xml: &str, bases: &BTreeSet<u32>) -> Result<(Vec<u8>, BTreeMap<u32, u32>), String> {
    let info = scan(xml)?;
    if !info.has_cell_xfs {
        return Err(xml_err("no <cellXfs> element"));
    }

    let (num_fmt_id, new_num_fmt) = match info.date_num_fmt {
        Some(id) => (id, false),
        None => (info.highest_num_fmt.map_or(FIRST_CUSTOM_NUM_FMT, |h| (h + 1).max(FIRST_CUSTOM_NUM_FMT)), true),
    };
    let num_fmt = element(
        "numFmt",
        &[("numFmtId".into(), num_fmt_id.to_string()), ("formatCode".into(), DATE_FORMAT.into())],
    );

    let mut mapping = BTreeMap::new();
    let mut new_xfs = Vec::new();
    for (i, &base) in bases.iter().enumerate() {
        let mut fields = info.cell_xfs.get(base as usize).cloned().unwrap_or_else(|| {
            ["numFmtId", "fontId", "fillId", "borderId", "xfId"]
                .iter()
                .map(|k| (k.to_string(), "0".to_string()))
                .collect()
        });
        set(&mut fields, "numFmtId", &num_fmt_id.to_string());
        set(&mut fields, "applyNumberFormat", "1");
        new_xfs.push(element("xf", &fields));
        mapping.insert(base, (info.cell_xfs.len() + i) as u32);
    }
    let xf_count = (info.cell_xfs.len() + new_xfs.len()).to_string();

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256 * (new_xfs.len() + 1)));
    let mut buf = Vec::new();
    let num_fmt_count = (info.num_fmt_count + 1).to_string();

    loop {
        let done = {
            let event = reader.read_event_into(&mut buf).map_err(xml_err)?;
            let mut out: Vec<Event> = Vec::new();
            match event {
                Event::Eof => {}
                Event::Start(e) if e.local_name().as_ref() == b"styleSheet" => {
                    out.push(Event::Start(e));
                    if new_num_fmt && !info.has_num_fmts {
                        out.push(Event::Start(element("numFmts", &[("count".into(), "1".into())])));
                        out.push(Event::Empty(num_fmt.clone()));
                        out.push(Event::End(BytesEnd::new("numFmts")));
                    }
                }
                Event::Empty(e) if new_num_fmt && e.local_name().as_ref() == b"numFmts" => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    out.push(Event::Start(with_attr(&e, b"count", Some("1"))));
                    out.push(Event::Empty(num_fmt.clone()));
                    out.push(Event::End(BytesEnd::new(name)));
                }
                Event::Start(e) if new_num_fmt && e.local_name().as_ref() == b"numFmts" => {
                    out.push(Event::Start(with_attr(&e, b"count", Some(&num_fmt_count))));
                }
                Event::End(e) if new_num_fmt && e.local_name().as_ref() == b"numFmts" => {
                    out.push(Event::Empty(num_fmt.clone()));
                    out.push(Event::End(e));
                }
                Event::Start(e) if e.local_name().as_ref() == b"cellXfs" => {
                    out.push(Event::Start(with_attr(&e, b"count", Some(&xf_count))));
                }
                Event::End(e) if e.local_name().as_ref() == b"cellXfs" => {
                    out.extend(new_xfs.iter().cloned().map(Event::Empty));
                    out.push(Event::End(e));
                }
                other => out.push(other),
            }
            let done = out.is_empty();
            for event in out {
                writer.write_event(event).map_err(xml_err)?;
            }
            done
        };
        buf.clear();
        if done {
            break;
        }
    }

    Ok((writer.into_inner(), mapping))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: &str = r##"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="1"><numFmt numFmtId="164" formatCode="#,##0.00"/></numFmts><fonts count="1"><font><sz val="11"/></font></fonts><cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="4" fontId="0" fillId="0" borderId="1" xfId="0" applyBorder="1"/><xf numFmtId="164" fontId="0" fillId="2" borderId="0" xfId="0"><alignment horizontal="center"/></xf></cellXfs></styleSheet>"##;

    fn run(xml: &str, bases: &[u32]) -> (String, BTreeMap<u32, u32>) {
        let bases: BTreeSet<u32> = bases.iter().copied().collect();
        let (bytes, map) = add_date_styles(xml, &bases).unwrap();
        (String::from_utf8(bytes).unwrap(), map)
    }

    #[test]
    fn appends_one_xf_per_base_with_new_num_fmt() {
        let (xml, map) = run(STYLES, &[0, 1]);
        assert_eq!(map, [(0, 3), (1, 4)].into_iter().collect());
        assert!(xml.contains(r#"<numFmts count="2">"#));
        assert!(xml.contains(r#"<numFmt numFmtId="165" formatCode="m/d/yyyy"/>"#));
        assert!(xml.contains(r#"<cellXfs count="5">"#));
        assert!(xml.contains(
            r#"<xf numFmtId="165" fontId="0" fillId="0" borderId="1" xfId="0" applyBorder="1" applyNumberFormat="1"/></cellXfs>"#
        ));
        // existing xfs untouched
        assert!(xml.contains(r#"<alignment horizontal="center"/></xf>"#));
    }

    #[test]
    fn reuses_existing_date_format() {
        let styles = STYLES.replace("#,##0.00", "m/d/yyyy");
        let (xml, map) = run(&styles, &[2]);
        assert_eq!(map[&2], 3);
        assert!(xml.contains(r#"<numFmts count="1">"#));
        assert!(xml.contains(r#"<xf numFmtId="164" fontId="0" fillId="2" borderId="0" xfId="0" applyNumberFormat="1"/>"#));
    }

    #[test]
    fn creates_num_fmts_when_missing() {
        let styles = r#"<styleSheet><fonts count="1"><font/></fonts><cellXfs count="1"><xf numFmtId="0" fontId="0"/></cellXfs></styleSheet>"#;
        let (xml, map) = run(styles, &[7]);
        assert_eq!(map[&7], 1);
        assert!(xml.starts_with(r#"<styleSheet><numFmts count="1"><numFmt numFmtId="164" formatCode="m/d/yyyy"/></numFmts><fonts"#));
        assert!(xml.contains(r#"<cellXfs count="2">"#));
        assert!(xml.contains(r#"<xf numFmtId="164" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>"#));
    }

    #[test]
    fn stylesheet_without_cell_xfs_is_rejected() {
        let bases: BTreeSet<u32> = [0].into_iter().collect();
        assert!(add_date_styles("<styleSheet/>", &bases).is_err());
    }
}
