// xlsx package plumbing: locating parts and rewriting the zip

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::sheet_xml::with_attr;

pub const WORKBOOK_PART: &str = "xl/workbook.xml";
pub const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
pub const STYLES_PART: &str = "xl/styles.xml";

/// Elements that follow `<calcPr>` in a workbook part.
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// Read a part of the package as text.
pub fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String, String> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| format!("File '{}' not found in XLSX: {}", path, e))?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| format!("Failed to read '{}': {}", path, e))?;

    Ok(content)
}

fn xml_err(e: impl std::fmt::Display) -> String {
    format!("XML parse error: {e}")
}

/// Relationship id of the first `<sheet>` in workbook.xml.
fn first_sheet_rid(workbook_xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(workbook_xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"sheet" => {
                // r:id, whatever the relationships prefix is called
                return e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id")
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned())
                    .ok_or_else(|| "First sheet has no relationship id".to_string());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Err("Workbook contains no sheets".to_string())
}

/// Target of relationship `rid` in workbook.xml.rels.
fn relationship_target(rels_xml: &str, rid: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(rels_xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                        b"Target" => target = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                        _ => {}
                    }
                }
                if id.as_deref() == Some(rid) {
                    if let Some(t) = target {
                        return Ok(t);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Err(format!("Relationship '{}' not found", rid))
}

/// Zip path of the first worksheet ("xl/worksheets/sheet1.xml").
pub fn first_worksheet_path<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String, String> {
    let workbook_xml = read_part(archive, WORKBOOK_PART)?;
    let rid = first_sheet_rid(&workbook_xml)?;
    let rels_xml = read_part(archive, WORKBOOK_RELS_PART)?;
    let target = relationship_target(&rels_xml, &rid)?;

    // Absolute targets are package-rooted; relative ones are relative to xl/
    Ok(match target.strip_prefix('/') {
        Some(rooted) => rooted.to_string(),
        None => format!("xl/{}", target),
    })
}

/// Set `fullCalcOnLoad="1"` on the workbook's `<calcPr>`, adding the element
/// in schema position when it is missing.
pub fn set_full_calc_on_load(workbook_xml: &str) -> Result<Vec<u8>, String> {
    let mut reader = Reader::from_str(workbook_xml);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len() + 64));
    let mut buf = Vec::new();
    let mut done_calc = false;

    loop {
        let finished = {
            let event = reader.read_event_into(&mut buf).map_err(xml_err)?;
            let mut out: Vec<Event> = Vec::new();
            match event {
                Event::Eof => {}
                Event::Empty(e) if e.local_name().as_ref() == b"calcPr" => {
                    done_calc = true;
                    out.push(Event::Empty(with_attr(&e, b"fullCalcOnLoad", Some("1"))));
                }
                Event::Start(e) if e.local_name().as_ref() == b"calcPr" => {
                    done_calc = true;
                    out.push(Event::Start(with_attr(&e, b"fullCalcOnLoad", Some("1"))));
                }
                Event::Start(e) if !done_calc && follows_calc_pr(&e) => {
                    done_calc = true;
                    out.push(Event::Empty(calc_pr()));
                    out.push(Event::Start(e));
                }
                Event::Empty(e) if !done_calc && follows_calc_pr(&e) => {
                    done_calc = true;
                    out.push(Event::Empty(calc_pr()));
                    out.push(Event::Empty(e));
                }
                Event::End(e) if !done_calc && e.local_name().as_ref() == b"workbook" => {
                    done_calc = true;
                    out.push(Event::Empty(calc_pr()));
                    out.push(Event::End(e));
                }
                other => out.push(other),
            }
            let finished = out.is_empty();
            for event in out {
                writer.write_event(event).map_err(xml_err)?;
            }
            finished
        };
        buf.clear();
        if finished {
            break;
        }
    }

    Ok(writer.into_inner())
}

fn calc_pr() -> BytesStart<'static> {
    let mut e = BytesStart::new("calcPr");
    e.push_attribute(("fullCalcOnLoad", "1"));
    e
}

fn follows_calc_pr(e: &BytesStart) -> bool {
    AFTER_CALC_PR.contains(&e.local_name().as_ref())
}

/// Write `original` to a new package with some parts replaced.
///
/// Untouched parts are copied raw, without recompressing. Replaced parts
/// are written deflated.
pub fn write_package(original: &[u8], replacements: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>, String> {
    let mut archive =
        ZipArchive::new(Cursor::new(original)).map_err(|e| format!("Failed to read xlsx zip: {}", e))?;
    let missing: Vec<&str> = replacements
        .keys()
        .filter(|k| archive.index_for_name(k).is_none())
        .map(|k| k.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(format!("Parts not found in package: {}", missing.join(", ")));
    }

    let mut out = ZipWriter::new(Cursor::new(Vec::with_capacity(original.len() + 1024)));

    for i in 0..archive.len() {
        let file = archive
            .by_index_raw(i)
            .map_err(|e| format!("Failed to read zip entry {}: {}", i, e))?;
        let name = file.name().to_string();

        match replacements.get(&name) {
            Some(data) => {
                let mut opts =
                    SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
                if let Some(dt) = file.last_modified() {
                    opts = opts.last_modified_time(dt);
                }
                drop(file);
                out.start_file(name.as_str(), opts)
                    .map_err(|e| format!("Failed to write zip entry '{}': {}", name, e))?;
                out.write_all(data)
                    .map_err(|e| format!("Failed to write zip entry '{}': {}", name, e))?;
            }
            None => {
                out.raw_copy_file(file)
                    .map_err(|e| format!("Failed to copy zip entry '{}': {}", name, e))?;
            }
        }
    }

    let cursor = out.finish().map_err(|e| format!("Failed to finalize zip: {}", e))?;
    Ok(cursor.into_inner())
}
