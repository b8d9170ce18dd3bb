//! Edits to the MPAS `streams.atmosphere` descriptor.
//!
//! Events are copied from reader to writer untouched except for the start
//! tag of the target stream, whose raw attribute text is patched in place so
//! the file keeps its one-attribute-per-line layout.

use crate::error::{CycleError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use regex::Regex;
use std::io::Cursor;
use std::path::Path;
use std::sync::OnceLock;

pub const DA_RESTART: &str = "da_restart";
const STREAM_TAG: &[u8] = b"stream";

static INTERVAL_RE: OnceLock<Regex> = OnceLock::new();

fn interval_re() -> &'static Regex {
    INTERVAL_RE.get_or_init(|| {
        Regex::new(r#"(\s)output_interval\s*=\s*("[^"]*"|'[^']*')"#).unwrap()
    })
}

fn xml_err(e: impl std::fmt::Display) -> CycleError {
    CycleError::Streams(e.to_string())
}

fn has_name(tag: &BytesStart<'_>, name: &str) -> Result<bool> {
    for attr in tag.attributes() {
        let attr = attr.map_err(xml_err)?;
        if attr.key.as_ref() == b"name" {
            return Ok(attr.unescape_value().map_err(xml_err)? == name);
        }
    }
    Ok(false)
}

fn with_interval(tag: &BytesStart<'_>, interval: &str) -> Result<BytesStart<'static>> {
    let raw = std::str::from_utf8(tag).map_err(xml_err)?;
    let name_len = tag.name().as_ref().len();
    let value = format!("\"{}\"", quick_xml::escape::escape(interval));
    let patched = if interval_re().is_match(raw) {
        interval_re()
            .replace(raw, |caps: &regex::Captures| {
                format!("{}output_interval={value}", &caps[1])
            })
            .into_owned()
    } else {
        format!("{} output_interval={value}", raw.trim_end())
    };
    Ok(BytesStart::from_content(patched, name_len))
}

/// Set `output_interval` on the top-level `<stream name="{stream}">` element.
///
/// Returns the new document and whether a matching stream was found. With
/// no match the document comes back unchanged.
pub fn patch_output_interval(xml: &str, stream: &str, interval: &str) -> Result<(String, bool)> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut depth = 0usize;
    let mut found = false;

    loop {
        let event = reader.read_event().map_err(xml_err)?;
        match event {
            Event::Eof => break,
            Event::Start(tag) => {
                let out = if depth == 1
                    && tag.name().as_ref() == STREAM_TAG
                    && has_name(&tag, stream)?
                {
                    found = true;
                    with_interval(&tag, interval)?
                } else {
                    tag.into_owned()
                };
                depth += 1;
                writer.write_event(Event::Start(out)).map_err(xml_err)?;
            }
            Event::Empty(tag) => {
                let out = if depth == 1
                    && tag.name().as_ref() == STREAM_TAG
                    && has_name(&tag, stream)?
                {
                    found = true;
                    with_interval(&tag, interval)?
                } else {
                    tag.into_owned()
                };
                writer.write_event(Event::Empty(out)).map_err(xml_err)?;
            }
            Event::End(tag) => {
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(tag)).map_err(xml_err)?;
            }
            other => writer.write_event(other).map_err(xml_err)?,
        }
    }

    let bytes = writer.into_inner().into_inner();
    let text = String::from_utf8(bytes).map_err(xml_err)?;
    Ok((text, found))
}

/// Patch the `da_restart` stream of `src` and write the result to `dst`.
pub fn write_patched_streams(src: &Path, dst: &Path, interval: &str) -> Result<bool> {
    let xml = std::fs::read_to_string(src)?;
    let (patched, found) = patch_output_interval(&xml, DA_RESTART, interval)?;
    if found {
        tracing::debug!(interval, "set da_restart output_interval");
    } else {
        tracing::warn!(src = %src.display(), "no da_restart stream; descriptor copied unchanged");
    }
    crate::io::atomic_write(dst, patched.as_bytes())?;
    Ok(found)
}
