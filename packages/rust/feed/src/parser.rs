//! RSS parser for the legislature's bill feed.
//!
//! Standard item fields map directly (`title`, `link`, `description`). The
//! bill-specific fields (`sessionyear`, `lsrtitle`, `latestcommittee`,
//! `housestatus`, `senatestatus`) are custom elements. They are looked up by
//! local name under any namespace prefix, or as plain unprefixed children of
//! `<item>`, which `rss` discards and a second `quick-xml` pass recovers.

use std::collections::HashMap;

use billtracker_shared::{BillTrackerError, FeedEntry, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use rss::{Channel, Item};

const CUSTOM_FIELDS: [&str; 5] = [
    "sessionyear",
    "lsrtitle",
    "latestcommittee",
    "housestatus",
    "senatestatus",
];

/// Unprefixed custom elements of one `<item>`, by local name.
type PlainFields = HashMap<&'static str, String>;

/// Parse a feed document into entries, in feed order.
///
/// Entries without a `sessionyear` element take `default_session_year`, the
/// year the feed was queried for.
pub(crate) fn parse_feed(xml: &str, default_session_year: &str) -> Result<Vec<FeedEntry>> {
    let channel = Channel::read_from(xml.as_bytes())
        .map_err(|e| BillTrackerError::parse(format!("invalid RSS feed: {e}")))?;
    let plain = plain_item_fields(xml)?;
    let none = PlainFields::new();

    Ok(channel
        .items()
        .iter()
        .enumerate()
        .map(|(i, item)| entry_from_item(item, plain.get(i).unwrap_or(&none), default_session_year))
        .collect())
}

fn entry_from_item(item: &Item, plain: &PlainFields, default_session_year: &str) -> FeedEntry {
    let owned = |value: Option<&str>| value.map(|v| v.trim().to_string());
    let custom = |name: &str| {
        extension_value(item, name).or_else(|| plain.get(name).map(|v| v.trim()))
    };

    FeedEntry {
        title: item.title().unwrap_or("").trim().to_string(),
        link: item.link().unwrap_or("").trim().to_string(),
        session_year: custom("sessionyear")
            .filter(|year| !year.is_empty())
            .unwrap_or(default_session_year)
            .to_string(),
        description: owned(item.description()),
        lsr_title: owned(custom("lsrtitle")),
        latest_committee: owned(custom("latestcommittee")),
        house_status: owned(custom("housestatus")),
        senate_status: owned(custom("senatestatus")),
    }
}

/// First text value of the extension element `name`, under any prefix.
fn extension_value<'a>(item: &'a Item, name: &str) -> Option<&'a str> {
    item.extensions()
        .values()
        .filter_map(|by_name| by_name.get(name))
        .flatten()
        .find_map(|ext| ext.value())
        .map(str::trim)
}

/// Collect unprefixed custom elements for every `<item>`, in document order.
///
/// Only direct children of an item count. The first occurrence of a name wins.
fn plain_item_fields(xml: &str) -> Result<Vec<PlainFields>> {
    let parse_err = |e: quick_xml::Error| BillTrackerError::parse(format!("invalid RSS feed: {e}"));

    let mut reader = Reader::from_str(xml);
    let mut items = Vec::new();
    let mut depth = 0usize;
    // Depth of the open <item>, its fields so far, and the field being read.
    let mut item_depth: Option<usize> = None;
    let mut fields = PlainFields::new();
    let mut current: Option<(&'static str, String)> = None;

    loop {
        match reader.read_event().map_err(parse_err)? {
            Event::Start(start) => {
                depth += 1;
                let name = start.name();
                let unprefixed = name.prefix().is_none();
                let local = name.local_name();

                match item_depth {
                    None if unprefixed && local.as_ref() == b"item" => {
                        item_depth = Some(depth);
                        fields = PlainFields::new();
                    }
                    Some(open) if depth == open + 1 && unprefixed => {
                        current = CUSTOM_FIELDS
                            .iter()
                            .find(|field| field.as_bytes() == local.as_ref())
                            .map(|field| (*field, String::new()));
                    }
                    _ => {}
                }
            }
            Event::Empty(empty) if item_depth.is_none() => {
                let name = empty.name();
                if name.prefix().is_none() && name.local_name().as_ref() == b"item" {
                    items.push(PlainFields::new());
                }
            }
            Event::End(_) => {
                if let Some(open) = item_depth {
                    if depth == open + 1 {
                        if let Some((name, value)) = current.take() {
                            fields.entry(name).or_insert(value);
                        }
                    } else if depth == open {
                        items.push(std::mem::take(&mut fields));
                        item_depth = None;
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(text) => {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(&text.unescape().map_err(parse_err)?);
                }
            }
            Event::CData(cdata) => {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(&String::from_utf8_lossy(&cdata.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}
