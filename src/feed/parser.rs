use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::util::unescape_entities;

/// SEC-003: Maximum element nesting accepted in a feed document.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("document has no root element")]
    Empty,

    #[error("unexpected end of document inside <{0}>")]
    Truncated(String),

    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
}

impl From<quick_xml::Error> for ParseError {
    fn from(err: quick_xml::Error) -> Self {
        ParseError::Xml(err.to_string())
    }
}

/// An RSS channel as read off the wire, with free-text fields already
/// entity-decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<ParsedItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Raw `pubDate` text; not interpreted.
    pub pub_date: String,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    ChannelTitle,
    ChannelLink,
    ChannelDescription,
    ItemTitle,
    ItemLink,
    ItemDescription,
    ItemPubDate,
}

/// Maps an element path (root first) to the field it fills, if any.
///
/// The root element name is not checked, matching readers that accept both
/// `<rss>` and RSS 0.9x variants. Prefixed names such as `atom:link` never
/// match.
fn field_for(path: &[Vec<u8>]) -> Option<Field> {
    match path {
        [_, channel, name] if channel.as_slice() == b"channel" => match name.as_slice() {
            b"title" => Some(Field::ChannelTitle),
            b"link" => Some(Field::ChannelLink),
            b"description" => Some(Field::ChannelDescription),
            _ => None,
        },
        [_, channel, item, name] if channel.as_slice() == b"channel" && item.as_slice() == b"item" => {
            match name.as_slice() {
                b"title" => Some(Field::ItemTitle),
                b"link" => Some(Field::ItemLink),
                b"description" => Some(Field::ItemDescription),
                b"pubDate" => Some(Field::ItemPubDate),
                _ => None,
            }
        }
        _ => None,
    }
}

fn is_item(path: &[Vec<u8>]) -> bool {
    matches!(path, [_, channel, item] if channel.as_slice() == b"channel" && item.as_slice() == b"item")
}

/// Parses an RSS 2.0 document.
///
/// The whole body must be well-formed XML: syntax errors, mismatched or
/// missing end tags, unknown entities and invalid UTF-8 all fail. Text of the
/// channel title/description and of each item's title/description is
/// HTML-unescaped once after XML decoding; links and `pubDate` are kept
/// verbatim apart from trimming surrounding whitespace.
///
/// # Security
///
/// SEC-002: quick-xml (0.37) never expands `<!ENTITY>` declarations, so
/// external-entity payloads surface as unrecognized-entity errors.
pub fn parse_document(bytes: &[u8]) -> Result<ParsedFeedDocument, ParseError> {
    let content = std::str::from_utf8(bytes).map_err(|e| ParseError::Xml(e.to_string()))?;
    let mut reader = Reader::from_str(content);

    let mut document = ParsedFeedDocument::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut current_item: Option<ParsedItem> = None;
    let mut text = String::new();
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if path.is_empty() && seen_root {
                    return Err(ParseError::Xml("multiple root elements".to_string()));
                }
                seen_root = true;
                // Markup nested inside a field is skipped; the field keeps
                // its own character data on both sides of it.
                let inside_field = field_for(&path).is_some();
                path.push(e.name().as_ref().to_vec());
                if path.len() > MAX_DEPTH {
                    return Err(ParseError::MaxDepthExceeded(MAX_DEPTH));
                }
                if is_item(&path) {
                    current_item = Some(ParsedItem::default());
                }
                if !inside_field {
                    text.clear();
                }
            }
            Event::Empty(_) => {
                if path.is_empty() {
                    if seen_root {
                        return Err(ParseError::Xml("multiple root elements".to_string()));
                    }
                    seen_root = true;
                }
            }
            Event::Text(e) => {
                if field_for(&path).is_some() {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if field_for(&path).is_some() {
                    let raw = std::str::from_utf8(&e).map_err(|e| ParseError::Xml(e.to_string()))?;
                    text.push_str(raw);
                }
            }
            Event::End(_) => {
                if let Some(field) = field_for(&path) {
                    assign(&mut document, current_item.as_mut(), field, text.trim());
                    text.clear();
                }
                if is_item(&path) {
                    if let Some(item) = current_item.take() {
                        document.items.push(item);
                    }
                }
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = path.last() {
        return Err(ParseError::Truncated(
            String::from_utf8_lossy(open).into_owned(),
        ));
    }
    if !seen_root {
        return Err(ParseError::Empty);
    }

    Ok(document)
}

fn assign(
    document: &mut ParsedFeedDocument,
    item: Option<&mut ParsedItem>,
    field: Field,
    value: &str,
) {
    match (field, item) {
        (Field::ChannelTitle, _) => document.title = unescape_entities(value).into_owned(),
        (Field::ChannelLink, _) => document.link = value.to_string(),
        (Field::ChannelDescription, _) => {
            document.description = unescape_entities(value).into_owned()
        }
        (Field::ItemTitle, Some(item)) => item.title = unescape_entities(value).into_owned(),
        (Field::ItemLink, Some(item)) => item.link = value.to_string(),
        (Field::ItemDescription, Some(item)) => {
            item.description = unescape_entities(value).into_owned()
        }
        (Field::ItemPubDate, Some(item)) => item.pub_date = value.to_string(),
        (_, None) => {}
    }
}
