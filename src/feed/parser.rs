use quick_xml::events::{BytesText, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Maximum element nesting accepted in a feed document.
const MAX_XML_DEPTH: usize = 64;

/// Errors produced while turning a response body into an [`RssFeed`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not valid UTF-8 text.
    #[error("Feed is not valid UTF-8: {0}")]
    Encoding(String),
    /// The XML itself is malformed.
    #[error("XML parse error: {0}")]
    Xml(String),
    /// The document ended while elements were still open.
    #[error("Feed document ended unexpectedly")]
    UnexpectedEof,
    /// Well-formed XML, but not an RSS document.
    #[error("Not an RSS feed: no <channel> element")]
    MissingChannel,
    /// Nesting exceeded [`MAX_XML_DEPTH`].
    #[error("Feed nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
}

/// An RSS channel as fetched, before any normalization against the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<RssItem>,
}

/// One `<item>`. `pub_date` is the raw `<pubDate>` text; empty when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl Field {
    /// Qualified names are compared, so `<atom:link>` never matches `link`.
    fn from_tag(name: &[u8], in_item: bool) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            b"pubDate" if in_item => Some(Field::PubDate),
            _ => None,
        }
    }
}

/// Parse an RSS 2.0 document.
///
/// Only direct children of `<channel>` and `<item>` populate fields, so
/// nested elements such as `<image><title>` are ignored. Field text is
/// XML-unescaped, then HTML-entity-decoded (feeds routinely double-escape
/// titles), then trimmed. CDATA sections are taken verbatim before decoding.
///
/// # Errors
///
/// Fails with [`ParseError`] for non-UTF-8 bodies, malformed or truncated
/// XML, and documents that contain no `<channel>`.
pub fn parse_feed(bytes: &[u8]) -> Result<RssFeed, ParseError> {
    let content = std::str::from_utf8(bytes).map_err(|e| ParseError::Encoding(e.to_string()))?;

    // quick-xml 0.37 never expands <!ENTITY> declarations; unknown entities
    // fall through to the HTML decoder as literal text.
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut channel: Option<RssFeed> = None;
    let mut channel_depth: Option<usize> = None;
    let mut channel_closed = false;
    let mut item: Option<RssItem> = None;
    let mut item_depth: Option<usize> = None;
    let mut field: Option<(Field, usize)> = None;
    let mut text = String::new();
    let mut depth: usize = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                if depth > MAX_XML_DEPTH {
                    return Err(ParseError::MaxDepthExceeded(MAX_XML_DEPTH));
                }
                let name = e.name();
                let name = name.as_ref();

                if channel_depth.is_none() {
                    // Only the first <channel> is read
                    if !channel_closed && name == b"channel" {
                        channel = Some(RssFeed::default());
                        channel_depth = Some(depth);
                    }
                } else if item_depth.is_none()
                    && name == b"item"
                    && channel_depth.map(|d| d + 1) == Some(depth)
                {
                    item = Some(RssItem::default());
                    item_depth = Some(depth);
                } else if field.is_none() {
                    let parent = item_depth.or(channel_depth);
                    if parent.map(|d| d + 1) == Some(depth) {
                        if let Some(f) = Field::from_tag(name, item.is_some()) {
                            field = Some((f, depth));
                            text.clear();
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if field.is_some() {
                    text.push_str(&unescape_text(&e)?);
                }
            }
            Ok(Event::CData(e)) => {
                if field.is_some() {
                    let raw = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| ParseError::Xml(err.to_string()))?;
                    text.push_str(&raw);
                }
            }
            Ok(Event::End(_)) => {
                if let Some((f, d)) = field {
                    if d == depth {
                        let value = html_escape::decode_html_entities(text.trim()).trim().to_string();
                        match (item.as_mut(), channel.as_mut()) {
                            (Some(it), _) => it.set(f, value),
                            (None, Some(ch)) => ch.set(f, value),
                            (None, None) => {}
                        }
                        field = None;
                    }
                }
                if item_depth == Some(depth) {
                    if let (Some(it), Some(ch)) = (item.take(), channel.as_mut()) {
                        ch.items.push(it);
                    }
                    item_depth = None;
                }
                if channel_depth == Some(depth) {
                    channel_depth = None;
                    channel_closed = true;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::Xml(format!(
                    "{} (at byte {})",
                    e,
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(ParseError::UnexpectedEof);
    }

    channel.ok_or(ParseError::MissingChannel)
}

fn unescape_text(e: &BytesText<'_>) -> Result<String, ParseError> {
    match e.unescape() {
        Ok(s) => Ok(s.into_owned()),
        // HTML-only entities such as &nbsp; are not XML; keep them for the HTML decoder
        Err(_) => std::str::from_utf8(e)
            .map(str::to_owned)
            .map_err(|err| ParseError::Encoding(err.to_string())),
    }
}

impl RssFeed {
    fn set(&mut self, field: Field, value: String) {
        match field {
            Field::Title => self.title = value,
            Field::Link => self.link = value,
            Field::Description => self.description = value,
            Field::PubDate => {}
        }
    }
}

impl RssItem {
    fn set(&mut self, field: Field, value: String) {
        match field {
            Field::Title => self.title = value,
            Field::Link => self.link = value,
            Field::Description => self.description = value,
            Field::PubDate => self.pub_date = value,
        }
    }
}
