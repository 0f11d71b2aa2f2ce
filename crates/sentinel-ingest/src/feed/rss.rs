//! GDACS RSS items
//!
//! Items are streamed with `quick_xml::NsReader`, one `<item>` per iteration.
//! Fields are keyed on their namespace URI, not the prefix a feed happens to
//! bind, and stored under the canonical `gdacs:`/`geo:`/`georss:` names.
//! Only direct children of `<item>` (plus the children of `geo:Point`) are
//! read: GDACS nests `gdacs:resources` blocks with their own `title` and
//! `link` elements that must not shadow the item's.

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Reader};
use std::collections::HashMap;

use super::dates::DateParser;
use super::resolve_coordinates;
use crate::error::{IngestError, ItemError};
use crate::models::RawRecord;

const ROOT_ELEMENTS: [&[u8]; 3] = [b"rss", b"feed", b"rdf:RDF"];

/// Namespace URIs and the canonical prefix their fields are stored under
const NAMESPACES: [(&[u8], &str); 3] = [
    (b"http://www.gdacs.org", "gdacs"),
    (b"http://www.w3.org/2003/01/geo/wgs84_pos#", "geo"),
    (b"http://www.georss.org/georss", "georss"),
];

pub struct RssItems<'a> {
    reader: NsReader<&'a [u8]>,
    buf: Vec<u8>,
    dates: &'a DateParser,
    position: usize,
    finished: bool,
    truncated: bool,
}

enum Step {
    Item,
    Skip,
    Eof,
    Broken(String),
}

impl<'a> RssItems<'a> {
    pub(crate) fn new(bytes: &'a [u8], dates: &'a DateParser) -> Result<Self, IngestError> {
        check_root(bytes)?;

        let mut reader = NsReader::from_reader(bytes);
        reader.config_mut().trim_text(true);

        Ok(Self {
            reader,
            buf: Vec::new(),
            dates,
            position: 0,
            finished: false,
            truncated: false,
        })
    }

    /// True when the document stopped being readable before its end, so
    /// items after that point were never seen
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    fn read_item(&mut self) -> Result<RawRecord, ItemError> {
        let mut fields: HashMap<String, String> = HashMap::new();
        let mut open: Vec<String> = Vec::new();
        let mut bad_text: Option<String> = None;
        let mut buf = Vec::new();

        let failure = loop {
            buf.clear();
            match self.reader.read_resolved_event_into(&mut buf) {
                Ok((ns, Event::Start(e))) => {
                    open.push(canonical_name(ns, e.local_name().as_ref(), e.name().as_ref()));
                },
                Ok((_, Event::End(_))) => {
                    // Nothing open means this is </item>
                    if open.pop().is_none() {
                        break None;
                    }
                },
                Ok((_, Event::Text(text))) => {
                    if let Some(key) = field_key(&open) {
                        match text.unescape() {
                            Ok(value) => fields.entry(key.to_string()).or_default().push_str(&value),
                            // Keep reading to </item> so the next item starts clean
                            Err(e) => {
                                bad_text.get_or_insert_with(|| format!("<{}>: {}", key, e));
                            },
                        }
                    }
                },
                Ok((_, Event::CData(data))) => {
                    if let Some(key) = field_key(&open) {
                        let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        fields.entry(key.to_string()).or_default().push_str(&value);
                    }
                },
                Ok((_, Event::Eof)) => break Some("document ended inside <item>".to_string()),
                Ok(_) => {},
                Err(e) => break Some(e.to_string()),
            }
        };

        if let Some(message) = failure {
            return Err(self.broken(message));
        }

        if let Some(message) = bad_text {
            return Err(ItemError::Parse {
                position: self.position,
                message: format!("unreadable text in {}", message),
            });
        }

        build_record(&fields, self.position, self.dates)
    }

    /// The reader cannot continue: end the sequence and mark it truncated
    fn broken(&mut self, message: String) -> ItemError {
        self.finished = true;
        self.truncated = true;
        ItemError::Parse {
            position: self.position,
            message: format!(
                "XML error near byte {}: {}",
                self.reader.buffer_position(),
                message
            ),
        }
    }
}

impl Iterator for RssItems<'_> {
    type Item = Result<RawRecord, ItemError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.buf.clear();
            let step = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"item" => Step::Item,
                Ok(Event::Eof) => Step::Eof,
                Ok(_) => Step::Skip,
                Err(e) => Step::Broken(e.to_string()),
            };

            match step {
                Step::Item => {
                    self.position += 1;
                    return Some(self.read_item());
                },
                Step::Skip => continue,
                Step::Eof => self.finished = true,
                Step::Broken(message) => {
                    self.position += 1;
                    return Some(Err(self.broken(message)));
                },
            }
        }

        None
    }
}

/// The document must at least open with a feed root element
fn check_root(bytes: &[u8]) -> Result<(), IngestError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = e.name();
                return if ROOT_ELEMENTS.contains(&name.as_ref()) {
                    Ok(())
                } else {
                    Err(IngestError::Parse(format!(
                        "Unexpected root element <{}>",
                        String::from_utf8_lossy(name.as_ref())
                    )))
                };
            },
            Ok(Event::Eof) => {
                return Err(IngestError::Parse("XML document has no root element".to_string()))
            },
            Ok(_) => {},
            Err(e) => return Err(IngestError::Parse(format!("Invalid XML: {}", e))),
        }
    }
}

/// Map an element to the key its text is stored under.
///
/// Known namespaces get their canonical prefix whatever prefix the document
/// bound them to. Unbound names keep their local name. An undeclared prefix
/// is kept verbatim.
fn canonical_name(ns: ResolveResult<'_>, local: &[u8], qualified: &[u8]) -> String {
    let local = String::from_utf8_lossy(local);
    match ns {
        ResolveResult::Bound(Namespace(uri)) => {
            match NAMESPACES.iter().find(|(known, _)| *known == uri) {
                Some((_, prefix)) => format!("{}:{}", prefix, local),
                None => format!("{{{}}}{}", String::from_utf8_lossy(uri), local),
            }
        },
        ResolveResult::Unbound => local.into_owned(),
        ResolveResult::Unknown(_) => String::from_utf8_lossy(qualified).into_owned(),
    }
}

fn field_key(open: &[String]) -> Option<&str> {
    match open {
        [field] => Some(field.as_str()),
        [parent, field] if parent == "geo:Point" => Some(field.as_str()),
        _ => None,
    }
}

fn build_record(
    fields: &HashMap<String, String>,
    position: usize,
    dates: &DateParser,
) -> Result<RawRecord, ItemError> {
    let get = |key: &str| {
        fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };
    let owned = |key: &str| get(key).map(str::to_string);
    let date = |key: &str| get(key).and_then(|v| dates.parse(v));

    let event_id = get("gdacs:eventid").ok_or_else(|| ItemError::Validation {
        position,
        message: format!(
            "missing gdacs:eventid (title: {})",
            get("title").unwrap_or("unknown")
        ),
    })?;

    let coordinates = resolve_coordinates(get("geo:lat"), get("geo:long"), get("georss:point"));

    let mut record = RawRecord::new(event_id);
    record.title = owned("title");
    record.description = owned("description");
    record.link = owned("link");
    record.published_at = date("pubDate");
    record.from_date = date("gdacs:fromdate");
    record.to_date = date("gdacs:todate");
    record.latitude = coordinates.map(|c| c.0);
    record.longitude = coordinates.map(|c| c.1);
    record.event_type = owned("gdacs:eventtype");
    record.alert_level = owned("gdacs:alertlevel");
    record.severity = owned("gdacs:severity");
    record.population_estimate = owned("gdacs:population");
    record.country = owned("gdacs:country");
    record.country_code = owned("gdacs:iso3");
    record.is_current_in_feed = get("gdacs:iscurrent").is_some_and(|v| v.eq_ignore_ascii_case("true"));

    Ok(record)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:geo="http://www.w3.org/2003/01/geo/wgs84_pos#"
     xmlns:gdacs="http://www.gdacs.org" xmlns:georss="http://www.georss.org/georss">
  <channel>
    <title>GDACS RSS information</title>
    <item>
      <title>Red earthquake alert in India</title>
      <description>An earthquake of magnitude 6.1 &amp; depth 10km</description>
      <link>https://www.gdacs.org/report.aspx?eventid=123&amp;eventtype=EQ</link>
      <pubDate>Wed, 16 Oct 2024 06:33:09 GMT</pubDate>
      <gdacs:fromdate>Wed, 16 Oct 2024 06:00:00 GMT</gdacs:fromdate>
      <gdacs:todate>not a date</gdacs:todate>
      <geo:Point>
        <geo:lat>28.6</geo:lat>
        <geo:long>77.2</geo:long>
      </geo:Point>
      <georss:point>1.0 2.0</georss:point>
      <gdacs:eventtype>EQ</gdacs:eventtype>
      <gdacs:alertlevel>Red</gdacs:alertlevel>
      <gdacs:severity unit="M" value="6.1">Magnitude 6.1M, Depth:10km</gdacs:severity>
      <gdacs:population unit="" value="120000">120 thousand (in MMI&gt;=VII)</gdacs:population>
      <gdacs:country>India</gdacs:country>
      <gdacs:iso3>IND</gdacs:iso3>
      <gdacs:eventid>EQ123</gdacs:eventid>
      <gdacs:iscurrent>true</gdacs:iscurrent>
      <gdacs:resources>
        <gdacs:resource id="overview">
          <gdacs:title>Overview map</gdacs:title>
          <gdacs:link>https://www.gdacs.org/map.png</gdacs:link>
        </gdacs:resource>
      </gdacs:resources>
    </item>
    <item>
      <title>Item without id</title>
      <gdacs:country>India</gdacs:country>
    </item>
    <item>
      <title><![CDATA[Flood in Assam]]></title>
      <georss:point>26.2 92.9</georss:point>
      <gdacs:eventid>FL77</gdacs:eventid>
      <gdacs:iscurrent>False</gdacs:iscurrent>
      <gdacs:cap/>
    </item>
  </channel>
</rss>"#;

    fn parse_all(xml: &str) -> Vec<Result<RawRecord, ItemError>> {
        let dates = DateParser::default();
        RssItems::new(xml.as_bytes(), &dates).unwrap().collect()
    }

    #[test]
    fn test_full_item_is_normalized() {
        let items = parse_all(FEED);
        assert_eq!(items.len(), 3);

        let eq = items[0].as_ref().unwrap();
        assert_eq!(eq.event_id, "EQ123");
        assert_eq!(eq.title.as_deref(), Some("Red earthquake alert in India"));
        assert_eq!(
            eq.description.as_deref(),
            Some("An earthquake of magnitude 6.1 & depth 10km")
        );
        assert_eq!(
            eq.link.as_deref(),
            Some("https://www.gdacs.org/report.aspx?eventid=123&eventtype=EQ")
        );
        assert_eq!(
            eq.published_at,
            Some(Utc.with_ymd_and_hms(2024, 10, 16, 6, 33, 9).unwrap())
        );
        assert_eq!(
            eq.from_date,
            Some(Utc.with_ymd_and_hms(2024, 10, 16, 6, 0, 0).unwrap())
        );
        assert_eq!(eq.to_date, None);
        assert_eq!(eq.coordinates(), Some((28.6, 77.2)));
        assert_eq!(eq.alert_level.as_deref(), Some("Red"));
        assert_eq!(eq.severity.as_deref(), Some("Magnitude 6.1M, Depth:10km"));
        assert_eq!(eq.population_estimate.as_deref(), Some("120 thousand (in MMI>=VII)"));
        assert_eq!(eq.country_code.as_deref(), Some("IND"));
        assert!(eq.is_current_in_feed);
    }

    #[test]
    fn test_missing_event_id_is_a_validation_error() {
        let items = parse_all(FEED);
        match &items[1] {
            Err(ItemError::Validation { position, message }) => {
                assert_eq!(*position, 2);
                assert!(message.contains("Item without id"));
            },
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_point_fallback_and_cdata() {
        let items = parse_all(FEED);
        let flood = items[2].as_ref().unwrap();
        assert_eq!(flood.event_id, "FL77");
        assert_eq!(flood.title.as_deref(), Some("Flood in Assam"));
        assert_eq!(flood.coordinates(), Some((26.2, 92.9)));
        assert!(!flood.is_current_in_feed);
    }

    #[test]
    fn test_parse_is_restartable() {
        let dates = DateParser::default();
        let first: Vec<_> = RssItems::new(FEED.as_bytes(), &dates).unwrap().collect();
        let second: Vec<_> = RssItems::new(FEED.as_bytes(), &dates).unwrap().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_syntax_error_ends_sequence_after_good_items() {
        let xml = r#"<rss><channel>
            <item><gdacs:eventid>1</gdacs:eventid></item>
            <item><gdacs:eventid>2</gdacs:eventid></oops>
            <item><gdacs:eventid>3</gdacs:eventid></item>
        </channel></rss>"#;

        let dates = DateParser::default();
        let mut items = RssItems::new(xml.as_bytes(), &dates).unwrap();
        let parsed: Vec<_> = items.by_ref().collect();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].as_ref().unwrap().event_id, "1");
        assert!(matches!(parsed[1], Err(ItemError::Parse { position: 2, .. })));
        assert!(items.truncated());
    }

    #[test]
    fn test_unknown_entity_skips_only_that_item() {
        let xml = r#"<rss xmlns:gdacs="http://www.gdacs.org"><channel>
            <item>
              <description>Heavy rain&nbsp;expected</description>
              <gdacs:eventid>A</gdacs:eventid>
            </item>
            <item><gdacs:eventid>B</gdacs:eventid></item>
        </channel></rss>"#;

        let dates = DateParser::default();
        let mut items = RssItems::new(xml.as_bytes(), &dates).unwrap();
        let parsed: Vec<_> = items.by_ref().collect();
        assert_eq!(parsed.len(), 2);
        match &parsed[0] {
            Err(ItemError::Parse { position, message }) => {
                assert_eq!(*position, 1);
                assert!(message.contains("description"), "{}", message);
            },
            other => panic!("expected parse error, got {:?}", other),
        }
        assert_eq!(parsed[1].as_ref().unwrap().event_id, "B");
        assert!(!items.truncated());
    }

    #[test]
    fn test_document_ending_inside_item_is_truncated() {
        let xml = "<rss><channel><item><gdacs:eventid>1</gdacs:eventid></item><item><title>cut";
        let dates = DateParser::default();
        let mut items = RssItems::new(xml.as_bytes(), &dates).unwrap();
        let parsed: Vec<_> = items.by_ref().collect();
        assert_eq!(parsed.len(), 2);
        assert!(parsed[1].is_err());
        assert!(items.truncated());
    }

    #[test]
    fn test_fields_resolve_by_namespace_uri() {
        let xml = r#"<rss xmlns:g="http://www.gdacs.org"
                         xmlns:pos="http://www.w3.org/2003/01/geo/wgs84_pos#"><channel>
            <item>
              <title>Cyclone near Odisha</title>
              <g:eventid>TC9</g:eventid>
              <g:iso3>IND</g:iso3>
              <g:iscurrent>true</g:iscurrent>
              <pos:Point><pos:lat>20.3</pos:lat><pos:long>85.8</pos:long></pos:Point>
              <ev:eventid xmlns:ev="http://example.org/other">wrong</ev:eventid>
            </item>
            <item>
              <eventid xmlns="http://www.gdacs.org">FL5</eventid>
            </item>
        </channel></rss>"#;

        let items = parse_all(xml);
        let tc = items[0].as_ref().unwrap();
        assert_eq!(tc.event_id, "TC9");
        assert_eq!(tc.title.as_deref(), Some("Cyclone near Odisha"));
        assert_eq!(tc.country_code.as_deref(), Some("IND"));
        assert_eq!(tc.coordinates(), Some((20.3, 85.8)));
        assert!(tc.is_current_in_feed);
        assert_eq!(items[1].as_ref().unwrap().event_id, "FL5");
    }

    #[test]
    fn test_non_feed_documents_are_rejected() {
        let dates = DateParser::default();
        assert!(RssItems::new(b"<html><body>maintenance</body></html>", &dates).is_err());
        assert!(RssItems::new(b"<?xml version=\"1.0\"?>", &dates).is_err());
    }

    #[test]
    fn test_empty_channel_yields_nothing() {
        assert!(parse_all("<rss><channel><title>x</title></channel></rss>").is_empty());
    }
}
