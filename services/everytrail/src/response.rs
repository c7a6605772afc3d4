use everytrail_core::{Error, Result};
use http::StatusCode;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use std::fmt::Debug;

/// Key holding the text content of an element.
pub const TEXT_KEY: &str = "_text";

/// ParseResponse turns a raw response body into a [`Response`].
///
/// Implementations must not return partially parsed documents: either the
/// whole body maps or a [`ErrorKind::FaultyResponse`](everytrail_core::ErrorKind::FaultyResponse)
/// error is returned.
pub trait ParseResponse: Debug + Send + Sync + 'static {
    /// Parse the raw response body.
    fn parse(&self, raw: &[u8]) -> Result<Response>;
}

/// Default XML mapper.
///
/// Every element becomes an object holding its attributes, its trimmed text
/// under `_text` and its children by tag name. Repeated children become arrays.
///
/// ```xml
/// <etTripResponse status="success"><trip id="1"><name>Ridge</name></trip></etTripResponse>
/// ```
///
/// maps to
///
/// ```json
/// {"etTripResponse": {"status": "success", "trip": {"id": "1", "name": {"_text": "Ridge"}}}}
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlParser;

impl ParseResponse for XmlParser {
    fn parse(&self, raw: &[u8]) -> Result<Response> {
        let mut reader = Reader::from_reader(raw);
        let mut buf = Vec::new();

        // Open elements: tag name, mapped content and collected text.
        let mut stack: Vec<(String, Map<String, Value>, String)> = Vec::new();
        let mut root: Option<(String, Value)> = None;

        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| {
                Error::faulty_response(format!(
                    "malformed XML at position {}: {e}",
                    reader.error_position()
                ))
                .with_source(e)
            })?;

            match event {
                Event::Start(e) => {
                    let name = tag_name(&e);
                    let attrs = attributes(&e)?;
                    stack.push((name, attrs, String::new()));
                }
                Event::Empty(e) => {
                    let name = tag_name(&e);
                    let element = Value::Object(attributes(&e)?);
                    attach(&mut stack, &mut root, name, element)?;
                }
                Event::End(_) => {
                    let Some((name, mut element, text)) = stack.pop() else {
                        return Err(Error::faulty_response("unexpected closing tag"));
                    };
                    let text = text.trim();
                    if !text.is_empty() {
                        element.insert(TEXT_KEY.to_string(), Value::String(text.to_string()));
                    }
                    attach(&mut stack, &mut root, name, Value::Object(element))?;
                }
                Event::Text(e) => {
                    if let Some((_, _, text)) = stack.last_mut() {
                        let unescaped = e.unescape().map_err(|err| {
                            Error::faulty_response("invalid escape in XML text").with_source(err)
                        })?;
                        text.push_str(&unescaped);
                    }
                }
                Event::CData(e) => {
                    if let Some((_, _, text)) = stack.last_mut() {
                        text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(Error::faulty_response("unexpected end of XML document"));
        }
        match root {
            Some((name, root)) => Ok(Response::new(name, root)),
            None => Err(Error::faulty_response("empty XML document")),
        }
    }
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_string()
}

fn attributes(e: &BytesStart<'_>) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for attr in e.attributes() {
        let attr = attr
            .map_err(|err| Error::faulty_response("invalid XML attribute").with_source(err))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| Error::faulty_response("invalid XML attribute value").with_source(err))?;
        map.insert(key, Value::String(value.to_string()));
    }
    Ok(map)
}

fn attach(
    stack: &mut [(String, Map<String, Value>, String)],
    root: &mut Option<(String, Value)>,
    name: String,
    element: Value,
) -> Result<()> {
    let Some((_, parent, _)) = stack.last_mut() else {
        if root.is_some() {
            return Err(Error::faulty_response("XML document has multiple roots"));
        }
        *root = Some((name, element));
        return Ok(());
    };

    match parent.get_mut(&name) {
        Some(Value::Array(items)) => items.push(element),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, element]);
        }
        None => {
            parent.insert(name, element);
        }
    }
    Ok(())
}

/// A parsed response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    name: String,
    root: Value,
}

impl Response {
    /// Create a response from its root element.
    pub fn new(name: impl Into<String>, root: Value) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    /// Tag name of the root element, like `etTripResponse`.
    pub fn root_name(&self) -> &str {
        &self.name
    }

    /// Mapped root element.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// The `status` attribute of the root element.
    pub fn status(&self) -> Option<&str> {
        self.root.get("status").and_then(Value::as_str)
    }

    /// Check if the service reported an error.
    pub fn is_error(&self) -> bool {
        self.status() == Some("error")
    }

    /// First error code reported by the service.
    pub fn error_code(&self) -> Option<i64> {
        self.text("errors/error")?.trim().parse().ok()
    }

    /// Look up a value by `/` separated path from the root element.
    ///
    /// Numeric segments index arrays, other segments applied to an array
    /// look into its first item.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.root, path)
    }

    /// Text of the value at `path`.
    pub fn text(&self, path: &str) -> Option<&str> {
        text_of(self.get(path)?)
    }

    /// Turn into the whole document mapping, `{root_name: root}`.
    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert(self.name, self.root);
        Value::Object(map)
    }

    /// Return an error if the service reported one.
    pub fn into_result(self) -> Result<Self> {
        if !self.is_error() {
            return Ok(self);
        }

        let code = self.error_code().unwrap_or(-100);
        let message = self
            .text("errors/error/message")
            .or_else(|| self.text("message"))
            .map(|m| format!("service returned error {code}: {m}"))
            .unwrap_or_else(|| format!("service returned error {code}"));
        Err(Error::service(code, message))
    }
}

/// Map a non-2xx status to an error.
pub(crate) fn check_status(status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::authentication(format!(
            "service rejected the credentials: {status}"
        ))),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Err(Error::timeout(
            format!("service timed out: {status}"),
        )),
        _ => Err(Error::connection(format!(
            "service returned unexpected status: {status}"
        ))),
    }
}

/// Look up a value by `/` separated path.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Array(items) => match segment.parse::<usize>() {
                Ok(idx) => items.get(idx),
                Err(_) => items.first()?.get(segment),
            },
            _ => current.get(segment),
        })
}

/// Text of a mapped value: strings as is, elements through `_text`.
pub(crate) fn text_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get(TEXT_KEY).and_then(Value::as_str),
        Value::Array(items) => items.first().and_then(text_of),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use everytrail_core::ErrorKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn test_parse_trip_response() -> Result<()> {
        let content = r#"<?xml version="1.0" encoding="UTF-8"?>
<etTripResponse status="success">
  <trip id="1042">
    <name>Ridge &amp; Valley</name>
    <pictures>
      <picture id="1"><caption>Summit</caption></picture>
      <picture id="2"/>
    </pictures>
    <notes><![CDATA[<b>windy</b>]]></notes>
  </trip>
</etTripResponse>"#;

        let resp = XmlParser.parse(content.as_bytes())?;
        assert_eq!(resp.root_name(), "etTripResponse");
        assert_eq!(resp.status(), Some("success"));
        assert!(!resp.is_error());
        assert_eq!(resp.text("trip/id"), Some("1042"));
        assert_eq!(resp.text("trip/name"), Some("Ridge & Valley"));
        assert_eq!(resp.text("trip/notes"), Some("<b>windy</b>"));
        assert_eq!(resp.text("trip/pictures/picture/1/id"), Some("2"));
        assert_eq!(resp.text("trip/pictures/picture/caption"), Some("Summit"));
        assert_eq!(
            resp.into_value(),
            json!({
                "etTripResponse": {
                    "status": "success",
                    "trip": {
                        "id": "1042",
                        "name": {"_text": "Ridge & Valley"},
                        "pictures": {
                            "picture": [
                                {"id": "1", "caption": {"_text": "Summit"}},
                                {"id": "2"}
                            ]
                        },
                        "notes": {"_text": "<b>windy</b>"}
                    }
                }
            })
        );
        Ok(())
    }

    #[test]
    fn test_service_error() {
        let content = r#"<etTripResponse status="error"><errors><error>11</error></errors></etTripResponse>"#;

        let resp = XmlParser.parse(content.as_bytes()).unwrap();
        assert!(resp.is_error());
        assert_eq!(resp.error_code(), Some(11));

        let err = resp.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Service);
        assert_eq!(err.code(), 11);
    }

    #[test_case(""; "empty body")]
    #[test_case("   \n"; "whitespace only")]
    #[test_case("<etTripResponse status=\"success\"><trip>"; "truncated")]
    #[test_case("<a></b>"; "mismatched tags")]
    #[test_case("<a/><b/>"; "multiple roots")]
    #[test_case("<a x=\"1\" x=\"2\"/>"; "duplicate attribute")]
    fn test_faulty_xml(content: &str) {
        let err = XmlParser.parse(content.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FaultyResponse);
    }
}
