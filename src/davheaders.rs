//! Typed versions of the webdav request/response headers.

use http::header::{HeaderName, HeaderValue};

use crate::ls::DavTimeout;

lazy_static! {
    static ref DEPTH: HeaderName = HeaderName::from_static("depth");
    static ref DESTINATION: HeaderName = HeaderName::from_static("destination");
    static ref IF: HeaderName = HeaderName::from_static("if");
    static ref LOCK_TOKEN: HeaderName = HeaderName::from_static("lock-token");
    static ref OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
    static ref TIMEOUT: HeaderName = HeaderName::from_static("timeout");
    static ref X_LITMUS: HeaderName = HeaderName::from_static("x-litmus");
}

fn one_str<'i>(
    values: &mut impl Iterator<Item = &'i HeaderValue>,
) -> Result<&'i str, headers::Error> {
    values
        .next()
        .and_then(|v| v.to_str().ok())
        .ok_or_else(headers::Error::invalid)
}

/// Depth: header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl headers::Header for Depth {
    fn name() -> &'static HeaderName {
        &DEPTH
    }

    fn decode<'i, I: Iterator<Item = &'i HeaderValue>>(values: &mut I) -> Result<Self, headers::Error> {
        match one_str(values)?.trim() {
            "0" => Ok(Depth::Zero),
            "1" => Ok(Depth::One),
            s if s.eq_ignore_ascii_case("infinity") => Ok(Depth::Infinity),
            _ => Err(headers::Error::invalid()),
        }
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let s = match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        };
        values.extend(Some(HeaderValue::from_static(s)));
    }
}

/// Timeout: header (RFC4918 #10.7).
///
/// The value is a comma separated list; the first entry we recognize
/// wins. A value without any recognizable entry is a decode error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeout(pub DavTimeout);

impl headers::Header for Timeout {
    fn name() -> &'static HeaderName {
        &TIMEOUT
    }

    fn decode<'i, I: Iterator<Item = &'i HeaderValue>>(values: &mut I) -> Result<Self, headers::Error> {
        for entry in one_str(values)?.split(',') {
            let entry = entry.trim();
            if entry.eq_ignore_ascii_case("infinite") {
                return Ok(Timeout(DavTimeout::Infinite));
            }
            if entry.len() > 7 && entry[..7].eq_ignore_ascii_case("second-") {
                if let Ok(secs) = entry[7..].parse::<u64>() {
                    return Ok(Timeout(DavTimeout::Seconds(secs)));
                }
            }
        }
        Err(headers::Error::invalid())
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(HeaderValue::from_str(&self.0.to_string()).ok());
    }
}

/// One `(...)` group of an If: header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfList {
    /// The `<uri>` resource tag in front of the group, if any.
    pub resource_tag: Option<String>,
    pub conditions: Vec<IfCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfCondition {
    pub negate: bool,
    pub item: IfItem,
    /// Whether a submitted lock token was found to name an actual lock.
    /// Always `false` straight out of the parser; the lock validation
    /// stage fills it in.
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfItem {
    Token(String),
    ETag(String),
}

/// If: header (RFC4918 #10.4), parsed into condition groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfHeader(pub Vec<IfList>);

fn parse_if(s: &str) -> Option<Vec<IfList>> {
    let mut lists = Vec::new();
    let mut resource_tag: Option<String> = None;
    let b = s.as_bytes();
    let mut i = 0;

    let scan = |b: &[u8], from: usize, until: u8| -> Option<usize> {
        (from..b.len()).find(|&j| b[j] == until)
    };

    while i < b.len() {
        match b[i] {
            b' ' | b'\t' => i += 1,
            b'<' => {
                let end = scan(b, i + 1, b'>')?;
                resource_tag = Some(s[i + 1..end].to_string());
                i = end + 1;
            }
            b'(' => {
                i += 1;
                let mut conditions = Vec::new();
                loop {
                    while i < b.len() && (b[i] == b' ' || b[i] == b'\t') {
                        i += 1;
                    }
                    match b.get(i)? {
                        b')' => {
                            i += 1;
                            break;
                        }
                        _ => {
                            let mut negate = false;
                            if b.len() >= i + 3 && b[i..i + 3].eq_ignore_ascii_case(b"not") {
                                negate = true;
                                i += 3;
                                while i < b.len() && (b[i] == b' ' || b[i] == b'\t') {
                                    i += 1;
                                }
                            }
                            let item = match b.get(i)? {
                                b'<' => {
                                    let end = scan(b, i + 1, b'>')?;
                                    let token = s[i + 1..end].to_string();
                                    i = end + 1;
                                    IfItem::Token(token)
                                }
                                b'[' => {
                                    let end = scan(b, i + 1, b']')?;
                                    let etag = s[i + 1..end].to_string();
                                    i = end + 1;
                                    IfItem::ETag(etag)
                                }
                                _ => return None,
                            };
                            conditions.push(IfCondition {
                                negate,
                                item,
                                valid: false,
                            });
                        }
                    }
                }
                if conditions.is_empty() {
                    return None;
                }
                lists.push(IfList {
                    resource_tag: resource_tag.clone(),
                    conditions,
                });
            }
            _ => return None,
        }
    }
    if lists.is_empty() {
        return None;
    }
    Some(lists)
}

impl headers::Header for IfHeader {
    fn name() -> &'static HeaderName {
        &IF
    }

    fn decode<'i, I: Iterator<Item = &'i HeaderValue>>(values: &mut I) -> Result<Self, headers::Error> {
        parse_if(one_str(values)?)
            .map(IfHeader)
            .ok_or_else(headers::Error::invalid)
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let mut out = String::new();
        for list in &self.0 {
            if let Some(tag) = &list.resource_tag {
                out.push_str(&format!("<{tag}> "));
            }
            out.push('(');
            for (n, c) in list.conditions.iter().enumerate() {
                if n > 0 {
                    out.push(' ');
                }
                if c.negate {
                    out.push_str("Not ");
                }
                match &c.item {
                    IfItem::Token(t) => out.push_str(&format!("<{t}>")),
                    IfItem::ETag(t) => out.push_str(&format!("[{t}]")),
                }
            }
            out.push_str(") ");
        }
        values.extend(HeaderValue::from_str(out.trim_end()).ok());
    }
}

/// Lock-Token: header, value kept as sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(pub String);

impl headers::Header for LockToken {
    fn name() -> &'static HeaderName {
        &LOCK_TOKEN
    }

    fn decode<'i, I: Iterator<Item = &'i HeaderValue>>(values: &mut I) -> Result<Self, headers::Error> {
        Ok(LockToken(one_str(values)?.trim().to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(HeaderValue::from_str(&self.0).ok());
    }
}

/// Destination: header, the raw url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination(pub String);

impl headers::Header for Destination {
    fn name() -> &'static HeaderName {
        &DESTINATION
    }

    fn decode<'i, I: Iterator<Item = &'i HeaderValue>>(values: &mut I) -> Result<Self, headers::Error> {
        Ok(Destination(one_str(values)?.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(HeaderValue::from_str(&self.0).ok());
    }
}

/// Overwrite: header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overwrite(pub bool);

impl headers::Header for Overwrite {
    fn name() -> &'static HeaderName {
        &OVERWRITE
    }

    fn decode<'i, I: Iterator<Item = &'i HeaderValue>>(values: &mut I) -> Result<Self, headers::Error> {
        match one_str(values)?.trim() {
            "T" => Ok(Overwrite(true)),
            "F" => Ok(Overwrite(false)),
            _ => Err(headers::Error::invalid()),
        }
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(Some(HeaderValue::from_static(if self.0 { "T" } else { "F" })));
    }
}

/// X-Litmus: header, logged when running the litmus test suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XLitmus(pub String);

impl headers::Header for XLitmus {
    fn name() -> &'static HeaderName {
        &X_LITMUS
    }

    fn decode<'i, I: Iterator<Item = &'i HeaderValue>>(values: &mut I) -> Result<Self, headers::Error> {
        Ok(XLitmus(one_str(values)?.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(HeaderValue::from_str(&self.0).ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use headers::{Header, HeaderMapExt};
    use http::HeaderMap;

    fn decode<T: Header>(value: &str) -> Result<T, headers::Error> {
        let v = HeaderValue::from_str(value).unwrap();
        let vals = [&v];
        let res = T::decode(&mut vals.into_iter());
        res
    }

    #[test]
    fn timeout_values() {
        assert_eq!(
            decode::<Timeout>("Second-100").unwrap(),
            Timeout(DavTimeout::Seconds(100))
        );
        // the first recognized entry wins.
        assert_eq!(
            decode::<Timeout>("infinite, Second-5").unwrap(),
            Timeout(DavTimeout::Infinite)
        );
        assert_eq!(
            decode::<Timeout>("garbage, Second-5").unwrap(),
            Timeout(DavTimeout::Seconds(5))
        );
        assert!(decode::<Timeout>("garbage").is_err());
        assert!(decode::<Timeout>("Second-").is_err());
    }

    #[test]
    fn depth_values() {
        assert_eq!(decode::<Depth>("0").unwrap(), Depth::Zero);
        assert_eq!(decode::<Depth>("Infinity").unwrap(), Depth::Infinity);
        assert!(decode::<Depth>("2").is_err());
    }

    #[test]
    fn if_header_untagged() {
        let h = decode::<IfHeader>("(<opaquelocktoken:x> [\"etag\"])").unwrap();
        assert_eq!(h.0.len(), 1);
        assert_eq!(h.0[0].resource_tag, None);
        assert_eq!(
            h.0[0].conditions[0].item,
            IfItem::Token("opaquelocktoken:x".to_string())
        );
        assert_eq!(h.0[0].conditions[1].item, IfItem::ETag("\"etag\"".to_string()));
    }

    #[test]
    fn if_header_tagged_and_negated() {
        let h = decode::<IfHeader>(
            "</dir> (Not <opaquelocktoken:a>) </file> (<opaquelocktoken:b>)",
        )
        .unwrap();
        assert_eq!(h.0.len(), 2);
        assert_eq!(h.0[0].resource_tag.as_deref(), Some("/dir"));
        assert!(h.0[0].conditions[0].negate);
        assert_eq!(h.0[1].resource_tag.as_deref(), Some("/file"));
        assert!(!h.0[1].conditions[0].negate);
    }

    #[test]
    fn if_header_garbage() {
        assert!(decode::<IfHeader>("lorem ipsum").is_err());
        assert!(decode::<IfHeader>("()").is_err());
        assert!(decode::<IfHeader>("(<unclosed)").is_err());
    }

    #[test]
    fn typed_roundtrip() {
        let mut map = HeaderMap::new();
        map.typed_insert(Depth::Infinity);
        map.typed_insert(Overwrite(false));
        assert_eq!(map.typed_get::<Depth>(), Some(Depth::Infinity));
        assert_eq!(map.typed_get::<Overwrite>(), Some(Overwrite(false)));
    }
}
