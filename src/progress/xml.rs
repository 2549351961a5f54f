// src/progress/xml.rs

//! Streaming parser for the XML progress protocol modules print on stdout.
//!
//! Recognised elements (whitespace and line breaks inside them are fine):
//!
//! ```text
//! <filter-start><filter-name>Blur</filter-name><filter-comment>..</filter-comment></filter-start>
//! <filter-start name="Blur"/>
//! <filter-progress>0.5</filter-progress>
//! <filter-progress progress="0.5"/>
//! <filter-end><filter-name>Blur</filter-name><filter-time>12</filter-time></filter-end>
//! <filter-end name="Blur"/>
//! ```
//!
//! Anything outside a `<filter-...>` element is ordinary program output and is
//! skipped. Text can arrive in arbitrary chunks; incomplete elements are kept
//! until the rest shows up.

use std::sync::LazyLock;

use regex::Regex;

use super::ProgressEvent;

const ELEMENT_PREFIX: &str = "<filter-";

/// Upper bound on buffered text for a single unterminated element.
pub const MAX_PENDING_BYTES: usize = 64 * 1024;

static ELEMENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<(filter-[A-Za-z-]+)").expect("valid regex"));
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*"([^"]*)""#).expect("valid regex")
});
static FILTER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<filter-name>(.*?)</filter-name>").expect("valid regex"));
static FILTER_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<filter-comment>(.*?)</filter-comment>").expect("valid regex")
});

/// Incremental parser; one instance per task.
#[derive(Debug, Default)]
pub struct XmlProgressParser {
    buffer: String,
}

impl XmlProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of stdout and return every event completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<ProgressEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        loop {
            let Some(start) = self.buffer.find(ELEMENT_PREFIX) else {
                self.keep_possible_prefix();
                break;
            };
            self.buffer.drain(..start);

            match self.next_element() {
                Scan::Complete { consumed, event } => {
                    self.buffer.drain(..consumed);
                    events.push(event);
                }
                Scan::Incomplete => {
                    if self.buffer.len() > MAX_PENDING_BYTES {
                        events.push(ProgressEvent::Error {
                            message: format!(
                                "unterminated progress element exceeds {MAX_PENDING_BYTES} bytes; discarding"
                            ),
                        });
                        // Skip past this element start and keep scanning.
                        self.buffer.drain(..ELEMENT_PREFIX.len());
                        continue;
                    }
                    break;
                }
            }
        }

        events
    }

    /// Signal end of output. Any half-written element is reported.
    pub fn finish(&mut self) -> Option<ProgressEvent> {
        let pending = std::mem::take(&mut self.buffer);
        if pending.trim_start().starts_with(ELEMENT_PREFIX) {
            Some(ProgressEvent::Error {
                message: format!("output ended inside a progress element: {}", pending.trim()),
            })
        } else {
            None
        }
    }

    /// Number of bytes currently buffered.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop plain output but keep a tail that could still grow into
    /// `<filter-`.
    fn keep_possible_prefix(&mut self) {
        let keep_from = self
            .buffer
            .rfind('<')
            .filter(|&idx| ELEMENT_PREFIX.starts_with(&self.buffer[idx..]));
        match keep_from {
            Some(idx) => {
                self.buffer.drain(..idx);
            }
            None => self.buffer.clear(),
        }
    }

    /// Scan the element at the start of the buffer.
    fn next_element(&self) -> Scan {
        let buf = self.buffer.as_str();
        let Some(caps) = ELEMENT_NAME.captures(buf) else {
            if buf.len() == ELEMENT_PREFIX.len() {
                return Scan::Incomplete;
            }
            return Scan::Complete {
                consumed: ELEMENT_PREFIX.len(),
                event: ProgressEvent::Error {
                    message: "malformed progress element name".to_string(),
                },
            };
        };
        let name = caps[1].to_string();
        let after_name = caps[0].len();

        // The name is only known once a delimiter follows it.
        let Some(delim) = buf[after_name..].chars().next() else {
            return Scan::Incomplete;
        };
        if !(delim == '>' || delim == '/' || delim.is_whitespace()) {
            let consumed = after_name;
            return Scan::Complete {
                consumed,
                event: ProgressEvent::Error {
                    message: format!("malformed progress element near '{}'", &buf[..consumed]),
                },
            };
        }

        let Some(tag_end) = buf.find('>') else {
            return Scan::Incomplete;
        };
        let open_tag = &buf[after_name..tag_end];

        if open_tag.trim_end().ends_with('/') {
            let attrs = parse_attributes(open_tag.trim_end().trim_end_matches('/'));
            return Scan::Complete {
                consumed: tag_end + 1,
                event: element_from_attributes(&name, &attrs),
            };
        }

        let close = format!("</{name}>");
        let Some(close_at) = buf[tag_end + 1..].find(&close) else {
            return Scan::Incomplete;
        };
        let body_end = tag_end + 1 + close_at;
        let body = &buf[tag_end + 1..body_end];
        let attrs = parse_attributes(open_tag);

        Scan::Complete {
            consumed: body_end + close.len(),
            event: element_from_body(&name, &attrs, body),
        }
    }
}

enum Scan {
    Complete { consumed: usize, event: ProgressEvent },
    Incomplete,
}

fn parse_attributes(tag: &str) -> Vec<(String, String)> {
    ATTRIBUTE
        .captures_iter(tag)
        .map(|c| (c[1].to_string(), unescape(&c[2])))
        .collect()
}

fn attribute<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn element_from_attributes(name: &str, attrs: &[(String, String)]) -> ProgressEvent {
    match name {
        "filter-start" => ProgressEvent::Started {
            name: attribute(attrs, "name").unwrap_or_default().to_string(),
            comment: attribute(attrs, "comment").unwrap_or_default().to_string(),
        },
        "filter-end" => ProgressEvent::Finished {
            name: attribute(attrs, "name").unwrap_or_default().to_string(),
        },
        "filter-progress" => match attribute(attrs, "progress") {
            Some(raw) => parse_fraction(raw),
            None => ProgressEvent::Error {
                message: "filter-progress element without a progress value".to_string(),
            },
        },
        other => unexpected_element(other),
    }
}

fn element_from_body(name: &str, attrs: &[(String, String)], body: &str) -> ProgressEvent {
    match name {
        "filter-start" => ProgressEvent::Started {
            name: nested(&FILTER_NAME, body)
                .or_else(|| attribute(attrs, "name").map(str::to_string))
                .unwrap_or_default(),
            comment: nested(&FILTER_COMMENT, body)
                .or_else(|| attribute(attrs, "comment").map(str::to_string))
                .unwrap_or_default(),
        },
        "filter-end" => ProgressEvent::Finished {
            name: nested(&FILTER_NAME, body)
                .or_else(|| attribute(attrs, "name").map(str::to_string))
                .unwrap_or_default(),
        },
        "filter-progress" => match attribute(attrs, "progress") {
            Some(raw) if body.trim().is_empty() => parse_fraction(raw),
            _ => parse_fraction(body),
        },
        other => unexpected_element(other),
    }
}

fn nested(re: &Regex, body: &str) -> Option<String> {
    re.captures(body).map(|c| unescape(c[1].trim()))
}

fn parse_fraction(raw: &str) -> ProgressEvent {
    match raw.trim().parse::<f64>() {
        Ok(fraction) if fraction.is_finite() => ProgressEvent::Progress { fraction },
        Ok(_) => ProgressEvent::Error {
            message: format!("non-finite progress value '{}'", raw.trim()),
        },
        Err(e) => ProgressEvent::Error {
            message: format!("invalid progress value '{}': {e}", raw.trim()),
        },
    }
}

fn unexpected_element(name: &str) -> ProgressEvent {
    ProgressEvent::Error {
        message: format!("unexpected progress element <{name}>"),
    }
}

fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
