//! Bus topic shapes
//!
//! All topics are scoped to one device's broker. Parsing uses fixed-arity
//! segment patterns; anything that does not match a known shape is `None`.
//!
//! | Topic | Retained | Payload |
//! |-------|----------|---------|
//! | `component/by_id/<id>/info` | yes | definition |
//! | `component/by_id/<id>` | no | bare value |
//! | `component/by_class/<class>/<id>/info` | yes | definition |
//! | `component/by_class/<class>/<id>` | no | bare value |
//! | `read/<group>/<class>/<id>` | no | (request) |
//! | `write/<id>` | no | bare value |
//! | `log/<level>[/<process_id>]` | no | message |

use std::fmt;

use wildmatch::WildMatch;

/// Severity for the `log/...` fan-out topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(LogLevel::Info),
            "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// A parsed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    /// Retained definition addressed by id
    Info { id: String },
    /// Value addressed by id
    Value { id: String },
    /// Retained definition under the class prefix
    ClassInfo { class: String, id: String },
    /// Value under the class prefix
    ClassValue { class: String, id: String },
    /// Front-end read request; any segment may be `+`
    Read { group: String, class: String, id: String },
    /// Front-end write request
    Write { id: String },
    /// Log fan-out
    Log { level: LogLevel, process: Option<String> },
}

impl Topic {
    pub fn info(id: &str) -> Self {
        Topic::Info { id: id.to_string() }
    }

    pub fn value(id: &str) -> Self {
        Topic::Value { id: id.to_string() }
    }

    pub fn write(id: &str) -> Self {
        Topic::Write { id: id.to_string() }
    }

    /// Parse a concrete topic string
    pub fn parse(topic: &str) -> Option<Self> {
        fn owned(s: &str) -> String {
            s.to_string()
        }

        let segments: Vec<&str> = topic.split('/').collect();

        match segments.as_slice() {
            ["component", "by_id", id, "info"] => Some(Topic::Info { id: owned(id) }),
            ["component", "by_id", id] => Some(Topic::Value { id: owned(id) }),
            ["component", "by_class", class, id, "info"] => Some(Topic::ClassInfo {
                class: owned(class),
                id: owned(id),
            }),
            ["component", "by_class", class, id] => Some(Topic::ClassValue {
                class: owned(class),
                id: owned(id),
            }),
            ["read", group, class, id] => Some(Topic::Read {
                group: owned(group),
                class: owned(class),
                id: owned(id),
            }),
            ["write", id] => Some(Topic::Write { id: owned(id) }),
            ["log", level] => LogLevel::parse(level).map(|level| Topic::Log {
                level,
                process: None,
            }),
            ["log", level, process @ ..] if !process.is_empty() => {
                LogLevel::parse(level).map(|level| Topic::Log {
                    level,
                    process: Some(process.join("/")),
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Info { id } => write!(f, "component/by_id/{}/info", id),
            Topic::Value { id } => write!(f, "component/by_id/{}", id),
            Topic::ClassInfo { class, id } => write!(f, "component/by_class/{}/{}/info", class, id),
            Topic::ClassValue { class, id } => write!(f, "component/by_class/{}/{}", class, id),
            Topic::Read { group, class, id } => write!(f, "read/{}/{}/{}", group, class, id),
            Topic::Write { id } => write!(f, "write/{}", id),
            Topic::Log { level, process: None } => write!(f, "log/{}", level.as_str()),
            Topic::Log {
                level,
                process: Some(p),
            } => write!(f, "log/{}/{}", level.as_str(), p),
        }
    }
}

/// Subscription pattern covering every topic about one id
pub fn id_pattern(id: &str) -> String {
    format!("component/by_id/{}/#", id)
}

/// Subscription pattern covering every topic about one class
pub fn class_pattern(class: &str) -> String {
    format!("component/by_class/{}/#", class)
}

/// Check a pattern is well formed: `#` only as the last segment, `+` only
/// as a whole segment.
pub fn valid_pattern(pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    let segments: Vec<&str> = pattern.split('/').collect();
    let last = segments.len() - 1;
    segments.iter().enumerate().all(|(i, s)| {
        (*s == "#" && i == last) || *s == "+" || !(s.contains('#') || s.contains('+'))
    })
}

/// Check if a topic matches a pattern (MQTT-style wildcards)
///
/// Examples:
///   topic: "component/by_id/temp"
///   pattern: "component/+/temp"      -> matches (+ is one level)
///   pattern: "component/#"           -> matches (# is the rest, including none)
///   pattern: "component/by_id/te*"   -> matches (segment glob)
pub fn topic_matches(topic: &str, pattern: &str) -> bool {
    let mut topic_segments = topic.split('/');

    for p in pattern.split('/') {
        match p {
            "#" => return true,
            "+" => {
                if topic_segments.next().is_none() {
                    return false;
                }
            }
            literal => match topic_segments.next() {
                Some(t) if literal.contains('*') || literal.contains('?') => {
                    if !WildMatch::new(literal).matches(t) {
                        return false;
                    }
                }
                Some(t) if t == literal => {}
                _ => return false,
            },
        }
    }

    topic_segments.next().is_none()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matching() {
        assert!(topic_matches("component/by_id/temp", "component/by_id/temp"));
        assert!(topic_matches("component/by_id/temp", "component/+/temp"));
        assert!(topic_matches("component/by_id/temp/info", "component/#"));
        assert!(topic_matches("component/by_id/temp", "component/by_id/temp/#"));
        assert!(topic_matches("component/by_id/temp/info", "component/by_id/temp/#"));
        assert!(topic_matches("component/by_id/temp_1", "component/by_id/temp_*"));
        assert!(!topic_matches("component/by_id/temp/info", "component/by_id/+"));
        assert!(!topic_matches("component/by_id/temp", "component/by_class/#"));
        assert!(!topic_matches("component/by_id", "component/by_id/+"));
        assert!(!topic_matches("component/by_id/temperature", "component/by_id/temp/#"));
    }

    #[test]
    fn test_parse_fixed_arity_shapes() {
        assert_eq!(
            Topic::parse("component/by_id/boiler/info"),
            Some(Topic::info("boiler"))
        );
        assert_eq!(Topic::parse("component/by_id/boiler"), Some(Topic::value("boiler")));
        assert_eq!(
            Topic::parse("component/by_class/temperature/boiler"),
            Some(Topic::ClassValue {
                class: "temperature".into(),
                id: "boiler".into()
            })
        );
        assert_eq!(
            Topic::parse("read/still/temperature/+"),
            Some(Topic::Read {
                group: "still".into(),
                class: "temperature".into(),
                id: "+".into()
            })
        );
        assert_eq!(Topic::parse("write/heater"), Some(Topic::write("heater")));
        assert_eq!(
            Topic::parse("log/error/processes/still"),
            Some(Topic::Log {
                level: LogLevel::Error,
                process: Some("processes/still".into())
            })
        );
        assert_eq!(Topic::parse("log/debug"), None);
        assert_eq!(Topic::parse("write/a/b"), None);
    }

    #[test]
    fn test_display_round_trips() {
        for topic in [
            Topic::info("x"),
            Topic::value("x"),
            Topic::write("x"),
            Topic::ClassInfo {
                class: "relay".into(),
                id: "x".into(),
            },
            Topic::Log {
                level: LogLevel::Warning,
                process: None,
            },
        ] {
            assert_eq!(Topic::parse(&topic.to_string()), Some(topic));
        }
    }

    #[test]
    fn test_pattern_validation() {
        assert!(valid_pattern("component/by_id/+/info"));
        assert!(valid_pattern("component/#"));
        assert!(!valid_pattern("component/#/info"));
        assert!(!valid_pattern("component/by_id/te+mp"));
        assert!(!valid_pattern(""));
    }
}
