use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

const ACTOR_DELIMITER: char = '#';

/// A compound actor reference such as `"42#Alice"`: a short identifier and a
/// display label carried in one field by the source tool.
///
/// Both facets always come from the same parse. Absent actors (unassigned
/// tickets and the like) decode to an empty reference rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ActorRef {
    id: String,
    name: String,
}

impl ActorRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// `"<id>#<name>"` splits at the first delimiter; input without a
    /// delimiter is all name; empty or `None` input is an empty reference.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Self::default();
        };
        match raw.split_once(ACTOR_DELIMITER) {
            Some((id, name)) => Self::new(id.trim(), name.trim()),
            None => Self::new("", raw),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.name.is_empty()
    }

    pub fn into_parts(self) -> (String, String) {
        (self.id, self.name)
    }
}

impl FromStr for ActorRef {
    type Err = Infallible;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(Some(input)))
    }
}

/// Renders the form [`ActorRef::parse`] reads back: a bare name, or
/// `id#name`. A name containing the delimiter keeps a leading `#` so it is
/// not mistaken for an id.
impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() && !self.name.contains(ACTOR_DELIMITER) {
            f.write_str(&self.name)
        } else {
            write!(f, "{}{ACTOR_DELIMITER}{}", self.id, self.name)
        }
    }
}

impl Serialize for ActorRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ActorRepr {
    Compound(String),
    Object(ActorObject),
}

#[derive(Deserialize)]
struct ActorObject {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    realname: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl ActorObject {
    fn into_actor(self) -> ActorRef {
        let id = match self.id {
            Some(Value::String(id)) => id,
            Some(Value::Number(id)) => id.to_string(),
            _ => self.account.clone().unwrap_or_default(),
        };
        let name = self
            .realname
            .filter(|name| !name.trim().is_empty())
            .or(self.name)
            .or(self.account)
            .unwrap_or_default();
        ActorRef::new(id.trim(), name.trim())
    }
}

impl<'de> Deserialize<'de> for ActorRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = Option::<ActorRepr>::deserialize(deserializer)?;
        Ok(match repr {
            None => ActorRef::default(),
            Some(ActorRepr::Compound(raw)) => ActorRef::parse(Some(&raw)),
            Some(ActorRepr::Object(object)) => object.into_actor(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_id_and_name() {
        let actor = ActorRef::parse(Some("42#Alice"));
        assert_eq!(actor.id(), "42");
        assert_eq!(actor.name(), "Alice");
    }

    #[test]
    fn empty_or_missing_input_is_empty_actor() {
        assert_eq!(ActorRef::parse(Some("")), ActorRef::new("", ""));
        assert_eq!(ActorRef::parse(None), ActorRef::new("", ""));
        assert!(ActorRef::parse(Some("   ")).is_empty());
    }

    #[test]
    fn missing_delimiter_means_name_only() {
        assert_eq!(ActorRef::parse(Some("Alice")), ActorRef::new("", "Alice"));
    }

    #[test]
    fn splits_on_first_delimiter_only() {
        let actor: ActorRef = "7#Team #2".parse().expect("infallible");
        assert_eq!(actor, ActorRef::new("7", "Team #2"));
    }

    #[test]
    fn display_reencodes_compound_form() {
        assert_eq!(ActorRef::new("42", "Alice").to_string(), "42#Alice");
        assert_eq!(ActorRef::new("", "Alice").to_string(), "Alice");
        assert_eq!(ActorRef::default().to_string(), "");
    }

    #[test]
    fn name_with_delimiter_reads_back_unchanged() {
        let actor = ActorRef::new("", "a#b");
        assert_eq!(actor.to_string(), "#a#b");
        assert_eq!(actor.to_string().parse::<ActorRef>().expect("infallible"), actor);

        let rendered = serde_json::to_string(&actor).expect("encode");
        assert_eq!(rendered, r##""#a#b""##);
        let decoded: ActorRef = serde_json::from_str(&rendered).expect("decode");
        assert_eq!(decoded, actor);
    }

    #[test]
    fn deserializes_null_string_and_object_forms() {
        let actors: Vec<ActorRef> = serde_json::from_str(
            r#"[null, "", "42#Alice", "Bob", {"id": 7, "account": "carol", "realname": "Carol"}, {"account": "dave"}]"#,
        )
        .expect("decode actors");

        assert_eq!(
            actors,
            vec![
                ActorRef::default(),
                ActorRef::default(),
                ActorRef::new("42", "Alice"),
                ActorRef::new("", "Bob"),
                ActorRef::new("7", "Carol"),
                ActorRef::new("dave", "dave"),
            ]
        );
    }

    #[test]
    fn serializes_as_compound_string() {
        let rendered = serde_json::to_string(&ActorRef::new("42", "Alice")).expect("encode");
        assert_eq!(rendered, r#""42#Alice""#);
    }
}
