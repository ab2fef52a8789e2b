use crate::errors::DecodeError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One collected payload, stored verbatim. The engine only ever reads these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub id: u64,
    pub table: String,
    pub params: String,
    pub data: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub remark: String,
    pub created_at: DateTime<Utc>,
}

impl RawRow {
    /// Strictly decodes the payload into a tool-specific response schema.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        Ok(serde_json::from_str(&self.data)?)
    }

    /// Decodes the request context the collector recorded alongside the payload.
    pub fn decode_input<T: DeserializeOwned>(&self) -> Result<Option<T>, DecodeError> {
        self.input
            .as_deref()
            .filter(|input| !input.trim().is_empty())
            .map(|input| serde_json::from_str(input).map_err(DecodeError::from))
            .transpose()
    }
}

/// A raw payload as handed over by a collector, before it has a row id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRawRow {
    pub data: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub remark: String,
}

impl NewRawRow {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = remark.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Deserialize)]
    struct Payload {
        id: u64,
        name: String,
    }

    #[derive(Debug, Deserialize)]
    struct Input {
        page: u32,
    }

    fn row(data: &str, input: Option<&str>) -> RawRow {
        RawRow {
            id: 1,
            table: "_raw_test".to_string(),
            params: r#"{"ConnectionId":1,"WorkspaceId":99}"#.to_string(),
            data: data.to_string(),
            url: String::new(),
            input: input.map(ToString::to_string),
            remark: String::new(),
            created_at: Utc
                .with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
                .single()
                .expect("valid timestamp"),
        }
    }

    #[test]
    fn decode_reads_typed_payload() {
        let payload: Payload = row(r#"{"id":991,"name":"Sub"}"#, None)
            .decode()
            .expect("decode");
        assert_eq!(payload.id, 991);
        assert_eq!(payload.name, "Sub");
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        assert!(row(r#"{"id":"#, None).decode::<Payload>().is_err());
        assert!(row(r#"{"name":"Sub"}"#, None).decode::<Payload>().is_err());
    }

    #[test]
    fn decode_input_treats_blank_as_absent() {
        assert!(row("{}", Some("  "))
            .decode_input::<Input>()
            .expect("blank input")
            .is_none());
        let input = row("{}", Some(r#"{"page":3}"#))
            .decode_input::<Input>()
            .expect("input")
            .expect("present");
        assert_eq!(input.page, 3);
    }
}
