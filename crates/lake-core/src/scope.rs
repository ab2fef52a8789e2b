use crate::errors::ContractError;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub const CONNECTION_ID_KEY: &str = "ConnectionId";

/// One named dimension of a scope, e.g. `WorkspaceId=99`. A value of zero
/// means the dimension is unset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeDim {
    name: String,
    value: u64,
}

impl ScopeDim {
    pub fn new(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

impl fmt::Display for ScopeDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

impl FromStr for ScopeDim {
    type Err = ContractError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ContractError::InvalidScopeDim {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let (name, value) = input
            .split_once('=')
            .ok_or_else(|| invalid("expected Name=id"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid("dimension name is empty"));
        }
        if name == CONNECTION_ID_KEY {
            return Err(invalid("ConnectionId is not a scope dimension"));
        }
        let value = value
            .trim()
            .parse::<u64>()
            .map_err(|err| invalid(&err.to_string()))?;
        Ok(Self::new(name, value))
    }
}

/// Identifies one tenant sub-resource: a connection plus a primary scope id
/// and an optional secondary one. Every raw row and entity row is tagged with
/// the serialized form returned by [`ScopeKey::params`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    connection_id: u64,
    primary: ScopeDim,
    secondary: Option<ScopeDim>,
    required: Vec<String>,
}

impl ScopeKey {
    pub fn new(connection_id: u64, primary: ScopeDim) -> Self {
        Self {
            connection_id,
            primary,
            secondary: None,
            required: Vec::new(),
        }
    }

    pub fn with_secondary(mut self, secondary: ScopeDim) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Marks a dimension as mandatory for the work about to run on this
    /// scope. Requirements never change [`ScopeKey::params`].
    pub fn require(mut self, name: &str) -> Self {
        if !self.required.iter().any(|existing| existing == name) {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn primary(&self) -> &ScopeDim {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&ScopeDim> {
        self.secondary.as_ref()
    }

    pub fn dimension(&self, name: &str) -> Option<u64> {
        if self.primary.name == name {
            return Some(self.primary.value);
        }
        self.secondary
            .as_ref()
            .filter(|secondary| secondary.name == name)
            .map(ScopeDim::value)
    }

    /// False when the connection is unset or any required dimension is
    /// missing or zero. Work on an inapplicable scope is skipped, not failed.
    pub fn is_applicable(&self) -> bool {
        self.connection_id != 0
            && self
                .required
                .iter()
                .all(|name| self.dimension(name).is_some_and(|value| value != 0))
    }

    pub fn missing_requirements(&self) -> Vec<&str> {
        self.required
            .iter()
            .filter(|name| !self.dimension(name).is_some_and(|value| value != 0))
            .map(String::as_str)
            .collect()
    }

    /// Canonical serialization, e.g. `{"ConnectionId":1,"WorkspaceId":99}`.
    /// Declared dimensions are always present, even when zero.
    pub fn params(&self) -> String {
        let mut entries = vec![
            (CONNECTION_ID_KEY.to_string(), self.connection_id),
            (self.primary.name.clone(), self.primary.value),
        ];
        if let Some(secondary) = self.secondary.as_ref() {
            entries.push((secondary.name.clone(), secondary.value));
        }
        entries.sort_by(|left, right| left.0.cmp(&right.0));

        let mut object = Map::new();
        for (name, value) in entries {
            object.insert(name, Value::from(value));
        }
        Value::Object(object).to_string()
    }

    pub fn partition(&self, table: &str) -> Partition {
        Partition {
            table: table.to_string(),
            params: self.params(),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.params())
    }
}

/// The read predicate for one scope over one table: exact match on both the
/// table name and the serialized params.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    table: String,
    params: String,
}

impl Partition {
    pub fn new(table: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            params: params.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn params(&self) -> &str {
        &self.params
    }

    pub fn matches(&self, table: &str, params: &str) -> bool {
        self.table == table && self.params == params
    }
}
