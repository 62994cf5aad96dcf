//! Field projection
//!
//! A `FieldSet` is parsed from a comma-separated list of dot paths such as
//! `metadata.name,status.phase`. A leading `-` turns the whole set into an exclude list.
//! The `Cleaner` serializes a value to JSON, deletes every key whose path is excluded and
//! deserializes the rest into the destination type.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Prefix carried by watch envelope field specifiers
pub const WATCH_OBJECT_PREFIX: &str = "result.object.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    fields: Vec<String>,
    exclude: bool,
}

impl FieldSet {
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        let (exclude, body) = match spec.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };
        let mut fields: Vec<String> = Vec::new();
        for field in body.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            if !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }
        Self { fields, exclude }
    }

    /// Strip `prefix` from every specifier; specifiers without it are kept as-is
    pub fn without_prefix(self, prefix: &str) -> Self {
        let fields = self
            .fields
            .into_iter()
            .map(|f| match f.strip_prefix(prefix) {
                Some(rest) => rest.to_string(),
                None => f,
            })
            .collect();
        Self {
            fields,
            exclude: self.exclude,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn is_exclude(&self) -> bool {
        self.exclude
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn will_exclude(&self, path: &str) -> bool {
        if self.fields.is_empty() {
            return false;
        }
        if self.matches(path) {
            self.exclude
        } else {
            !self.exclude
        }
    }

    /// Whether `path` is an ancestor of, equal to, or below some specifier
    fn matches(&self, path: &str) -> bool {
        self.fields
            .iter()
            .any(|field| is_path_prefix(path, field) || is_path_prefix(field, path))
    }

    /// Whether the key at `path` should be removed from a projected object. Exclude mode
    /// only removes the named subtrees, never their ancestors.
    fn removes(&self, path: &str) -> bool {
        if self.exclude {
            self.fields.iter().any(|field| is_path_prefix(field, path))
        } else {
            !self.matches(path)
        }
    }
}

/// Dot-segment prefix: `status` prefixes `status.nodes` but not `statusText`
fn is_path_prefix(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cleaner {
    fields: FieldSet,
}

impl Cleaner {
    pub fn new(fields: FieldSet) -> Self {
        Self { fields }
    }

    pub fn parse(spec: &str) -> Self {
        Self::new(FieldSet::parse(spec))
    }

    pub fn without_prefix(self, prefix: &str) -> Self {
        Self::new(self.fields.without_prefix(prefix))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn will_exclude(&self, path: &str) -> bool {
        self.fields.will_exclude(path)
    }

    /// Project `src` into `D`. `None` means no fields were requested and the caller
    /// should use the original value.
    pub fn project<S, D>(&self, src: &S) -> Result<Option<D>, ApiError>
    where
        S: Serialize,
        D: DeserializeOwned,
    {
        if self.fields.is_empty() {
            return Ok(None);
        }
        let mut value =
            serde_json::to_value(src).map_err(|e| ApiError::Projection(e.to_string()))?;
        match &mut value {
            Value::Object(object) => self.clean_object("", object),
            _ => {
                return Err(ApiError::Projection(
                    "expected a JSON object at the top level".to_string(),
                ))
            }
        }
        let projected =
            serde_json::from_value(value).map_err(|e| ApiError::Projection(e.to_string()))?;
        Ok(Some(projected))
    }

    /// Project `src` into its own type, falling back to it unchanged when no fields are set
    pub fn clean<T>(&self, src: T) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned,
    {
        Ok(self.project(&src)?.unwrap_or(src))
    }

    fn clean_object(&self, prefix: &str, object: &mut Map<String, Value>) {
        if self.fields.is_empty() {
            return;
        }
        object.retain(|key, _| !self.fields.removes(&join_path(prefix, key)));
        for (key, value) in object.iter_mut() {
            let path = join_path(prefix, key);
            self.clean_value(&path, value);
        }
    }

    fn clean_value(&self, path: &str, value: &mut Value) {
        match value {
            Value::Object(child) => self.clean_object(path, child),
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.clean_value(path, item);
                }
            }
            _ => {}
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}
