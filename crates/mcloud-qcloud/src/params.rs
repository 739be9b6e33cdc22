//! Flat request parameters.
//!
//! Vendor actions take a flat `key → value` map. Lists are flattened with
//! zero-based dotted indices (`InstanceIds.0`, `Filters.0.Values.1`); the
//! helpers here always emit indices contiguously from zero.

use crate::error::{QcloudError, QcloudResult};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Parameter map for one action call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    inner: BTreeMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Display) -> &mut Self {
        self.inner.insert(key.into(), value.to_string());
        self
    }

    /// Builder-style [`Params::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.set(key, value);
        self
    }

    /// Set `key` only when `value` is non-empty.
    pub fn set_opt(&mut self, key: impl Into<String>, value: Option<&str>) -> &mut Self {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            self.inner.insert(key.into(), v.to_string());
        }
        self
    }

    /// `Prefix.0 = a, Prefix.1 = b, ...`
    pub fn set_list<S: AsRef<str>>(&mut self, prefix: &str, values: &[S]) -> &mut Self {
        for (i, v) in values.iter().enumerate() {
            self.inner.insert(format!("{}.{}", prefix, i), v.as_ref().to_string());
        }
        self
    }

    /// `Prefix.i.Field = value` for every field of every item.
    pub fn set_struct_list<I, F>(&mut self, prefix: &str, items: I) -> &mut Self
    where
        I: IntoIterator<Item = F>,
        F: IntoIterator<Item = (&'static str, String)>,
    {
        for (i, fields) in items.into_iter().enumerate() {
            for (field, value) in fields {
                self.inner.insert(format!("{}.{}.{}", prefix, i, field), value);
            }
        }
        self
    }

    /// `Filters.i.Name = name, Filters.i.Values.j = value`.
    pub fn add_filter<S: AsRef<str>>(&mut self, name: &str, values: &[S]) -> &mut Self {
        let index = (0..)
            .find(|i| !self.inner.contains_key(&format!("Filters.{}.Name", i)))
            .unwrap_or(0);
        self.inner.insert(format!("Filters.{}.Name", index), name.to_string());
        self.set_list(&format!("Filters.{}.Values", index), values)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(|s| s.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.inner.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Reject `...Ids.0 = ""`: a lookup for an empty id can only come from
    /// a buggy caller and would otherwise list everything.
    pub fn check_ids(&self) -> QcloudResult<()> {
        for (k, v) in &self.inner {
            if k.ends_with("Ids.0") && v.is_empty() {
                return Err(QcloudError::not_found(format!("{} = {}", k, v)));
            }
        }
        Ok(())
    }

    /// `application/x-www-form-urlencoded` body, keys in sorted order.
    pub fn to_form(&self) -> String {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.inner {
            ser.append_pair(k, v);
        }
        ser.finish()
    }
}

impl<K: Into<String>, V: Display> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

/// Fresh idempotency token for one logical create.
pub fn client_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn list_indices_are_contiguous_from_zero() {
        let mut p = Params::new();
        p.set_list("InstanceIds", &["ins-1", "ins-2", "ins-3"]);
        assert_eq!(p.get("InstanceIds.0"), Some("ins-1"));
        assert_eq!(p.get("InstanceIds.2"), Some("ins-3"));
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn struct_list_flattening() {
        let mut p = Params::new();
        p.set_struct_list(
            "ResourceTags",
            vec![
                vec![("TagKey", "env".to_string()), ("TagValue", "prod".to_string())],
                vec![("TagKey", "team".to_string()), ("TagValue", "".to_string())],
            ],
        );
        assert_eq!(p.get("ResourceTags.0.TagKey"), Some("env"));
        assert_eq!(p.get("ResourceTags.1.TagValue"), Some(""));
    }

    #[test]
    fn filters_append_next_index() {
        let mut p = Params::new();
        p.add_filter("zone", &["ap-guangzhou-3"]);
        p.add_filter("vpc-id", &["vpc-1", "vpc-2"]);
        assert_eq!(p.get("Filters.0.Name"), Some("zone"));
        assert_eq!(p.get("Filters.1.Name"), Some("vpc-id"));
        assert_eq!(p.get("Filters.1.Values.1"), Some("vpc-2"));
    }

    #[test]
    fn empty_first_id_is_not_found() {
        let p = Params::new().with("VpcIds.0", "");
        let err = p.check_ids().unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let ok = Params::new().with("VpcIds.0", "vpc-1").with("Name", "");
        assert!(ok.check_ids().is_ok());
    }

    #[test]
    fn set_opt_skips_empty() {
        let mut p = Params::new();
        p.set_opt("A", Some("")).set_opt("B", None).set_opt("C", Some("x"));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn form_encoding_is_sorted_and_escaped() {
        let p: Params = [("Zeta", "a b"), ("Alpha", "1&2")].into_iter().collect();
        assert_eq!(p.to_form(), "Alpha=1%262&Zeta=a+b");
    }

    #[test]
    fn client_tokens_differ() {
        assert_ne!(client_token(), client_token());
        assert_eq!(client_token().len(), 32);
    }
}
