//! Resource identity and tag normalisation.
//!
//! Services report tags under six different list fields with either
//! `Key`/`Value` or `TagKey`/`TagValue` members. [`QcloudTags`] is flattened
//! into every resource record and folds them into one map, keeping keys in
//! the vendor's reserved namespace apart as system tags.

use crate::client::QcloudClient;
use crate::endpoint::Service;
use crate::error::QcloudResult;
use crate::pagination::PageSpec;
use crate::params::Params;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Reserved key namespace for tags set by the platform itself.
pub const SYSTEM_TAG_PREFIX: &str = "tencentcloud:";

/// Placeholder the console uses for resources without a name.
pub const UNNAMED: &str = "未命名";

pub fn is_system_key(key: &str) -> bool {
    key.starts_with(SYSTEM_TAG_PREFIX)
}

/// Display name, falling back to the id for empty or placeholder names.
pub fn display_name(name: &str, id: &str) -> String {
    if name.is_empty() || name == UNNAMED {
        id.to_string()
    } else {
        name.to_string()
    }
}

// ── Tag records ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPair {
    #[serde(rename = "TagKey", alias = "Key", default)]
    pub key: String,
    #[serde(
        rename = "TagValue",
        alias = "Value",
        default,
        deserialize_with = "crate::payload::lenient::string"
    )]
    pub value: String,
}

/// Any list of tag pairs; `null`, objects and malformed entries are skipped.
fn pair_list<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<TagPair>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<TagPair>(item).ok())
            .filter(|pair| !pair.key.is_empty())
            .collect(),
        _ => Vec::new(),
    })
}

/// The six tag shapes, flattened into a resource record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcloudTags {
    #[serde(rename = "TagSet", default, deserialize_with = "pair_list", skip_serializing_if = "Vec::is_empty")]
    pub tag_set: Vec<TagPair>,
    #[serde(rename = "InstanceTags", default, deserialize_with = "pair_list", skip_serializing_if = "Vec::is_empty")]
    pub instance_tags: Vec<TagPair>,
    #[serde(rename = "TagList", default, deserialize_with = "pair_list", skip_serializing_if = "Vec::is_empty")]
    pub tag_list: Vec<TagPair>,
    #[serde(rename = "Tags", default, deserialize_with = "pair_list", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagPair>,
    #[serde(rename = "Tag", default, deserialize_with = "pair_list", skip_serializing_if = "Vec::is_empty")]
    pub tag: Vec<TagPair>,
    #[serde(rename = "ResourceTags", default, deserialize_with = "pair_list", skip_serializing_if = "Vec::is_empty")]
    pub resource_tags: Vec<TagPair>,
}

impl QcloudTags {
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let mut tags: Vec<TagPair> = map
            .iter()
            .map(|(k, v)| TagPair {
                key: k.clone(),
                value: v.clone(),
            })
            .collect();
        tags.sort_by(|a, b| a.key.cmp(&b.key));
        Self {
            tags,
            ..Self::default()
        }
    }

    fn pairs(&self) -> impl Iterator<Item = &TagPair> {
        self.tag_set
            .iter()
            .chain(&self.instance_tags)
            .chain(&self.tag_list)
            .chain(&self.tags)
            .chain(&self.tag)
            .chain(&self.resource_tags)
    }

    fn collect(&self, system: bool) -> HashMap<String, String> {
        let mut out = HashMap::new();
        for pair in self.pairs().filter(|p| is_system_key(&p.key) == system) {
            let value = if pair.value == "null" {
                String::new()
            } else {
                pair.value.clone()
            };
            out.entry(pair.key.clone()).or_insert(value);
        }
        out
    }

    /// User tags across every shape.
    pub fn get_tags(&self) -> HashMap<String, String> {
        self.collect(false)
    }

    /// Tags in the reserved namespace only.
    pub fn get_sys_tags(&self) -> HashMap<String, String> {
        self.collect(true)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs().next().is_none()
    }
}

// ── Identity ────────────────────────────────────────────────────────────

/// Identity surface shared by every resource record.
pub trait Resource {
    fn id(&self) -> String;

    fn name(&self) -> String {
        self.id()
    }

    /// Vendor id unless the resource is only unique below a parent.
    fn global_id(&self) -> String {
        self.id()
    }

    fn status(&self) -> String;

    fn qcloud_tags(&self) -> Option<&QcloudTags> {
        None
    }

    fn tags(&self) -> HashMap<String, String> {
        self.qcloud_tags().map(QcloudTags::get_tags).unwrap_or_default()
    }

    fn sys_tags(&self) -> HashMap<String, String> {
        self.qcloud_tags().map(QcloudTags::get_sys_tags).unwrap_or_default()
    }
}

/// Where a resource lives in the tag service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagTarget {
    /// Tag service `ServiceType`, e.g. `cvm`.
    pub service: &'static str,
    /// Tag service `ResourcePrefix`, e.g. `instance`.
    pub resource_type: &'static str,
}

impl TagTarget {
    pub const fn new(service: &'static str, resource_type: &'static str) -> Self {
        Self {
            service,
            resource_type,
        }
    }

    /// Six-part resource name: `qcs::<service>:<region>:uin/<owner>:<type>/<id>`.
    pub fn resource_name(&self, region: &str, owner_id: &str, id: &str) -> String {
        format!(
            "qcs::{}:{}:uin/{}:{}/{}",
            self.service, region, owner_id, self.resource_type, id
        )
    }
}

/// A resource whose tags are written through the tag service.
pub trait TaggedResource: Resource {
    const TAG_TARGET: TagTarget;
}

#[derive(Debug, Deserialize)]
struct ResourceTag {
    #[serde(rename = "TagKey", default)]
    key: String,
    #[serde(rename = "TagValue", default, deserialize_with = "crate::payload::lenient::string")]
    value: String,
}

/// Tag writes that turn `current` into `desired`: `(replace, delete)`.
pub fn diff_tags(
    current: &HashMap<String, String>,
    desired: &HashMap<String, String>,
    replace: bool,
) -> (Vec<(String, String)>, Vec<String>) {
    let mut upserts: Vec<(String, String)> = desired
        .iter()
        .filter(|(k, v)| current.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    upserts.sort();
    let mut deletes: Vec<String> = if replace {
        current
            .keys()
            .filter(|k| !is_system_key(k) && !desired.contains_key(*k))
            .cloned()
            .collect()
    } else {
        Vec::new()
    };
    deletes.sort();
    (upserts, deletes)
}

impl QcloudClient {
    /// Current tags of one resource as seen by the tag service.
    pub async fn get_resource_tags(
        &self,
        target: TagTarget,
        region: &str,
        id: &str,
    ) -> QcloudResult<HashMap<String, String>> {
        let mut params = Params::new();
        params
            .set("ServiceType", target.service)
            .set("ResourcePrefix", target.resource_type)
            .set("ResourceRegion", region)
            .set("ResourceIds.0", id);
        let spec = PageSpec::new(Service::Tag, "DescribeResourceTagsByResourceIds", "Tags").limit(100);
        let tags: Vec<ResourceTag> = self.list_all(&spec, params, None).await?;
        Ok(tags
            .into_iter()
            .map(|t| {
                let value = if t.value == "null" { String::new() } else { t.value };
                (t.key, value)
            })
            .collect())
    }

    /// Write `tags` on a resource; `replace` also removes absent user keys.
    pub async fn set_resource_tags(
        &self,
        target: TagTarget,
        region: &str,
        id: &str,
        tags: &HashMap<String, String>,
        replace: bool,
    ) -> QcloudResult<()> {
        let current = self.get_resource_tags(target, region, id).await?;
        let (upserts, deletes) = diff_tags(&current, tags, replace);
        if upserts.is_empty() && deletes.is_empty() {
            return Ok(());
        }
        let owner_id = self.account_id().await?;
        let mut params = Params::new();
        params.set("Resource", target.resource_name(region, &owner_id, id));
        params.set_struct_list(
            "ReplaceTags",
            upserts
                .into_iter()
                .map(|(k, v)| vec![("TagKey", k), ("TagValue", v)]),
        );
        params.set_struct_list("DeleteTags", deletes.into_iter().map(|k| vec![("TagKey", k)]));
        self.tag_request("ModifyResourceTags", params).await?;
        Ok(())
    }
}
