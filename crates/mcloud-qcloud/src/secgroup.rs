//! Security group operations (service `vpc`).

use crate::endpoint::Service;
use crate::error::QcloudResult;
use crate::pagination::{expect_single, PageSpec};
use crate::params::Params;
use crate::region::QcloudRegion;
use crate::tags::{display_name, QcloudTags, Resource, TagTarget, TaggedResource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityGroup {
    #[serde(rename = "SecurityGroupId")]
    pub security_group_id: String,
    #[serde(rename = "SecurityGroupName", default)]
    pub security_group_name: String,
    #[serde(rename = "SecurityGroupDesc", default)]
    pub description: String,
    /// Arrives as a number or a string; `0` is the default project.
    #[serde(rename = "ProjectId", default, deserialize_with = "crate::payload::lenient::string")]
    pub project_id: String,
    /// The group created with the account; it cannot be deleted.
    #[serde(rename = "IsDefault", default)]
    pub is_default: bool,
    #[serde(rename = "CreatedTime", default)]
    pub created_time: String,
    #[serde(flatten)]
    pub tags: QcloudTags,
}

impl Resource for SecurityGroup {
    fn id(&self) -> String {
        self.security_group_id.clone()
    }

    fn name(&self) -> String {
        display_name(&self.security_group_name, &self.security_group_id)
    }

    fn status(&self) -> String {
        "ready".to_string()
    }

    fn qcloud_tags(&self) -> Option<&QcloudTags> {
        Some(&self.tags)
    }
}

impl TaggedResource for SecurityGroup {
    const TAG_TARGET: TagTarget = TagTarget::new("cvm", "sg");
}

pub struct SecurityGroupClient {
    region: QcloudRegion,
}

impl SecurityGroupClient {
    pub fn new(region: QcloudRegion) -> Self {
        Self { region }
    }

    fn group_spec() -> PageSpec {
        PageSpec::new(Service::Vpc, "DescribeSecurityGroups", "SecurityGroupSet").limit(100)
    }

    pub async fn describe_security_groups(
        &self,
        group_ids: &[String],
        name: Option<&str>,
    ) -> QcloudResult<Vec<SecurityGroup>> {
        let mut params = Params::new();
        params.set_list("SecurityGroupIds", group_ids);
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            params.add_filter("security-group-name", &[name]);
        }
        self.region
            .client()
            .list_all(&Self::group_spec(), params, Some(self.region.id()))
            .await
    }

    pub async fn get_security_group(&self, group_id: &str) -> QcloudResult<SecurityGroup> {
        let groups = self.describe_security_groups(&[group_id.to_string()], None).await?;
        expect_single(groups, "security group", group_id)
    }

    /// CreateSecurityGroup with optional project and tags.
    pub async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        project_id: Option<&str>,
        tags: &HashMap<String, String>,
    ) -> QcloudResult<SecurityGroup> {
        let mut params = Params::new();
        params
            .set("GroupName", name)
            .set("GroupDescription", if description.is_empty() { "-" } else { description });
        params.set_opt("ProjectId", project_id);
        let mut tags: Vec<_> = tags.iter().collect();
        tags.sort();
        params.set_struct_list(
            "Tags",
            tags.into_iter()
                .map(|(k, v)| vec![("Key", k.clone()), ("Value", v.clone())]),
        );
        let payload = self.region.vpc_request("CreateSecurityGroup", params).await?;
        payload.unmarshal("SecurityGroup")
    }

    pub async fn delete_security_group(&self, group_id: &str) -> QcloudResult<()> {
        let params = Params::new().with("SecurityGroupId", group_id);
        match self.region.vpc_request("DeleteSecurityGroup", params).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }
}

impl QcloudRegion {
    pub fn security_groups(&self) -> SecurityGroupClient {
        SecurityGroupClient::new(self.clone())
    }
}
