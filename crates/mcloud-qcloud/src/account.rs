//! Account-scoped operations: caller identity, sub-account summary, balance
//! and projects.

use crate::client::QcloudClient;
use crate::endpoint::Service;
use crate::error::{ErrorKind, QcloudResult};
use crate::pagination::PageSpec;
use crate::params::Params;
use serde::{Deserialize, Serialize};

/// Console login page for sub-users.
pub const IAM_LOGIN_URL: &str = "https://cloud.tencent.com/login/subAccount";

/// Project every resource belongs to unless assigned elsewhere.
pub const DEFAULT_PROJECT_ID: &str = "0";
pub const DEFAULT_PROJECT_NAME: &str = "默认项目";

/// Accounts at or above this uin are international accounts billed in USD.
const INTERNATIONAL_UIN_FLOOR: i64 = 200_000_000_000;

const NO_FINANCE_AUTH: &str = "UnauthorizedOperation.NotFinanceAuth";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAccount {
    pub id: String,
    pub name: String,
    pub account: String,
    pub default_project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Available balance in currency units.
    pub amount: f64,
    pub currency: String,
    pub uin: i64,
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    #[serde(rename = "Balance", default)]
    balance: f64,
    #[serde(rename = "Uin", default, deserialize_with = "crate::payload::lenient::int")]
    uin: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "ProjectId", deserialize_with = "crate::payload::lenient::string")]
    pub project_id: String,
    #[serde(rename = "ProjectName", default)]
    pub project_name: String,
    #[serde(rename = "CreatorUin", default, deserialize_with = "crate::payload::lenient::string")]
    pub creator_uin: String,
    #[serde(rename = "ProjectInfo", default)]
    pub description: String,
    #[serde(rename = "CreateTime", default)]
    pub create_time: String,
}

impl QcloudClient {
    /// Numeric account id, discovered once through GetCallerIdentity unless a
    /// bucket listing already revealed it.
    pub async fn account_id(&self) -> QcloudResult<String> {
        self.catalog()
            .owner_id_or_fetch(|| async {
                let payload = self.sts_request("GetCallerIdentity", Params::new()).await?;
                payload.unmarshal::<String>("AccountId")
            })
            .await
    }

    pub fn iam_login_url(&self) -> &'static str {
        IAM_LOGIN_URL
    }

    /// The single sub-account this credential represents.
    pub async fn sub_accounts(&self) -> QcloudResult<Vec<SubAccount>> {
        self.fetch_regions().await?;
        let account = if self.app_id().is_empty() {
            self.credential().secret_id.clone()
        } else {
            format!("{}/{}", self.credential().secret_id, self.app_id())
        };
        Ok(vec![SubAccount {
            id: self.account_id().await?,
            name: self.provider_name().to_string(),
            account,
            default_project_id: DEFAULT_PROJECT_ID.to_string(),
        }])
    }

    /// DescribeAccountBalance; the vendor reports cents.
    pub async fn query_account_balance(&self) -> QcloudResult<AccountBalance> {
        let payload = match self.billing_request("DescribeAccountBalance", Params::new()).await {
            Err(mut e) if e.is_code(&[NO_FINANCE_AUTH]) => {
                e.kind = ErrorKind::NoPermission;
                return Err(e);
            }
            other => other?,
        };
        let raw: RawBalance = serde_json::from_value(payload.into_inner())?;
        let currency = if raw.uin >= INTERNATIONAL_UIN_FLOOR { "USD" } else { "CNY" };
        Ok(AccountBalance {
            amount: raw.balance / 100.0,
            currency: currency.to_string(),
            uin: raw.uin,
        })
    }

    /// Every project, followed by the implicit default project.
    pub async fn projects(&self) -> QcloudResult<Vec<Project>> {
        let spec = PageSpec::new(Service::Tag, "DescribeProjects", "Projects")
            .total_at("Total")
            .limit(1000);
        let mut projects: Vec<Project> = self
            .list_all(&spec, Params::new().with("AllList", 1), None)
            .await?;
        projects.push(Project {
            project_id: DEFAULT_PROJECT_ID.to_string(),
            project_name: DEFAULT_PROJECT_NAME.to_string(),
            ..Project::default()
        });
        Ok(projects)
    }
}
