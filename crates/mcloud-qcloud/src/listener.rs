//! CLB listeners and their forwarding rules.
//!
//! Every mutating call returns a RequestId that `DescribeTaskStatus` tracks;
//! the operations here wait on it before returning.

use crate::error::{QcloudError, QcloudResult};
use crate::loadbalancer::ClbClient;
use crate::pagination::expect_single;
use crate::params::Params;
use serde::{Deserialize, Serialize};

/// Bits of `HealthCheck.HttpCode`, lowest first.
const HTTP_CODE_CLASSES: [(i64, &str); 5] = [
    (1, "http_1xx"),
    (2, "http_2xx"),
    (4, "http_3xx"),
    (8, "http_4xx"),
    (16, "http_5xx"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerProtocol {
    Tcp,
    Udp,
    Http,
    Https,
    TcpSsl,
}

impl ListenerProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
            Self::TcpSsl => "TCP_SSL",
        }
    }

    /// Layer-4 listeners carry their own scheduler and health check;
    /// layer-7 ones delegate both to rules.
    pub fn is_layer4(&self) -> bool {
        matches!(self, Self::Tcp | Self::Udp | Self::TcpSsl)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scheduler {
    #[default]
    WeightedRoundRobin,
    LeastConnections,
    SourceHash,
}

impl Scheduler {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeightedRoundRobin => "WRR",
            Self::LeastConnections => "LEAST_CONN",
            Self::SourceHash => "IP_HASH",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCheck {
    /// 1 on, 0 off.
    #[serde(rename = "HealthSwitch", default)]
    pub health_switch: i64,
    /// Response timeout in seconds.
    #[serde(rename = "TimeOut", default)]
    pub time_out: i64,
    /// Seconds between health checks.
    #[serde(rename = "IntervalTime", default)]
    pub interval_time: i64,
    /// Successes before a backend counts as healthy.
    #[serde(rename = "HealthNum", default)]
    pub health_num: i64,
    /// Failures before a backend counts as unhealthy.
    #[serde(rename = "UnHealthNum", default)]
    pub unhealth_num: i64,
    /// Bitmask of healthy status classes, see [`HealthCheck::http_codes`].
    #[serde(rename = "HttpCode", default)]
    pub http_code: i64,
    #[serde(rename = "HttpCheckPath", default)]
    pub http_check_path: String,
    #[serde(rename = "HttpCheckDomain", default)]
    pub http_check_domain: String,
    #[serde(rename = "HttpCheckMethod", default)]
    pub http_check_method: String,
    #[serde(rename = "CheckType", default)]
    pub check_type: String,
}

impl Default for HealthCheck {
    /// Switched off, with the smallest timings the API accepts.
    fn default() -> Self {
        Self {
            health_switch: 0,
            time_out: 2,
            interval_time: 5,
            health_num: 3,
            unhealth_num: 3,
            http_code: 0,
            http_check_path: String::new(),
            http_check_domain: String::new(),
            http_check_method: String::new(),
            check_type: String::new(),
        }
    }
}

impl HealthCheck {
    pub fn enabled(&self) -> bool {
        self.health_switch == 1
    }

    /// Status classes encoded in `http_code`.
    pub fn http_codes(&self) -> Vec<&'static str> {
        HTTP_CODE_CLASSES
            .iter()
            .filter(|(bit, _)| self.http_code & bit != 0)
            .map(|(_, class)| *class)
            .collect()
    }

    /// Inverse of [`HealthCheck::http_codes`]; unknown classes are ignored.
    pub fn http_code_mask<S: AsRef<str>>(classes: &[S]) -> i64 {
        HTTP_CODE_CLASSES
            .iter()
            .filter(|(_, class)| classes.iter().any(|c| c.as_ref() == *class))
            .map(|(bit, _)| bit)
            .sum()
    }

    /// `<prefix>.HealthSwitch ...`; HTTP fields only go out with a code mask.
    fn apply(&self, params: &mut Params, prefix: &str) {
        params
            .set(format!("{}.HealthSwitch", prefix), self.health_switch)
            .set(format!("{}.TimeOut", prefix), self.time_out)
            .set(format!("{}.IntervalTime", prefix), self.interval_time)
            .set(format!("{}.HealthNum", prefix), self.health_num)
            .set(format!("{}.UnHealthNum", prefix), self.unhealth_num);
        if self.http_code > 0 {
            params.set(format!("{}.HttpCode", prefix), self.http_code);
            params.set_opt(format!("{}.HttpCheckPath", prefix), Some(self.http_check_path.as_str()));
            params.set_opt(format!("{}.HttpCheckDomain", prefix), Some(self.http_check_domain.as_str()));
            params.set_opt(format!("{}.HttpCheckMethod", prefix), Some(self.http_check_method.as_str()));
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListenerCertificate {
    /// `UNIDIRECTIONAL` or `MUTUAL`.
    #[serde(rename = "SSLMode", default)]
    pub ssl_mode: String,
    #[serde(rename = "CertId", default)]
    pub cert_id: String,
    #[serde(rename = "CertCaId", default)]
    pub cert_ca_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListenerRule {
    #[serde(rename = "LocationId")]
    pub location_id: String,
    #[serde(rename = "Domain", default)]
    pub domain: String,
    #[serde(rename = "Url", default)]
    pub url: String,
    #[serde(rename = "Scheduler", default)]
    pub scheduler: String,
    #[serde(rename = "SessionExpireTime", default)]
    pub session_expire_time: i64,
    #[serde(rename = "HealthCheck", default)]
    pub health_check: Option<HealthCheck>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Listener {
    #[serde(rename = "ListenerId")]
    pub listener_id: String,
    #[serde(rename = "ListenerName", default)]
    pub listener_name: String,
    #[serde(rename = "Protocol", default)]
    pub protocol: String,
    #[serde(rename = "Port", default)]
    pub port: u16,
    #[serde(rename = "Scheduler", default)]
    pub scheduler: String,
    /// Sticky-session lifetime in seconds, 0 when off.
    #[serde(rename = "SessionExpireTime", default)]
    pub session_expire_time: i64,
    /// 1 when the HTTPS listener serves several certificates by SNI.
    #[serde(rename = "SniSwitch", default)]
    pub sni_switch: i64,
    #[serde(rename = "Certificate", default)]
    pub certificate: Option<ListenerCertificate>,
    #[serde(rename = "HealthCheck", default)]
    pub health_check: Option<HealthCheck>,
    #[serde(rename = "Rules", default, deserialize_with = "crate::payload::lenient::list")]
    pub rules: Vec<ListenerRule>,
    #[serde(rename = "CreateTime", default)]
    pub create_time: String,
}

impl Listener {
    pub fn rule_by_url(&self, domain: &str, url: &str) -> Option<&ListenerRule> {
        self.rules.iter().find(|r| r.domain == domain && r.url == url)
    }
}

#[derive(Debug, Clone)]
pub struct ListenerCreateOptions {
    pub name: String,
    pub protocol: ListenerProtocol,
    pub port: u16,
    pub scheduler: Scheduler,
    /// Only sent for TCP and UDP listeners.
    pub session_expire_time: Option<i64>,
    /// Layer-4 only; layer-7 health checks live on rules.
    pub health_check: Option<HealthCheck>,
    /// Required for HTTPS.
    pub certificate_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RuleCreateOptions {
    pub domain: String,
    pub url: String,
    pub scheduler: Scheduler,
    pub session_expire_time: Option<i64>,
    pub health_check: Option<HealthCheck>,
}

impl ClbClient {
    /// DescribeListeners of one balancer, optionally narrowed by id or protocol.
    pub async fn describe_listeners(
        &self,
        lb_id: &str,
        listener_ids: &[String],
        protocol: Option<ListenerProtocol>,
    ) -> QcloudResult<Vec<Listener>> {
        let mut params = Params::new().with("LoadBalancerId", lb_id);
        params.set_list("ListenerIds", listener_ids);
        params.set_opt("Protocol", protocol.map(|p| p.as_str()));
        self.region
            .clb_request("DescribeListeners", params)
            .await?
            .list("Listeners")
    }

    pub async fn get_listener(&self, lb_id: &str, listener_id: &str) -> QcloudResult<Listener> {
        let listeners = self
            .describe_listeners(lb_id, &[listener_id.to_string()], None)
            .await?;
        expect_single(listeners, "listener", listener_id)
    }

    /// CreateListener; returns the new listener once its task finished.
    pub async fn create_listener(&self, lb_id: &str, opts: &ListenerCreateOptions) -> QcloudResult<Listener> {
        let mut params = Params::new()
            .with("LoadBalancerId", lb_id)
            .with("Ports.0", opts.port)
            .with("Protocol", opts.protocol.as_str())
            .with("ListenerNames.0", &opts.name);
        if opts.protocol.is_layer4() {
            params.set("Scheduler", opts.scheduler.as_str());
            if let Some(health_check) = &opts.health_check {
                health_check.apply(&mut params, "HealthCheck");
            }
        }
        if matches!(opts.protocol, ListenerProtocol::Tcp | ListenerProtocol::Udp) {
            if let Some(seconds) = opts.session_expire_time {
                params.set("SessionExpireTime", seconds);
            }
        }
        if opts.protocol == ListenerProtocol::Https {
            let cert_id = opts
                .certificate_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| QcloudError::invalid_arg("HTTPS listener needs a certificate"))?;
            params
                .set("Certificate.SSLMode", "UNIDIRECTIONAL")
                .set("Certificate.CertId", cert_id);
        }

        let payload = self.region.clb_request("CreateListener", params).await?;
        let ids: Vec<String> = payload.list("ListenerIds")?;
        let listener_id = ids
            .into_iter()
            .next()
            .ok_or_else(|| QcloudError::decode("CreateListener returned no ListenerIds"))?;
        self.wait_request(&payload, "CreateListener").await?;
        self.get_listener(lb_id, &listener_id).await
    }

    /// ModifyListener; only the name, scheduler and health check may change.
    pub async fn modify_listener(
        &self,
        lb_id: &str,
        listener_id: &str,
        name: Option<&str>,
        scheduler: Option<Scheduler>,
        health_check: Option<&HealthCheck>,
    ) -> QcloudResult<()> {
        let mut params = Params::new()
            .with("LoadBalancerId", lb_id)
            .with("ListenerId", listener_id);
        params.set_opt("ListenerName", name);
        params.set_opt("Scheduler", scheduler.map(|s| s.as_str()));
        if let Some(health_check) = health_check {
            health_check.apply(&mut params, "HealthCheck");
        }
        let payload = self.region.clb_request("ModifyListener", params).await?;
        self.wait_request(&payload, "ModifyListener").await
    }

    pub async fn delete_listener(&self, lb_id: &str, listener_id: &str) -> QcloudResult<()> {
        let params = Params::new()
            .with("LoadBalancerId", lb_id)
            .with("ListenerId", listener_id);
        let payload = self.region.clb_request("DeleteListener", params).await?;
        self.wait_request(&payload, "DeleteListener").await
    }

    /// CreateRule on a layer-7 listener, then read the rule back by domain and url.
    pub async fn create_rule(
        &self,
        lb_id: &str,
        listener_id: &str,
        opts: &RuleCreateOptions,
    ) -> QcloudResult<ListenerRule> {
        let mut params = Params::new()
            .with("LoadBalancerId", lb_id)
            .with("ListenerId", listener_id)
            .with("Rules.0.Domain", &opts.domain)
            .with("Rules.0.Url", &opts.url)
            .with("Rules.0.Scheduler", opts.scheduler.as_str());
        if let Some(seconds) = opts.session_expire_time {
            params.set("Rules.0.SessionExpireTime", seconds);
        }
        if let Some(health_check) = &opts.health_check {
            health_check.apply(&mut params, "Rules.0.HealthCheck");
        }
        let payload = self.region.clb_request("CreateRule", params).await?;
        self.wait_request(&payload, "CreateRule").await?;

        let listener = self.get_listener(lb_id, listener_id).await?;
        listener
            .rule_by_url(&opts.domain, &opts.url)
            .cloned()
            .ok_or_else(|| QcloudError::not_found(format!("rule {}{} on {}", opts.domain, opts.url, listener_id)))
    }

    pub async fn delete_rule(&self, lb_id: &str, listener_id: &str, location_id: &str) -> QcloudResult<()> {
        let params = Params::new()
            .with("LoadBalancerId", lb_id)
            .with("ListenerId", listener_id)
            .with("LocationIds.0", location_id);
        let payload = self.region.clb_request("DeleteRule", params).await?;
        self.wait_request(&payload, "DeleteRule").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{region_of, scripted_client};
    use crate::error::ErrorKind;
    use serde_json::json;

    fn listener_json() -> serde_json::Value {
        json!({
            "ListenerId": "lbl-1",
            "ListenerName": "web",
            "Protocol": "HTTP",
            "Port": 80,
            "Certificate": null,
            "HealthCheck": null,
            "Rules": [{
                "LocationId": "loc-1",
                "Domain": "www.example.com",
                "Url": "/api",
                "Scheduler": "WRR",
                "HealthCheck": {
                    "HealthSwitch": 1, "TimeOut": 2, "IntervalTime": 5,
                    "HealthNum": 3, "UnHealthNum": 3, "HttpCode": 6,
                    "HttpCheckPath": "/healthz", "HttpCheckMethod": "HEAD"
                }
            }]
        })
    }

    #[test]
    fn http_code_bits() {
        let check = HealthCheck {
            http_code: 6,
            ..Default::default()
        };
        assert_eq!(check.http_codes(), vec!["http_2xx", "http_3xx"]);
        assert_eq!(HealthCheck::http_code_mask(&["http_5xx", "http_1xx", "bogus"]), 17);
        assert!(!HealthCheck::default().enabled());
    }

    #[test]
    fn health_check_leaves_http_fields_out_without_codes() {
        let mut params = Params::new();
        HealthCheck::default().apply(&mut params, "HealthCheck");
        assert_eq!(params.get("HealthCheck.HealthSwitch"), Some("0"));
        assert_eq!(params.get("HealthCheck.IntervalTime"), Some("5"));
        assert!(!params.contains("HealthCheck.HttpCode"));

        let mut params = Params::new();
        let check = HealthCheck {
            health_switch: 1,
            http_code: 2,
            http_check_path: "/ping".to_string(),
            ..Default::default()
        };
        check.apply(&mut params, "Rules.0.HealthCheck");
        assert_eq!(params.get("Rules.0.HealthCheck.HttpCode"), Some("2"));
        assert_eq!(params.get("Rules.0.HealthCheck.HttpCheckPath"), Some("/ping"));
        assert!(!params.contains("Rules.0.HealthCheck.HttpCheckDomain"));
    }

    #[tokio::test]
    async fn list_and_get() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"Listeners": [listener_json()], "TotalCount": 1})).await;
        wire.push_json(json!({"Listeners": null, "TotalCount": 0})).await;
        let clb = region_of(client, "ap-guangzhou").clb();

        let listener = clb.get_listener("lb-1", "lbl-1").await.unwrap();
        assert_eq!(listener.port, 80);
        let rule = listener.rule_by_url("www.example.com", "/api").unwrap();
        assert_eq!(rule.health_check.as_ref().unwrap().http_codes(), vec!["http_2xx", "http_3xx"]);

        let err = clb.get_listener("lb-1", "lbl-9").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let req = &wire.requests().await[0];
        assert_eq!(req.action(), Some("DescribeListeners"));
        assert_eq!(req.host(), "clb.tencentcloudapi.com");
        assert_eq!(req.param("LoadBalancerId").as_deref(), Some("lb-1"));
        assert_eq!(req.param("ListenerIds.0").as_deref(), Some("lbl-1"));
        assert_eq!(req.param("Protocol"), None);
    }

    #[tokio::test]
    async fn protocol_filter() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"Listeners": [], "TotalCount": 0})).await;
        region_of(client, "ap-guangzhou")
            .clb()
            .describe_listeners("lb-1", &[], Some(ListenerProtocol::TcpSsl))
            .await
            .unwrap();
        assert_eq!(wire.requests().await[0].param("Protocol").as_deref(), Some("TCP_SSL"));
    }

    #[tokio::test(start_paused = true)]
    async fn create_tcp_listener_waits_then_reads_back() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"ListenerIds": ["lbl-2"]})).await;
        wire.push_json(json!({"Status": 2})).await;
        wire.push_json(json!({"Status": 0})).await;
        wire.push_json(json!({"Listeners": [{"ListenerId": "lbl-2", "Protocol": "TCP", "Port": 443}]})).await;
        let opts = ListenerCreateOptions {
            name: "tls".to_string(),
            protocol: ListenerProtocol::Tcp,
            port: 443,
            scheduler: Scheduler::LeastConnections,
            session_expire_time: Some(30),
            health_check: Some(HealthCheck::default()),
            certificate_id: None,
        };
        let listener = region_of(client, "ap-guangzhou")
            .clb()
            .create_listener("lb-1", &opts)
            .await
            .unwrap();
        assert_eq!(listener.listener_id, "lbl-2");

        let reqs = wire.requests().await;
        assert_eq!(reqs.len(), 4);
        let create = &reqs[0];
        assert_eq!(create.action(), Some("CreateListener"));
        assert_eq!(create.param("Ports.0").as_deref(), Some("443"));
        assert_eq!(create.param("Protocol").as_deref(), Some("TCP"));
        assert_eq!(create.param("ListenerNames.0").as_deref(), Some("tls"));
        assert_eq!(create.param("Scheduler").as_deref(), Some("LEAST_CONN"));
        assert_eq!(create.param("SessionExpireTime").as_deref(), Some("30"));
        assert_eq!(create.param("HealthCheck.HealthNum").as_deref(), Some("3"));
        assert_eq!(reqs[1].action(), Some("DescribeTaskStatus"));
        assert_eq!(reqs[3].param("ListenerIds.0").as_deref(), Some("lbl-2"));
    }

    #[tokio::test]
    async fn https_listener_needs_certificate() {
        let (client, wire, _) = scripted_client(false);
        let opts = ListenerCreateOptions {
            name: "web".to_string(),
            protocol: ListenerProtocol::Https,
            port: 443,
            scheduler: Scheduler::default(),
            session_expire_time: Some(30),
            health_check: None,
            certificate_id: None,
        };
        let err = region_of(client, "ap-guangzhou")
            .clb()
            .create_listener("lb-1", &opts)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArg);
        assert_eq!(wire.request_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn https_listener_sends_certificate_without_scheduler() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"ListenerIds": ["lbl-3"]})).await;
        wire.push_json(json!({"Status": 0})).await;
        wire.push_json(json!({"Listeners": [{"ListenerId": "lbl-3", "Protocol": "HTTPS", "Port": 443}]})).await;
        let opts = ListenerCreateOptions {
            name: "web".to_string(),
            protocol: ListenerProtocol::Https,
            port: 443,
            scheduler: Scheduler::SourceHash,
            session_expire_time: Some(30),
            health_check: Some(HealthCheck::default()),
            certificate_id: Some("cert-1".to_string()),
        };
        region_of(client, "ap-guangzhou")
            .clb()
            .create_listener("lb-1", &opts)
            .await
            .unwrap();
        let create = &wire.requests().await[0];
        assert_eq!(create.param("Certificate.CertId").as_deref(), Some("cert-1"));
        assert_eq!(create.param("Certificate.SSLMode").as_deref(), Some("UNIDIRECTIONAL"));
        assert_eq!(create.param("Scheduler"), None);
        assert_eq!(create.param("SessionExpireTime"), None);
        assert_eq!(create.param("HealthCheck.HealthSwitch"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rule_created_and_found_by_url() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({})).await;
        wire.push_json(json!({"Status": 0})).await;
        wire.push_json(json!({"Listeners": [listener_json()]})).await;
        let opts = RuleCreateOptions {
            domain: "www.example.com".to_string(),
            url: "/api".to_string(),
            health_check: Some(HealthCheck {
                health_switch: 1,
                http_code: HealthCheck::http_code_mask(&["http_2xx"]),
                http_check_path: "/healthz".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let rule = region_of(client, "ap-guangzhou")
            .clb()
            .create_rule("lb-1", "lbl-1", &opts)
            .await
            .unwrap();
        assert_eq!(rule.location_id, "loc-1");
        let create = &wire.requests().await[0];
        assert_eq!(create.action(), Some("CreateRule"));
        assert_eq!(create.param("Rules.0.Url").as_deref(), Some("/api"));
        assert_eq!(create.param("Rules.0.Scheduler").as_deref(), Some("WRR"));
        assert_eq!(create.param("Rules.0.HealthCheck.HttpCode").as_deref(), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_rule_by_location() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({})).await;
        wire.push_json(json!({"Status": 0})).await;
        region_of(client, "ap-guangzhou")
            .clb()
            .delete_rule("lb-1", "lbl-1", "loc-1")
            .await
            .unwrap();
        let reqs = wire.requests().await;
        assert_eq!(reqs[0].action(), Some("DeleteRule"));
        assert_eq!(reqs[0].param("LocationIds.0").as_deref(), Some("loc-1"));
        assert_eq!(reqs.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_task_surfaces() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({})).await;
        wire.push_json(json!({"Status": 1})).await;
        let err = region_of(client, "ap-guangzhou")
            .clb()
            .delete_listener("lb-1", "lbl-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TaskFailed);
    }
}
