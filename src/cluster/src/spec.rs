//! Cluster specification and provisioner config synthesis.

use serde::{Deserialize, Serialize};

/// Default host port the cluster API server is published on.
pub const DEFAULT_API_PORT: u16 = 6443;

/// One host-port → loadbalancer-port publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPublish {
    pub host_port: u16,
    pub container_port: u16,
}

/// Serialized input to the provisioner, derived from the run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    pub node_count: u32,
    /// Kubernetes version as an opaque image tag; empty means the
    /// provisioner default.
    #[serde(default)]
    pub kubernetes_version: String,
    pub api_port: u16,
    pub port_publishes: Vec<PortPublish>,
    /// Optional local image registry created alongside the cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
}

impl ClusterSpec {
    pub fn new(name: impl Into<String>, node_count: u32) -> Self {
        Self {
            name: name.into(),
            node_count: node_count.max(1),
            kubernetes_version: String::new(),
            api_port: DEFAULT_API_PORT,
            port_publishes: vec![
                PortPublish {
                    host_port: 80,
                    container_port: 80,
                },
                PortPublish {
                    host_port: 443,
                    container_port: 443,
                },
            ],
            registry: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.kubernetes_version = version.into();
        self
    }

    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api_port = port;
        self
    }

    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Every host port the spec wants to bind, API port first.
    pub fn host_ports(&self) -> Vec<u16> {
        let mut ports = vec![self.api_port];
        ports.extend(self.port_publishes.iter().map(|p| p.host_port));
        ports
    }

    /// Render the provisioner's YAML config document.
    pub fn provisioner_config(&self) -> String {
        let config = ProvisionerConfig {
            api_version: "k3d.io/v1alpha5",
            kind: "Simple",
            metadata: ConfigMetadata { name: &self.name },
            servers: 1,
            agents: self.node_count.saturating_sub(1),
            image: if self.kubernetes_version.is_empty() {
                None
            } else {
                Some(format!("rancher/k3s:{}", self.kubernetes_version))
            },
            kube_api: KubeApi {
                host_port: self.api_port.to_string(),
            },
            ports: self
                .port_publishes
                .iter()
                .map(|p| PortMapping {
                    port: format!("{}:{}", p.host_port, p.container_port),
                    node_filters: vec!["loadbalancer".to_string()],
                })
                .collect(),
            registries: self.registry.as_deref().map(|name| Registries {
                create: RegistryCreate {
                    name: name.to_string(),
                },
            }),
        };
        serde_yaml::to_string(&config).expect("provisioner config serializes")
    }
}

#[derive(Serialize)]
struct ProvisionerConfig<'a> {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    metadata: ConfigMetadata<'a>,
    servers: u32,
    agents: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(rename = "kubeAPI")]
    kube_api: KubeApi,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<PortMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    registries: Option<Registries>,
}

#[derive(Serialize)]
struct ConfigMetadata<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct KubeApi {
    #[serde(rename = "hostPort")]
    host_port: String,
}

#[derive(Serialize)]
struct PortMapping {
    port: String,
    #[serde(rename = "nodeFilters")]
    node_filters: Vec<String>,
}

#[derive(Serialize)]
struct Registries {
    create: RegistryCreate,
}

#[derive(Serialize)]
struct RegistryCreate {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_renders_servers_and_agents() {
        let spec = ClusterSpec::new("demo-1", 3);
        let yaml = spec.provisioner_config();
        assert!(yaml.contains("name: demo-1"));
        assert!(yaml.contains("servers: 1"));
        assert!(yaml.contains("agents: 2"));
        assert!(yaml.contains("80:80"));
        assert!(yaml.contains("443:443"));
        assert!(yaml.contains("hostPort: '6443'"));
    }

    #[test]
    fn single_node_means_zero_agents() {
        let yaml = ClusterSpec::new("solo", 1).provisioner_config();
        assert!(yaml.contains("agents: 0"));
    }

    #[test]
    fn version_becomes_image_tag() {
        let yaml = ClusterSpec::new("x", 1)
            .with_version("v1.31.4-k3s1")
            .provisioner_config();
        assert!(yaml.contains("rancher/k3s:v1.31.4-k3s1"));
    }

    #[test]
    fn host_ports_lists_api_port_first() {
        let spec = ClusterSpec::new("x", 1).with_api_port(7443);
        assert_eq!(spec.host_ports(), vec![7443, 80, 443]);
    }
}
