//! System document types.
//!
//! A [`System`] is either the canonical definition of record or the result of
//! inspecting a live environment ("analyzed"). Both share this shape; only
//! their provenance differs.
//!
//! # Wire format
//!
//! Documents use camelCase keys:
//!
//! ```json
//! {
//!   "id": "4f1c...", "namespace": "acme", "name": "web",
//!   "containerDefinitions": [
//!     {"id": "cd1", "type": "aws-ami", "specific": {}},
//!     {"id": "cd2", "type": "docker", "specific": {"dockerImageId": "img123"}}
//!   ],
//!   "topology": {"containers": {
//!     "vm1": {"id": "vm1", "containerDefinitionId": "cd1", "contains": ["c1"]},
//!     "c1": {"id": "c1", "containedBy": "vm1", "containerDefinitionId": "cd2",
//!            "specific": {"dockerImageId": "img123"}}
//!   }}
//! }
//! ```

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A deployable system: its container definitions plus the topology instantiating them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct System {
  pub id: String,
  #[serde(default)]
  pub namespace: String,
  pub name: String,
  #[serde(default)]
  pub topology: Topology,
  #[serde(default)]
  pub container_definitions: Vec<ContainerDefinition>,
}

impl System {
  /// A blank canonical document, as created at registration time.
  pub fn blank(id: impl Into<String>, namespace: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      namespace: namespace.into(),
      name: name.into(),
      topology: Topology::default(),
      container_definitions: Vec::new(),
    }
  }

  pub fn definition(&self, id: &str) -> Option<&ContainerDefinition> {
    self.container_definitions.iter().find(|d| d.id == id)
  }

  pub fn definition_mut(&mut self, id: &str) -> Option<&mut ContainerDefinition> {
    self.container_definitions.iter_mut().find(|d| d.id == id)
  }

  /// The definition a container instantiates, if it exists.
  pub fn definition_of(&self, container: &Container) -> Option<&ContainerDefinition> {
    self.definition(&container.container_definition_id)
  }

  /// Containers whose definition is a virtualization host (`virtualbox` / `aws-ami`), in topology order.
  pub fn hosts(&self) -> impl Iterator<Item = &Container> {
    self
      .topology
      .containers
      .values()
      .filter(move |c| self.definition_of(c).is_some_and(|d| d.spec.is_host()))
  }
}

/// Containers of one system, keyed by container id.
///
/// Iteration follows document order, which is the scan order used when
/// matching identities. A container without an `id` takes its key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RawTopology")]
pub struct Topology {
  pub containers: IndexMap<String, Container>,
}

#[derive(Deserialize)]
struct RawTopology {
  #[serde(default)]
  containers: IndexMap<String, Container>,
}

impl From<RawTopology> for Topology {
  fn from(raw: RawTopology) -> Self {
    let mut containers = raw.containers;
    for (key, container) in containers.iter_mut() {
      if container.id.is_empty() {
        container.id = key.clone();
      }
    }
    Self { containers }
  }
}

impl Topology {
  pub fn get(&self, id: &str) -> Option<&Container> {
    self.containers.get(id)
  }

  pub fn len(&self) -> usize {
    self.containers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.containers.is_empty()
  }

  /// Insert a container under its own id.
  pub fn insert(&mut self, container: Container) -> Option<Container> {
    self.containers.insert(container.id.clone(), container)
  }
}

/// One instance in a topology.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
  #[serde(default)]
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub contained_by: Option<String>,
  #[serde(default)]
  pub contains: Vec<String>,
  pub container_definition_id: String,
  #[serde(default)]
  pub specific: ContainerSpecific,
}

impl Container {
  pub fn new(id: impl Into<String>, container_definition_id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      container_definition_id: container_definition_id.into(),
      ..Self::default()
    }
  }
}

/// Instance-specific data reported for a container.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpecific {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub docker_image_id: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// A typed template (docker image, VM image, ...) that containers instantiate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDefinition", into = "RawDefinition")]
pub struct ContainerDefinition {
  pub id: String,
  pub name: Option<String>,
  pub spec: DefinitionSpec,
}

impl ContainerDefinition {
  pub fn new(id: impl Into<String>, spec: DefinitionSpec) -> Self {
    Self {
      id: id.into(),
      name: None,
      spec,
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn docker_image_id(&self) -> Option<&str> {
    self.spec.docker_image_id()
  }
}

/// Kind-specific payload of a [`ContainerDefinition`], keyed by its `type` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionSpec {
  /// `docker`
  Docker(DockerImage),
  /// `boot2docker`
  Boot2docker(DockerImage),
  /// `virtualbox`
  Virtualbox(MachineImage),
  /// `aws-ami`
  AwsAmi(MachineImage),
  /// Any other type tag; the payload is kept verbatim.
  Other { kind: String, specific: Value },
}

impl DefinitionSpec {
  pub fn docker(image_id: impl Into<String>) -> Self {
    DefinitionSpec::Docker(DockerImage {
      docker_image_id: Some(image_id.into()),
      extra: Map::new(),
    })
  }

  /// The `type` tag used on the wire.
  pub fn kind(&self) -> &str {
    match self {
      DefinitionSpec::Docker(_) => "docker",
      DefinitionSpec::Boot2docker(_) => "boot2docker",
      DefinitionSpec::Virtualbox(_) => "virtualbox",
      DefinitionSpec::AwsAmi(_) => "aws-ami",
      DefinitionSpec::Other { kind, .. } => kind,
    }
  }

  /// Virtualization hosts whose direct children take part in identity matching.
  pub fn is_host(&self) -> bool {
    matches!(self, DefinitionSpec::Virtualbox(_) | DefinitionSpec::AwsAmi(_))
  }

  /// Kinds that carry a content-derived docker image id.
  pub fn is_docker(&self) -> bool {
    matches!(self, DefinitionSpec::Docker(_) | DefinitionSpec::Boot2docker(_))
  }

  pub fn docker_image_id(&self) -> Option<&str> {
    match self {
      DefinitionSpec::Docker(image) | DefinitionSpec::Boot2docker(image) => image.docker_image_id.as_deref(),
      _ => None,
    }
  }

  /// Record a built image id. Returns `false` for kinds that carry no image id.
  pub fn set_docker_image_id(&mut self, image_id: impl Into<String>) -> bool {
    match self {
      DefinitionSpec::Docker(image) | DefinitionSpec::Boot2docker(image) => {
        image.docker_image_id = Some(image_id.into());
        true
      }
      _ => false,
    }
  }
}

impl fmt::Display for DefinitionSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.kind())
  }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerImage {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub docker_image_id: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MachineImage {
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Untyped wire form of a definition: `{id, name?, type, specific}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawDefinition {
  id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  name: Option<String>,
  #[serde(rename = "type")]
  kind: String,
  #[serde(default)]
  specific: Value,
}

impl TryFrom<RawDefinition> for ContainerDefinition {
  type Error = serde_json::Error;

  fn try_from(raw: RawDefinition) -> Result<Self, Self::Error> {
    let specific = match raw.specific {
      Value::Null => Value::Object(Map::new()),
      other => other,
    };

    let spec = match raw.kind.as_str() {
      "docker" => DefinitionSpec::Docker(serde_json::from_value(specific)?),
      "boot2docker" => DefinitionSpec::Boot2docker(serde_json::from_value(specific)?),
      "virtualbox" => DefinitionSpec::Virtualbox(serde_json::from_value(specific)?),
      "aws-ami" => DefinitionSpec::AwsAmi(serde_json::from_value(specific)?),
      _ => DefinitionSpec::Other {
        kind: raw.kind,
        specific,
      },
    };

    Ok(ContainerDefinition {
      id: raw.id,
      name: raw.name,
      spec,
    })
  }
}

impl From<ContainerDefinition> for RawDefinition {
  fn from(def: ContainerDefinition) -> Self {
    let kind = def.spec.kind().to_string();
    let specific = match def.spec {
      DefinitionSpec::Docker(image) | DefinitionSpec::Boot2docker(image) => {
        serde_json::to_value(image).unwrap_or_else(|_| Value::Object(Map::new()))
      }
      DefinitionSpec::Virtualbox(image) | DefinitionSpec::AwsAmi(image) => Value::Object(image.extra),
      DefinitionSpec::Other { specific, .. } => specific,
    };

    RawDefinition {
      id: def.id,
      name: def.name,
      kind,
      specific,
    }
  }
}
