//! Test fixtures for topo-lib.
//!
//! Builders for small system documents shaped like the ones produced by
//! inspection: one or more virtualization hosts carrying docker containers.

use crate::system::{Container, ContainerDefinition, DefinitionSpec, MachineImage, System};

pub fn host_definition(id: &str) -> ContainerDefinition {
  ContainerDefinition::new(id, DefinitionSpec::AwsAmi(MachineImage::default()))
}

pub fn docker_definition(id: &str, image: &str) -> ContainerDefinition {
  ContainerDefinition::new(id, DefinitionSpec::docker(image))
}

pub fn host(id: &str, definition: &str, children: &[&str]) -> Container {
  let mut container = Container::new(id, definition);
  container.contains = children.iter().map(|c| c.to_string()).collect();
  container
}

pub fn child(id: &str, definition: &str, parent: &str, image: &str) -> Container {
  let mut container = Container::new(id, definition);
  container.contained_by = Some(parent.to_string());
  container.specific.docker_image_id = Some(image.to_string());
  container
}

/// `vm1` (aws-ami) hosting `c1` (docker `img123`).
pub fn canonical_system() -> System {
  let mut system = System::blank("sys1", "acme", "web");
  system.container_definitions = vec![host_definition("cd1"), docker_definition("cd2", "img123")];
  system.topology.insert(host("vm1", "cd1", &["c1"]));
  system.topology.insert(child("c1", "cd2", "vm1", "img123"));
  system
}

/// The same deployment as [`canonical_system`], re-discovered with ephemeral ids.
pub fn analyzed_system() -> System {
  let mut system = System::blank("sys1", "acme", "web");
  system.container_definitions = vec![host_definition("cd1"), docker_definition("def-9f2", "img123")];
  system.topology.insert(host("vm1", "cd1", &["xyz"]));
  system.topology.insert(child("xyz", "def-9f2", "vm1", "img123"));
  system
}
