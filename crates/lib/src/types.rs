use std::fmt;

use serde::{Deserialize, Serialize};

/// The actor behind a mutation, recorded in commits and timeline entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub name: String,
  pub email: String,
}

impl User {
  pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      email: email.into(),
    }
  }

  /// The identity used for bookkeeping done by topo itself (registry bootstrap).
  pub fn system() -> Self {
    Self::new("system", "system@topo.local")
  }

  /// Best-effort identity of the invoking OS user.
  pub fn from_env() -> Self {
    let name = std::env::var("USER")
      .or_else(|_| std::env::var("USERNAME"))
      .unwrap_or_else(|_| "unknown".to_string());
    let email = format!("{}@localhost", name);
    Self { name, email }
  }
}

impl fmt::Display for User {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} <{}>", self.name, self.email)
  }
}
