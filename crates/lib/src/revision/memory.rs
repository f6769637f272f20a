//! Process-local revision store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::system::System;

use super::storage::RevisionStore;
use super::types::{Revision, RevisionError, TimelineEntry};

#[derive(Debug, Default)]
struct History {
  revisions: Vec<Revision>,
  deployed: Option<u64>,
  timeline: Vec<TimelineEntry>,
}

impl History {
  fn get(&self, number: u64) -> Option<Revision> {
    self.revisions.iter().find(|r| r.revision == number).map(|r| {
      let mut revision = r.clone();
      revision.deployed = self.deployed == Some(number);
      revision
    })
  }
}

/// [`RevisionStore`] keeping every history in memory.
///
/// One lock guards all systems, which trivially serialises writers.
#[derive(Debug, Default)]
pub struct MemoryRevisionStore {
  histories: Mutex<HashMap<String, History>>,
}

impl MemoryRevisionStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl RevisionStore for MemoryRevisionStore {
  async fn commit_revision(
    &self,
    system_id: &str,
    description: &str,
    system: System,
  ) -> Result<Revision, RevisionError> {
    let mut histories = self.histories.lock().await;
    let history = histories.entry(system_id.to_string()).or_default();

    let revision = Revision::next(system_id, description, system, history.revisions.last())?;
    history.revisions.push(revision.clone());
    Ok(revision)
  }

  async fn head(&self, system_id: &str) -> Result<Option<Revision>, RevisionError> {
    self.revision(system_id, None).await
  }

  async fn revision(&self, system_id: &str, number: Option<u64>) -> Result<Option<Revision>, RevisionError> {
    let histories = self.histories.lock().await;
    let Some(history) = histories.get(system_id) else {
      return Ok(None);
    };
    let number = match number.or_else(|| history.revisions.last().map(|r| r.revision)) {
      Some(n) => n,
      None => return Ok(None),
    };
    Ok(history.get(number))
  }

  async fn mark_deployed(&self, system_id: &str, number: u64) -> Result<(), RevisionError> {
    let mut histories = self.histories.lock().await;
    match histories.get_mut(system_id) {
      Some(history) if history.revisions.iter().any(|r| r.revision == number) => {
        history.deployed = Some(number);
        Ok(())
      }
      _ => Err(RevisionError::NotFound {
        system_id: system_id.to_string(),
        revision: number,
      }),
    }
  }

  async fn deployed(&self, system_id: &str) -> Result<Option<Revision>, RevisionError> {
    let histories = self.histories.lock().await;
    Ok(
      histories
        .get(system_id)
        .and_then(|h| h.deployed.and_then(|n| h.get(n))),
    )
  }

  async fn list_revisions(&self, system_id: &str) -> Result<Vec<Revision>, RevisionError> {
    let histories = self.histories.lock().await;
    Ok(
      histories
        .get(system_id)
        .map(|h| h.revisions.iter().rev().filter_map(|r| h.get(r.revision)).collect())
        .unwrap_or_default(),
    )
  }

  async fn append_timeline(&self, system_id: &str, entry: TimelineEntry) -> Result<(), RevisionError> {
    let mut histories = self.histories.lock().await;
    histories.entry(system_id.to_string()).or_default().timeline.push(entry);
    Ok(())
  }

  async fn timeline(&self, system_id: &str) -> Result<Vec<TimelineEntry>, RevisionError> {
    let histories = self.histories.lock().await;
    Ok(histories.get(system_id).map(|h| h.timeline.clone()).unwrap_or_default())
  }
}
