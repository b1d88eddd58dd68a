//! In-memory remote stores for coordinator tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use stowage_core::domain::{Completeness, WriteUnit};
use stowage_core::ports::{IDocumentStore, IObjectStore, RemoteError};

type CommitRule = Box<dyn Fn(&[WriteUnit]) -> Option<RemoteError> + Send + Sync>;

/// Document store that records commits and fails the ones a rule selects
#[derive(Default)]
pub struct MockDocumentStore {
    rule: Option<CommitRule>,
    pub commits: Mutex<Vec<Vec<String>>>,
    pub attempts: Mutex<usize>,
    pub partial_marks: Mutex<Vec<(String, Vec<String>)>>,
    pub mark_partial_error: Option<RemoteError>,
    pub completeness: HashMap<String, Completeness>,
}

impl MockDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every commit for which `rule` returns an error
    pub fn failing_when<F>(rule: F) -> Self
    where
        F: Fn(&[WriteUnit]) -> Option<RemoteError> + Send + Sync + 'static,
    {
        Self {
            rule: Some(Box::new(rule)),
            ..Self::default()
        }
    }

    /// Keys of each successful commit, in commit order
    pub fn committed(&self) -> Vec<Vec<String>> {
        self.commits.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl IDocumentStore for MockDocumentStore {
    fn backend_name(&self) -> &str {
        "mock-documents"
    }

    async fn commit_batch(&self, writes: &[WriteUnit]) -> Result<(), RemoteError> {
        *self.attempts.lock().unwrap() += 1;
        tokio::task::yield_now().await;
        if let Some(error) = self.rule.as_ref().and_then(|rule| rule(writes)) {
            return Err(error);
        }
        self.commits
            .lock()
            .unwrap()
            .push(writes.iter().map(|w| w.key.clone()).collect());
        Ok(())
    }

    async fn mark_partial(
        &self,
        snapshot_id: &str,
        failed_keys: &[String],
    ) -> Result<(), RemoteError> {
        self.partial_marks
            .lock()
            .unwrap()
            .push((snapshot_id.to_string(), failed_keys.to_vec()));
        match &self.mark_partial_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn fetch_completeness(&self, snapshot_id: &str) -> Result<Completeness, RemoteError> {
        Ok(self
            .completeness
            .get(snapshot_id)
            .copied()
            .unwrap_or(Completeness::Unknown))
    }
}

/// Object store that keeps uploads in memory and fails chosen paths
#[derive(Default)]
pub struct MockObjectStore {
    pub uploads: Mutex<Vec<(String, Vec<u8>, String)>>,
    pub calls: Mutex<usize>,
    pub failures: HashMap<String, RemoteError>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failures: impl IntoIterator<Item = (&'static str, RemoteError)>) -> Self {
        Self {
            failures: failures
                .into_iter()
                .map(|(path, error)| (path.to_string(), error))
                .collect(),
            ..Self::default()
        }
    }

    pub fn uploaded_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(path, _, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl IObjectStore for MockObjectStore {
    fn backend_name(&self) -> &str {
        "mock-objects"
    }

    async fn upload_object(
        &self,
        remote_path: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<(), RemoteError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(error) = self.failures.get(remote_path) {
            return Err(error.clone());
        }
        self.uploads.lock().unwrap().push((
            remote_path.to_string(),
            content.to_vec(),
            content_type.to_string(),
        ));
        Ok(())
    }
}
