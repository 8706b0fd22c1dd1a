//! Typed façade over `RefStore` adding branch vocabulary: name validation,
//! tracking metadata, ahead/behind, merge checks, create/rename/delete
//! policy (§4.5).

use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use crate::errors::CellError;
use crate::hash::ObjectHash;
use crate::object_store::ObjectStore;
use crate::refstore::{RefStore, UpdateRefOptions};

const MAX_WALK: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct TrackingInfo {
    pub remote: Option<String>,
    pub remote_branch: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub gone: bool,
}

pub struct BranchManager {
    refs: Arc<RefStore>,
    object_store: Arc<ObjectStore>,
    tracking: DashMap<String, TrackingInfo>,
    current_branch: RwLock<Option<String>>,
}

/// Validates a branch short name against Git's ref-name rules (§4.5).
pub fn validate_branch_name(name: &str) -> Result<(), CellError> {
    if name.is_empty() {
        return Err(CellError::Invalid("branch name must not be empty".into()));
    }
    if name == "HEAD" {
        return Err(CellError::Invalid("branch name must not be HEAD".into()));
    }
    if name.starts_with('-') {
        return Err(CellError::Invalid("branch name must not start with '-'".into()));
    }
    if name.contains(' ') {
        return Err(CellError::Invalid("branch name must not contain spaces".into()));
    }
    if name.contains("..") {
        return Err(CellError::Invalid("branch name must not contain '..'".into()));
    }
    if name.ends_with(".lock") {
        return Err(CellError::Invalid("branch name must not end with '.lock'".into()));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(CellError::Invalid("branch name must not contain control characters".into()));
    }
    for forbidden in ['~', '^', ':', '?', '*', '[', ']', '\\'] {
        if name.contains(forbidden) {
            return Err(CellError::Invalid(format!("branch name must not contain '{forbidden}'")));
        }
    }
    Ok(())
}

fn branch_ref(name: &str) -> String {
    format!("refs/heads/{name}")
}

impl BranchManager {
    pub fn new(refs: Arc<RefStore>, object_store: Arc<ObjectStore>) -> Self {
        BranchManager {
            refs,
            object_store,
            tracking: DashMap::new(),
            current_branch: RwLock::new(None),
        }
    }

    pub fn current_branch(&self) -> Option<String> {
        self.current_branch.read().unwrap().clone()
    }

    pub fn set_current_branch(&self, name: impl Into<String>) {
        *self.current_branch.write().unwrap() = Some(name.into());
    }

    /// Validates the start point (`sha`, another ref, or `HEAD`) and resolves it.
    async fn resolve_start_point(&self, start_point: &str) -> Result<String, CellError> {
        if let Ok(hash) = start_point.parse::<ObjectHash>() {
            if self.object_store.has_object(&hash).await? {
                return Ok(hash.to_string());
            }
        }
        if start_point == "HEAD" {
            let (_, sha) = self.refs.resolve_ref("HEAD").await?;
            return Ok(sha);
        }
        if let Some(value) = self.refs.get_ref(start_point).await? {
            return Ok(value.target);
        }
        Err(CellError::Invalid(format!("INVALID_START_POINT: {start_point}")))
    }

    pub async fn create_branch(&self, name: &str, start_point: &str) -> Result<(), CellError> {
        validate_branch_name(name)?;
        let sha = self.resolve_start_point(start_point).await?;
        self.refs
            .update_ref(&branch_ref(name), &sha, UpdateRefOptions { create: true, ..Default::default() })
            .await
    }

    pub async fn rename_branch(&self, from: &str, to: &str) -> Result<(), CellError> {
        validate_branch_name(to)?;
        let value = self
            .refs
            .get_ref(&branch_ref(from))
            .await?
            .ok_or_else(|| CellError::NotFound(format!("NO_SUCH_REF: {from}")))?;
        self.refs
            .update_ref(&branch_ref(to), &value.target, UpdateRefOptions { create: true, ..Default::default() })
            .await?;
        self.refs.delete_ref(&branch_ref(from)).await?;

        if let Some((_, info)) = self.tracking.remove(from) {
            self.tracking.insert(to.to_string(), info);
        }
        if self.current_branch() == Some(from.to_string()) {
            self.set_current_branch(to);
        }
        Ok(())
    }

    pub async fn delete_branch(&self, name: &str, force: bool) -> Result<(), CellError> {
        if self.current_branch() == Some(name.to_string()) {
            return Err(CellError::Invalid(format!("CANNOT_DELETE_CURRENT: {name}")));
        }
        if !force {
            let default_branch = self.current_branch().unwrap_or_else(|| "main".to_string());
            let merged = self.is_merged(name, &default_branch).await.unwrap_or(false);
            if !merged {
                return Err(CellError::Invalid(format!("branch {name} is not merged; use force")));
            }
        }
        self.refs.delete_ref(&branch_ref(name)).await
    }

    /// True iff `branch`'s tip is reachable from `into` via a bounded
    /// ancestor walk (`into`'s ancestry includes `branch`'s tip).
    pub async fn is_merged(&self, branch: &str, into: &str) -> Result<bool, CellError> {
        let branch_tip = self
            .refs
            .get_ref(&branch_ref(branch))
            .await?
            .ok_or_else(|| CellError::NotFound(format!("NO_SUCH_REF: {branch}")))?
            .target;
        let into_tip = self
            .refs
            .get_ref(&branch_ref(into))
            .await?
            .ok_or_else(|| CellError::NotFound(format!("NO_SUCH_REF: {into}")))?
            .target;
        self.refs.is_descendant(&into_tip, &branch_tip).await
    }

    /// Refreshes `ahead`/`behind` against `upstream`, bounded to `MAX_WALK`
    /// commits each direction.
    pub async fn refresh_tracking(&self, branch: &str, upstream: &str) -> Result<TrackingInfo, CellError> {
        let branch_tip = self
            .refs
            .get_ref(&branch_ref(branch))
            .await?
            .map(|v| v.target)
            .unwrap_or_default();
        let upstream_tip = self
            .refs
            .get_ref(&branch_ref(upstream))
            .await?
            .map(|v| v.target);

        let Some(upstream_tip) = upstream_tip else {
            let info = TrackingInfo {
                gone: true,
                ..Default::default()
            };
            self.tracking.insert(branch.to_string(), info.clone());
            return Ok(info);
        };

        let ahead = self.count_unique_ancestors(&branch_tip, &upstream_tip).await?;
        let behind = self.count_unique_ancestors(&upstream_tip, &branch_tip).await?;

        let info = TrackingInfo {
            remote: Some("origin".to_string()),
            remote_branch: Some(upstream.to_string()),
            ahead,
            behind,
            gone: false,
        };
        self.tracking.insert(branch.to_string(), info.clone());
        Ok(info)
    }

    async fn count_unique_ancestors(&self, from: &str, excluding: &str) -> Result<u32, CellError> {
        let mut frontier = vec![from.to_string()];
        let mut visited = std::collections::HashSet::new();
        let mut count = 0u32;
        let mut walked = 0usize;

        while let Some(sha_hex) = frontier.pop() {
            if sha_hex == excluding || !visited.insert(sha_hex.clone()) {
                continue;
            }
            walked += 1;
            if walked > MAX_WALK {
                break;
            }
            count += 1;
            let Ok(hash) = sha_hex.parse::<ObjectHash>() else { continue };
            if let Some(commit) = self.object_store.get_commit(&hash).await? {
                for parent in commit.parent_commit_ids {
                    frontier.push(parent.to_string());
                }
            }
        }
        Ok(count)
    }

    pub fn tracking_for(&self, branch: &str) -> Option<TrackingInfo> {
        self.tracking.get(branch).map(|v| v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_head_and_reserved_characters() {
        assert!(validate_branch_name("HEAD").is_err());
        assert!(validate_branch_name("-weird").is_err());
        assert!(validate_branch_name("has space").is_err());
        assert!(validate_branch_name("a..b").is_err());
        assert!(validate_branch_name("x.lock").is_err());
        assert!(validate_branch_name("a~b").is_err());
        assert!(validate_branch_name("feature/login").is_ok());
    }
}
