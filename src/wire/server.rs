//! Git Smart HTTP server-side state machine (§4.6): ref advertisement,
//! upload-pack negotiation, receive-pack ingestion.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::branch::BranchManager;
use crate::codec::{ObjectTrait, ObjectType};
use crate::errors::CellError;
use crate::hash::ObjectHash;
use crate::object_store::ObjectStore;
use crate::refstore::protection;
use crate::refstore::{RefStore, UpdateRefOptions};

use super::pktline::{add_pkt_line_string, build_smart_reply, read_pkt_line, read_until_white_space};
use super::types::{
    COMMON_CAP_LIST, PKT_LINE_END_MARKER, ProtocolError, RECEIVE_CAP_LIST, RefCommand, ServiceType,
    TransportProtocol, UPLOAD_CAP_LIST,
};

pub struct GitServer {
    object_store: Arc<ObjectStore>,
    refs: Arc<RefStore>,
    #[allow(dead_code)]
    branches: Arc<BranchManager>,
}

const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

impl GitServer {
    pub fn new(object_store: Arc<ObjectStore>, refs: Arc<RefStore>, branches: Arc<BranchManager>) -> Self {
        GitServer { object_store, refs, branches }
    }

    /// `GET /<ns>/info/refs?service=...` (§4.6).
    pub async fn info_refs(&self, service: ServiceType) -> Result<Vec<u8>, ProtocolError> {
        let refs = self.refs.list_refs(None).await?;
        let head = refs
            .iter()
            .find(|r| r.name == "refs/heads/main" || r.name == "refs/heads/master")
            .map(|r| r.target.clone())
            .unwrap_or_else(|| ZERO_SHA.to_string());

        let cap_list = match service {
            ServiceType::UploadPack => format!("{UPLOAD_CAP_LIST}{COMMON_CAP_LIST}"),
            ServiceType::ReceivePack => format!("{RECEIVE_CAP_LIST}{COMMON_CAP_LIST}"),
        };

        let name = if head == ZERO_SHA { "capabilities^{}" } else { "HEAD" };
        let mut ref_list = vec![format!("{head} {name}\0{cap_list}\n")];
        for r in &refs {
            ref_list.push(format!("{} {}\n", r.target, r.name));
        }

        let stream = build_smart_reply(TransportProtocol::Http, &ref_list, service.to_string());
        Ok(stream.to_vec())
    }

    /// `POST /<ns>/git-upload-pack` (§4.6): negotiate wants/haves, stream a
    /// packfile of every object reachable from the wants but not the haves.
    pub async fn upload_pack(&self, request: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let mut bytes = Bytes::copy_from_slice(request);
        let mut wants = Vec::new();
        let mut haves = Vec::new();

        loop {
            let (taken, mut line) = read_pkt_line(&mut bytes);
            if taken == 0 || line.is_empty() {
                break;
            }
            let command = read_until_white_space(&mut line);
            match command.as_str() {
                "want" => wants.push(read_until_white_space(&mut line)),
                "have" => haves.push(read_until_white_space(&mut line)),
                "done" => break,
                other => tracing::warn!("unknown upload-pack command: {other}"),
            }
        }

        let mut response = BytesMut::new();
        let mut common = None;
        for have in &haves {
            if let Ok(hash) = have.parse::<ObjectHash>() {
                if self.object_store.has_object(&hash).await.unwrap_or(false) {
                    add_pkt_line_string(&mut response, format!("ACK {have} common\n"));
                    common.get_or_insert_with(|| have.clone());
                }
            }
        }
        if common.is_none() {
            add_pkt_line_string(&mut response, "NAK\n".to_string());
        } else {
            add_pkt_line_string(&mut response, format!("ACK {} ready\n", common.unwrap()));
        }

        let excluded = self.reachable_from(&haves).await.map_err(ProtocolError::from)?;
        let objects = self.collect_objects(&wants, &excluded).await.map_err(ProtocolError::from)?;
        let pack = crate::codec::pack::pack_encode(&objects).map_err(ProtocolError::from)?;

        add_pkt_line_string(&mut response, "PACK\n".to_string());
        response.put(&PKT_LINE_END_MARKER[..]);
        response.extend_from_slice(&pack);
        Ok(response.to_vec())
    }

    /// `POST /<ns>/git-receive-pack` (§4.6): apply ref update commands then
    /// the trailing packfile, CAS-guarded per ref.
    pub async fn receive_pack(&self, request: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let mut bytes = Bytes::copy_from_slice(request);
        let mut commands = Vec::new();
        let mut atomic = false;

        loop {
            let (taken, line) = read_pkt_line(&mut bytes);
            if taken == 0 || line.is_empty() {
                break;
            }
            let mut line = line;
            let old_hash = read_until_white_space(&mut line);
            let new_hash = read_until_white_space(&mut line);
            let mut ref_name_and_caps = line;
            let ref_name = if let Some(pos) = ref_name_and_caps.iter().position(|b| *b == 0) {
                let caps = String::from_utf8_lossy(&ref_name_and_caps[..pos]).to_string();
                ref_name_and_caps.advance(pos + 1);
                atomic = atomic || caps.contains("atomic");
                String::from_utf8_lossy(&ref_name_and_caps).trim_end().to_string()
            } else {
                String::from_utf8_lossy(&ref_name_and_caps).trim_end().to_string()
            };
            commands.push(RefCommand::new(old_hash, new_hash, ref_name));
        }

        if !bytes.is_empty() {
            let mut on_entry_objects: Vec<(ObjectType, Vec<u8>)> = Vec::new();
            crate::codec::pack::pack_decode(&bytes, |entry| {
                on_entry_objects.push((entry.obj_type, entry.data));
            })
            .map_err(ProtocolError::from)?;
            self.object_store.put_objects(on_entry_objects).await.map_err(ProtocolError::from)?;
        }

        let mut report_status = BytesMut::new();
        add_pkt_line_string(&mut report_status, "unpack ok\n".to_string());

        if atomic {
            let mut any_rejected = false;
            for command in &commands {
                if self.would_reject(command).await {
                    any_rejected = true;
                    break;
                }
            }
            if any_rejected {
                for command in &mut commands {
                    command.failed("atomic transaction aborted".to_string());
                    add_pkt_line_string(&mut report_status, command.report_line());
                }
                report_status.put(&PKT_LINE_END_MARKER[..]);
                return Ok(report_status.to_vec());
            }
        }

        for command in &mut commands {
            let expected_old = if command.old_hash == ZERO_SHA { None } else { Some(command.old_hash.clone()) };
            let result = self
                .refs
                .update_ref(
                    &command.ref_name,
                    &command.new_hash,
                    UpdateRefOptions {
                        expected_old_sha: expected_old,
                        create: command.old_hash == ZERO_SHA,
                        ..Default::default()
                    },
                )
                .await;
            match result {
                Ok(()) => command.success(),
                Err(e) => command.failed(e.to_string()),
            }
            add_pkt_line_string(&mut report_status, command.report_line());
        }

        report_status.put(&PKT_LINE_END_MARKER[..]);
        Ok(report_status.to_vec())
    }

    /// Dry-runs a single ref-update command against current ref/object
    /// state without mutating anything, so an atomic push can be rejected
    /// in full before any command is applied.
    async fn would_reject(&self, command: &RefCommand) -> bool {
        let deleting = command.new_hash == ZERO_SHA;

        if !deleting {
            let Ok(hash) = command.new_hash.parse::<ObjectHash>() else { return true };
            match self.object_store.has_object(&hash).await {
                Ok(true) => {}
                _ => return true,
            }
        }

        let existing = match self.refs.get_ref(&command.ref_name).await {
            Ok(value) => value,
            Err(_) => return true,
        };
        let expected_old = if command.old_hash == ZERO_SHA { None } else { Some(command.old_hash.clone()) };
        match (&existing, &expected_old) {
            (None, None) => {}
            (None, Some(_)) => return true,
            (Some(_), None) => return true,
            (Some(current), Some(expected)) => {
                if &current.target != expected {
                    return true;
                }
            }
        }

        let rule = match protection::find_matching_rule(self.refs.db(), &command.ref_name).await {
            Ok(rule) => rule,
            Err(_) => return true,
        };
        let Some(rule) = rule else { return false };
        if rule.required_reviews > 0 {
            return true;
        }
        if rule.prevent_deletion && deleting {
            return true;
        }
        if rule.prevent_force_push && !deleting {
            if let Some(current) = &existing {
                if current.target != command.new_hash {
                    match self.refs.is_descendant(&command.new_hash, &current.target).await {
                        Ok(true) => {}
                        _ => return true,
                    }
                }
            }
        }
        false
    }

    /// All shas reachable (commit parents, tree entries, blobs) from `tips`.
    async fn reachable_from(&self, tips: &[String]) -> Result<HashSet<String>, CellError> {
        let mut visited = HashSet::new();
        let mut frontier: Vec<String> = tips.to_vec();
        while let Some(sha_hex) = frontier.pop() {
            if !visited.insert(sha_hex.clone()) {
                continue;
            }
            let Ok(hash) = sha_hex.parse::<ObjectHash>() else { continue };
            if let Some(commit) = self.object_store.get_commit(&hash).await? {
                frontier.push(commit.tree_id.to_string());
                for parent in commit.parent_commit_ids {
                    frontier.push(parent.to_string());
                }
            } else if let Some(tree) = self.object_store.get_tree(&hash).await? {
                for entry in tree.tree_entries {
                    frontier.push(entry.id.to_string());
                }
            }
        }
        Ok(visited)
    }

    /// Objects reachable from `wants` but not already in `excluded`.
    async fn collect_objects(&self, wants: &[String], excluded: &HashSet<String>) -> Result<Vec<(ObjectType, Vec<u8>)>, CellError> {
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        let mut frontier: Vec<String> = wants.to_vec();

        while let Some(sha_hex) = frontier.pop() {
            if excluded.contains(&sha_hex) || !visited.insert(sha_hex.clone()) {
                continue;
            }
            let Ok(hash) = sha_hex.parse::<ObjectHash>() else { continue };

            if let Some(commit) = self.object_store.get_commit(&hash).await? {
                out.push((ObjectType::Commit, commit.to_data().map_err(|e| CellError::Internal(e.to_string()))?));
                frontier.push(commit.tree_id.to_string());
                for parent in commit.parent_commit_ids {
                    frontier.push(parent.to_string());
                }
            } else if let Some(tree) = self.object_store.get_tree(&hash).await? {
                let data = tree.to_data().map_err(|e| CellError::Internal(e.to_string()))?;
                out.push((ObjectType::Tree, data));
                for entry in &tree.tree_entries {
                    frontier.push(entry.id.to_string());
                }
            } else if let Some(blob) = self.object_store.get_blob(&hash).await? {
                out.push((ObjectType::Blob, blob.data));
            }
        }
        Ok(out)
    }
}
