//! Builds a [`TreeSnapshot`] from one pass over the record source.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::NaiveDate;
use indexmap::IndexMap;

use super::inode_table::{Inode, InodeTable};
use super::snapshot::{
    root_node, NodeKind, NodeType, PhotoRef, RecordEntry, TreeSnapshot, VirtualNode,
};
use super::sudoers::SudoersPolicy;
use crate::codec;
use crate::decode::{
    decode_attribute, AttributeClass, ContentType, DecodedFile, Schema, FILE_MODE,
};
use crate::record::{Record, RecordId};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("snapshot build task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Everything that shapes a build besides the records themselves.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub schema: Schema,
    pub sudoers: Option<SudoersPolicy>,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    options: Arc<BuildOptions>,
}

impl SnapshotBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Build on a blocking thread so the runtime keeps serving other tasks.
    pub async fn build_blocking(
        &self,
        previous: Arc<TreeSnapshot>,
        records: Vec<Record>,
    ) -> Result<TreeSnapshot, BuildError> {
        let builder = self.clone();
        let snapshot =
            tokio::task::spawn_blocking(move || builder.build(&previous, records)).await?;
        Ok(snapshot)
    }

    pub fn build(&self, previous: &TreeSnapshot, records: Vec<Record>) -> TreeSnapshot {
        self.build_at(previous, records, SystemTime::now())
    }

    #[tracing::instrument(skip_all, fields(generation = previous.generation() + 1))]
    pub fn build_at(
        &self,
        previous: &TreeSnapshot,
        records: Vec<Record>,
        built_at: SystemTime,
    ) -> TreeSnapshot {
        let schema = &self.options.schema;
        let staged = stage(records);
        let mut arena = Arena::new(previous, built_at);

        // Directories first so that a directory always wins over an
        // attribute file of the same name, whatever the record order.
        let mut dirs = Vec::with_capacity(staged.len());
        for (path, record) in &staged {
            let dir = arena.ensure_dir(path);
            let mtime = record_mtime(schema, record);
            if let Some(mtime) = mtime {
                arena.set_mtime(dir, mtime);
            }
            dirs.push((dir, mtime.unwrap_or(built_at)));
        }

        let mut entries = IndexMap::with_capacity(staged.len());
        for ((path, record), (dir, mtime)) in staged.iter().zip(dirs) {
            let mut photo = None;
            // Names produced by image and multiline attributes. These keep
            // their file even when a generic attribute encodes to the same name.
            let mut recognized: HashSet<String> = HashSet::new();

            for (attribute, values) in record.attributes() {
                let class = schema.classify(attribute);
                let is_generic = class == AttributeClass::Generic;
                let is_photo = schema.is_photo_attribute(attribute);

                for file in decode_attribute(class, attribute, values) {
                    if recognized.contains(&file.name) {
                        tracing::warn!(
                            record = %record.id,
                            %attribute,
                            name = %file.name,
                            "file name already taken by a recognized attribute; dropping value"
                        );
                        continue;
                    }
                    if !is_generic {
                        recognized.insert(file.name.clone());
                    }

                    let file_path = InodeTable::join(path, &file.name);
                    let content = file.content.clone();
                    let Some(ino) = arena.add_file(dir, path, file, mtime) else {
                        continue;
                    };
                    if is_photo && photo.is_none() {
                        photo = Some(PhotoRef {
                            ino,
                            path: file_path,
                            content,
                        });
                    }
                }
            }

            let uid = record
                .first_text(&schema.uid_attribute)
                .and_then(|text| text.trim().parse::<u32>().ok());

            entries.insert(
                record.id.clone(),
                RecordEntry {
                    id: record.id.clone(),
                    dir,
                    path: path.clone(),
                    uid,
                    photo,
                },
            );
        }

        if let Some(policy) = &self.options.sudoers {
            let content = policy.render(staged.values());
            let file = DecodedFile {
                name: codec::encode(policy.file_name.as_bytes()),
                content,
                mode: FILE_MODE,
                content_type: ContentType::Text,
            };
            if arena.has_child(InodeTable::ROOT_INODE, &file.name) {
                tracing::warn!(name = %file.name, "root entry already exists; not writing sudoers file");
            } else {
                arena.add_file(InodeTable::ROOT_INODE, "/", file, built_at);
            }
        }

        let generation = previous.generation() + 1;
        let snapshot = arena.finish(generation, built_at, entries);
        tracing::debug!(
            records = snapshot.record_count(),
            nodes = snapshot.node_count(),
            "snapshot built"
        );
        snapshot
    }
}

/// Map every usable record to its directory path. Later records replace
/// earlier ones that land on the same path.
fn stage(records: Vec<Record>) -> IndexMap<String, Record> {
    let mut staged: IndexMap<String, Record> = IndexMap::with_capacity(records.len());

    for record in records {
        let components = match record.id.components() {
            Ok(components) => components,
            Err(error) => {
                tracing::warn!(record = %record.id, %error, "skipping record with unusable DN");
                continue;
            }
        };

        let path = components
            .iter()
            .fold("/".to_string(), |parent, component| {
                InodeTable::join(&parent, &codec::encode(component))
            });

        if let Some(earlier) = staged.get(&path) {
            tracing::warn!(
                %path,
                earlier = %earlier.id,
                later = %record.id,
                "records collide on one directory; keeping the later record"
            );
        }
        staged.insert(path, record);
    }

    staged
}

/// Mutable node storage used only while a build is in progress.
struct Arena<'p> {
    previous: &'p TreeSnapshot,
    nodes: HashMap<Inode, VirtualNode>,
    inodes: InodeTable,
    built_at: SystemTime,
}

impl<'p> Arena<'p> {
    fn new(previous: &'p TreeSnapshot, built_at: SystemTime) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(InodeTable::ROOT_INODE, root_node(built_at));
        Self {
            previous,
            nodes,
            inodes: previous.inodes().successor(),
            built_at,
        }
    }

    /// Inode for `path`, carried over from the previous generation unless
    /// the node there was of a different kind.
    fn assign(&mut self, path: &str, kind: NodeType) -> Inode {
        let previous: &'p TreeSnapshot = self.previous;
        let same_kind = previous
            .inodes()
            .get_inode(path)
            .and_then(|ino| previous.node(ino))
            .is_some_and(|node| node.node_type() == kind);
        self.inodes
            .get_or_create(path, same_kind.then(|| previous.inodes()))
    }

    fn child(&self, parent: Inode, name: &str) -> Option<&VirtualNode> {
        match &self.nodes.get(&parent)?.kind {
            NodeKind::Directory { children } => {
                children.get(name).and_then(|ino| self.nodes.get(ino))
            }
            NodeKind::File { .. } => None,
        }
    }

    fn has_child(&self, parent: Inode, name: &str) -> bool {
        self.child(parent, name).is_some()
    }

    fn attach(&mut self, parent: Inode, name: &str, ino: Inode) {
        if let Some(VirtualNode {
            kind: NodeKind::Directory { children },
            ..
        }) = self.nodes.get_mut(&parent)
        {
            children.insert(name.to_string(), ino);
        }
    }

    fn ensure_dir(&mut self, path: &str) -> Inode {
        let mut parent = InodeTable::ROOT_INODE;
        let mut parent_path = "/".to_string();

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let child_path = InodeTable::join(&parent_path, segment);
            let existing = self.child(parent, segment).map(|node| node.ino);
            parent = match existing {
                Some(ino) => ino,
                None => {
                    let ino = self.assign(&child_path, NodeType::Directory);
                    self.nodes.insert(
                        ino,
                        VirtualNode {
                            ino,
                            parent,
                            name: segment.to_string(),
                            mtime: self.built_at,
                            kind: NodeKind::Directory {
                                children: IndexMap::new(),
                            },
                        },
                    );
                    self.attach(parent, segment, ino);
                    ino
                }
            };
            parent_path = child_path;
        }

        parent
    }

    fn set_mtime(&mut self, ino: Inode, mtime: SystemTime) {
        if let Some(node) = self.nodes.get_mut(&ino) {
            node.mtime = mtime;
        }
    }

    fn add_file(
        &mut self,
        dir: Inode,
        dir_path: &str,
        file: DecodedFile,
        mtime: SystemTime,
    ) -> Option<Inode> {
        let path = InodeTable::join(dir_path, &file.name);

        match self.child(dir, &file.name) {
            Some(existing) if existing.is_dir() => {
                tracing::warn!(%path, "attribute file shadowed by a directory; dropping it");
                return None;
            }
            Some(_) => tracing::debug!(%path, "replacing earlier file with the same name"),
            None => {}
        }

        let ino = self.assign(&path, NodeType::File);
        self.nodes.insert(
            ino,
            VirtualNode {
                ino,
                parent: dir,
                name: file.name.clone(),
                mtime,
                kind: NodeKind::File {
                    content: file.content,
                    mode: file.mode,
                    content_type: file.content_type,
                },
            },
        );
        self.attach(dir, &file.name, ino);
        Some(ino)
    }

    fn finish(
        self,
        generation: u64,
        built_at: SystemTime,
        records: IndexMap<RecordId, RecordEntry>,
    ) -> TreeSnapshot {
        TreeSnapshot::from_parts(generation, built_at, self.nodes, self.inodes, records)
    }
}

fn record_mtime(schema: &Schema, record: &Record) -> Option<SystemTime> {
    schema
        .timestamp_attributes
        .iter()
        .filter_map(|attribute| record.first_text(attribute))
        .find_map(parse_generalized_time)
}

/// Parse LDAP GeneralizedTime (`YYYYmmddHHMMSS[.fff](Z|±hh[mm])`).
pub fn parse_generalized_time(text: &str) -> Option<SystemTime> {
    let text = text.trim();
    let digits = text.get(..14)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| digits[range].parse::<u32>().ok();
    let datetime = NaiveDate::from_ymd_opt(field(0..4)? as i32, field(4..6)?, field(6..8)?)?
        .and_hms_opt(field(8..10)?, field(10..12)?, field(12..14)?)?;

    let mut rest = &text[14..];
    if let Some(fraction) = rest.strip_prefix(['.', ',']) {
        let end = fraction
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(fraction.len());
        rest = &fraction[end..];
    }

    let offset_secs: i64 = match rest {
        "" | "Z" => 0,
        _ => {
            let (sign, zone) = if let Some(zone) = rest.strip_prefix('+') {
                (1, zone)
            } else if let Some(zone) = rest.strip_prefix('-') {
                (-1, zone)
            } else {
                return None;
            };
            let hours: i64 = zone.get(..2)?.parse().ok()?;
            let minutes: i64 = match zone.get(2..) {
                Some("") | None => 0,
                Some(minutes) => minutes.parse().ok()?,
            };
            sign * (hours * 3600 + minutes * 60)
        }
    };

    let utc = datetime.and_utc() - chrono::TimeDelta::try_seconds(offset_secs)?;
    Some(SystemTime::from(utc))
}

/// Build a snapshot straight from records without any history. Used by
/// one-shot commands and tests.
pub fn build_once(options: BuildOptions, records: Vec<Record>) -> TreeSnapshot {
    SnapshotBuilder::new(options).build(&TreeSnapshot::empty(), records)
}
