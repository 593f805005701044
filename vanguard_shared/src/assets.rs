//! Asset precache bookkeeping.
//!
//! The registry tracks which named assets (models, materials, sounds) the
//! current session depends on. Entries may be registered before their data is
//! resolved; the manifest built from the registry is what joining clients
//! must be able to satisfy. Actual file loading is an external concern.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Category of a precached asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    Model,
    Material,
    Sound,
}

/// Stable id of a registered asset within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub u32);

/// One registered asset. `data` stays `None` until the loader resolves it.
#[derive(Debug, Clone)]
pub struct AssetEntry {
    pub id: AssetId,
    pub kind: AssetKind,
    pub name: String,
    pub data: Option<Bytes>,
}

impl AssetEntry {
    /// Content hash when resolved, name hash otherwise.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        match &self.data {
            Some(bytes) => bytes.as_ref().hash(&mut hasher),
            None => self.name.hash(&mut hasher),
        }
        hasher.finish()
    }
}

/// Manifest entry sent to joining clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: AssetId,
    pub kind: AssetKind,
    pub name: String,
    pub hash: u64,
}

/// The precache manifest: everything a client must resolve before spawning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PrecacheManifest {
    pub entries: Vec<ManifestEntry>,
}

impl PrecacheManifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Session-wide set of referenced assets.
#[derive(Default)]
pub struct AssetRegistry {
    entries: Vec<AssetEntry>,
    by_name: HashMap<(AssetKind, String), AssetId>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an asset name, returning the existing id if already known.
    pub fn precache(&mut self, kind: AssetKind, name: &str) -> AssetId {
        if let Some(id) = self.by_name.get(&(kind, name.to_string())) {
            return *id;
        }
        let id = AssetId(self.entries.len() as u32);
        self.entries.push(AssetEntry {
            id,
            kind,
            name: name.to_string(),
            data: None,
        });
        self.by_name.insert((kind, name.to_string()), id);
        id
    }

    pub fn precache_model(&mut self, name: &str) -> AssetId {
        self.precache(AssetKind::Model, name)
    }

    pub fn precache_material(&mut self, name: &str) -> AssetId {
        self.precache(AssetKind::Material, name)
    }

    pub fn precache_sound(&mut self, name: &str) -> AssetId {
        self.precache(AssetKind::Sound, name)
    }

    /// Attaches loaded data to a registered entry.
    pub fn resolve(&mut self, id: AssetId, data: Bytes) -> bool {
        match self.entries.get_mut(id.0 as usize) {
            Some(entry) => {
                entry.data = Some(data);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: AssetId) -> Option<&AssetEntry> {
        self.entries.get(id.0 as usize)
    }

    pub fn lookup(&self, kind: AssetKind, name: &str) -> Option<AssetId> {
        self.by_name.get(&(kind, name.to_string())).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the manifest sent during the join handshake.
    pub fn manifest(&self) -> PrecacheManifest {
        PrecacheManifest {
            entries: self
                .entries
                .iter()
                .map(|e| ManifestEntry {
                    id: e.id,
                    kind: e.kind,
                    name: e.name.clone(),
                    hash: e.content_hash(),
                })
                .collect(),
        }
    }
}
