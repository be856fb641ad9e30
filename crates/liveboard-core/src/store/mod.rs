//! Layer store backed by a Loro CRDT document.
//!
//! The Loro document has the following structure:
//! ```text
//! LoroDoc
//! ├── "layers": LoroMap<LayerId, LoroMap> (layer records)
//! └── "layer_ids": LoroList<String> (layer ids in z-order, back to front)
//! ```
//!
//! Every mutation goes through [`LayerStore::apply`], which groups its
//! writes into a single Loro commit and reports what actually changed. An
//! id is listed in `layer_ids` if and only if `layers` holds its record;
//! remote merges that break this are repaired on import.

mod convert;

pub use convert::{layer_from_loro, layer_to_loro};

use crate::config::BoardConfig;
use crate::layer::{Bounds, Layer, LayerId, LayerKind, Rgb};
use convert::{bounds_to_loro, fill_to_loro};
use kurbo::Point;
use loro::{
    Container, ExportMode, LoroDoc, LoroError, LoroList, LoroMap, LoroValue, ValueOrContainer,
    VersionVector,
};
use std::collections::HashSet;
use thiserror::Error;

/// Key for the layer records map in the document.
pub const LAYERS_KEY: &str = "layers";
/// Key for the z-order list in the document.
pub const LAYER_IDS_KEY: &str = "layer_ids";

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("CRDT error: {0}")]
    Crdt(#[from] LoroError),
    #[error("Encode error: {0}")]
    Encode(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A requested write against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Append a new layer on top of the z-order.
    Insert { layer: Layer },
    /// Re-insert a known layer at a z-index.
    Restore { layer: Layer, index: usize },
    UpdateBounds { id: LayerId, bounds: Bounds },
    UpdateFill { id: LayerId, fill: Rgb },
    Delete { id: LayerId },
    Reorder { id: LayerId, index: usize },
}

/// A write that was actually committed, with enough state to invert it.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Inserted { layer: Layer, index: usize },
    Deleted { layer: Layer, index: usize },
    BoundsChanged { id: LayerId, before: Bounds, after: Bounds },
    FillChanged { id: LayerId, before: Rgb, after: Rgb },
    Reordered { id: LayerId, from: usize, to: usize },
}

impl Change {
    /// The mutation that undoes this change.
    pub fn inverse(&self) -> Mutation {
        match self {
            Change::Inserted { layer, .. } => Mutation::Delete { id: layer.id.clone() },
            Change::Deleted { layer, index } => Mutation::Restore {
                layer: layer.clone(),
                index: *index,
            },
            Change::BoundsChanged { id, before, .. } => Mutation::UpdateBounds {
                id: id.clone(),
                bounds: *before,
            },
            Change::FillChanged { id, before, .. } => Mutation::UpdateFill {
                id: id.clone(),
                fill: *before,
            },
            Change::Reordered { id, from, .. } => Mutation::Reorder {
                id: id.clone(),
                index: *from,
            },
        }
    }

    /// The mutation that reapplies this change.
    pub fn forward(&self) -> Mutation {
        match self {
            Change::Inserted { layer, index } => Mutation::Restore {
                layer: layer.clone(),
                index: *index,
            },
            Change::Deleted { layer, .. } => Mutation::Delete { id: layer.id.clone() },
            Change::BoundsChanged { id, after, .. } => Mutation::UpdateBounds {
                id: id.clone(),
                bounds: *after,
            },
            Change::FillChanged { id, after, .. } => Mutation::UpdateFill {
                id: id.clone(),
                fill: *after,
            },
            Change::Reordered { id, to, .. } => Mutation::Reorder {
                id: id.clone(),
                index: *to,
            },
        }
    }

    /// Layer this change touched.
    pub fn layer_id(&self) -> &str {
        match self {
            Change::Inserted { layer, .. } | Change::Deleted { layer, .. } => &layer.id,
            Change::BoundsChanged { id, .. } | Change::FillChanged { id, .. } | Change::Reordered { id, .. } => id,
        }
    }
}

/// Typed, transactional access to the shared layer document.
pub struct LayerStore {
    doc: LoroDoc,
    max_layers: usize,
    default_size: f64,
}

impl LayerStore {
    /// Create an empty store.
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            doc: LoroDoc::new(),
            max_layers: config.max_layers,
            default_size: config.default_layer_size,
        }
    }

    /// Create a store from a snapshot exported by a peer or relay.
    pub fn from_snapshot(bytes: &[u8], config: &BoardConfig) -> StoreResult<Self> {
        let mut store = Self::new(config);
        store.doc.import(bytes)?;
        store.repair()?;
        Ok(store)
    }

    /// Peer id of the underlying CRDT document.
    pub fn peer_id(&self) -> u64 {
        self.doc.peer_id()
    }

    pub fn max_layers(&self) -> usize {
        self.max_layers
    }

    fn layers_map(&self) -> LoroMap {
        self.doc.get_map(LAYERS_KEY)
    }

    fn id_list(&self) -> LoroList {
        self.doc.get_list(LAYER_IDS_KEY)
    }

    /// Handle to one layer's record, if it exists.
    fn layer_record(&self, id: &str) -> Option<LoroMap> {
        match self.layers_map().get(id)? {
            ValueOrContainer::Container(Container::Map(map)) => Some(map),
            _ => None,
        }
    }

    /// Number of live layers.
    pub fn len(&self) -> usize {
        self.layers_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Layer ids in z-order (back to front).
    pub fn layer_ids(&self) -> Vec<LayerId> {
        let list = self.id_list();
        let mut result = Vec::with_capacity(list.len());
        for i in 0..list.len() {
            if let Some(ValueOrContainer::Value(LoroValue::String(id))) = list.get(i) {
                result.push(id.to_string());
            }
        }
        result
    }

    /// Position of a layer in the z-order.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        let list = self.id_list();
        (0..list.len()).find(|&i| {
            matches!(list.get(i), Some(ValueOrContainer::Value(LoroValue::String(s))) if s.as_ref() == id)
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.layer_record(id).is_some()
    }

    /// Get a layer by id.
    pub fn layer(&self, id: &str) -> Option<Layer> {
        match self.layer_record(id)?.get_deep_value() {
            LoroValue::Map(map) => layer_from_loro(&map),
            _ => None,
        }
    }

    /// All layers in z-order.
    pub fn layers(&self) -> Vec<Layer> {
        let LoroValue::Map(records) = self.layers_map().get_deep_value() else {
            return Vec::new();
        };
        self.layer_ids()
            .iter()
            .filter_map(|id| match records.get(id.as_str()) {
                Some(LoroValue::Map(record)) => layer_from_loro(record),
                _ => None,
            })
            .collect()
    }

    // --- Transactions ---

    /// Apply a batch of mutations as one commit.
    ///
    /// Mutations that find nothing to do (missing target, full canvas,
    /// unchanged value) are skipped and produce no change.
    pub fn apply(&mut self, mutations: &[Mutation]) -> StoreResult<Vec<Change>> {
        let mut changes = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            match self.apply_one(mutation) {
                Ok(Some(change)) => changes.push(change),
                Ok(None) => {}
                Err(err) => {
                    // Keep the referential invariant even if a write failed half way.
                    self.doc.commit();
                    self.repair()?;
                    return Err(err);
                }
            }
        }
        self.doc.commit();
        Ok(changes)
    }

    fn apply_one(&mut self, mutation: &Mutation) -> StoreResult<Option<Change>> {
        match mutation {
            Mutation::Insert { layer } => {
                let index = self.id_list().len();
                self.write_layer(layer, index)
            }
            Mutation::Restore { layer, index } => self.write_layer(layer, *index),
            Mutation::UpdateBounds { id, bounds } => {
                let (Some(record), Some(layer)) = (self.layer_record(id), self.layer(id)) else {
                    log::debug!("Ignoring bounds update for missing layer {id}");
                    return Ok(None);
                };
                if layer.bounds == *bounds {
                    return Ok(None);
                }
                bounds_to_loro(bounds, &record)?;
                Ok(Some(Change::BoundsChanged {
                    id: id.clone(),
                    before: layer.bounds,
                    after: *bounds,
                }))
            }
            Mutation::UpdateFill { id, fill } => {
                let (Some(record), Some(layer)) = (self.layer_record(id), self.layer(id)) else {
                    log::debug!("Ignoring fill update for missing layer {id}");
                    return Ok(None);
                };
                if layer.fill == *fill {
                    return Ok(None);
                }
                fill_to_loro(*fill, &record)?;
                Ok(Some(Change::FillChanged {
                    id: id.clone(),
                    before: layer.fill,
                    after: *fill,
                }))
            }
            Mutation::Delete { id } => {
                let layer = self.layer(id);
                let index = self.index_of(id);
                if self.contains(id) {
                    self.layers_map().delete(id)?;
                }
                self.remove_from_list(id)?;
                Ok(layer.map(|layer| Change::Deleted {
                    layer,
                    index: index.unwrap_or_default(),
                }))
            }
            Mutation::Reorder { id, index } => {
                let (Some(from), true) = (self.index_of(id), self.contains(id)) else {
                    return Ok(None);
                };
                let list = self.id_list();
                let to = (*index).min(list.len().saturating_sub(1));
                if from == to {
                    return Ok(None);
                }
                list.delete(from, 1)?;
                list.insert(to, LoroValue::String(id.to_string().into()))?;
                Ok(Some(Change::Reordered {
                    id: id.clone(),
                    from,
                    to,
                }))
            }
        }
    }

    /// Write a complete layer record and its z-order entry.
    ///
    /// The live count is re-read here, inside the transaction, so a stale
    /// count observed by the caller can never push the store over the cap.
    fn write_layer(&mut self, layer: &Layer, index: usize) -> StoreResult<Option<Change>> {
        if self.len() >= self.max_layers {
            log::debug!("Layer cap of {} reached, ignoring insert", self.max_layers);
            return Ok(None);
        }
        if self.contains(&layer.id) {
            return Ok(None);
        }

        let record = self.layers_map().insert_container(&layer.id, LoroMap::new())?;
        layer_to_loro(layer, &record)?;

        let list = self.id_list();
        let index = index.min(list.len());
        list.insert(index, LoroValue::String(layer.id.clone().into()))?;

        Ok(Some(Change::Inserted {
            layer: layer.clone(),
            index,
        }))
    }

    fn remove_from_list(&self, id: &str) -> StoreResult<()> {
        let list = self.id_list();
        // Walk backwards so earlier indexes stay valid after each delete.
        for i in (0..list.len()).rev() {
            if let Some(ValueOrContainer::Value(LoroValue::String(s))) = list.get(i) {
                if s.as_ref() == id {
                    list.delete(i, 1)?;
                }
            }
        }
        Ok(())
    }

    // --- Convenience operations ---

    /// Insert a new layer of `kind` at `position` with the default size.
    /// Returns `None` when the canvas is full.
    pub fn insert_layer(&mut self, kind: LayerKind, position: Point, fill: Rgb) -> StoreResult<Option<Change>> {
        let layer = Layer::new(kind, position, self.default_size, fill);
        Ok(self.apply(&[Mutation::Insert { layer }])?.pop())
    }

    /// Insert a freehand path from absolute canvas points.
    pub fn insert_path(&mut self, points: &[Point], fill: Rgb) -> StoreResult<Option<Change>> {
        let Some(layer) = Layer::path(points, fill) else {
            return Ok(None);
        };
        Ok(self.apply(&[Mutation::Insert { layer }])?.pop())
    }

    /// Re-insert a known layer at `index` (clamped). No-op if the id is
    /// already live or the canvas is full.
    pub fn restore_layer(&mut self, layer: Layer, index: usize) -> StoreResult<Option<Change>> {
        Ok(self.apply(&[Mutation::Restore { layer, index }])?.pop())
    }

    pub fn update_layer_bounds(&mut self, id: &str, bounds: Bounds) -> StoreResult<Option<Change>> {
        Ok(self
            .apply(&[Mutation::UpdateBounds {
                id: id.to_string(),
                bounds,
            }])?
            .pop())
    }

    pub fn update_layer_fill(&mut self, id: &str, fill: Rgb) -> StoreResult<Option<Change>> {
        Ok(self
            .apply(&[Mutation::UpdateFill {
                id: id.to_string(),
                fill,
            }])?
            .pop())
    }

    pub fn delete_layer(&mut self, id: &str) -> StoreResult<Option<Change>> {
        Ok(self.apply(&[Mutation::Delete { id: id.to_string() }])?.pop())
    }

    /// Move a layer to `index` in the z-order (clamped to the valid range).
    pub fn reorder_layer(&mut self, id: &str, index: usize) -> StoreResult<Option<Change>> {
        Ok(self
            .apply(&[Mutation::Reorder {
                id: id.to_string(),
                index,
            }])?
            .pop())
    }

    // --- Integrity ---

    /// Restore the list/map correspondence after a merge.
    ///
    /// Listed ids without a record are dropped, duplicate list entries keep
    /// only the topmost occurrence, and records missing from the list are
    /// appended on top. Returns the number of fixes made.
    pub fn repair(&mut self) -> StoreResult<usize> {
        let records: HashSet<String> = match self.layers_map().get_deep_value() {
            LoroValue::Map(map) => map.keys().cloned().collect(),
            _ => HashSet::new(),
        };

        let ids = self.layer_ids();
        let mut seen = HashSet::new();
        let mut doomed = Vec::new();
        for (i, id) in ids.iter().enumerate().rev() {
            if !records.contains(id) || !seen.insert(id.clone()) {
                doomed.push(i);
            }
        }

        let mut orphans: Vec<&String> = records.iter().filter(|id| !seen.contains(*id)).collect();
        orphans.sort();

        let fixes = doomed.len() + orphans.len();
        if fixes == 0 {
            return Ok(0);
        }

        let list = self.id_list();
        // `doomed` is in descending order.
        for i in doomed {
            list.delete(i, 1)?;
        }
        for id in orphans {
            list.push(LoroValue::String(id.clone().into()))?;
        }
        self.doc.commit();

        log::warn!("Repaired {fixes} dangling layer references after merge");
        Ok(fixes)
    }

    // --- Network Sync ---

    /// Export the full document state.
    pub fn export_snapshot(&self) -> StoreResult<Vec<u8>> {
        self.doc
            .export(ExportMode::Snapshot)
            .map_err(|e| StoreError::Encode(e.to_string()))
    }

    /// Export the operations made since `since`.
    pub fn export_updates(&self, since: &VersionVector) -> StoreResult<Vec<u8>> {
        self.doc
            .export(ExportMode::updates(since))
            .map_err(|e| StoreError::Encode(e.to_string()))
    }

    /// Current version vector.
    pub fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    /// Merge updates or a snapshot from a peer.
    pub fn import(&mut self, bytes: &[u8]) -> StoreResult<()> {
        self.doc.import(bytes)?;
        self.repair()?;
        Ok(())
    }

    /// Merge updates without repairing the result.
    ///
    /// For relays, which forward operations but must never author any.
    pub fn import_raw(&mut self, bytes: &[u8]) -> StoreResult<()> {
        self.doc.import(bytes)?;
        Ok(())
    }

    /// Replace the local document with an authoritative snapshot.
    ///
    /// Local operations the snapshot does not contain are discarded. Returns
    /// the snapshot's version, so repairs made here still count as local
    /// operations to export.
    pub fn replace_with_snapshot(&mut self, bytes: &[u8]) -> StoreResult<VersionVector> {
        let doc = LoroDoc::new();
        doc.import(bytes)?;
        let imported = doc.oplog_vv();
        self.doc = doc;
        self.repair()?;
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> LayerStore {
        LayerStore::new(&BoardConfig::default())
    }

    fn insert(store: &mut LayerStore, x: f64, y: f64) -> Layer {
        match store
            .insert_layer(LayerKind::Rectangle, Point::new(x, y), Rgb::black())
            .expect("Failed to insert layer")
        {
            Some(Change::Inserted { layer, .. }) => layer,
            other => panic!("Expected an insert, got {other:?}"),
        }
    }

    fn sync(from: &LayerStore, to: &mut LayerStore) {
        let bytes = from.export_updates(&to.version()).expect("Failed to export");
        to.import(&bytes).expect("Failed to import");
    }

    #[test]
    fn test_insert_layer_defaults() {
        let mut store = store();
        let layer = insert(&mut store, 10.0, 10.0);

        let stored = store.layer(&layer.id).expect("Layer not found");
        assert_eq!(stored.bounds, Bounds::new(10.0, 10.0, 100.0, 100.0));
        assert_eq!(stored.kind, LayerKind::Rectangle);
        assert_eq!(store.layer_ids(), vec![layer.id]);
    }

    #[test]
    fn test_insert_cap_and_order() {
        let mut store = store();
        let mut inserted = Vec::new();
        for i in 0..105 {
            if let Some(Change::Inserted { layer, .. }) = store
                .insert_layer(LayerKind::Note, Point::new(i as f64, 0.0), Rgb::black())
                .expect("Failed to insert")
            {
                inserted.push(layer.id);
            }
        }

        assert_eq!(inserted.len(), 100);
        assert_eq!(store.len(), 100);
        assert_eq!(store.layer_ids(), inserted);
    }

    #[test]
    fn test_insert_over_cap_leaves_store_unchanged() {
        let mut store = store();
        for i in 0..100 {
            insert(&mut store, i as f64, 0.0);
        }
        let before = store.layer_ids();
        let version = store.version();

        let result = store
            .insert_layer(LayerKind::Rectangle, Point::ZERO, Rgb::black())
            .expect("Insert must not fail");

        assert!(result.is_none());
        assert_eq!(store.layer_ids(), before);
        assert_eq!(store.version(), version);
    }

    #[test]
    fn test_update_missing_layer_is_noop() {
        let mut store = store();
        let change = store
            .update_layer_bounds("gone", Bounds::new(0.0, 0.0, 1.0, 1.0))
            .expect("Update must not fail");
        assert!(change.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_bounds_records_before() {
        let mut store = store();
        let layer = insert(&mut store, 0.0, 0.0);
        let target = Bounds::new(5.0, 6.0, 70.0, 80.0);

        let change = store.update_layer_bounds(&layer.id, target).expect("Failed to update");
        assert_eq!(
            change,
            Some(Change::BoundsChanged {
                id: layer.id.clone(),
                before: layer.bounds,
                after: target,
            })
        );
        assert_eq!(store.layer(&layer.id).map(|l| l.bounds), Some(target));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut store = store();
        let layer = insert(&mut store, 0.0, 0.0);

        let first = store.delete_layer(&layer.id).expect("Failed to delete");
        assert!(matches!(first, Some(Change::Deleted { index: 0, .. })));
        let second = store.delete_layer(&layer.id).expect("Second delete must not fail");
        assert!(second.is_none());
        assert!(store.layer_ids().is_empty());
        assert!(store.layer(&layer.id).is_none());
    }

    #[test]
    fn test_reorder_layer() {
        let mut store = store();
        let a = insert(&mut store, 0.0, 0.0);
        let b = insert(&mut store, 10.0, 0.0);
        let c = insert(&mut store, 20.0, 0.0);

        let change = store.reorder_layer(&a.id, 99).expect("Failed to reorder");
        assert_eq!(
            change,
            Some(Change::Reordered {
                id: a.id.clone(),
                from: 0,
                to: 2,
            })
        );
        assert_eq!(store.layer_ids(), vec![b.id.clone(), c.id.clone(), a.id.clone()]);

        let change = store.reorder_layer(&a.id, 2).expect("Failed to reorder");
        assert!(change.is_none());
    }

    #[test]
    fn test_restore_at_index() {
        let mut store = store();
        let a = insert(&mut store, 0.0, 0.0);
        let b = insert(&mut store, 10.0, 0.0);

        let Some(deleted) = store.delete_layer(&a.id).expect("Failed to delete") else {
            panic!("Expected a delete");
        };
        store.apply(&[deleted.inverse()]).expect("Failed to restore");

        assert_eq!(store.layer_ids(), vec![a.id.clone(), b.id]);
        assert_eq!(store.layer(&a.id), Some(a));
    }

    #[test]
    fn test_restore_live_layer_is_noop() {
        let mut store = store();
        let a = insert(&mut store, 0.0, 0.0);
        let change = store.restore_layer(a.clone(), 0).expect("Restore must not fail");
        assert!(change.is_none());
        assert_eq!(store.layer_ids(), vec![a.id]);
    }

    #[test]
    fn test_batch_is_one_commit() {
        let mut store = store();
        let a = insert(&mut store, 0.0, 0.0);
        let b = insert(&mut store, 10.0, 0.0);

        let changes = store
            .apply(&[
                Mutation::UpdateBounds {
                    id: a.id.clone(),
                    bounds: Bounds::new(1.0, 1.0, 100.0, 100.0),
                },
                Mutation::Delete { id: "missing".into() },
                Mutation::UpdateFill {
                    id: b.id.clone(),
                    fill: Rgb::new(255, 0, 0),
                },
            ])
            .expect("Failed to apply batch");

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].layer_id(), a.id);
        assert_eq!(changes[1].layer_id(), b.id);
    }

    #[test]
    fn test_path_roundtrip() {
        let mut store = store();
        let points = [Point::new(0.0, 0.0), Point::new(10.0, 5.0), Point::new(20.0, 30.0)];
        let Some(Change::Inserted { layer, .. }) = store.insert_path(&points, Rgb::new(1, 2, 3)).expect("Failed to insert path") else {
            panic!("Expected a path insert");
        };

        let stored = store.layer(&layer.id).expect("Path not found");
        assert_eq!(stored.kind, LayerKind::Path);
        assert_eq!(stored.absolute_points(), points.to_vec());
        assert_eq!(stored.fill, Rgb::new(1, 2, 3));
    }

    #[test]
    fn test_concurrent_delete_and_update_leave_no_dangling_id() {
        let mut alice = store();
        let mut bob = store();
        let layer = insert(&mut alice, 0.0, 0.0);
        sync(&alice, &mut bob);
        assert!(bob.contains(&layer.id));

        alice.delete_layer(&layer.id).expect("Failed to delete");
        bob.update_layer_bounds(&layer.id, Bounds::new(50.0, 50.0, 10.0, 10.0))
            .expect("Failed to update");

        sync(&alice, &mut bob);
        sync(&bob, &mut alice);

        for store in [&alice, &bob] {
            assert!(!store.layer_ids().contains(&layer.id));
            assert!(store.layer(&layer.id).is_none());
            assert_eq!(store.len(), store.layer_ids().len());
        }
    }

    #[test]
    fn test_concurrent_reorder_and_delete_is_repaired() {
        let mut alice = store();
        let mut bob = store();
        let a = insert(&mut alice, 0.0, 0.0);
        let b = insert(&mut alice, 10.0, 0.0);
        sync(&alice, &mut bob);

        alice.delete_layer(&a.id).expect("Failed to delete");
        bob.reorder_layer(&a.id, 1).expect("Failed to reorder");

        sync(&alice, &mut bob);
        sync(&bob, &mut alice);

        for store in [&alice, &bob] {
            assert_eq!(store.layer_ids(), vec![b.id.clone()]);
            assert!(store.layer(&a.id).is_none());
        }
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut store = store();
        insert(&mut store, 10.0, 20.0);

        let bytes = store.export_snapshot().expect("Failed to export");
        let copy = LayerStore::from_snapshot(&bytes, &BoardConfig::default()).expect("Failed to import");

        assert_eq!(copy.layers(), store.layers());
    }

    #[test]
    fn test_replace_with_snapshot_discards_local_edits() {
        let mut server = store();
        let kept = insert(&mut server, 0.0, 0.0);
        let snapshot = server.export_snapshot().expect("Failed to export");

        let mut client = store();
        insert(&mut client, 99.0, 99.0);
        client.replace_with_snapshot(&snapshot).expect("Failed to resync");

        assert_eq!(client.layer_ids(), vec![kept.id]);
    }

    /// Two peers move the same layer concurrently, leaving a duplicate entry.
    fn concurrent_reorders() -> (LayerStore, LayerStore, Layer, Layer) {
        let mut alice = store();
        let mut bob = store();
        let a = insert(&mut alice, 0.0, 0.0);
        let b = insert(&mut alice, 10.0, 0.0);
        sync(&alice, &mut bob);

        alice.reorder_layer(&a.id, 1).expect("Failed to reorder");
        bob.reorder_layer(&a.id, 1).expect("Failed to reorder");
        (alice, bob, a, b)
    }

    #[test]
    fn test_import_raw_leaves_merge_untouched() {
        let (alice, bob, a, _) = concurrent_reorders();
        let mut relay = store();
        relay
            .import_raw(&alice.export_snapshot().expect("Failed to export"))
            .expect("Failed to import");
        relay
            .import_raw(&bob.export_updates(&relay.version()).expect("Failed to export"))
            .expect("Failed to import");

        let ids = relay.layer_ids();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids.iter().filter(|id| **id == a.id).count(), 2);
    }

    #[test]
    fn test_replace_with_snapshot_exports_its_repairs() {
        let (alice, bob, a, b) = concurrent_reorders();
        let mut relay = store();
        relay
            .import_raw(&alice.export_snapshot().expect("Failed to export"))
            .expect("Failed to import");
        relay
            .import_raw(&bob.export_updates(&relay.version()).expect("Failed to export"))
            .expect("Failed to import");

        let mut client = store();
        let imported = client
            .replace_with_snapshot(&relay.export_snapshot().expect("Failed to export"))
            .expect("Failed to resync");
        assert_eq!(client.layer_ids(), vec![b.id.clone(), a.id.clone()]);
        assert_ne!(client.version(), imported);

        // The repair travels back and fixes the relay's copy.
        let repair = client.export_updates(&imported).expect("Failed to export");
        relay.import_raw(&repair).expect("Failed to import");
        assert_eq!(relay.layer_ids(), client.layer_ids());
    }
}
