//! Byte-bounded LRU cache of loaded node points.
use super::selection::SelectionMask;
use crate::error::OctreeError;
use crate::point::LidarPoint;
use glam::Vec3;
use std::collections::HashMap;
use tracing::debug;

/// Points of one node held in memory, with the node's selection bits.
#[derive(Debug, Clone)]
pub struct LoadedNode {
    pub points: Vec<LidarPoint>,
    pub normals: Option<Vec<Vec3>>,
    pub selection: SelectionMask,
    /// Selection bits changed since the node was loaded.
    pub selection_dirty: bool,
    /// Colours changed since the node was loaded.
    pub colors_dirty: bool,
}

impl LoadedNode {
    pub fn new(points: Vec<LidarPoint>, normals: Option<Vec<Vec3>>) -> Self {
        let selection = SelectionMask::new(points.len());
        Self {
            points,
            normals,
            selection,
            selection_dirty: false,
            colors_dirty: false,
        }
    }

    /// Resident size counted against the cache budget.
    pub fn byte_size(&self) -> usize {
        self.points.len() * std::mem::size_of::<LidarPoint>()
            + self.normals.as_ref().map_or(0, |n| n.len() * std::mem::size_of::<Vec3>())
            + self.selection.byte_size()
    }
}

/// Counters describing cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub loaded_nodes: usize,
    pub resident_bytes: usize,
    pub peak_bytes: usize,
    pub loads: u64,
    pub hits: u64,
    pub evictions: u64,
    /// Nodes skipped by the last traversal because they could not be read.
    pub unavailable_nodes: usize,
}

#[derive(Debug)]
struct Entry {
    node: usize,
    data: LoadedNode,
    bytes: usize,
    pins: u32,
    /// Towards the most recently used end.
    newer: Option<usize>,
    /// Towards the least recently used end.
    older: Option<usize>,
}

/// Handle of a cache slot; valid until the node is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(usize);

#[derive(Debug)]
pub struct NodeCache {
    budget: usize,
    entries: Vec<Option<Entry>>,
    free: Vec<usize>,
    by_node: HashMap<usize, usize>,
    newest: Option<usize>,
    oldest: Option<usize>,
    stats: CacheStats,
}

impl NodeCache {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            entries: Vec::new(),
            free: Vec::new(),
            by_node: HashMap::new(),
            newest: None,
            oldest: None,
            stats: CacheStats::default(),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn set_unavailable(&mut self, count: usize) {
        self.stats.unavailable_nodes = count;
    }

    fn entry(&self, slot: usize) -> &Entry {
        match &self.entries[slot] {
            Some(entry) => entry,
            None => unreachable!("cache slot {slot} is empty"),
        }
    }

    fn entry_mut(&mut self, slot: usize) -> &mut Entry {
        match &mut self.entries[slot] {
            Some(entry) => entry,
            None => unreachable!("cache slot {slot} is empty"),
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (newer, older) = {
            let e = self.entry(slot);
            (e.newer, e.older)
        };
        match newer {
            Some(n) => self.entry_mut(n).older = older,
            None => self.newest = older,
        }
        match older {
            Some(o) => self.entry_mut(o).newer = newer,
            None => self.oldest = newer,
        }
        let e = self.entry_mut(slot);
        e.newer = None;
        e.older = None;
    }

    fn push_newest(&mut self, slot: usize) {
        let previous = self.newest;
        {
            let e = self.entry_mut(slot);
            e.older = previous;
            e.newer = None;
        }
        if let Some(p) = previous {
            self.entry_mut(p).newer = Some(slot);
        }
        self.newest = Some(slot);
        if self.oldest.is_none() {
            self.oldest = Some(slot);
        }
    }

    /// Look up a loaded node and mark it most recently used.
    pub fn lookup(&mut self, node: usize) -> Option<Slot> {
        let slot = *self.by_node.get(&node)?;
        self.unlink(slot);
        self.push_newest(slot);
        self.stats.hits += 1;
        Some(Slot(slot))
    }

    pub fn contains(&self, node: usize) -> bool {
        self.by_node.contains_key(&node)
    }

    /// Insert a freshly loaded node, evicting least recently used unpinned nodes until it fits.
    ///
    /// Each victim is handed to `on_evict` while still resident; if that fails the
    /// victim stays cached and the new node is not inserted.
    pub fn insert<F>(&mut self, node: usize, data: LoadedNode, mut on_evict: F) -> Result<Slot, OctreeError>
    where
        F: FnMut(usize, &LoadedNode) -> Result<(), OctreeError>,
    {
        let bytes = data.byte_size();
        while self.stats.resident_bytes + bytes > self.budget {
            let mut candidate = self.oldest;
            while let Some(slot) = candidate {
                let e = self.entry(slot);
                if e.pins == 0 {
                    break;
                }
                candidate = e.newer;
            }
            let Some(victim) = candidate else {
                return Err(OctreeError::CacheExhausted {
                    needed: bytes,
                    pinned: self.stats.resident_bytes,
                    budget: self.budget,
                });
            };
            {
                let e = self.entry(victim);
                on_evict(e.node, &e.data)?;
            }
            let (victim_node, _) = self.remove_slot(victim);
            self.stats.evictions += 1;
            debug!("evicted node {victim_node} from the node cache");
        }

        let entry = Entry {
            node,
            data,
            bytes,
            pins: 0,
            newer: None,
            older: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.entries[slot] = Some(entry);
                slot
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        };
        self.push_newest(slot);
        self.by_node.insert(node, slot);
        self.stats.resident_bytes += bytes;
        self.stats.peak_bytes = self.stats.peak_bytes.max(self.stats.resident_bytes);
        self.stats.loaded_nodes = self.by_node.len();
        self.stats.loads += 1;
        Ok(Slot(slot))
    }

    fn remove_slot(&mut self, slot: usize) -> (usize, LoadedNode) {
        self.unlink(slot);
        let entry = match self.entries[slot].take() {
            Some(entry) => entry,
            None => unreachable!("cache slot {slot} is empty"),
        };
        self.free.push(slot);
        self.by_node.remove(&entry.node);
        self.stats.resident_bytes -= entry.bytes;
        self.stats.loaded_nodes = self.by_node.len();
        (entry.node, entry.data)
    }

    pub fn pin(&mut self, slot: Slot) {
        self.entry_mut(slot.0).pins += 1;
    }

    pub fn unpin(&mut self, slot: Slot) {
        let e = self.entry_mut(slot.0);
        e.pins = e.pins.saturating_sub(1);
    }

    pub fn get(&self, slot: Slot) -> &LoadedNode {
        &self.entry(slot.0).data
    }

    pub fn get_mut(&mut self, slot: Slot) -> &mut LoadedNode {
        &mut self.entry_mut(slot.0).data
    }

    /// Apply a function to every loaded node.
    pub fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(usize, &mut LoadedNode),
    {
        for entry in self.entries.iter_mut().flatten() {
            f(entry.node, &mut entry.data);
        }
    }
}
