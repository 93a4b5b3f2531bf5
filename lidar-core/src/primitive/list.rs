//! Ordered collection of primitives with selection flags and drag support.
use super::drag::DragState;
use super::file::{read_primitive_file, write_primitive_file};
use super::{Primitive, DEFAULT_GRID_COLOR, DEFAULT_SURFACE_COLOR};
use crate::report::{user_error, LOAD_PRIMITIVES, SAVE_PRIMITIVES};
use glam::DVec3;
use std::path::Path;
use tracing::info;

/// Colour given to selected primitives.
pub const SELECTED_SURFACE_COLOR: [f32; 4] = [0.1, 0.5, 0.6, 0.5];

#[derive(Debug, Clone)]
pub struct PrimitiveList {
    primitives: Vec<Primitive>,
    selected: Vec<bool>,
    surface_color: [f32; 4],
    last_picked: Option<usize>,
    /// Per-type counters for default labels, indexed by type tag.
    created: [u32; 6],
}

impl Default for PrimitiveList {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimitiveList {
    pub fn new() -> Self {
        Self {
            primitives: Vec::new(),
            selected: Vec::new(),
            surface_color: DEFAULT_SURFACE_COLOR,
            last_picked: None,
            created: [0; 6],
        }
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Primitive> {
        self.primitives.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Primitive> {
        self.primitives.iter()
    }

    pub fn last_picked(&self) -> Option<usize> {
        self.last_picked
    }

    /// Colour given to unselected primitives, applied to all of them.
    pub fn set_surface_color(&mut self, color: [f32; 4]) {
        self.surface_color = color;
        for (primitive, &selected) in self.primitives.iter_mut().zip(&self.selected) {
            if !selected {
                primitive.set_surface_color(color);
            }
        }
    }

    /// Stores a primitive, labelling it `"<Type> <n>"` if it has no label, and returns its index.
    pub fn add(&mut self, mut primitive: Primitive) -> usize {
        let tag = primitive.type_tag() as usize;
        self.created[tag] += 1;
        if primitive.label.is_empty() {
            primitive.label = format!("{} {}", primitive.kind.type_name(), self.created[tag]);
        }
        primitive.set_surface_color(self.surface_color);
        primitive.set_grid_color(DEFAULT_GRID_COLOR);
        self.primitives.push(primitive);
        self.selected.push(false);
        let index = self.primitives.len() - 1;
        self.last_picked = Some(index);
        index
    }

    pub fn remove(&mut self, index: usize) -> Option<Primitive> {
        if index >= self.primitives.len() {
            return None;
        }
        self.selected.remove(index);
        self.last_picked = None;
        Some(self.primitives.remove(index))
    }

    /// Removes every selected primitive and returns how many were removed.
    pub fn remove_selected(&mut self) -> usize {
        let before = self.primitives.len();
        let mut flags = self.selected.iter();
        self.primitives.retain(|_| !flags.next().copied().unwrap_or(false));
        self.selected.retain(|&s| !s);
        self.last_picked = None;
        before - self.primitives.len()
    }

    pub fn clear(&mut self) {
        self.primitives.clear();
        self.selected.clear();
        self.last_picked = None;
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.get(index).copied().unwrap_or(false)
    }

    pub fn set_selected(&mut self, index: usize, selected: bool) {
        let Some(primitive) = self.primitives.get_mut(index) else {
            return;
        };
        self.selected[index] = selected;
        primitive.set_surface_color(if selected {
            SELECTED_SURFACE_COLOR
        } else {
            self.surface_color
        });
    }

    /// Toggles the selection of the last picked primitive.
    pub fn toggle_last_picked(&mut self) {
        if let Some(index) = self.last_picked {
            let selected = !self.is_selected(index);
            self.set_selected(index, selected);
        }
    }

    pub fn selected(&self) -> impl Iterator<Item = &Primitive> {
        self.primitives
            .iter()
            .zip(&self.selected)
            .filter_map(|(p, &s)| s.then_some(p))
    }

    /// Picks the primitive nearest to `p` within `max_distance`.
    pub fn pick(&mut self, p: DVec3, max_distance: f64) -> Option<DragState> {
        let mut max_dist2 = max_distance * max_distance;
        let mut picked = None;
        for (index, primitive) in self.primitives.iter().enumerate() {
            if let Some(part) = primitive.pick(p, &mut max_dist2) {
                picked = Some(DragState { index, part });
            }
        }
        if let Some(state) = picked {
            self.last_picked = Some(state.index);
        }
        picked
    }

    pub fn drag(&mut self, state: &mut DragState, p: DVec3) {
        if let Some(primitive) = self.primitives.get_mut(state.index) {
            primitive.drag(&mut state.part, p);
        }
    }

    /// Writes every primitive to a v1.3 file in source coordinates (`offset` added back).
    pub fn save(&self, path: &Path, offset: DVec3) -> Result<(), String> {
        write_primitive_file(path, self.primitives.iter(), offset).map_err(|e| {
            user_error(
                SAVE_PRIMITIVES,
                format!("Could not write primitives to file {} due to exception {e}", path.display()),
            )
        })?;
        info!("saved {} primitives to {}", self.len(), path.display());
        Ok(())
    }

    /// Appends the primitives of a v1.3 file, moving them into octree coordinates.
    /// Nothing is added when the file cannot be read completely.
    pub fn load(&mut self, path: &Path, offset: DVec3) -> Result<usize, String> {
        let loaded = read_primitive_file(path, offset).map_err(|e| {
            user_error(
                LOAD_PRIMITIVES,
                format!("Could not load primitives from file {} due to exception {e}", path.display()),
            )
        })?;
        let count = loaded.len();
        for primitive in loaded {
            self.add(primitive);
        }
        info!("loaded {count} primitives from {}", path.display());
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{PointShape, PrimitiveKind, SphereShape};

    fn point(at: DVec3) -> Primitive {
        Primitive::new(PrimitiveKind::Point(PointShape { point: at }), 3, 0.0)
    }

    #[test]
    fn default_labels_count_per_type() {
        let mut list = PrimitiveList::new();
        list.add(point(DVec3::ZERO));
        list.add(Primitive::new(
            PrimitiveKind::Sphere(SphereShape {
                center: DVec3::ZERO,
                radius: 1.0,
            }),
            4,
            0.0,
        ));
        let mut named = point(DVec3::ONE);
        named.label = "Benchmark".into();
        list.add(named);
        list.add(point(DVec3::X));
        let labels: Vec<_> = list.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["Point 1", "Sphere 1", "Benchmark", "Point 3"]);
    }

    #[test]
    fn pick_returns_nearest_primitive() {
        let mut list = PrimitiveList::new();
        list.add(point(DVec3::new(0.0, 0.0, 0.0)));
        list.add(point(DVec3::new(0.3, 0.0, 0.0)));
        list.add(point(DVec3::new(0.1, 0.0, 0.0)));
        let state = list.pick(DVec3::new(0.12, 0.0, 0.0), 0.5).unwrap();
        assert_eq!(state.index, 2);
        assert_eq!(list.last_picked(), Some(2));
        assert!(list.pick(DVec3::new(5.0, 0.0, 0.0), 0.5).is_none());
    }

    #[test]
    fn saved_list_loads_back_with_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SavedPrimitives.dat");
        let offset = DVec3::new(500.0, 250.0, 0.0);

        let mut list = PrimitiveList::new();
        list.add(point(DVec3::new(1.0, 2.0, 3.0)));
        list.add(point(DVec3::new(-4.0, 0.5, 0.0)));
        list.save(&path, offset).unwrap();

        let mut restored = PrimitiveList::new();
        assert_eq!(restored.load(&path, offset).unwrap(), 2);
        let labels: Vec<_> = restored.iter().map(|p| p.label.clone()).collect();
        assert_eq!(labels, ["Point 1", "Point 2"]);
        assert_eq!(restored.get(1).map(|p| p.kind), list.get(1).map(|p| p.kind));
    }

    #[test]
    fn unreadable_file_is_reported_against_the_operation() {
        let dir = tempfile::tempdir().unwrap();
        let mut list = PrimitiveList::new();
        let message = list.load(&dir.path().join("missing.dat"), DVec3::ZERO).unwrap_err();
        assert!(message.starts_with("Load Primitives...: Could not load primitives from file"));
        assert!(list.is_empty());
    }

    #[test]
    fn removing_selected_keeps_flags_aligned() {
        let mut list = PrimitiveList::new();
        for x in 0..4 {
            list.add(point(DVec3::new(x as f64, 0.0, 0.0)));
        }
        list.set_selected(1, true);
        list.set_selected(3, true);
        assert_eq!(list.selected().count(), 2);
        assert_eq!(list.remove_selected(), 2);
        assert_eq!(list.len(), 2);
        assert!(!list.is_selected(0) && !list.is_selected(1));
        assert_eq!(list.get(1).map(|p| p.label.as_str()), Some("Point 3"));
    }
}
