//! Drawable objects and the per-frame view handed to render systems.

use std::sync::Arc;

use framekit_core::{Camera, ObjectId, ObjectIdAllocator, Transform};
use glam::Vec3;

use crate::model::Model;

/// Something that can be drawn. Objects without a model are skipped.
#[derive(Debug)]
pub struct GameObject {
    id: ObjectId,
    pub model: Option<Arc<Model>>,
    pub color: Vec3,
    pub transform: Transform,
}

impl GameObject {
    pub const fn id(&self) -> ObjectId {
        self.id
    }
}

/// Owns the objects of a scene, ordered by id.
#[derive(Debug, Default)]
pub struct ObjectStore {
    ids: ObjectIdAllocator,
    objects: Vec<GameObject>,
}

impl ObjectStore {
    pub const fn new() -> Self {
        Self {
            ids: ObjectIdAllocator::new(),
            objects: Vec::new(),
        }
    }

    /// Add an empty object and return it for setup.
    pub fn create(&mut self) -> &mut GameObject {
        let id = self.ids.allocate();
        let index = self.objects.len();
        self.objects.push(GameObject {
            id,
            model: None,
            color: Vec3::ZERO,
            transform: Transform::default(),
        });
        &mut self.objects[index]
    }

    pub fn get(&self, id: ObjectId) -> Option<&GameObject> {
        self.position(id).map(|i| &self.objects[i])
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        self.position(id).map(move |i| &mut self.objects[i])
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<GameObject> {
        self.position(id).map(|i| self.objects.remove(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameObject> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut GameObject> {
        self.objects.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Borrow the store for one frame.
    pub fn view<'a>(&'a self, camera: &'a Camera) -> SceneView<'a> {
        SceneView {
            objects: &self.objects,
            camera,
        }
    }

    // Ids are allocated in increasing order and removal keeps order.
    fn position(&self, id: ObjectId) -> Option<usize> {
        self.objects.binary_search_by_key(&id, GameObject::id).ok()
    }
}

/// Read-only scene state for one frame.
#[derive(Clone, Copy, Debug)]
pub struct SceneView<'a> {
    pub objects: &'a [GameObject],
    pub camera: &'a Camera,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_and_lookup_survives_removal() {
        let mut store = ObjectStore::new();
        let ids: Vec<_> = (0..4).map(|_| store.create().id()).collect();
        assert_eq!(ids, vec![ObjectId(0), ObjectId(1), ObjectId(2), ObjectId(3)]);

        let removed = store.remove(ObjectId(1)).unwrap();
        assert_eq!(removed.id(), ObjectId(1));
        assert!(store.get(ObjectId(1)).is_none());
        assert_eq!(store.get(ObjectId(3)).unwrap().id(), ObjectId(3));
        assert_eq!(store.len(), 3);

        // Removed ids are not handed out again.
        assert_eq!(store.create().id(), ObjectId(4));
    }

    #[test]
    fn objects_are_editable_in_place() {
        let mut store = ObjectStore::new();
        let id = {
            let object = store.create();
            object.color = Vec3::new(0.1, 0.2, 0.3);
            object.id()
        };

        store.get_mut(id).unwrap().transform.translation = Vec3::new(0.0, 0.0, 2.5);

        let object = store.get(id).unwrap();
        approx::assert_relative_eq!(object.transform.translation.z, 2.5);
        approx::assert_relative_eq!(object.color.y, 0.2);
        assert!(object.model.is_none());
    }

    #[test]
    fn view_borrows_every_object() {
        let mut store = ObjectStore::new();
        store.create();
        store.create();
        let camera = Camera::default();

        let view = store.view(&camera);
        assert_eq!(view.objects.len(), 2);
    }
}
