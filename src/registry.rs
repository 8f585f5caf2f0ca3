//! Rebuildable id→object index over one object-tree snapshot.
//!
//! Identifiers are assigned in pre-order traversal starting at 1 and are
//! valid only until the next [`ObjectRegistry::rebuild`]. The registry holds
//! weak handles only; the host object graph keeps exclusive ownership, and a
//! handle whose object has been dropped surfaces as a typed
//! [`Lookup::Stale`] outcome instead of aliasing freed memory.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::host::{HostObject, ObjectGraph};
use crate::protocol::ObjectEntry;

/// Result of resolving an identifier against the current snapshot.
pub enum Lookup {
    /// The object is still alive.
    Live(Arc<dyn HostObject>),
    /// The identifier was assigned in this snapshot, but the object has
    /// since been dropped by the host.
    Stale,
    /// The identifier was never assigned in this snapshot.
    Unknown,
}

impl std::fmt::Debug for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Live(_) => f.debug_tuple("Live").finish(),
            Lookup::Stale => f.write_str("Stale"),
            Lookup::Unknown => f.write_str("Unknown"),
        }
    }
}

/// The id→object index for one tree snapshot.
#[derive(Default)]
pub struct ObjectRegistry {
    objects: HashMap<u32, Weak<dyn HostObject>>,
}

impl ObjectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard the previous snapshot and re-index the host's current roots.
    ///
    /// Widgets come first, then windows; a window backed by a separate
    /// scene graph contributes its scene root as an extra top-level entry
    /// (parent 0), since child enumeration cannot reach it.
    pub fn rebuild(&mut self, graph: &dyn ObjectGraph) -> Vec<ObjectEntry> {
        self.objects.clear();
        let mut entries = Vec::new();

        for widget in graph.top_level_widgets() {
            self.add_object(0, &widget, &mut entries);
        }

        for window in graph.top_level_windows() {
            self.add_object(0, &window, &mut entries);

            if let Some(root) = window.scene_root() {
                self.add_object(0, &root, &mut entries);
            }
        }

        entries
    }

    /// Register one object and, recursively, its children.
    fn add_object(
        &mut self,
        parent: u32,
        object: &Arc<dyn HostObject>,
        entries: &mut Vec<ObjectEntry>,
    ) {
        let id = self.objects.len() as u32 + 1;
        self.objects.insert(id, Arc::downgrade(object));

        entries.push(ObjectEntry {
            id,
            parent,
            address: object.native_address(),
            type_name: object.type_name(),
            name: object.object_name(),
        });

        for child in object.children() {
            self.add_object(id, &child, entries);
        }
    }

    /// Resolve an identifier from the current snapshot.
    pub fn lookup(&self, id: u32) -> Lookup {
        match self.objects.get(&id) {
            Some(weak) => match weak.upgrade() {
                Some(object) => Lookup::Live(object),
                None => Lookup::Stale,
            },
            None => Lookup::Unknown,
        }
    }

    /// Number of registered objects in the current snapshot.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no snapshot has been taken (or it was empty).
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostProperty;

    struct Node {
        type_name: &'static str,
        name: &'static str,
        children: Vec<Arc<dyn HostObject>>,
        scene_root: Option<Arc<dyn HostObject>>,
    }

    impl Node {
        fn leaf(type_name: &'static str, name: &'static str) -> Arc<dyn HostObject> {
            Arc::new(Self { type_name, name, children: Vec::new(), scene_root: None })
        }
    }

    impl HostObject for Node {
        fn type_name(&self) -> String {
            self.type_name.to_string()
        }
        fn object_name(&self) -> String {
            self.name.to_string()
        }
        fn native_address(&self) -> u64 {
            self as *const Self as u64
        }
        fn children(&self) -> Vec<Arc<dyn HostObject>> {
            self.children.clone()
        }
        fn properties(&self) -> Vec<HostProperty> {
            Vec::new()
        }
        fn set_property(&self, _name: &str, _value: serde_json::Value) {}
        fn scene_root(&self) -> Option<Arc<dyn HostObject>> {
            self.scene_root.clone()
        }
    }

    struct Graph {
        widgets: Vec<Arc<dyn HostObject>>,
        windows: Vec<Arc<dyn HostObject>>,
    }

    impl ObjectGraph for Graph {
        fn top_level_widgets(&self) -> Vec<Arc<dyn HostObject>> {
            self.widgets.clone()
        }
        fn top_level_windows(&self) -> Vec<Arc<dyn HostObject>> {
            self.windows.clone()
        }
    }

    fn sample_graph() -> Graph {
        // window
        // └── toolbar
        //     ├── open
        //     └── save
        let toolbar: Arc<dyn HostObject> = Arc::new(Node {
            type_name: "ToolBar",
            name: "toolbar",
            children: vec![Node::leaf("Button", "open"), Node::leaf("Button", "save")],
            scene_root: None,
        });
        let window: Arc<dyn HostObject> = Arc::new(Node {
            type_name: "MainWindow",
            name: "main",
            children: vec![toolbar],
            scene_root: None,
        });
        Graph { widgets: vec![window], windows: Vec::new() }
    }

    #[test]
    fn test_preorder_ids_and_parents() {
        let graph = sample_graph();
        let mut registry = ObjectRegistry::new();
        let entries = registry.rebuild(&graph);

        let summary: Vec<(u32, u32, &str)> = entries
            .iter()
            .map(|e| (e.id, e.parent, e.name.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![(1, 0, "main"), (2, 1, "toolbar"), (3, 2, "open"), (4, 2, "save")]
        );
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_every_returned_id_resolves_live() {
        let graph = sample_graph();
        let mut registry = ObjectRegistry::new();
        let entries = registry.rebuild(&graph);

        for entry in &entries {
            assert!(matches!(registry.lookup(entry.id), Lookup::Live(_)));
        }
        assert!(matches!(registry.lookup(0), Lookup::Unknown));
        assert!(matches!(registry.lookup(entries.len() as u32 + 1), Lookup::Unknown));
    }

    #[test]
    fn test_scene_root_becomes_extra_top_level_entry() {
        let scene: Arc<dyn HostObject> = Arc::new(Node {
            type_name: "SceneItem",
            name: "qmlRoot",
            children: vec![Node::leaf("SceneItem", "child")],
            scene_root: None,
        });
        let view: Arc<dyn HostObject> = Arc::new(Node {
            type_name: "QuickView",
            name: "view",
            children: Vec::new(),
            scene_root: Some(scene),
        });
        let graph = Graph { widgets: Vec::new(), windows: vec![view] };

        let mut registry = ObjectRegistry::new();
        let entries = registry.rebuild(&graph);

        let summary: Vec<(u32, u32, &str)> = entries
            .iter()
            .map(|e| (e.id, e.parent, e.name.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![(1, 0, "view"), (2, 0, "qmlRoot"), (3, 2, "child")]
        );
    }

    #[test]
    fn test_rebuild_discards_previous_ids() {
        let graph = sample_graph();
        let mut registry = ObjectRegistry::new();
        registry.rebuild(&graph);

        let small = Graph {
            widgets: vec![Node::leaf("Dialog", "about")],
            windows: Vec::new(),
        };
        let entries = registry.rebuild(&small);
        assert_eq!(entries.len(), 1);
        assert!(matches!(registry.lookup(1), Lookup::Live(_)));
        assert!(matches!(registry.lookup(2), Lookup::Unknown));
    }

    #[test]
    fn test_dropped_object_is_stale_not_aliased() {
        let widget = Node::leaf("Dialog", "temp");
        let graph = Graph {
            widgets: vec![widget.clone()],
            windows: Vec::new(),
        };
        let mut registry = ObjectRegistry::new();
        registry.rebuild(&graph);
        drop(graph);
        drop(widget);

        assert!(matches!(registry.lookup(1), Lookup::Stale));
    }
}
