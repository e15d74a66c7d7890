//! `ReferenceValue` & `HierarchicalContext` (spec §4.3, C3). Layers
//! shadow outer layers for the same name; `unified_set` is the sole
//! write path, enforcing the dedup invariant through `EntityCache` and
//! advancing `generation` monotonically (spec §8 invariant 1/2).

use std::collections::HashMap;
use std::sync::Arc;

use synthetic_sensors_common::Value;

/// The `(reference, value)` record underpinning every context entry
/// (GLOSSARY). `reference` is immutable after first write; only
/// `value` may be refreshed by lazy resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceValue {
    reference: String,
    value: Value,
}

impl ReferenceValue {
    pub fn new(reference: impl Into<String>, value: Value) -> Self {
        Self { reference: reference.into(), value }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    fn refresh(&mut self, value: Value) {
        self.value = value;
    }
}

/// Cycle-scoped interning table (spec §9 "interned records, not graph
/// references"): at most one `ReferenceValue` instance per reference
/// string within a cycle. Cleared between cycles, never shared across
/// sensor sets (spec §5).
#[derive(Debug, Default)]
pub struct EntityCache {
    interned: HashMap<String, Arc<ReferenceValue>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `rv`, returning the canonical shared instance for its
    /// reference. A second `intern` call for the same reference with a
    /// different value replaces the cached instance (lazy resolution
    /// refreshing a previously-`None` shell) but the reference key is
    /// stable.
    fn intern(&mut self, rv: ReferenceValue) -> Arc<ReferenceValue> {
        let shared = Arc::new(rv);
        self.interned.insert(shared.reference().to_string(), Arc::clone(&shared));
        shared
    }

    pub fn get(&self, reference: &str) -> Option<Arc<ReferenceValue>> {
        self.interned.get(reference).cloned()
    }

    pub fn len(&self) -> usize {
        self.interned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interned.is_empty()
    }

    pub fn clear(&mut self) {
        self.interned.clear();
    }
}

/// A single named layer of the hierarchy (global / sensor / attribute).
/// `vars` maps a locally-visible name to the reference string it
/// resolves to in the `EntityCache` — this indirection is what lets
/// `push_layer` bind a fresh local name to a reference shared with an
/// outer layer.
#[derive(Debug, Default)]
struct Layer {
    name: String,
    vars: HashMap<String, String>,
}

/// `{instance_id, item_count, generation, checksum, layer_count}`
/// (spec §4.3 `integrity()`). Any caller can snapshot this to detect
/// corruption; within a cycle `item_count`/`generation` must never
/// regress (spec §8 invariant 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextIntegrity {
    pub instance_id: u64,
    pub item_count: usize,
    pub generation: u64,
    pub checksum: u64,
    pub layer_count: usize,
}

/// Layered, append-only name→value resolution context for a single
/// sensor evaluation cycle (spec §4.3, C3).
pub struct HierarchicalContext {
    instance_id: u64,
    layers: Vec<Layer>,
    entities: EntityCache,
    generation: u64,
    checksum: u64,
}

impl HierarchicalContext {
    pub fn new(instance_id: u64) -> Self {
        let mut ctx = Self {
            instance_id,
            layers: Vec::new(),
            entities: EntityCache::new(),
            generation: 0,
            checksum: 0,
        };
        ctx.push_layer("global");
        ctx
    }

    pub fn push_layer(&mut self, name: impl Into<String>) {
        self.layers.push(Layer { name: name.into(), vars: HashMap::new() });
    }

    pub fn current_layer(&self) -> &str {
        self.layers.last().map(|l| l.name.as_str()).unwrap_or("")
    }

    /// Pops the innermost layer, e.g. to make sibling attribute layers
    /// sit side by side above `state` rather than nesting inside one
    /// another. Never pops the global layer.
    pub fn pop_layer(&mut self) {
        if self.layers.len() > 1 {
            self.layers.pop();
        }
    }

    /// Inner layers shadow outer layers for the same name (spec §4.3
    /// invariant 2: attribute > sensor > global).
    pub fn get(&self, name: &str) -> Option<Arc<ReferenceValue>> {
        for layer in self.layers.iter().rev() {
            if let Some(reference) = layer.vars.get(name) {
                return self.entities.get(reference);
            }
        }
        None
    }

    /// The sole write path (spec §4.3). Wraps a raw value into a
    /// `ReferenceValue` if not already wrapped, binds `name` in the
    /// current layer to that reference, and advances `generation`.
    pub fn unified_set(&mut self, name: &str, rv: ReferenceValue) {
        let reference = rv.reference().to_string();
        self.entities.intern(rv);
        self.layers
            .last_mut()
            .expect("a context always has at least the global layer")
            .vars
            .insert(name.to_string(), reference.clone());
        self.generation += 1;
        self.checksum = self.checksum.wrapping_add(hash_str(&reference)).wrapping_add(self.generation);
    }

    /// Refreshes the value of an already-interned reference in place
    /// (lazy resolution completing a shell created with `value=None`).
    /// Does not rebind any layer's name→reference mapping.
    pub fn refresh(&mut self, reference: &str, value: Value) {
        if let Some(existing) = self.entities.interned.get(reference).cloned() {
            let mut refreshed = (*existing).clone();
            refreshed.refresh(value);
            self.entities.intern(refreshed);
            self.generation += 1;
        }
    }

    /// All name→reference bindings visible in the current layer
    /// ordering, innermost-wins (spec §4.3 `flatten()`).
    pub fn flatten(&self) -> HashMap<String, Arc<ReferenceValue>> {
        let mut out = HashMap::new();
        for layer in &self.layers {
            for (name, reference) in &layer.vars {
                if let Some(rv) = self.entities.get(reference) {
                    out.insert(name.clone(), rv);
                }
            }
        }
        out
    }

    pub fn integrity(&self) -> ContextIntegrity {
        ContextIntegrity {
            instance_id: self.instance_id,
            item_count: self.entities.len(),
            generation: self.generation,
            checksum: self.checksum,
            layer_count: self.layers.len(),
        }
    }
}

fn hash_str(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}
