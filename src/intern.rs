//! String interning.
//!
//! Symbol names and file paths are interned once per [`Session`] and
//! referred to by 32-bit [`Name`] ids. The table is insert-only and
//! monotonic, so concurrent queries may intern freely; ids are stable for
//! the session but *not* deterministic across runs, which is why symbol
//! tables sort by resolved string rather than by id.
//!
//! [`Session`]: crate::session::Session

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// An interned string id. `Name::EMPTY` is the empty string.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(u32);

impl Name {
    /// The interned empty string, used for "no package" and the like.
    pub const EMPTY: Name = Name(0);

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

struct Tables {
    lookup: FxHashMap<Arc<str>, u32>,
    strings: Vec<Arc<str>>,
}

/// The session-wide string table.
pub struct Interner {
    tables: RwLock<Tables>,
}

impl Interner {
    pub fn new() -> Interner {
        let empty: Arc<str> = Arc::from("");
        let mut lookup = FxHashMap::default();
        lookup.insert(empty.clone(), 0);
        Interner {
            tables: RwLock::new(Tables {
                lookup,
                strings: vec![empty],
            }),
        }
    }

    /// Interns `value`, returning its id. Idempotent.
    pub fn intern(&self, value: &str) -> Name {
        if let Some(&id) = self.tables.read().lookup.get(value) {
            return Name(id);
        }
        let mut tables = self.tables.write();
        if let Some(&id) = tables.lookup.get(value) {
            return Name(id);
        }
        let id = tables.strings.len() as u32;
        let stored: Arc<str> = Arc::from(value);
        tables.strings.push(stored.clone());
        tables.lookup.insert(stored, id);
        Name(id)
    }

    /// The string behind `name`. The returned `Arc` is cheap to clone and
    /// outlives any later inserts.
    pub fn resolve(&self, name: Name) -> Arc<str> {
        self.tables.read().strings[name.0 as usize].clone()
    }

    /// Appends a component to a dotted name and interns the result.
    ///
    /// An empty `base` yields just the component; this is how
    /// fully-qualified names are built up while walking nested scopes.
    pub fn join(&self, base: Name, component: &str) -> Name {
        if base == Name::EMPTY {
            return self.intern(component);
        }
        let base = self.resolve(base);
        self.intern(&format!("{base}.{component}"))
    }

    /// Number of distinct strings interned so far.
    pub fn len(&self) -> usize {
        self.tables.read().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for Interner {
    fn default() -> Self {
        Interner::new()
    }
}

impl fmt::Debug for Interner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interner")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let interner = Interner::new();
        let a = interner.intern("foo");
        let b = interner.intern("foo");
        let c = interner.intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(&*interner.resolve(a), "foo");
        assert_eq!(&*interner.resolve(c), "bar");
    }

    #[test]
    fn empty_is_reserved() {
        let interner = Interner::new();
        assert_eq!(interner.intern(""), Name::EMPTY);
        assert_eq!(&*interner.resolve(Name::EMPTY), "");
    }

    #[test]
    fn join_builds_dotted_names() {
        let interner = Interner::new();
        let pkg = interner.intern("foo.bar");
        let fqn = interner.join(pkg, "Baz");
        assert_eq!(&*interner.resolve(fqn), "foo.bar.Baz");
        assert_eq!(interner.join(Name::EMPTY, "Baz"), interner.intern("Baz"));
    }

    #[test]
    fn concurrent_interning_agrees() {
        let interner = Arc::new(Interner::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let interner = interner.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|i| interner.intern(&format!("sym{i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let ids: Vec<Vec<Name>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for other in &ids[1..] {
            assert_eq!(&ids[0], other);
        }
    }
}
