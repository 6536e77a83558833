//! Named model elements, identity, and scoped registration.
//!
//! Every named object registers under `(scope, id)` where the scope is derived
//! from its base path and visibility. Identity comparisons use the lower-cased
//! id; the original capitalization is preserved for reporting.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, ErrorKind, Result, SourceLocation};

/// Visibility of an element within its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Public,
    Private,
}

impl Default for Role {
    fn default() -> Self {
        Role::Public
    }
}

/// A dot-separated series of container names placing an element in a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BasePath {
    segments: Vec<String>,
}

impl BasePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses dot notation, e.g. `"plant.cooling"`.
    pub fn parse(path: &str) -> Self {
        if path.is_empty() {
            return Self::root();
        }
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The enclosing scope, or `None` at the root.
    pub fn parent(&self) -> Option<BasePath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }
}

impl fmt::Display for BasePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Identity and scope shared by every named model object.
#[derive(Debug, Clone)]
pub struct Element {
    name: String,
    id: String,
    base_path: BasePath,
    role: Role,
    label: Option<String>,
    location: Option<SourceLocation>,
}

impl Element {
    /// Builds an element identity. Names are assumed to be trimmed.
    pub fn new(name: &str, base_path: BasePath, role: Role) -> Self {
        Self {
            name: name.to_string(),
            id: name.to_lowercase(),
            base_path,
            role,
            label: None,
            location: None,
        }
    }

    /// A public element at the root scope.
    pub fn public(name: &str) -> Self {
        Self::new(name, BasePath::root(), Role::Public)
    }

    /// The original name with capitalization preserved.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The lower-cased identity used for comparisons.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn base_path(&self) -> &BasePath {
        &self.base_path
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: &str) {
        self.label = Some(label.to_string());
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    pub fn set_location(&mut self, location: SourceLocation) {
        self.location = Some(location);
    }

    /// The registration key: private elements live under their base path,
    /// public ones in the shared root scope.
    pub fn scope_key(&self) -> String {
        match self.role {
            Role::Public => String::new(),
            Role::Private => self.base_path.to_string(),
        }
    }
}

/// Surface every registrable object exposes to the element table.
pub trait Named {
    fn element(&self) -> &Element;

    fn id(&self) -> &str {
        self.element().id()
    }

    fn name(&self) -> &str {
        self.element().name()
    }
}

impl<T: Named> Named for std::rc::Rc<T> {
    fn element(&self) -> &Element {
        (**self).element()
    }
}

/// A table of shared elements keyed by `(scope, id)`.
///
/// Duplicate registration is a redefinition error. Lookups resolve a name in
/// the originating scope and then walk outward through enclosing containers;
/// private elements never leak out of their base path.
#[derive(Debug, Clone, Default)]
pub struct ElementTable<T> {
    entries: IndexMap<(String, String), T>,
}

impl<T: Named + Clone> ElementTable<T> {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> Result<()> {
        let element = value.element();
        let key = (element.scope_key(), element.id().to_string());
        let name = element.name().to_string();
        let location = element.location().cloned();
        if self.entries.contains_key(&key) {
            let mut err = Error::new(ErrorKind::Redefinition(name));
            if let Some(location) = location {
                err = err.with_location(location);
            }
            return Err(err);
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Resolves `name` as seen from `origin`, walking outward to the root.
    pub fn lookup(&self, name: &str, origin: &BasePath) -> Option<&T> {
        let id = name.to_lowercase();
        let mut scope = Some(origin.clone());
        while let Some(path) = scope {
            let key = (path.to_string(), id.clone());
            if let Some(found) = self.entries.get(&key) {
                return Some(found);
            }
            scope = path.parent();
        }
        // Public elements register under the empty scope, already covered by
        // the walk when origin is root; cover non-root origins here.
        self.entries.get(&(String::new(), id))
    }

    /// Resolves a public name at the root scope.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.lookup(name, &BasePath::root())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
