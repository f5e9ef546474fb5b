//! Method actors: the interned identities of methods a compiled method can
//! refer to, together with the calling convention they are entered with.

use std::collections::HashMap;
use std::fmt;

use crate::value::MethodRef;

/// Calling convention a method is entered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallConv {
    /// Convention used between compiled managed methods.
    Managed,
    /// Platform C convention, used for native functions.
    Native,
}

/// A method known to the compiler by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodActor {
    pub name: String,
    pub convention: CallConv,
}

/// Interned actor table mapping names to `MethodRef`s.
///
/// Two well-known actors are interned by [`ActorTable::new`]: the runtime
/// routine that raises an exception, and a placeholder used for call sites
/// that are linked after code installation.
#[derive(Debug, Clone)]
pub struct ActorTable {
    actors: Vec<MethodActor>,
    lookup: HashMap<String, MethodRef>,
}

impl ActorTable {
    /// Name of the runtime routine that starts unwinding with a throwable.
    pub const RAISE: &'static str = "Throw.raise";
    /// Name of the placeholder actor for call sites patched at link time.
    pub const UNLINKED: &'static str = "<unlinked>";

    pub fn new() -> Self {
        let mut table = Self {
            actors: Vec::new(),
            lookup: HashMap::new(),
        };
        table.intern(Self::RAISE, CallConv::Managed);
        table.intern(Self::UNLINKED, CallConv::Managed);
        table
    }

    /// Intern an actor, returning its `MethodRef`.
    ///
    /// If the name already exists, returns the existing id and keeps the
    /// originally registered convention.
    pub fn intern(&mut self, name: &str, convention: CallConv) -> MethodRef {
        if let Some(&id) = self.lookup.get(name) {
            return id;
        }
        let id = MethodRef(self.actors.len() as u32);
        self.actors.push(MethodActor {
            name: name.to_string(),
            convention,
        });
        self.lookup.insert(name.to_string(), id);
        id
    }

    /// Resolve a `MethodRef` back to its actor.
    pub fn resolve(&self, id: MethodRef) -> &MethodActor {
        &self.actors[id.0 as usize]
    }

    pub fn lookup(&self, name: &str) -> Option<MethodRef> {
        self.lookup.get(name).copied()
    }

    /// The exception-raising runtime routine.
    pub fn raise(&self) -> MethodRef {
        MethodRef(0)
    }

    /// The placeholder callee of not-yet-linked call sites.
    pub fn unlinked(&self) -> MethodRef {
        MethodRef(1)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

impl Default for ActorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MethodActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)
    }
}
