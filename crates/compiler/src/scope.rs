//! Scope stack: global collection plus frames for routine locals, FOR
//! loop variables, and closed-routine import sets.
//!
//! The stack owns the collections only while their block is open; when a
//! routine closes, its local map migrates into the `Procedure` node.

use crate::symbol::{SymbolId, SymbolMap};

#[derive(Debug)]
enum FrameKind {
    Routine {
        closed: bool,
        /// Names a CLOSED routine may see besides its locals. Inherited
        /// imports, the routine itself, its nested routines, and anything
        /// named by IMPORT.
        imports: SymbolMap,
    },
    /// Per-FOR frame holding the loop variable.
    For,
}

#[derive(Debug)]
struct Frame {
    map: SymbolMap,
    kind: FrameKind,
}

#[derive(Debug, Default)]
pub struct ScopeStack {
    pub globals: SymbolMap,
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack::default()
    }

    pub fn push_routine(&mut self, closed: bool, imports: SymbolMap) {
        self.frames.push(Frame {
            map: SymbolMap::new(),
            kind: FrameKind::Routine { closed, imports },
        });
    }

    pub fn push_for(&mut self) {
        self.frames.push(Frame {
            map: SymbolMap::new(),
            kind: FrameKind::For,
        });
    }

    /// Close the innermost frame and hand back its collection.
    pub fn pop_frame(&mut self) -> SymbolMap {
        self.frames.pop().map(|f| f.map).unwrap_or_default()
    }

    pub fn in_routine(&self) -> bool {
        self.frames
            .iter()
            .any(|f| matches!(f.kind, FrameKind::Routine { .. }))
    }

    /// True when the innermost enclosing routine is CLOSED.
    pub fn in_closed(&self) -> bool {
        for frame in self.frames.iter().rev() {
            if let FrameKind::Routine { closed, .. } = frame.kind {
                return closed;
            }
        }
        false
    }

    /// Resolve a name: frames innermost-out; a CLOSED routine boundary
    /// diverts to its import set and never reaches the outer frames or
    /// globals.
    pub fn resolve(&self, name: &str) -> Option<SymbolId> {
        for frame in self.frames.iter().rev() {
            if let Some(id) = frame.map.get(name) {
                return Some(id);
            }
            if let FrameKind::Routine { closed, imports } = &frame.kind
                && *closed
            {
                return imports.get(name);
            }
        }
        self.globals.get(name)
    }

    /// Resolve against the innermost frame only (declaration shadowing).
    pub fn resolve_in_current(&self, name: &str) -> Option<SymbolId> {
        match self.frames.last() {
            Some(frame) => frame.map.get(name),
            None => self.globals.get(name),
        }
    }

    /// Resolve within the innermost routine only (label scoping).
    pub fn resolve_in_routine(&self, name: &str) -> Option<SymbolId> {
        for frame in self.frames.iter().rev() {
            if let Some(id) = frame.map.get(name) {
                return Some(id);
            }
            if matches!(frame.kind, FrameKind::Routine { .. }) {
                break;
            }
        }
        None
    }

    /// Add a name to the innermost frame, or to the globals outside any
    /// routine. False when the name is already taken there.
    pub fn add_to_current(&mut self, name: &str, id: SymbolId) -> bool {
        match self.frames.last_mut() {
            Some(frame) => frame.map.insert(name, id),
            None => self.globals.insert(name, id),
        }
    }

    /// Add a name to the innermost routine frame, skipping FOR frames
    /// (labels and statement functions live at routine level).
    pub fn add_to_routine(&mut self, name: &str, id: SymbolId) -> bool {
        for frame in self.frames.iter_mut().rev() {
            if matches!(frame.kind, FrameKind::Routine { .. }) {
                return frame.map.insert(name, id);
            }
        }
        self.globals.insert(name, id)
    }

    /// Import set of the innermost routine, when it is CLOSED (read-only
    /// view, for inheritance into nested CLOSED routines).
    pub fn current_imports(&self) -> Option<&SymbolMap> {
        for frame in self.frames.iter().rev() {
            if let FrameKind::Routine { closed, imports } = &frame.kind {
                return closed.then_some(imports);
            }
        }
        None
    }

    /// Import set of the innermost routine, when it is CLOSED.
    pub fn imports_mut(&mut self) -> Option<&mut SymbolMap> {
        for frame in self.frames.iter_mut().rev() {
            if let FrameKind::Routine { closed, imports } = &mut frame.kind {
                return closed.then_some(imports);
            }
        }
        None
    }

    /// Ids collected in the innermost frame, in insertion order.
    pub fn current_ids(&self) -> &[SymbolId] {
        self.frames
            .last()
            .map(|f| f.map.ids())
            .unwrap_or(self.globals.ids())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{BaseType, FullType, SymScope, Symbol, SymbolArena};

    fn sym(arena: &mut SymbolArena, name: &str) -> SymbolId {
        arena.alloc(Symbol::var(
            name,
            FullType::of(BaseType::Float),
            SymScope::Local,
        ))
    }

    #[test]
    fn test_innermost_wins() {
        let mut arena = SymbolArena::new();
        let outer = sym(&mut arena, "X");
        let inner = sym(&mut arena, "X");
        let mut scopes = ScopeStack::new();
        scopes.globals.insert("X", outer);
        scopes.push_routine(false, SymbolMap::new());
        scopes.add_to_current("X", inner);
        assert_eq!(scopes.resolve("x"), Some(inner));
        scopes.pop_frame();
        assert_eq!(scopes.resolve("x"), Some(outer));
    }

    #[test]
    fn test_open_routine_sees_globals() {
        let mut arena = SymbolArena::new();
        let g = sym(&mut arena, "Total");
        let mut scopes = ScopeStack::new();
        scopes.globals.insert("Total", g);
        scopes.push_routine(false, SymbolMap::new());
        assert_eq!(scopes.resolve("TOTAL"), Some(g));
    }

    #[test]
    fn test_closed_routine_blocks_globals() {
        let mut arena = SymbolArena::new();
        let g = sym(&mut arena, "Total");
        let mut scopes = ScopeStack::new();
        scopes.globals.insert("Total", g);
        scopes.push_routine(true, SymbolMap::new());
        assert_eq!(scopes.resolve("Total"), None);
        assert!(scopes.in_closed());

        // An IMPORT makes the name visible again.
        scopes.imports_mut().unwrap().insert("Total", g);
        assert_eq!(scopes.resolve("Total"), Some(g));
    }

    #[test]
    fn test_closed_routine_blocks_outer_locals() {
        let mut arena = SymbolArena::new();
        let outer_local = sym(&mut arena, "A");
        let mut scopes = ScopeStack::new();
        scopes.push_routine(false, SymbolMap::new());
        scopes.add_to_current("A", outer_local);
        scopes.push_routine(true, SymbolMap::new());
        assert_eq!(scopes.resolve("A"), None);
    }

    #[test]
    fn test_for_frame_is_transparent() {
        let mut arena = SymbolArena::new();
        let local = sym(&mut arena, "A");
        let loopvar = sym(&mut arena, "I");
        let mut scopes = ScopeStack::new();
        scopes.push_routine(false, SymbolMap::new());
        scopes.add_to_current("A", local);
        scopes.push_for();
        scopes.add_to_current("I", loopvar);
        assert_eq!(scopes.resolve("I"), Some(loopvar));
        assert_eq!(scopes.resolve("A"), Some(local));
        scopes.pop_frame();
        assert_eq!(scopes.resolve("I"), None);
    }

    #[test]
    fn test_add_to_routine_skips_for_frames() {
        let mut arena = SymbolArena::new();
        let label = sym(&mut arena, "done");
        let mut scopes = ScopeStack::new();
        scopes.push_routine(false, SymbolMap::new());
        scopes.push_for();
        assert!(scopes.add_to_routine("done", label));
        scopes.pop_frame(); // FOR frame goes; the label stays visible
        assert_eq!(scopes.resolve("done"), Some(label));
    }
}
