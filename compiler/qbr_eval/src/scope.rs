// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The lexical environment of one execution path: a stack of frames over a
//! slot arena. Bindings map names to slots so that aliases can reference the
//! same storage as the variable they alias; forking a path clones the whole
//! environment.

use crate::val::{Ty, Value};
use rustc_hash::FxHashMap;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameKind {
    Global,
    Block,
    ForIter,
    If,
    Else,
    While,
    Function,
    Gate,
}

impl FrameKind {
    /// A barrier frame hides all non-`const` bindings of enclosing scopes.
    fn is_barrier(self) -> bool {
        matches!(self, FrameKind::Function | FrameKind::Gate)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mutability {
    Const,
    Mutable,
    Input,
    Output,
}

#[derive(Clone, Debug)]
pub struct Variable {
    pub name: Rc<str>,
    pub ty: Ty,
    pub mutability: Mutability,
    pub value: Value,
}

/// Where an alias points: a slot, and optionally the element indices it
/// selects out of the aliased register or array.
#[derive(Clone, Debug)]
pub(crate) struct AliasTarget {
    pub slot: usize,
    pub selection: Option<Rc<[i64]>>,
}

#[derive(Clone, Debug)]
enum Binding {
    Var(usize),
    Alias(AliasTarget),
}

#[derive(Clone, Debug)]
struct Frame {
    kind: FrameKind,
    bindings: FxHashMap<Rc<str>, Binding>,
}

/// The result of a name lookup: the storage slot and, when the lookup went
/// through an alias, the selection it applies.
#[derive(Clone, Debug)]
pub(crate) struct Resolved {
    pub slot: usize,
    pub selection: Option<Rc<[i64]>>,
}

#[derive(Clone, Debug)]
pub struct Env {
    frames: Vec<Frame>,
    slots: Vec<Variable>,
}

impl Env {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            frames: vec![Frame {
                kind: FrameKind::Global,
                bindings: FxHashMap::default(),
            }],
            slots: Vec::new(),
        }
    }

    pub(crate) fn enter(&mut self, kind: FrameKind) {
        self.frames.push(Frame {
            kind,
            bindings: FxHashMap::default(),
        });
    }

    pub(crate) fn leave(&mut self) {
        self.frames
            .pop()
            .expect("scope should be entered before leaving");
        assert!(!self.frames.is_empty(), "global frame should never be left");
    }

    #[must_use]
    pub(crate) fn in_global_scope(&self) -> bool {
        self.frames.len() == 1
    }

    /// Declares a new variable in the current frame. Fails if the name is
    /// already bound in the current frame.
    pub(crate) fn declare(&mut self, var: Variable) -> Result<usize, ()> {
        let name = var.name.clone();
        let frame = self
            .frames
            .last_mut()
            .expect("environment should have a frame");
        if frame.bindings.contains_key(&name) {
            return Err(());
        }
        let slot = self.slots.len();
        self.slots.push(var);
        frame.bindings.insert(name, Binding::Var(slot));
        Ok(slot)
    }

    /// Declares an alias to existing storage in the current frame.
    pub(crate) fn declare_alias(&mut self, name: Rc<str>, target: AliasTarget) -> Result<(), ()> {
        let frame = self
            .frames
            .last_mut()
            .expect("environment should have a frame");
        if frame.bindings.contains_key(&name) {
            return Err(());
        }
        frame.bindings.insert(name, Binding::Alias(target));
        Ok(())
    }

    /// Resolves a name, walking frames outward. Crossing a `Function` or
    /// `Gate` frame hides every non-`const` binding declared outside it.
    #[must_use]
    pub(crate) fn resolve(&self, name: &str) -> Option<Resolved> {
        let mut crossed_barrier = false;
        for frame in self.frames.iter().rev() {
            if let Some(binding) = frame.bindings.get(name) {
                let resolved = match binding {
                    Binding::Var(slot) => Resolved {
                        slot: *slot,
                        selection: None,
                    },
                    Binding::Alias(target) => Resolved {
                        slot: target.slot,
                        selection: target.selection.clone(),
                    },
                };
                if crossed_barrier && self.slots[resolved.slot].mutability != Mutability::Const {
                    return None;
                }
                return Some(resolved);
            }
            crossed_barrier |= frame.kind.is_barrier();
        }
        None
    }

    #[must_use]
    pub(crate) fn var(&self, slot: usize) -> &Variable {
        &self.slots[slot]
    }

    pub(crate) fn var_mut(&mut self, slot: usize) -> &mut Variable {
        &mut self.slots[slot]
    }

    /// The variables bound in the global frame, in declaration order.
    pub(crate) fn globals(&self) -> impl Iterator<Item = &Variable> {
        let mut slots: Vec<usize> = self.frames[0]
            .bindings
            .values()
            .filter_map(|binding| match binding {
                Binding::Var(slot) => Some(*slot),
                Binding::Alias(_) => None,
            })
            .collect();
        slots.sort_unstable();
        slots.into_iter().map(|slot| &self.slots[slot])
    }
}

#[cfg(test)]
mod tests {
    use super::{AliasTarget, Env, FrameKind, Mutability, Variable};
    use crate::val::{IntValue, Ty, Value};

    fn int_var(name: &str, mutability: Mutability, value: i64) -> Variable {
        Variable {
            name: name.into(),
            ty: Ty::Int {
                width: 64,
                signed: true,
            },
            mutability,
            value: Value::Int(IntValue {
                width: 64,
                signed: true,
                value,
            }),
        }
    }

    #[test]
    fn redeclaration_in_same_frame_fails() {
        let mut env = Env::new();
        env.declare(int_var("x", Mutability::Mutable, 1))
            .expect("first declaration should succeed");
        assert!(env.declare(int_var("x", Mutability::Mutable, 2)).is_err());
    }

    #[test]
    fn shadowing_in_inner_frame_is_allowed_and_unwinds() {
        let mut env = Env::new();
        env.declare(int_var("x", Mutability::Mutable, 1))
            .expect("declaration should succeed");
        env.enter(FrameKind::Block);
        env.declare(int_var("x", Mutability::Mutable, 2))
            .expect("shadowing declaration should succeed");
        let inner = env.resolve("x").expect("x should resolve");
        assert_eq!(env.var(inner.slot).value.clone().unwrap_int(), 2);
        env.leave();
        let outer = env.resolve("x").expect("x should resolve");
        assert_eq!(env.var(outer.slot).value.clone().unwrap_int(), 1);
    }

    #[test]
    fn function_barrier_hides_mutable_but_not_const() {
        let mut env = Env::new();
        env.declare(int_var("mutable_global", Mutability::Mutable, 1))
            .expect("declaration should succeed");
        env.declare(int_var("const_global", Mutability::Const, 2))
            .expect("declaration should succeed");
        env.enter(FrameKind::Function);
        assert!(env.resolve("mutable_global").is_none());
        let resolved = env
            .resolve("const_global")
            .expect("const should be visible across the barrier");
        assert_eq!(env.var(resolved.slot).value.clone().unwrap_int(), 2);
        env.leave();
        assert!(env.resolve("mutable_global").is_some());
    }

    #[test]
    fn alias_resolves_to_the_aliased_slot() {
        let mut env = Env::new();
        let slot = env
            .declare(int_var("x", Mutability::Mutable, 7))
            .expect("declaration should succeed");
        env.declare_alias(
            "y".into(),
            AliasTarget {
                slot,
                selection: None,
            },
        )
        .expect("alias declaration should succeed");
        let resolved = env.resolve("y").expect("alias should resolve");
        assert_eq!(resolved.slot, slot);
    }
}
