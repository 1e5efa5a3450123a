//! Pass 2 — slot assignment (spec §4.1 pass 2).
//!
//! Walks the scope tree pass 1 built and assigns every [`Binding`] a
//! [`Slot`]. Function and module scopes each own one flat run of local
//! slots shared with their descendant block scopes (a block never gets its
//! own frame); nested function scopes start a fresh run. Captured bindings
//! — `is_accessed_by_nested_function` — get a closure slot instead of a
//! local one, and the owning function's prologue gains a `ScopePush`.

use ahash::AHashSet;

use crate::error::ScopeResult;
use crate::intern::InternerBuilder;

use super::types::*;

struct Assigner<'a> {
    scopes: &'a mut Vec<Scope>,
    bindings: &'a mut Vec<Binding>,
    interner: &'a mut InternerBuilder,
    used_global_names: AHashSet<String>,
}

impl<'a> Assigner<'a> {
    fn assign_declared_binding(
        &mut self,
        scope: ScopeId,
        binding: BindingId,
        is_module: bool,
        local_counter: &mut u16,
        closure_counter: &mut u16,
    ) -> ScopeResult<()> {
        if is_module {
            let base = self.interner.get(self.bindings[binding.index()].name).to_owned();
            let mut candidate = base.clone();
            let mut suffix = 1u32;
            while self.used_global_names.contains(&candidate) {
                candidate = format!("{base}${suffix}");
                suffix += 1;
            }
            self.used_global_names.insert(candidate.clone());
            let name = self.interner.intern(&candidate);
            self.bindings[binding.index()].slot = Some(Slot::Global { name });
            return Ok(());
        }

        if self.bindings[binding.index()].is_accessed_by_nested_function {
            let index = *closure_counter;
            *closure_counter += 1;
            self.bindings[binding.index()].slot = Some(Slot::Closure { index });
            self.scopes[scope.index()].closure_slot_count =
                self.scopes[scope.index()].closure_slot_count.max(*closure_counter);
        } else {
            let index = *local_counter;
            *local_counter += 1;
            self.bindings[binding.index()].slot = Some(Slot::Local { index });
        }
        Ok(())
    }

    /// Assigns `this`/a parameter its slot: a closure slot when captured by a
    /// nested function (spec §4.2 pass 2: "a closure slot seeded by
    /// `InitParameter`/`InitThis` when captured"), a local slot when
    /// reassigned but never captured, and only otherwise the argument slot
    /// itself — `Slot::Argument` is immutable (`emit_store_slot` rejects
    /// writes to it), so it is reserved for the case nothing ever writes
    /// through a fresh binding for it. `emit_copy_if_not_argument` emits the
    /// `InitParameter`/`InitThis` copy for the first two cases.
    fn assign_parameter_binding(&mut self, scope: ScopeId, binding: BindingId, arg_index: u16, local_counter: &mut u16, closure_counter: &mut u16) {
        if self.bindings[binding.index()].is_accessed_by_nested_function {
            let index = *closure_counter;
            *closure_counter += 1;
            self.bindings[binding.index()].slot = Some(Slot::Closure { index });
            self.scopes[scope.index()].closure_slot_count =
                self.scopes[scope.index()].closure_slot_count.max(*closure_counter);
        } else if self.bindings[binding.index()].is_written_to {
            let index = *local_counter;
            *local_counter += 1;
            self.bindings[binding.index()].slot = Some(Slot::Local { index });
        } else {
            self.bindings[binding.index()].slot = Some(Slot::Argument { arg_index });
        }
    }

    /// Assigns slots for everything declared directly in `scope` (params,
    /// `this`, hoisted vars/functions, lexical declarations), then recurses
    /// into child block scopes sharing the same frame counters.
    fn assign_frame_body(
        &mut self,
        scope: ScopeId,
        is_module: bool,
        local_counter: &mut u16,
        closure_counter: &mut u16,
    ) -> ScopeResult<()> {
        if !is_module {
            if let Some(this_binding) = self.scopes[scope.index()].this_binding {
                self.assign_parameter_binding(scope, this_binding, 0, local_counter, closure_counter);
            }
            let params = self.scopes[scope.index()].parameter_bindings.clone();
            for (i, param) in params.into_iter().enumerate() {
                self.assign_parameter_binding(scope, param, (i + 1) as u16, local_counter, closure_counter);
            }
        }

        // Import bindings resolve through another module's namespace object;
        // every other module-level binding becomes a disambiguated global.
        let declared: Vec<BindingId> = self.scopes[scope.index()]
            .bindings
            .values()
            .copied()
            .filter(|b| !matches!(self.bindings[b.index()].kind, BindingKind::Param | BindingKind::This))
            .collect();
        for binding in declared {
            if self.bindings[binding.index()].kind == BindingKind::Import {
                let namespace_name = self.interner.intern("#module");
                let property_name = self.bindings[binding.index()].name;
                self.bindings[binding.index()].slot = Some(Slot::ModuleImportExport {
                    namespace_slot: Box::new(Slot::Global { name: namespace_name }),
                    property_name,
                });
                continue;
            }
            self.assign_declared_binding(scope, binding, is_module, local_counter, closure_counter)?;
        }

        let children = self.scopes[scope.index()].children.clone();
        for child in children {
            match self.scopes[child.index()].kind {
                ScopeKind::Block => {
                    self.assign_frame_body(child, false, local_counter, closure_counter)?;
                    let lexical = self.scopes[child.index()].lexical_declarations.clone();
                    let pops = lexical
                        .iter()
                        .filter(|b| matches!(self.bindings[b.index()].slot, Some(Slot::Local { .. })))
                        .count();
                    self.scopes[child.index()].epilogue_pop_count = pops as u16;
                }
                ScopeKind::Function => self.assign_function(child)?,
                ScopeKind::Module => unreachable!("module scope is never nested"),
            }
        }
        Ok(())
    }

    fn assign_function(&mut self, scope: ScopeId) -> ScopeResult<()> {
        let mut local_counter = 0u16;
        let mut closure_counter = 0u16;
        self.assign_frame_body(scope, false, &mut local_counter, &mut closure_counter)?;

        // Conservative but simple per spec §9 design note: a function is
        // treated as a closure (needs access to an enclosing closure scope)
        // whenever any strict ancestor function scope allocated closure
        // slots of its own. Exact use-site analysis would be tighter but
        // this keeps pass 2 a single bottom-up-independent walk.
        let mut parent = self.scopes[scope.index()].parent;
        let mut is_closure = false;
        while let Some(p) = parent {
            if self.scopes[p.index()].kind == ScopeKind::Function && self.scopes[p.index()].closure_slot_count > 0 {
                is_closure = true;
                break;
            }
            parent = self.scopes[p.index()].parent;
        }
        self.scopes[scope.index()].function_is_closure = is_closure;

        if self.scopes[scope.index()].closure_slot_count > 0 {
            self.scopes[scope.index()].prologue.insert(
                0,
                PrologueOp::ScopePush {
                    slot_count: self.scopes[scope.index()].closure_slot_count,
                },
            );
        }
        Ok(())
    }
}

pub(super) fn assign_slots(
    scopes: &mut Vec<Scope>,
    bindings: &mut Vec<Binding>,
    interner: &mut InternerBuilder,
    module_scope: ScopeId,
) -> ScopeResult<()> {
    let mut assigner = Assigner {
        scopes,
        bindings,
        interner,
        used_global_names: AHashSet::new(),
    };
    let mut local_counter = 0u16;
    let mut closure_counter = 0u16;
    assigner.assign_frame_body(module_scope, true, &mut local_counter, &mut closure_counter)?;
    if assigner.scopes[module_scope.index()].closure_slot_count > 0 {
        assigner.scopes[module_scope.index()].prologue.insert(
            0,
            PrologueOp::ScopePush {
                slot_count: assigner.scopes[module_scope.index()].closure_slot_count,
            },
        );
    }
    Ok(())
}
