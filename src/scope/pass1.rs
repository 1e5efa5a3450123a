//! Pass 1 — scope construction and binding classification (spec §4.1).
//!
//! A single depth-first traversal of the AST that:
//! - opens one [`Scope`] per program/function/block,
//! - records every declaration as a [`Binding`] under the narrowest scope
//!   its kind permits,
//! - records every identifier use as a [`Reference`], resolved lexically,
//! - flags bindings that are written to or captured by a nested function.
//!
//! The IL compiler later walks the *same* AST in the *same* depth-first
//! order and consumes `references` through a [`super::ReferenceCursor`] —
//! so the traversal order here is load-bearing, not just a style choice.

use crate::ast::*;
use crate::error::{MicroviumError, ScopeResult};
use crate::intern::InternerBuilder;

use super::types::*;

pub(super) struct Builder {
    pub(super) scopes: Vec<Scope>,
    pub(super) bindings: Vec<Binding>,
    pub(super) references: Vec<Reference>,
    pub(super) interner: InternerBuilder,
    /// Stack of scopes enclosing the node currently being visited, innermost last.
    scope_stack: Vec<ScopeId>,
}

impl Builder {
    fn push_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let parent = self.scope_stack.last().copied();
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(kind, parent));
        if let Some(parent) = parent {
            self.scopes[parent.index()].children.push(id);
        }
        self.scope_stack.push(id);
        id
    }

    fn pop_scope(&mut self) {
        self.scope_stack.pop();
    }

    fn current(&self) -> ScopeId {
        *self.scope_stack.last().expect("scope stack is never empty during traversal")
    }

    /// Nearest enclosing Function or Module scope — the hoist target for
    /// `var` declarations and nested function declarations (spec §4.1).
    fn hoist_target(&self) -> ScopeId {
        for &id in self.scope_stack.iter().rev() {
            let kind = self.scopes[id.index()].kind;
            if matches!(kind, ScopeKind::Function | ScopeKind::Module) {
                return id;
            }
        }
        unreachable!("module scope is always on the stack")
    }

    fn nearest_function_scope(&self) -> Option<ScopeId> {
        self.scope_stack
            .iter()
            .rev()
            .copied()
            .find(|&id| self.scopes[id.index()].kind == ScopeKind::Function)
    }

    fn declare(
        &mut self,
        scope: ScopeId,
        name: &str,
        kind: BindingKind,
        loc: SourceLocation,
    ) -> ScopeResult<BindingId> {
        let name_id = self.interner.intern(name);
        if let Some(&existing) = self.scopes[scope.index()].bindings.get(&name_id) {
            // Redeclaring `var`/function across hoists is allowed (sloppy-mode
            // idiom the teacher's own prepare pass tolerates); anything else
            // at the same scope is a duplicate declaration.
            let existing_kind = self.bindings[existing.index()].kind;
            let redeclaration_ok =
                matches!((existing_kind, kind), (BindingKind::Var, BindingKind::Var));
            if !redeclaration_ok {
                return Err(MicroviumError::compile(format!("duplicate binding '{name}'"), loc));
            }
            return Ok(existing);
        }

        let id = BindingId(self.bindings.len() as u32);
        self.bindings.push(Binding {
            name: name_id,
            kind,
            declared_at: loc,
            is_written_to: false,
            is_accessed_by_nested_function: false,
            is_exported: false,
            slot: None,
        });
        self.scopes[scope.index()].bindings.insert(name_id, id);
        Ok(id)
    }

    /// Resolves `name` from `use_scope` outward, recording whether the walk
    /// crossed a function-scope boundary (spec §4.1: "crosses at least one
    /// intervening function boundary").
    fn resolve(&mut self, name: &str, use_scope: ScopeId, loc: SourceLocation, is_write: bool) -> Resolved {
        let name_id = self.interner.intern(name);
        let mut crossed_function = false;
        let mut current = Some(use_scope);
        while let Some(id) = current {
            let scope = &self.scopes[id.index()];
            if let Some(&binding_id) = scope.bindings.get(&name_id) {
                let binding = &mut self.bindings[binding_id.index()];
                if is_write {
                    binding.is_written_to = true;
                }
                if crossed_function {
                    binding.is_accessed_by_nested_function = true;
                }
                let resolved = Resolved::Binding(binding_id);
                self.references.push(Reference {
                    resolved,
                    is_write,
                    location: loc,
                });
                return resolved;
            }
            if scope.kind == ScopeKind::Function {
                crossed_function = true;
            }
            current = scope.parent;
        }
        let resolved = Resolved::FreeVariable(name_id);
        self.references.push(Reference {
            resolved,
            is_write,
            location: loc,
        });
        resolved
    }

    fn add_prologue(&mut self, scope: ScopeId, op: PrologueOp) {
        self.scopes[scope.index()].prologue.push(op);
    }

    // --- statements ---------------------------------------------------

    fn visit_program(&mut self, program: &Program) -> ScopeResult<()> {
        for stmt in &program.body {
            self.visit_stmt(stmt)?;
        }
        Ok(())
    }

    fn visit_block_stmts(&mut self, stmts: &[Stmt]) -> ScopeResult<()> {
        for stmt in stmts {
            self.visit_stmt(stmt)?;
        }
        Ok(())
    }

    fn visit_stmt(&mut self, stmt: &Stmt) -> ScopeResult<()> {
        match &stmt.kind {
            StmtKind::VariableDeclaration { kind, declarations } => {
                for decl in declarations {
                    if let Some(init) = &decl.init {
                        self.visit_expr(init)?;
                    }
                    let binding_kind = match kind {
                        DeclKind::Var => BindingKind::Var,
                        DeclKind::Let => BindingKind::Let,
                        DeclKind::Const => BindingKind::Const,
                    };
                    match kind {
                        DeclKind::Var => {
                            let target = self.hoist_target();
                            let binding = self.declare(target, &decl.name, binding_kind, decl.loc)?;
                            if !self.scopes[target.index()].var_declarations.contains(&binding) {
                                self.scopes[target.index()].var_declarations.push(binding);
                            }
                            self.add_prologue(target, PrologueOp::InitVarDeclaration { binding });
                        }
                        DeclKind::Let | DeclKind::Const => {
                            let current = self.current();
                            let binding = self.declare(current, &decl.name, binding_kind, decl.loc)?;
                            self.scopes[current.index()].lexical_declarations.push(binding);
                            self.add_prologue(current, PrologueOp::InitLexicalDeclaration { binding });
                        }
                    }
                }
                Ok(())
            }
            StmtKind::FunctionDeclaration(func) => {
                let name = func
                    .name
                    .as_deref()
                    .ok_or_else(|| MicroviumError::compile("function declaration requires a name", stmt.loc))?;
                let target = self.hoist_target();
                let binding = self.declare(target, name, BindingKind::Var, stmt.loc)?;
                self.scopes[target.index()].nested_function_declarations.push(binding);
                // Initialization site stays in the textual block (spec §4.1).
                let current = self.current();
                self.add_prologue(current, PrologueOp::InitFunctionDeclaration { binding });
                self.visit_function(func)
            }
            StmtKind::ExpressionStatement(expr) => self.visit_expr(expr),
            StmtKind::Block(stmts) => {
                self.push_scope(ScopeKind::Block);
                self.visit_block_stmts(stmts)?;
                self.pop_scope();
                Ok(())
            }
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                self.visit_expr(test)?;
                self.visit_stmt(consequent)?;
                if let Some(alt) = alternate {
                    self.visit_stmt(alt)?;
                }
                Ok(())
            }
            StmtKind::While { test, body } => {
                self.visit_expr(test)?;
                self.visit_stmt(body)
            }
            StmtKind::DoWhile { body, test } => {
                self.visit_stmt(body)?;
                self.visit_expr(test)
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                self.push_scope(ScopeKind::Block);
                if let Some(init) = init {
                    self.visit_stmt(init)?;
                }
                if let Some(test) = test {
                    self.visit_expr(test)?;
                }
                self.visit_stmt(body)?;
                if let Some(update) = update {
                    self.visit_expr(update)?;
                }
                self.pop_scope();
                Ok(())
            }
            StmtKind::Switch { discriminant, cases } => {
                self.visit_expr(discriminant)?;
                self.push_scope(ScopeKind::Block);
                for case in cases {
                    if let Some(test) = &case.test {
                        self.visit_expr(test)?;
                    }
                    self.visit_block_stmts(&case.consequent)?;
                }
                self.pop_scope();
                Ok(())
            }
            StmtKind::Break => Ok(()),
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.visit_expr(value)?;
                }
                Ok(())
            }
            StmtKind::Import { bindings, .. } => {
                let target = self.hoist_target();
                for binding in bindings {
                    self.declare(target, &binding.local_name, BindingKind::Import, binding.loc)?;
                }
                Ok(())
            }
            StmtKind::Export { declaration, name } => {
                if let Some(decl) = declaration {
                    self.visit_stmt(decl)?;
                }
                let target = self.hoist_target();
                if let Some(name) = name {
                    let name_id = self.interner.intern(name);
                    if let Some(&binding_id) = self.scopes[target.index()].bindings.get(&name_id) {
                        self.bindings[binding_id.index()].is_exported = true;
                    } else {
                        return Err(MicroviumError::compile(format!("export of unknown name '{name}'"), stmt.loc));
                    }
                } else if let Some(decl) = declaration {
                    self.mark_declaration_exported(decl, target)?;
                }
                Ok(())
            }
        }
    }

    fn mark_declaration_exported(&mut self, decl: &Stmt, target: ScopeId) -> ScopeResult<()> {
        let names: Vec<String> = match &decl.kind {
            StmtKind::FunctionDeclaration(func) => func.name.clone().into_iter().collect(),
            StmtKind::VariableDeclaration { declarations, .. } => {
                declarations.iter().map(|d| d.name.clone()).collect()
            }
            _ => Vec::new(),
        };
        for name in names {
            let name_id = self.interner.intern(&name);
            if let Some(&binding_id) = self.scopes[target.index()].bindings.get(&name_id) {
                self.bindings[binding_id.index()].is_exported = true;
            }
        }
        Ok(())
    }

    fn visit_function(&mut self, func: &FunctionNode) -> ScopeResult<()> {
        self.push_scope(ScopeKind::Function);
        let fn_scope = self.current();

        if !func.is_arrow {
            let this_binding = self.declare(fn_scope, "this", BindingKind::This, func.loc)?;
            self.scopes[fn_scope.index()].this_binding = Some(this_binding);
            self.add_prologue(fn_scope, PrologueOp::InitThis { binding: this_binding });
        }

        for param in &func.params {
            let binding = self.declare(fn_scope, param, BindingKind::Param, func.loc)?;
            self.scopes[fn_scope.index()].parameter_bindings.push(binding);
            self.add_prologue(fn_scope, PrologueOp::InitParameter { binding });
        }

        match &func.body {
            FunctionBody::Block(stmts) => self.visit_block_stmts(stmts)?,
            FunctionBody::Expression(expr) => self.visit_expr(expr)?,
        }

        reorder_top_level_prologue(&mut self.scopes[fn_scope.index()]);
        self.pop_scope();
        Ok(())
    }

    // --- expressions ----------------------------------------------------

    fn visit_expr(&mut self, expr: &Expr) -> ScopeResult<()> {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::This => Ok(()),
            ExprKind::Identifier(name) => {
                let scope = self.current();
                self.resolve(name, scope, expr.loc, false);
                Ok(())
            }
            ExprKind::TemplateLiteral { expressions, .. } => {
                for e in expressions {
                    self.visit_expr(e)?;
                }
                Ok(())
            }
            ExprKind::Array(items) => {
                for item in items {
                    self.visit_expr(item)?;
                }
                Ok(())
            }
            ExprKind::Object(props) => {
                for prop in props {
                    if let PropertyKey::Computed(key) = &prop.key {
                        self.visit_expr(key)?;
                    }
                    self.visit_expr(&prop.value)?;
                }
                Ok(())
            }
            ExprKind::Binary { left, right, .. } => {
                self.visit_expr(left)?;
                self.visit_expr(right)
            }
            ExprKind::Logical { op, left, right } => {
                if matches!(op, LogicalOp::NullishCoalesce) {
                    return Err(MicroviumError::feature_not_supported("??", expr.loc));
                }
                self.visit_expr(left)?;
                self.visit_expr(right)
            }
            ExprKind::Unary { op, argument } => {
                if matches!(op, UnaryOp::Typeof | UnaryOp::Void | UnaryOp::Delete) {
                    return Err(MicroviumError::feature_not_supported(format!("{op:?}"), expr.loc));
                }
                self.visit_expr(argument)
            }
            ExprKind::Update { argument, .. } => self.visit_assignment_target(argument, true),
            ExprKind::Assignment { target, value, .. } => {
                self.visit_expr(value)?;
                self.visit_assignment_target(target, true)
            }
            ExprKind::Call { callee, args } => {
                self.visit_expr(callee)?;
                for arg in args {
                    self.visit_expr(arg)?;
                }
                Ok(())
            }
            ExprKind::Member { object, property } => {
                self.visit_expr(object)?;
                if let MemberProperty::Computed(key) = property {
                    self.visit_expr(key)?;
                }
                Ok(())
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.visit_expr(test)?;
                self.visit_expr(consequent)?;
                self.visit_expr(alternate)
            }
            ExprKind::Function(func) => self.visit_function(func),
        }
    }

    /// Visits an assignment/update target, recording a write reference and
    /// rejecting targets that are not a bare identifier (spec only supports
    /// simple assignment targets; destructuring patterns are unsupported).
    fn visit_assignment_target(&mut self, target: &Expr, is_write: bool) -> ScopeResult<()> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let scope = self.current();
                self.resolve(name, scope, target.loc, is_write);
                Ok(())
            }
            ExprKind::Member { object, property } => {
                self.visit_expr(object)?;
                if let MemberProperty::Computed(key) = property {
                    self.visit_expr(key)?;
                }
                Ok(())
            }
            _ => Err(MicroviumError::feature_not_supported(
                "destructuring assignment target",
                target.loc,
            )),
        }
    }
}

/// Resolves spec §9 design note (ii): at a function/module scope's own
/// prologue, function-declaration initializers run before `var` default
/// initializers, regardless of textual order. Deeper blocks are untouched —
/// their `InitFunctionDeclaration` ops live in the block's own prologue, not
/// here, so this only ever reorders entries pass 1 pushed directly onto the
/// function/module scope's own prologue.
fn reorder_top_level_prologue(scope: &mut Scope) {
    let (mut functions, mut rest): (Vec<_>, Vec<_>) = scope
        .prologue
        .drain(..)
        .partition(|op| matches!(op, PrologueOp::InitFunctionDeclaration { .. }));
    functions.append(&mut rest);
    scope.prologue = functions;
}

pub(super) fn build_scopes(program: &Program) -> ScopeResult<Builder> {
    let mut builder = Builder {
        scopes: Vec::new(),
        bindings: Vec::new(),
        references: Vec::new(),
        interner: InternerBuilder::new(),
        scope_stack: Vec::new(),
    };
    builder.push_scope(ScopeKind::Module);
    builder.visit_program(program)?;
    let module_scope = builder.current();
    reorder_top_level_prologue(&mut builder.scopes[module_scope.index()]);
    builder.pop_scope();
    Ok(builder)
}
