//! [`Executor`]: the reference Host-side VM (spec §4.4, §6).
//!
//! One `Executor` owns a heap, a global-variable table and an export table
//! that all outlive any single `evaluateModule` call; the compiled
//! [`IlUnit`] itself is reloaded fresh each call, mirroring the teacher's
//! `Executor::new` taking a freshly-parsed `RunSnapshot` per run rather than
//! accumulating compiled units across calls.

use std::rc::Rc;

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::ast::Program;
use crate::error::{HostResult, MicroviumError};
use crate::heap::{Allocation, Heap};
use crate::il::{self, BlockId, IlBinOp, IlLiteral, IlUnaryOp, IlUnit, Opcode};
use crate::intern::InternerBuilder;
use crate::scope;
use crate::snapshot::{ExportEntry, ImportEntry, SnapshotInfo};
use crate::value::{FunctionId, HostFunctionId, Value};

/// Resolves an `import` specifier to a [`Value`], given access to the
/// executor's heap and interner so it can build objects/strings in the same
/// id space the running unit uses (spec §6 "imports are resolved by either
/// a table or a resolver function").
pub type ImportResolver = Box<dyn FnMut(&str, &mut Heap, &mut InternerBuilder) -> HostResult<Value>>;

type HostFn = Box<dyn FnMut(&mut Executor, Vec<Value>) -> HostResult<Value>>;

/// Reserved slot for the `vmExport` builtin every module sees as a free
/// variable (spec test scenario 1: `vmExport(0, () => 42)`).
const VM_EXPORT_HOST_ID: HostFunctionId = HostFunctionId(0);

/// A stack-machine interpreter over one [`IlUnit`] at a time (spec §4.4).
///
/// `globals`/`exports`/`heap` persist across `evaluate_module` calls, the
/// way a real device's VM state persists between modules loaded before a
/// snapshot is taken; `unit` is swapped out wholesale by each call, which
/// means a `Value::Function`/`Value::Reference(Closure)` produced by one
/// module is only meaningful for calls made while that module is the
/// current one — this executor does not remap function ids across loads
/// (see DESIGN.md).
pub struct Executor {
    heap: Heap,
    interner: InternerBuilder,
    globals: IndexMap<String, Value>,
    exports: IndexMap<u16, Value>,
    host_functions: Vec<Option<HostFn>>,
    import_resolver: Option<ImportResolver>,
    unit: Option<Rc<IlUnit>>,
    required_engine_version: u16,
    required_feature_flags: u32,
}

impl Executor {
    /// Spec §6 `create(importResolver) -> VM`. `import_resolver` is `None`
    /// when the embedder has nothing to import from.
    pub fn create(import_resolver: Option<ImportResolver>) -> Self {
        let mut executor = Self {
            heap: Heap::new(),
            interner: InternerBuilder::new(),
            globals: IndexMap::new(),
            exports: IndexMap::new(),
            host_functions: Vec::new(),
            import_resolver,
            unit: None,
            required_engine_version: 1,
            required_feature_flags: 0,
        };
        let vm_export_id = executor.import_host_function(vm_export_builtin);
        debug_assert_eq!(vm_export_id, VM_EXPORT_HOST_ID);
        executor
    }

    /// Spec §6 `vm.importHostFunction(hostFunctionId)`: registers a Rust
    /// closure the script can invoke if something (an import, a builtin)
    /// hands it `Value::HostFunction(id)`.
    pub fn import_host_function<F>(&mut self, f: F) -> HostFunctionId
    where
        F: FnMut(&mut Executor, Vec<Value>) -> HostResult<Value> + 'static,
    {
        let id = HostFunctionId(self.host_functions.len() as u32);
        self.host_functions.push(Some(Box::new(f)));
        id
    }

    /// Spec §6 `vm.evaluateModule({sourceText, debugFilename})`, adapted:
    /// parsing is an external collaborator (spec §1), so this takes an
    /// already-parsed [`Program`] rather than source text (see DESIGN.md).
    /// Runs scope analysis, IL compilation and verification, then
    /// interprets `#entry` to completion, returning whatever it returns.
    pub fn evaluate_module(&mut self, program: &Program, debug_filename: &str) -> HostResult<Value> {
        let model = scope::analyze(program)?;
        let unit = il::compile(program, &model, debug_filename)?;
        il::verify_unit(&unit)?;
        let unit = Rc::new(unit);

        self.interner = InternerBuilder::from_interns(&unit.interns);

        for &name in &unit.free_variables {
            let text = unit.interns.get(name);
            if text == "vmExport" {
                self.globals.insert("vmExport".to_owned(), Value::HostFunction(VM_EXPORT_HOST_ID));
            }
        }

        // Every import shares the single `"#module"` global regardless of
        // specifier (pass 2's simplification, see DESIGN.md): later imports
        // silently overwrite earlier ones.
        for import in &unit.module_imports {
            let namespace = self.resolve_import(&import.specifier)?;
            self.globals.insert("#module".to_owned(), namespace);
        }

        // Module-level function declarations never get a store emitted by
        // the compiler (spec §4.2 "Entry function"); the host VM
        // materializes them as globals before `#entry` runs.
        for &(name, fn_id) in &unit.hoisted_module_functions {
            let text = unit.interns.get(name).to_owned();
            self.globals.insert(text, Value::Function(fn_id));
        }

        let namespace_id = self.heap.allocate(Allocation::Object(ahash::AHashMap::new()));
        let this_module = Value::Reference(namespace_id);
        let result = self.run_function(&unit, unit.entry_function_id, vec![this_module], None)?;
        self.unit = Some(unit);
        Ok(result)
    }

    fn resolve_import(&mut self, specifier: &str) -> HostResult<Value> {
        let mut resolver = self
            .import_resolver
            .take()
            .ok_or_else(|| MicroviumError::InvalidOperation(format!("no import resolver registered to resolve '{specifier}'")))?;
        let result = resolver(specifier, &mut self.heap, &mut self.interner);
        self.import_resolver = Some(resolver);
        result
    }

    /// Spec §6 `vm.exportValue(exportId, value)`.
    pub fn export_value(&mut self, export_id: u16, value: Value) {
        self.exports.insert(export_id, value);
    }

    /// Spec §6 `vm.resolveExport(exportId)`.
    pub fn resolve_export(&self, export_id: u16) -> Option<Value> {
        self.exports.get(&export_id).cloned()
    }

    /// Calls a [`Value`] (a function, closure, or host function) resolved
    /// from e.g. [`Executor::resolve_export`], the way an embedder invokes
    /// an exported callback after the module that produced it has already
    /// finished running (spec §8 scenario 2: "two successive calls").
    pub fn call(&mut self, callee: Value, args: Vec<Value>) -> HostResult<Value> {
        let unit = self
            .unit
            .clone()
            .ok_or_else(|| MicroviumError::InvalidOperation("call: no module has been evaluated yet".into()))?;
        self.invoke(&unit, callee, args)
    }

    /// Spec §6 `vm.garbageCollect()` / SPEC_FULL.md §4.4: a stop-the-world
    /// mark-and-sweep over the heap arena, adequate for initialization-time
    /// use. Roots are every `Value::Reference` reachable from `globals` or
    /// `exports`; anything else live gets freed regardless of refcount,
    /// which is what lets this reclaim cycles the refcounting in
    /// [`Heap::dec_ref`] alone cannot.
    pub fn garbage_collect(&mut self) {
        let mut reachable = AHashSet::new();
        let mut worklist = Vec::new();
        for value in self.globals.values().chain(self.exports.values()) {
            if let Value::Reference(id) = value {
                if reachable.insert(*id) {
                    worklist.push(*id);
                }
            }
        }
        while let Some(id) = worklist.pop() {
            if !self.heap.is_live(id) {
                continue;
            }
            for child in allocation_children(self.heap.get(id)) {
                if let Value::Reference(child_id) = child {
                    if reachable.insert(child_id) {
                        worklist.push(child_id);
                    }
                }
            }
        }
        self.heap.sweep(&reachable);
    }

    /// Spec §6 `vm.createSnapshotInfo() -> SnapshotInfo`.
    pub fn create_snapshot_info(&mut self) -> HostResult<SnapshotInfo> {
        let unit = self
            .unit
            .as_ref()
            .ok_or_else(|| MicroviumError::InvalidOperation("createSnapshotInfo called before evaluateModule".into()))?
            .clone();

        let mut globals = IndexMap::new();
        for (name, value) in &self.globals {
            let id = self.interner.intern(name);
            globals.insert(id, value.clone());
        }
        let imports = unit
            .module_imports
            .iter()
            .map(|import| ImportEntry {
                specifier: self.interner.intern(&import.specifier),
            })
            .collect();
        let exports = self
            .exports
            .iter()
            .map(|(&export_id, value)| ExportEntry {
                export_id,
                value: value.clone(),
            })
            .collect();

        Ok(SnapshotInfo {
            required_engine_version: self.required_engine_version,
            required_feature_flags: self.required_feature_flags,
            globals,
            heap: self.heap.clone(),
            imports,
            exports,
            function_count: unit.functions.len() as u32,
            interns: self.interner.snapshot_interns(),
        })
    }

    // --- interpreter --------------------------------------------------

    /// Runs one IL function to completion. `args` is `[this, arg1, ...]`
    /// (spec §4.2 `ArgumentSlot`: "index 0 = this"); `inherited_scope` is
    /// `Some` iff the callee was reached through a `Value::Reference` to an
    /// `Allocation::Closure` (spec §4.2 `ClosureNew`, see DESIGN.md for how
    /// this executor reconstructs scope capture without a stack operand).
    fn run_function(
        &mut self,
        unit: &Rc<IlUnit>,
        fn_id: FunctionId,
        args: Vec<Value>,
        inherited_scope: Option<Vec<Value>>,
    ) -> HostResult<Value> {
        let function = unit
            .functions
            .get(&fn_id)
            .ok_or_else(|| MicroviumError::internal(format!("no such function {}", fn_id.index())))?;
        let mut block_id = function.entry_block_id;
        let mut stack: Vec<Value> = Vec::new();
        let mut locals: Vec<Value> = Vec::new();
        let mut own_scope: Option<Vec<Value>> = None;

        loop {
            let function = unit.functions.get(&fn_id).expect("function table stable across one call");
            let block = function
                .blocks
                .get(&block_id)
                .ok_or_else(|| MicroviumError::internal(format!("no such block {}", block_id.index())))?;

            let mut next_block: Option<BlockId> = None;
            for op in &block.operations {
                match &op.opcode {
                    Opcode::Literal(lit) => stack.push(value_of_literal(lit)),
                    Opcode::LoadVar { index } => stack.push(locals.get(*index as usize).cloned().unwrap_or(Value::Undefined)),
                    Opcode::StoreVar { index } => {
                        let value = stack.last().cloned().expect("StoreVar with empty stack");
                        let index = *index as usize;
                        if index >= locals.len() {
                            locals.resize(index + 1, Value::Undefined);
                        }
                        locals[index] = value;
                    }
                    Opcode::LoadArg { arg_index } => {
                        stack.push(args.get(*arg_index as usize).cloned().unwrap_or(Value::Undefined));
                    }
                    Opcode::LoadScoped { index } => {
                        let index = *index as usize;
                        let value = match &own_scope {
                            Some(scope) if index < scope.len() => scope[index].clone(),
                            _ => inherited_scope.as_ref().and_then(|s| s.get(index)).cloned().unwrap_or(Value::Undefined),
                        };
                        stack.push(value);
                    }
                    Opcode::StoreScoped { index } => {
                        let index = *index as usize;
                        match own_scope.as_mut() {
                            Some(scope) if index < scope.len() => {
                                scope[index] = stack.last().cloned().expect("StoreScoped with empty stack");
                            }
                            // Closures capture their scope vector by value (see
                            // DESIGN.md), so a write through an inherited scope
                            // does not propagate back to the ancestor frame
                            // that pushed it — a documented limitation of this
                            // simplification.
                            _ => {}
                        }
                    }
                    Opcode::LoadGlobal { name } => {
                        let text = unit.interns.get(*name);
                        stack.push(self.globals.get(text).cloned().unwrap_or(Value::Undefined));
                    }
                    Opcode::StoreGlobal { name } => {
                        let text = unit.interns.get(*name).to_owned();
                        let value = stack.last().cloned().expect("StoreGlobal with empty stack");
                        self.globals.insert(text, value);
                    }
                    Opcode::Dup => {
                        let top = stack.last().cloned().expect("Dup with empty stack");
                        stack.push(top);
                    }
                    Opcode::Pop { count } => {
                        let new_len = stack.len().saturating_sub(*count as usize);
                        stack.truncate(new_len);
                    }
                    Opcode::BinOp(bin_op) => {
                        let b = stack.pop().expect("BinOp needs two operands");
                        let a = stack.pop().expect("BinOp needs two operands");
                        stack.push(self.apply_binop(*bin_op, a, b)?);
                    }
                    Opcode::UnaryOp(unary_op) => {
                        let a = stack.pop().expect("UnaryOp needs an operand");
                        stack.push(apply_unaryop(*unary_op, &a)?);
                    }
                    Opcode::Branch { target } => {
                        let cond = stack.pop().expect("Branch needs a condition");
                        if !cond.is_truthy() {
                            next_block = Some(*target);
                            break;
                        }
                    }
                    Opcode::Jump { target } => {
                        next_block = Some(*target);
                        break;
                    }
                    Opcode::Call { this_and_args } => {
                        let total = 1 + *this_and_args as usize;
                        if stack.len() < total {
                            return Err(MicroviumError::internal("Call: operand stack underflow"));
                        }
                        let split_at = stack.len() - total;
                        let mut operands = stack.split_off(split_at);
                        let callee = operands.remove(0);
                        let result = self.invoke(unit, callee, operands)?;
                        stack.push(result);
                    }
                    Opcode::ObjectGet => {
                        let key = stack.pop().expect("ObjectGet needs a key");
                        let object = stack.pop().expect("ObjectGet needs an object");
                        stack.push(self.object_get(&object, &key)?);
                    }
                    Opcode::ObjectSet => {
                        let value = stack.pop().expect("ObjectSet needs a value");
                        let key = stack.pop().expect("ObjectSet needs a key");
                        let object = stack.last().cloned().expect("ObjectSet needs an object");
                        self.object_set(&object, &key, value)?;
                    }
                    Opcode::Rot3 => {
                        let c = stack.pop().expect("Rot3 needs three values");
                        let b = stack.pop().expect("Rot3 needs three values");
                        let a = stack.pop().expect("Rot3 needs three values");
                        stack.push(b);
                        stack.push(c);
                        stack.push(a);
                    }
                    Opcode::Swap => {
                        let b = stack.pop().expect("Swap needs two values");
                        let a = stack.pop().expect("Swap needs two values");
                        stack.push(b);
                        stack.push(a);
                    }
                    Opcode::ArrayNew => {
                        let id = self.heap.allocate(Allocation::Array(Vec::new()));
                        stack.push(Value::Reference(id));
                    }
                    Opcode::ObjectNew => {
                        let id = self.heap.allocate(Allocation::Object(ahash::AHashMap::new()));
                        stack.push(Value::Reference(id));
                    }
                    Opcode::ClosureNew { .. } => {
                        let func_value = stack.pop().expect("ClosureNew needs a function literal");
                        let function = match func_value {
                            Value::Function(id) => id,
                            other => {
                                return Err(MicroviumError::internal(format!(
                                    "ClosureNew: expected a function literal, found {}",
                                    other.type_name()
                                )))
                            }
                        };
                        let scope = own_scope
                            .clone()
                            .or_else(|| inherited_scope.clone())
                            .unwrap_or_default();
                        let id = self.heap.allocate(Allocation::Closure { function, scope });
                        stack.push(Value::Reference(id));
                    }
                    Opcode::Return => {
                        let value = stack.pop().expect("Return needs a value");
                        return Ok(value);
                    }
                    Opcode::Nop { .. } => {}
                    Opcode::ScopePush { slot_count } => {
                        own_scope = Some(vec![Value::Undefined; *slot_count as usize]);
                    }
                }
            }

            match next_block {
                Some(target) => block_id = target,
                None => return Err(MicroviumError::internal("block fell off the end without a terminator")),
            }
        }
    }

    fn invoke(&mut self, unit: &Rc<IlUnit>, callee: Value, args: Vec<Value>) -> HostResult<Value> {
        match callee {
            Value::Function(fn_id) => self.run_function(unit, fn_id, args, None),
            Value::Reference(id) => {
                let (function, scope) = match self.heap.get(id) {
                    Allocation::Closure { function, scope } => (*function, scope.clone()),
                    other => {
                        return Err(MicroviumError::InvalidOperation(format!(
                            "value is not callable (allocation type {})",
                            other.type_code()
                        )))
                    }
                };
                self.run_function(unit, function, args, Some(scope))
            }
            Value::HostFunction(host_id) => self.call_host_function(host_id, args),
            other => Err(MicroviumError::InvalidOperation(format!("{} is not callable", other.type_name()))),
        }
    }

    fn call_host_function(&mut self, id: HostFunctionId, args: Vec<Value>) -> HostResult<Value> {
        let index = id.index();
        let mut slot = self
            .host_functions
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| MicroviumError::InvalidOperation(format!("host function {index} is not registered")))?;
        let result = slot(self, args);
        self.host_functions[index] = Some(slot);
        result
    }

    fn object_get(&self, object: &Value, key: &Value) -> HostResult<Value> {
        let Value::Reference(id) = object else {
            return Err(MicroviumError::InvalidOperation(format!("cannot read a property of {}", object.type_name())));
        };
        match self.heap.get(*id) {
            Allocation::Object(props) => match key {
                Value::String(key_id) => Ok(props.get(key_id).cloned().unwrap_or(Value::Undefined)),
                _ => Err(MicroviumError::InvalidOperation("object property key must be a string".into())),
            },
            Allocation::Array(items) => {
                if let Value::String(key_id) = key {
                    if self.interner.get(*key_id) == "length" {
                        return Ok(Value::Number(items.len() as f64));
                    }
                }
                match key {
                    Value::Number(n) if *n >= 0.0 => Ok(items.get(*n as usize).cloned().unwrap_or(Value::Undefined)),
                    _ => Err(MicroviumError::InvalidOperation("array index must be a non-negative number".into())),
                }
            }
            Allocation::String(s) => {
                if let Value::String(key_id) = key {
                    if self.interner.get(*key_id) == "length" {
                        return Ok(Value::Number(s.chars().count() as f64));
                    }
                }
                Ok(Value::Undefined)
            }
            Allocation::Function(_) | Allocation::Closure { .. } => Ok(Value::Undefined),
        }
    }

    fn object_set(&mut self, object: &Value, key: &Value, value: Value) -> HostResult<()> {
        let Value::Reference(id) = object else {
            return Err(MicroviumError::InvalidOperation(format!("cannot write a property of {}", object.type_name())));
        };
        let id = *id;
        match self.heap.get_mut(id) {
            Allocation::Object(props) => match key {
                Value::String(key_id) => {
                    props.insert(*key_id, value);
                    Ok(())
                }
                _ => Err(MicroviumError::InvalidOperation("object property key must be a string".into())),
            },
            Allocation::Array(items) => match key {
                Value::Number(n) if *n >= 0.0 => {
                    let index = *n as usize;
                    if index >= items.len() {
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                    Ok(())
                }
                _ => Err(MicroviumError::InvalidOperation("array index must be a non-negative number".into())),
            },
            Allocation::String(_) | Allocation::Function(_) | Allocation::Closure { .. } => {
                Err(MicroviumError::InvalidOperation("value is not a writable object".into()))
            }
        }
    }

    fn apply_binop(&mut self, op: IlBinOp, a: Value, b: Value) -> HostResult<Value> {
        if matches!(op, IlBinOp::Add) && (matches!(a, Value::String(_)) || matches!(b, Value::String(_))) {
            let text = format!("{}{}", self.stringify(&a), self.stringify(&b));
            return Ok(Value::String(self.interner.intern(&text)));
        }
        match op {
            IlBinOp::Add => Ok(Value::Number(as_number(&a)? + as_number(&b)?)),
            IlBinOp::Sub => Ok(Value::Number(as_number(&a)? - as_number(&b)?)),
            IlBinOp::Mul => Ok(Value::Number(as_number(&a)? * as_number(&b)?)),
            IlBinOp::Div => Ok(Value::Number(as_number(&a)? / as_number(&b)?)),
            IlBinOp::Mod => Ok(Value::Number(as_number(&a)? % as_number(&b)?)),
            IlBinOp::DivideAndTrunc => Ok(Value::Number(to_int32(as_number(&a)? / as_number(&b)?) as f64)),
            IlBinOp::StrictEq => Ok(Value::Boolean(strict_equals(&a, &b))),
            IlBinOp::StrictNotEq => Ok(Value::Boolean(!strict_equals(&a, &b))),
            IlBinOp::Lt => Ok(Value::Boolean(as_number(&a)? < as_number(&b)?)),
            IlBinOp::Lte => Ok(Value::Boolean(as_number(&a)? <= as_number(&b)?)),
            IlBinOp::Gt => Ok(Value::Boolean(as_number(&a)? > as_number(&b)?)),
            IlBinOp::Gte => Ok(Value::Boolean(as_number(&a)? >= as_number(&b)?)),
            IlBinOp::BitAnd => Ok(Value::Number((to_int32(as_number(&a)?) & to_int32(as_number(&b)?)) as f64)),
            IlBinOp::BitOr => Ok(Value::Number((to_int32(as_number(&a)?) | to_int32(as_number(&b)?)) as f64)),
            IlBinOp::BitXor => Ok(Value::Number((to_int32(as_number(&a)?) ^ to_int32(as_number(&b)?)) as f64)),
            IlBinOp::Shl => Ok(Value::Number(((to_int32(as_number(&a)?)).wrapping_shl((to_int32(as_number(&b)?) & 31) as u32)) as f64)),
            IlBinOp::Shr => Ok(Value::Number(((to_int32(as_number(&a)?)).wrapping_shr((to_int32(as_number(&b)?) & 31) as u32)) as f64)),
        }
    }

    fn stringify(&self, value: &Value) -> String {
        match value {
            Value::Undefined => "undefined".to_owned(),
            Value::Null => "null".to_owned(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(id) => self.interner.get(*id).to_owned(),
            Value::Reference(_) => "[object Object]".to_owned(),
            Value::Function(_) | Value::HostFunction(_) => "[object Function]".to_owned(),
            Value::Ephemeral(_) => "[object Ephemeral]".to_owned(),
        }
    }
}

fn value_of_literal(lit: &IlLiteral) -> Value {
    match lit {
        IlLiteral::Undefined => Value::Undefined,
        IlLiteral::Null => Value::Null,
        IlLiteral::Boolean(b) => Value::Boolean(*b),
        IlLiteral::Number(n) => Value::Number(*n),
        IlLiteral::String(id) => Value::String(*id),
        IlLiteral::Function(id) => Value::Function(*id),
    }
}

fn apply_unaryop(op: IlUnaryOp, a: &Value) -> HostResult<Value> {
    match op {
        IlUnaryOp::Not => Ok(Value::Boolean(!a.is_truthy())),
        IlUnaryOp::BitNot => Ok(Value::Number(!to_int32(as_number(a)?) as f64)),
    }
}

fn as_number(value: &Value) -> HostResult<f64> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(MicroviumError::InvalidOperation(format!("expected a number, found {}", other.type_name()))),
    }
}

/// ECMAScript ToInt32 would wrap out-of-range/non-finite values through a
/// 2^32 modulus; this reference VM just saturates, which is simpler and
/// matches every value this compiler's restricted numeric subset produces.
fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    n as i32
}

/// `===` value equality. Unlike [`Value::same_value`] (used for GC/dedup
/// purposes), this does not special-case `NaN` or `+0`/`-0`: `NaN === NaN`
/// is `false` and `+0 === -0` is `true`, matching ordinary strict equality.
fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Reference(x), Value::Reference(y)) => x == y,
        (Value::Function(x), Value::Function(y)) => x == y,
        (Value::HostFunction(x), Value::HostFunction(y)) => x == y,
        (Value::Ephemeral(x), Value::Ephemeral(y)) => x == y,
        _ => false,
    }
}

fn allocation_children(allocation: &Allocation) -> Vec<Value> {
    match allocation {
        Allocation::Object(props) => props.values().cloned().collect(),
        Allocation::Array(items) => items.clone(),
        Allocation::Closure { scope, .. } => scope.clone(),
        Allocation::String(_) | Allocation::Function(_) => Vec::new(),
    }
}

/// The `vmExport(id, value)` builtin every module can call as a free
/// variable (spec test scenario 1). `args` is `[this, exportId, value]`.
fn vm_export_builtin(executor: &mut Executor, args: Vec<Value>) -> HostResult<Value> {
    let export_id = match args.get(1) {
        Some(Value::Number(n)) => *n as u16,
        _ => return Err(MicroviumError::InvalidOperation("vmExport(id, value): id must be a number".into())),
    };
    let value = args.get(2).cloned().unwrap_or(Value::Undefined);
    executor.export_value(export_id, value);
    Ok(Value::Undefined)
}
