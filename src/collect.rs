//! Object identification and constraint collection.
//!
//! This is the frontend half of the analysis: a first pass over the
//! module creates a node for every memory object and every pointer value
//! (so forward references resolve), and a second pass translates each
//! statement into inclusion constraints. Any IR value referenced without
//! a node is a frontend bug and aborts.

use log::debug;
use rustc_hash::FxHashMap;

use crate::constraint::Constraint;
use crate::extlib::{self, ExternalKind};
use crate::ir::{Callee, Function, Init, Module, Operand, Statement, ValueRef};
use crate::node::NodeFactory;
use crate::types::NodeIndex;

/// Where a memory object came from; queried by
/// `points_to_constant_memory`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ObjectOrigin {
    Global { is_const: bool },
    Function,
    Stack,
    Heap,
}

pub struct Collector<'a> {
    module: &'a Module,
    factory: &'a mut NodeFactory,
    constraints: &'a mut Vec<Constraint>,
    origins: &'a mut FxHashMap<ValueRef, ObjectOrigin>,
}

impl<'a> Collector<'a> {
    pub fn new(
        module: &'a Module,
        factory: &'a mut NodeFactory,
        constraints: &'a mut Vec<Constraint>,
        origins: &'a mut FxHashMap<ValueRef, ObjectOrigin>,
    ) -> Self {
        Self {
            module,
            factory,
            constraints,
            origins,
        }
    }

    pub fn run(&mut self) {
        self.identify_objects();
        self.collect_constraints();
        debug!(
            "collected {} constraints over {} nodes",
            self.constraints.len(),
            self.factory.num_nodes()
        );
    }

    /// Creates a node for every memory object and pointer value in the
    /// module, before any constraint is emitted.
    fn identify_objects(&mut self) {
        for g in &self.module.globals {
            self.factory.create_value_node(Some(g.value));
            self.factory.create_object_node(Some(g.value));
            self.origins.insert(
                g.value,
                ObjectOrigin::Global {
                    is_const: g.is_const,
                },
            );
        }

        for f in &self.module.functions {
            if f.is_address_taken {
                self.factory.create_value_node(Some(f.value));
                self.factory.create_object_node(Some(f.value));
                self.origins.insert(f.value, ObjectOrigin::Function);
            }
            if f.returns_pointer {
                self.factory.create_return_node(f.func);
            }
            if f.is_variadic {
                self.factory.create_vararg_node(f.func);
            }
            for p in &f.params {
                if p.is_pointer {
                    self.factory.create_value_node(Some(p.value));
                }
            }
            for stmt in &f.body {
                match stmt {
                    Statement::Alloca { dst } => {
                        self.factory.create_value_node(Some(*dst));
                        self.factory.create_object_node(Some(*dst));
                        self.origins.insert(*dst, ObjectOrigin::Stack);
                    }
                    Statement::Load { dst, .. }
                    | Statement::Assign { dst, .. }
                    | Statement::IntToPtr { dst, .. }
                    | Statement::VaArg { dst } => {
                        self.factory.create_value_node(Some(*dst));
                    }
                    Statement::Call { dst, callee, .. } => {
                        if let Some(d) = dst {
                            self.factory.create_value_node(Some(*d));
                        }
                        // Heap object for allocating library calls
                        if let (Some(d), Callee::Direct(fr)) = (dst, callee) {
                            let target = self.module.function(*fr);
                            if target.is_external
                                && extlib::classify(&target.name).is_some_and(|k| k.allocates())
                            {
                                self.factory.create_object_node(Some(*d));
                                self.origins.insert(*d, ObjectOrigin::Heap);
                            }
                        }
                    }
                    Statement::Store { .. } | Statement::Return { .. } => {}
                }
            }
        }
    }

    fn collect_constraints(&mut self) {
        // Standing constraints: the universal set points to itself, and
        // the null pointer points to the null object
        self.emit(Constraint::addr_of(
            NodeFactory::UNIVERSAL_PTR,
            NodeFactory::UNIVERSAL_OBJ,
        ));
        self.emit(Constraint::store(
            NodeFactory::UNIVERSAL_OBJ,
            NodeFactory::UNIVERSAL_OBJ,
        ));
        self.emit(Constraint::addr_of(
            NodeFactory::NULL_PTR,
            NodeFactory::NULL_OBJ,
        ));

        for g in &self.module.globals {
            let val = self.value_node(g.value);
            let obj = self.object_node(g.value);
            self.emit(Constraint::addr_of(val, obj));
            self.global_initializer(obj, &g.init);
        }

        for f in &self.module.functions {
            if f.is_address_taken {
                let val = self.value_node(f.value);
                let obj = self.object_node(f.value);
                self.emit(Constraint::addr_of(val, obj));
            }
            for stmt in &f.body {
                self.statement(f, stmt);
            }
        }
    }

    fn global_initializer(&mut self, obj: NodeIndex, init: &Init) {
        match init {
            // Defined in another translation unit: anything
            Init::Unknown => self.emit(Constraint::copy(obj, NodeFactory::UNIVERSAL_OBJ)),
            Init::Null => self.emit(Constraint::copy(obj, NodeFactory::NULL_OBJ)),
            Init::Scalar => {}
            Init::Global(v) => {
                let target = self.object_node(*v);
                self.emit(Constraint::addr_of(obj, target));
            }
            // Field-insensitive: every element collapses onto the one
            // object node
            Init::Aggregate(elems) => {
                for e in elems {
                    self.global_initializer(obj, e);
                }
            }
        }
    }

    fn statement(&mut self, f: &Function, stmt: &Statement) {
        match stmt {
            Statement::Alloca { dst } => {
                let d = self.value_node(*dst);
                let o = self.object_node(*dst);
                self.emit(Constraint::addr_of(d, o));
            }
            Statement::Load { dst, addr } => {
                let d = self.value_node(*dst);
                let a = self.value_node(*addr);
                self.emit(Constraint::load(d, a));
            }
            Statement::Store { addr, value } => {
                let a = self.value_node(*addr);
                if let Some(v) = self.operand_node(value) {
                    self.emit(Constraint::store(a, v));
                }
            }
            Statement::Assign { dst, srcs } => {
                let d = self.value_node(*dst);
                for src in srcs {
                    if let Some(s) = self.operand_node(src) {
                        self.emit(Constraint::copy(d, s));
                    }
                }
            }
            Statement::IntToPtr { dst, origin } => {
                let d = self.value_node(*dst);
                match origin {
                    Some(x) => {
                        let x = self.value_node(*x);
                        self.emit(Constraint::copy(d, x));
                    }
                    None => self.emit(Constraint::copy(d, NodeFactory::UNIVERSAL_PTR)),
                }
            }
            Statement::Call { dst, callee, args } => self.call(f, *dst, callee, args),
            Statement::VaArg { dst } => {
                let d = self.value_node(*dst);
                let va = self
                    .factory
                    .vararg_node_for(f.func)
                    .expect("va_arg outside a variadic function");
                self.emit(Constraint::copy(d, va));
            }
            Statement::Return { value } => {
                let Some(ret) = self.factory.return_node_for(f.func) else {
                    return;
                };
                if let Some(v) = self.operand_node(value) {
                    self.emit(Constraint::copy(ret, v));
                }
            }
        }
    }

    fn call(&mut self, enclosing: &Function, dst: Option<ValueRef>, callee: &Callee, args: &[Operand]) {
        match callee {
            Callee::Direct(fr) => {
                let target = self.module.function(*fr);
                if target.is_external {
                    self.external_call(enclosing, dst, target, args);
                } else {
                    self.direct_call(dst, target, args, true);
                }
            }
            Callee::Indirect(_) => {
                // The result could come from anywhere
                if let Some(d) = dst {
                    let d = self.value_node(d);
                    self.emit(Constraint::copy(d, NodeFactory::UNIVERSAL_PTR));
                }
                // Bind arguments against every address-taken function
                // with matching arity (or variadic)
                for target in &self.module.functions {
                    if !target.is_address_taken || target.is_external {
                        continue;
                    }
                    if !target.is_variadic && target.params.len() != args.len() {
                        continue;
                    }
                    self.direct_call(None, target, args, false);
                }
            }
        }
    }

    /// Positional argument binding, truncated to the shorter list; excess
    /// actuals of a variadic callee flow into its vararg object.
    fn direct_call(
        &mut self,
        dst: Option<ValueRef>,
        target: &Function,
        args: &[Operand],
        bind_result: bool,
    ) {
        for (i, arg) in args.iter().enumerate() {
            let Some(a) = self.operand_node(arg) else {
                continue;
            };
            if i < target.params.len() {
                if target.params[i].is_pointer {
                    let p = self.value_node(target.params[i].value);
                    self.emit(Constraint::copy(p, a));
                }
            } else if target.is_variadic {
                let va = self
                    .factory
                    .vararg_node_for(target.func)
                    .expect("variadic function without a vararg node");
                self.emit(Constraint::copy(va, a));
            }
        }
        if bind_result {
            if let Some(d) = dst {
                let d = self.value_node(d);
                match self.factory.return_node_for(target.func) {
                    Some(ret) => self.emit(Constraint::copy(d, ret)),
                    // Pointer result from a callee we have no return node
                    // for: unknown
                    None => self.emit(Constraint::copy(d, NodeFactory::UNIVERSAL_PTR)),
                }
            }
        }
    }

    fn external_call(
        &mut self,
        enclosing: &Function,
        dst: Option<ValueRef>,
        target: &Function,
        args: &[Operand],
    ) {
        match extlib::classify(&target.name) {
            Some(ExternalKind::Noop) => {}
            Some(ExternalKind::Alloc) => {
                if let Some(d) = dst {
                    let dn = self.value_node(d);
                    let obj = self.object_node(d);
                    self.emit(Constraint::addr_of(dn, obj));
                    // realloc may also return its first argument
                    if target.name == "realloc" {
                        if let Some(first) = args.first() {
                            if !matches!(first, Operand::Null) {
                                if let Some(a) = self.operand_node(first) {
                                    self.emit(Constraint::copy(dn, a));
                                }
                            }
                        }
                    }
                }
            }
            Some(ExternalKind::AllocViaArg0) => {
                if let Some(a0) = args.first().and_then(|a| self.operand_node(a)) {
                    let obj = self.factory.create_object_node(None);
                    let tmp = self.factory.create_value_node(None);
                    self.emit(Constraint::addr_of(tmp, obj));
                    self.emit(Constraint::store(a0, tmp));
                }
            }
            Some(ExternalKind::RetArg(k)) => {
                if let (Some(d), Some(arg)) = (dst, args.get(k)) {
                    let dn = self.value_node(d);
                    if let Some(a) = self.operand_node(arg) {
                        self.emit(Constraint::copy(dn, a));
                    }
                }
            }
            Some(ExternalKind::Memcpy) => {
                let dst_arg = args.first().and_then(|a| self.operand_node(a));
                let src_arg = args.get(1).and_then(|a| self.operand_node(a));
                if let (Some(d0), Some(s1)) = (dst_arg, src_arg) {
                    // One scratch value carries the whole transfer: the
                    // analysis is field-insensitive
                    let tmp = self.factory.create_value_node(None);
                    self.emit(Constraint::load(tmp, s1));
                    self.emit(Constraint::store(d0, tmp));
                    if let Some(d) = dst {
                        let dn = self.value_node(d);
                        self.emit(Constraint::copy(dn, d0));
                    }
                }
            }
            Some(ExternalKind::Convert) => {
                let nptr = args.first().and_then(|a| self.operand_node(a));
                let endptr = match args.get(1) {
                    Some(Operand::Null) | None => None,
                    Some(a) => self.operand_node(a),
                };
                if let (Some(n), Some(e)) = (nptr, endptr) {
                    self.emit(Constraint::store(e, n));
                }
            }
            Some(ExternalKind::VaStart) => {
                let va = self
                    .factory
                    .vararg_node_for(enclosing.func)
                    .expect("va_start outside a variadic function");
                if let Some(a0) = args.first().and_then(|a| self.operand_node(a)) {
                    self.emit(Constraint::addr_of(a0, va));
                }
            }
            None => {
                // The oracle refuses: pollute every pointer argument and
                // the result
                debug!(
                    "unknown external function '{}', polluting with the universal pointer",
                    target.name
                );
                for arg in args {
                    if let Operand::Value(v) = arg {
                        let a = self.value_node(*v);
                        self.emit(Constraint::copy(a, NodeFactory::UNIVERSAL_PTR));
                    }
                }
                if let Some(d) = dst {
                    let dn = self.value_node(d);
                    self.emit(Constraint::copy(dn, NodeFactory::UNIVERSAL_PTR));
                }
            }
        }
    }

    #[inline]
    fn emit(&mut self, c: Constraint) {
        self.constraints.push(c);
    }

    fn value_node(&self, v: ValueRef) -> NodeIndex {
        self.factory
            .value_node_for(v)
            .unwrap_or_else(|| panic!("No value node for {}", v))
    }

    fn object_node(&self, v: ValueRef) -> NodeIndex {
        self.factory
            .object_node_for(v)
            .unwrap_or_else(|| panic!("No object node for {}", v))
    }

    fn operand_node(&self, op: &Operand) -> Option<NodeIndex> {
        match op {
            Operand::Value(v) => Some(self.value_node(*v)),
            Operand::Null => Some(NodeFactory::NULL_PTR),
            Operand::NonPointer => None,
        }
    }
}
