//! AVM_Rod: a finalized sequence of executable nodes — the thing a
//! compiler would emit and this crate interprets. §4.3 in the runtime's own
//! terms: `execute` walks the sequence until a node reports anything other
//! than `Next`, at which point the whole rod (and whatever rod contains it)
//! unwinds with that status.
//!
//! This crate builds rods by hand (there is no parser here); `Rod::push`
//! followed by `Rod::finalize` is the whole construction API.

use std::fmt;
use std::rc::Rc;

use asteria_core::SourceLocation;

use crate::context::{ExecutiveContext, Global};
use crate::gc::VariableMap;
use crate::ptc::{PtcArguments, PtcDisposition};
use crate::reference::Reference;
use crate::reference_stack::ReferenceStack;
use crate::runtime_error::RuntimeError;
use crate::subscript::Subscript;
use crate::value::{CowFunction, Value};
use crate::variable::Variable;

/// How a rod (or the node that just ran) wants its enclosing loop/function
/// to continue. Anything but `Next` stops the current rod immediately and
/// propagates to whatever is running it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Next,
    ReturnVoid,
    ReturnRef,
    BreakUnspec,
    BreakSwitch,
    BreakWhile,
    BreakFor,
    ContinueUnspec,
    ContinueWhile,
    ContinueFor,
}

impl Status {
    fn is_break(self) -> bool {
        matches!(self, Status::BreakUnspec | Status::BreakSwitch | Status::BreakWhile | Status::BreakFor)
    }

    fn is_continue(self) -> bool {
        matches!(self, Status::ContinueUnspec | Status::ContinueWhile | Status::ContinueFor)
    }
}

pub trait RodNode: fmt::Debug {
    fn execute(
        &self,
        ctx: &Rc<ExecutiveContext>,
        global: &mut Global,
        stack: &mut ReferenceStack,
        alt_stack: &mut ReferenceStack,
    ) -> Result<Status, RuntimeError>;

    fn collect_variables(&self, _staged: &mut VariableMap, _temp: &mut VariableMap) {}
}

#[derive(Debug, Default)]
pub struct Rod {
    nodes: Vec<Box<dyn RodNode>>,
    finalized: bool,
}

impl Rod {
    pub fn new() -> Self {
        Rod::default()
    }

    /// Alias for `new`, used where a placeholder empty body reads better
    /// than "new".
    pub fn empty() -> Self {
        Rod::default()
    }

    pub fn push(&mut self, node: Box<dyn RodNode>) {
        assert!(!self.finalized, "cannot push onto a finalized rod");
        self.nodes.push(node);
    }

    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn execute(
        &self,
        ctx: &Rc<ExecutiveContext>,
        global: &mut Global,
        stack: &mut ReferenceStack,
        alt_stack: &mut ReferenceStack,
    ) -> Result<Status, RuntimeError> {
        let _span = tracing::trace_span!("rod_execute", nodes = self.nodes.len()).entered();
        for node in &self.nodes {
            match node.execute(ctx, global, stack, alt_stack)? {
                Status::Next => continue,
                other => return Ok(other),
            }
        }
        Ok(Status::Next)
    }

    pub fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        for node in &self.nodes {
            node.collect_variables(staged, temp);
        }
    }
}

/// Unwinds a pending tail call (and any tail call it in turn returns)
/// iteratively rather than growing the host stack, per §4.3. Each resolved
/// frame's `on_call`/`on_return` hooks fire in a fixed order:
/// `on_call` as each frame is entered here, `on_return` for all of them
/// (innermost first) once the chain finally produces a concrete value, and
/// the frame's own captured defers run right after its `on_return`.
pub fn resolve_ptc(self_ref: &mut Reference, global: &mut Global) -> Result<(), RuntimeError> {
    let mut frames = Vec::new();

    while let Some(ptc) = self_ref.take_ptc() {
        let ptc = Rc::try_unwrap(ptc).unwrap_or_else(|rc| (*rc).clone_for_resolve());
        let (sloc, disposition, target, mut target_self, stack, caller_opt, defer) = ptc.into_parts();

        if let Some(hooks) = global.hooks() {
            hooks.on_call(&sloc, &target)?;
        }

        let invoke_result = target.invoke_ptc_aware(&mut target_self, global, stack);
        frames.push((sloc, disposition, defer, caller_opt));

        match invoke_result {
            Ok(()) => *self_ref = target_self,
            Err(mut err) => {
                annotate_ptc_unwind(&mut err, &frames);
                return Err(err);
            }
        }
    }

    let outermost_disposition = frames.first().map(|(_, disposition, _, _)| *disposition);

    let total_frames = frames.len();
    let mut alt_stack = ReferenceStack::new();
    for (sloc, disposition, defer, caller_opt) in frames.into_iter().rev() {
        if let Some(hooks) = global.hooks() {
            hooks.on_return(&sloc, disposition)?;
        }
        let defer_ctx = ExecutiveContext::new_defer();
        for (defer_sloc, rod) in defer {
            let mut scratch = ReferenceStack::new();
            if let Err(mut err) = rod.execute(&defer_ctx, global, &mut scratch, &mut alt_stack) {
                err.push_frame_defer(defer_sloc);
                err.push_frame_plain(sloc.clone(), "[proper tail call]");
                if let Some(caller) = &caller_opt {
                    err.push_frame_function(caller.sloc().clone(), caller.name());
                }
                return Err(err);
            }
        }
    }
    tracing::debug!(depth = total_frames, "ptc chain resolved");

    // The chain's result is whatever the innermost link produced, but the
    // outermost `return`/`return void`/`return ref` decided how the caller
    // is allowed to observe it (§4.3's closing paragraph).
    match outermost_disposition {
        Some(PtcDisposition::Void) => *self_ref = Reference::void(),
        Some(PtcDisposition::ByVal) => {
            let value = self_ref.dereference_readonly_owned()?;
            *self_ref = Reference::temporary(value);
        }
        Some(PtcDisposition::ByRef) | Some(PtcDisposition::None) | None => {}
    }

    Ok(())
}

fn annotate_ptc_unwind(
    err: &mut RuntimeError,
    frames: &[(SourceLocation, PtcDisposition, Vec<(SourceLocation, Rc<Rod>)>, Option<Rc<crate::function::InstantiatedFunction>>)],
) {
    for (sloc, _, _, caller_opt) in frames.iter().rev() {
        err.push_frame_plain(sloc.clone(), "[proper tail call]");
        if let Some(caller) = caller_opt {
            err.push_frame_function(caller.sloc().clone(), caller.name());
        }
    }
}

/// A small escape hatch for the rare case `resolve_ptc` observes a
/// `PtcArguments` still shared (e.g. a defer captured a reference to it).
/// `PtcArguments` holds no `Rc`-cycle-prone state itself, so this is a plain
/// deep copy, not a shared clone.
impl PtcArguments {
    fn clone_for_resolve(&self) -> PtcArguments {
        let cloned = PtcArguments::new(
            self.sloc().clone(),
            self.ptc_aware(),
            self.target().clone(),
            self.self_ref().clone(),
            self.stack().clone(),
        );
        if let Some(caller) = self.caller_opt() {
            cloned.set_caller(caller.clone());
        }
        cloned
    }
}

#[derive(Debug)]
pub struct PushConstant(pub Value);

impl RodNode for PushConstant {
    fn execute(&self, _ctx: &Rc<ExecutiveContext>, _global: &mut Global, stack: &mut ReferenceStack, _alt: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        stack.push(Reference::temporary(self.0.clone()));
        Ok(Status::Next)
    }
}

#[derive(Debug)]
pub struct PushLocalReference {
    pub name: Rc<str>,
    pub sloc: SourceLocation,
}

impl RodNode for PushLocalReference {
    fn execute(&self, ctx: &Rc<ExecutiveContext>, _global: &mut Global, stack: &mut ReferenceStack, _alt: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        match ctx.lookup(&self.name) {
            Some(r) => {
                stack.push(r);
                Ok(Status::Next)
            }
            None => Err(RuntimeError::format(&format!("undeclared identifier `{}`", self.name), self.sloc.clone())),
        }
    }
}

/// Declares a name in the current context, optionally running `init` first
/// (whose result becomes the variable's initial value).
#[derive(Debug)]
pub struct DeclareVariable {
    pub name: Rc<str>,
    pub immutable: bool,
    pub init: Option<Rod>,
    pub sloc: SourceLocation,
}

impl RodNode for DeclareVariable {
    fn execute(&self, ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, alt_stack: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let value = match &self.init {
            Some(rod) => {
                let status = rod.execute(ctx, global, stack, alt_stack)?;
                debug_assert_eq!(status, Status::Next);
                let r = std::mem::take(stack.mut_top(0));
                stack.pop(1);
                resolve_and_own(r, global)?
            }
            None => Value::Null,
        };

        let var = Rc::new(Variable::new(value, self.immutable));
        global.gc().track(var.clone());
        ctx.declare(&self.name, Reference::variable(var));

        if let Some(hooks) = global.hooks() {
            hooks.on_variable_declare(&self.sloc, &self.name)?;
        }
        Ok(Status::Next)
    }

    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        if let Some(rod) = &self.init {
            rod.collect_variables(staged, temp);
        }
    }
}

fn resolve_and_own(mut r: Reference, global: &mut Global) -> Result<Value, RuntimeError> {
    if r.is_ptc() {
        resolve_ptc(&mut r, global)?;
    }
    r.dereference_readonly_owned()
}

/// Builds an array `Value` out of `elements`, each evaluated in turn and
/// collected in order (§3.1: array = ordered sequence of `Value`).
#[derive(Debug)]
pub struct BuildArray {
    pub elements: Vec<Rod>,
}

impl RodNode for BuildArray {
    fn execute(&self, ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, alt_stack: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let mut values = Vec::with_capacity(self.elements.len());
        for element in &self.elements {
            let status = element.execute(ctx, global, stack, alt_stack)?;
            debug_assert_eq!(status, Status::Next);
            let r = std::mem::take(stack.mut_top(0));
            stack.pop(1);
            values.push(resolve_and_own(r, global)?);
        }
        stack.push(Reference::temporary(Value::array(values)));
        Ok(Status::Next)
    }

    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        for element in &self.elements {
            element.collect_variables(staged, temp);
        }
    }
}

#[derive(Debug)]
pub struct PushSubscript {
    pub subscript: Subscript,
    pub sloc: SourceLocation,
}

impl RodNode for PushSubscript {
    fn execute(&self, _ctx: &Rc<ExecutiveContext>, _global: &mut Global, stack: &mut ReferenceStack, _alt: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        stack
            .mut_top(0)
            .push_subscript(self.subscript.clone())
            .map_err(|mut e| {
                e.push_frame_plain(self.sloc.clone(), "subscript");
                e
            })?;
        Ok(Status::Next)
    }
}

/// Pops rhs then lhs off the stack (rhs was pushed last), writes the rhs
/// value through the lhs reference, and pushes a temporary holding the
/// assigned value (assignment is itself an expression).
#[derive(Debug)]
pub struct Assign {
    pub sloc: SourceLocation,
}

impl RodNode for Assign {
    fn execute(&self, _ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, _alt: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let mut rhs = std::mem::take(stack.mut_top(0));
        let lhs = std::mem::take(stack.mut_top(1));
        stack.pop(2);

        if rhs.is_ptc() {
            resolve_ptc(&mut rhs, global)?;
        }
        let value = rhs.dereference_readonly_owned()?;
        lhs.dereference_mutable(|slot| {
            *slot = value.clone();
            Ok(())
        })
        .map_err(|mut e| {
            e.push_frame_plain(self.sloc.clone(), "assignment");
            e
        })?;
        stack.push(Reference::temporary(value));
        Ok(Status::Next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug)]
pub struct BinaryOp {
    pub op: BinOp,
    pub sloc: SourceLocation,
}

impl RodNode for BinaryOp {
    fn execute(&self, _ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, _alt: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let mut rhs_ref = std::mem::take(stack.mut_top(0));
        let mut lhs_ref = std::mem::take(stack.mut_top(1));
        stack.pop(2);

        if rhs_ref.is_ptc() {
            resolve_ptc(&mut rhs_ref, global)?;
        }
        if lhs_ref.is_ptc() {
            resolve_ptc(&mut lhs_ref, global)?;
        }
        let lhs = lhs_ref.dereference_readonly_owned()?;
        let rhs = rhs_ref.dereference_readonly_owned()?;

        let result = apply_binop(self.op, &lhs, &rhs).map_err(|msg| RuntimeError::format(&msg, self.sloc.clone()))?;
        stack.push(Reference::temporary(result));
        Ok(Status::Next)
    }
}

fn apply_binop(op: BinOp, a: &Value, b: &Value) -> Result<Value, String> {
    use crate::value::Compare;
    use BinOp::*;

    if let Add = op {
        return a.add(b);
    }

    match op {
        Subtract | Multiply | Divide | Modulo => numeric_arith(op, a, b),
        BitAnd | BitOr | BitXor | ShiftLeft | ShiftRight => integer_bitwise(op, a, b),
        Equal => Ok(Value::Bool(a.value_eq(b))),
        NotEqual => Ok(Value::Bool(!a.value_eq(b))),
        Less => Ok(Value::Bool(matches!(a.compare(b), Compare::Less))),
        LessEqual => Ok(Value::Bool(matches!(a.compare(b), Compare::Less | Compare::Equal))),
        Greater => Ok(Value::Bool(matches!(a.compare(b), Compare::Greater))),
        GreaterEqual => Ok(Value::Bool(matches!(a.compare(b), Compare::Greater | Compare::Equal))),
        Add => unreachable!(),
    }
}

fn numeric_arith(op: BinOp, a: &Value, b: &Value) -> Result<Value, String> {
    use Value::*;
    match (a, b) {
        (Int(x), Int(y)) => match op {
            BinOp::Subtract => x.checked_sub(*y).map(Int).ok_or_else(|| "integer overflow in `-`".into()),
            BinOp::Multiply => x.checked_mul(*y).map(Int).ok_or_else(|| "integer overflow in `*`".into()),
            BinOp::Divide => {
                if *y == 0 {
                    Err("division by zero".into())
                } else {
                    Ok(Int(x / y))
                }
            }
            BinOp::Modulo => {
                if *y == 0 {
                    Err("division by zero".into())
                } else {
                    Ok(Int(x % y))
                }
            }
            _ => unreachable!(),
        },
        (Int(_) | Real(_), Int(_) | Real(_)) => {
            let x = as_f64(a);
            let y = as_f64(b);
            match op {
                BinOp::Subtract => Ok(Real(x - y)),
                BinOp::Multiply => Ok(Real(x * y)),
                BinOp::Divide => Ok(Real(x / y)),
                BinOp::Modulo => Ok(Real(x % y)),
                _ => unreachable!(),
            }
        }
        _ => Err(format!("arithmetic not defined for {} and {}", a.type_name(), b.type_name())),
    }
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(n) => *n as f64,
        Value::Real(r) => *r,
        _ => unreachable!(),
    }
}

fn integer_bitwise(op: BinOp, a: &Value, b: &Value) -> Result<Value, String> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(match op {
            BinOp::BitAnd => x & y,
            BinOp::BitOr => x | y,
            BinOp::BitXor => x ^ y,
            BinOp::ShiftLeft => x.checked_shl(*y as u32).unwrap_or(0),
            BinOp::ShiftRight => x.checked_shr(*y as u32).unwrap_or(if *x < 0 { -1 } else { 0 }),
            _ => unreachable!(),
        })),
        _ => Err(format!("bitwise operator not defined for {} and {}", a.type_name(), b.type_name())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Negate,
    Not,
    BitNot,
    Length,
    TypeOf,
}

#[derive(Debug)]
pub struct UnaryOp {
    pub op: UnOp,
    pub sloc: SourceLocation,
}

impl RodNode for UnaryOp {
    fn execute(&self, _ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, _alt: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let mut r = std::mem::take(stack.mut_top(0));
        stack.pop(1);
        if r.is_ptc() {
            resolve_ptc(&mut r, global)?;
        }
        let v = r.dereference_readonly_owned()?;
        let result = match self.op {
            UnOp::Negate => match v {
                Value::Int(n) => n.checked_neg().map(Value::Int).ok_or("integer overflow in unary `-`".to_string()),
                Value::Real(x) => Ok(Value::Real(-x)),
                other => Err(format!("unary `-` not defined for {}", other.type_name())),
            },
            UnOp::Not => Ok(Value::Bool(!v.is_truthy())),
            UnOp::BitNot => match v {
                Value::Int(n) => Ok(Value::Int(!n)),
                other => Err(format!("unary `~` not defined for {}", other.type_name())),
            },
            UnOp::Length => v.length().map(Value::Int),
            UnOp::TypeOf => Ok(Value::String(v.type_name().into())),
        }
        .map_err(|msg| RuntimeError::format(&msg, self.sloc.clone()))?;
        stack.push(Reference::temporary(result));
        Ok(Status::Next)
    }
}

/// Short-circuit `&&`. `lhs` is always evaluated; `rhs` only if `lhs` is
/// truthy, in which case the expression's value is `rhs`'s.
#[derive(Debug)]
pub struct LogicalAnd {
    pub lhs: Rod,
    pub rhs: Rod,
}

impl RodNode for LogicalAnd {
    fn execute(&self, ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, alt_stack: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let status = self.lhs.execute(ctx, global, stack, alt_stack)?;
        debug_assert_eq!(status, Status::Next);
        let mut lhs_ref = std::mem::take(stack.mut_top(0));
        if lhs_ref.is_ptc() {
            resolve_ptc(&mut lhs_ref, global)?;
        }
        let truthy = lhs_ref.dereference_readonly_owned()?.is_truthy();
        if !truthy {
            stack.pop(1);
            stack.push(lhs_ref);
            return Ok(Status::Next);
        }
        stack.pop(1);
        self.rhs.execute(ctx, global, stack, alt_stack)
    }

    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        self.lhs.collect_variables(staged, temp);
        self.rhs.collect_variables(staged, temp);
    }
}

#[derive(Debug)]
pub struct LogicalOr {
    pub lhs: Rod,
    pub rhs: Rod,
}

impl RodNode for LogicalOr {
    fn execute(&self, ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, alt_stack: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let status = self.lhs.execute(ctx, global, stack, alt_stack)?;
        debug_assert_eq!(status, Status::Next);
        let mut lhs_ref = std::mem::take(stack.mut_top(0));
        if lhs_ref.is_ptc() {
            resolve_ptc(&mut lhs_ref, global)?;
        }
        let truthy = lhs_ref.dereference_readonly_owned()?.is_truthy();
        if truthy {
            stack.pop(1);
            stack.push(lhs_ref);
            return Ok(Status::Next);
        }
        stack.pop(1);
        self.rhs.execute(ctx, global, stack, alt_stack)
    }

    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        self.lhs.collect_variables(staged, temp);
        self.rhs.collect_variables(staged, temp);
    }
}

/// A call site. Non-tail (`ptc == None`) calls invoke the target immediately
/// and resolve any tail-call chain it returns before continuing; tail calls
/// just park a `PtcArguments` and let the caller's own `Status::ReturnRef`
/// carry it upward (§4.3).
#[derive(Debug)]
pub struct FunctionCall {
    pub nargs: usize,
    pub ptc: PtcDisposition,
    pub sloc: SourceLocation,
}

impl RodNode for FunctionCall {
    fn execute(&self, _ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, _alt: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let mut call_stack = ReferenceStack::new();
        for i in (0..self.nargs).rev() {
            call_stack.push(std::mem::take(stack.mut_top(i)));
        }
        stack.pop(self.nargs);

        let mut target_ref = std::mem::take(stack.mut_top(0));
        stack.pop(1);
        if target_ref.is_ptc() {
            resolve_ptc(&mut target_ref, global)?;
        }
        let target_value = target_ref.dereference_readonly_owned()?;
        let target: CowFunction = match target_value {
            Value::Function(f) => f,
            other => {
                return Err(RuntimeError::format(
                    &format!("attempt to call a value of type {}", other.type_name()),
                    self.sloc.clone(),
                ))
            }
        };

        if self.ptc != PtcDisposition::None {
            let ptc = PtcArguments::new(self.sloc.clone(), self.ptc, target, Reference::void(), call_stack);
            stack.push(Reference::ptc(Rc::new(ptc)));
            return Ok(Status::Next);
        }

        if let Some(hooks) = global.hooks() {
            hooks.on_call(&self.sloc, &target)?;
        }
        let mut result_ref = Reference::void();
        target
            .invoke_ptc_aware(&mut result_ref, global, call_stack)
            .map_err(|mut e| {
                e.push_frame_plain(self.sloc.clone(), "call");
                e
            })?;
        if result_ref.is_ptc() {
            resolve_ptc(&mut result_ref, global)?;
        }
        if let Some(hooks) = global.hooks() {
            hooks.on_return(&self.sloc, self.ptc)?;
        }
        stack.push(result_ref);
        Ok(Status::Next)
    }
}

/// `return expr;` / `return ref expr;`. A pending tail call on top of the
/// stack (the callee already decided its own disposition when it was
/// pushed by `FunctionCall`) passes through untouched regardless of
/// `by_ref` — that is the whole point of a proper tail call, §4.3. A
/// concrete by-value result is copied out of whatever it references so the
/// caller cannot observe later mutation of the callee's locals; a by-ref
/// result keeps the reference as-is.
#[derive(Debug)]
pub struct ReturnValue {
    pub by_ref: bool,
}

impl RodNode for ReturnValue {
    fn execute(&self, _ctx: &Rc<ExecutiveContext>, _global: &mut Global, stack: &mut ReferenceStack, _alt: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let r = std::mem::take(stack.mut_top(0));
        stack.pop(1);
        if r.is_ptc() || self.by_ref {
            stack.push(r);
            return Ok(Status::ReturnRef);
        }
        let value = r.dereference_readonly_owned()?;
        stack.push(Reference::temporary(value));
        Ok(Status::ReturnRef)
    }
}

#[derive(Debug)]
pub struct ReturnVoid;

impl RodNode for ReturnVoid {
    fn execute(&self, _ctx: &Rc<ExecutiveContext>, _global: &mut Global, _stack: &mut ReferenceStack, _alt: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        Ok(Status::ReturnVoid)
    }
}

#[derive(Debug)]
pub struct If {
    pub cond: Rod,
    pub then_body: Rod,
    pub else_body: Option<Rod>,
}

impl RodNode for If {
    fn execute(&self, ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, alt_stack: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let status = self.cond.execute(ctx, global, stack, alt_stack)?;
        debug_assert_eq!(status, Status::Next);
        let mut cond_ref = std::mem::take(stack.mut_top(0));
        stack.pop(1);
        if cond_ref.is_ptc() {
            resolve_ptc(&mut cond_ref, global)?;
        }
        let truthy = cond_ref.dereference_readonly_owned()?.is_truthy();

        if truthy {
            let child = ExecutiveContext::new_plain(ctx.clone());
            self.then_body.execute(&child, global, stack, alt_stack)
        } else if let Some(else_body) = &self.else_body {
            let child = ExecutiveContext::new_plain(ctx.clone());
            else_body.execute(&child, global, stack, alt_stack)
        } else {
            Ok(Status::Next)
        }
    }

    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        self.cond.collect_variables(staged, temp);
        self.then_body.collect_variables(staged, temp);
        if let Some(e) = &self.else_body {
            e.collect_variables(staged, temp);
        }
    }
}

#[derive(Debug)]
pub struct While {
    pub cond: Rod,
    pub body: Rod,
}

impl RodNode for While {
    fn execute(&self, ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, alt_stack: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        loop {
            let status = self.cond.execute(ctx, global, stack, alt_stack)?;
            debug_assert_eq!(status, Status::Next);
            let mut cond_ref = std::mem::take(stack.mut_top(0));
            stack.pop(1);
            if cond_ref.is_ptc() {
                resolve_ptc(&mut cond_ref, global)?;
            }
            if !cond_ref.dereference_readonly_owned()?.is_truthy() {
                return Ok(Status::Next);
            }

            let child = ExecutiveContext::new_plain(ctx.clone());
            match self.body.execute(&child, global, stack, alt_stack)? {
                Status::Next => continue,
                s if s.is_continue() => continue,
                s if s.is_break() => return Ok(Status::Next),
                other => return Ok(other),
            }
        }
    }

    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        self.cond.collect_variables(staged, temp);
        self.body.collect_variables(staged, temp);
    }
}

#[derive(Debug)]
pub struct For {
    pub init: Rod,
    pub cond: Option<Rod>,
    pub step: Option<Rod>,
    pub body: Rod,
}

impl RodNode for For {
    fn execute(&self, ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, alt_stack: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let loop_ctx = ExecutiveContext::new_plain(ctx.clone());
        let status = self.init.execute(&loop_ctx, global, stack, alt_stack)?;
        debug_assert_eq!(status, Status::Next);

        loop {
            if let Some(cond) = &self.cond {
                let status = cond.execute(&loop_ctx, global, stack, alt_stack)?;
                debug_assert_eq!(status, Status::Next);
                let mut cond_ref = std::mem::take(stack.mut_top(0));
                stack.pop(1);
                if cond_ref.is_ptc() {
                    resolve_ptc(&mut cond_ref, global)?;
                }
                if !cond_ref.dereference_readonly_owned()?.is_truthy() {
                    return Ok(Status::Next);
                }
            }

            let body_ctx = ExecutiveContext::new_plain(loop_ctx.clone());
            match self.body.execute(&body_ctx, global, stack, alt_stack)? {
                Status::Next => {}
                s if s.is_continue() => {}
                s if s.is_break() => return Ok(Status::Next),
                other => return Ok(other),
            }

            if let Some(step) = &self.step {
                let status = step.execute(&loop_ctx, global, stack, alt_stack)?;
                debug_assert_eq!(status, Status::Next);
            }
        }
    }

    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        self.init.collect_variables(staged, temp);
        if let Some(c) = &self.cond {
            c.collect_variables(staged, temp);
        }
        if let Some(s) = &self.step {
            s.collect_variables(staged, temp);
        }
        self.body.collect_variables(staged, temp);
    }
}

#[derive(Debug)]
pub struct SwitchCase {
    pub label: Option<Rod>,
    pub body: Rod,
}

#[derive(Debug)]
pub struct Switch {
    pub value: Rod,
    pub cases: Vec<SwitchCase>,
}

impl RodNode for Switch {
    fn execute(&self, ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, alt_stack: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let status = self.value.execute(ctx, global, stack, alt_stack)?;
        debug_assert_eq!(status, Status::Next);
        let mut subject_ref = std::mem::take(stack.mut_top(0));
        stack.pop(1);
        if subject_ref.is_ptc() {
            resolve_ptc(&mut subject_ref, global)?;
        }
        let subject = subject_ref.dereference_readonly_owned()?;

        let switch_ctx = ExecutiveContext::new_plain(ctx.clone());
        let mut matched = false;
        for case in &self.cases {
            if !matched {
                match &case.label {
                    Some(label_rod) => {
                        let status = label_rod.execute(&switch_ctx, global, stack, alt_stack)?;
                        debug_assert_eq!(status, Status::Next);
                        let mut label_ref = std::mem::take(stack.mut_top(0));
                        stack.pop(1);
                        if label_ref.is_ptc() {
                            resolve_ptc(&mut label_ref, global)?;
                        }
                        if label_ref.dereference_readonly_owned()?.value_eq(&subject) {
                            matched = true;
                        }
                    }
                    None => matched = true,
                }
            }
            if matched {
                match case.body.execute(&switch_ctx, global, stack, alt_stack)? {
                    Status::Next => continue,
                    s if s.is_break() => return Ok(Status::Next),
                    other => return Ok(other),
                }
            }
        }
        Ok(Status::Next)
    }

    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        self.value.collect_variables(staged, temp);
        for case in &self.cases {
            if let Some(l) = &case.label {
                l.collect_variables(staged, temp);
            }
            case.body.collect_variables(staged, temp);
        }
    }
}

#[derive(Debug)]
pub struct Break(pub Status);

impl RodNode for Break {
    fn execute(&self, _ctx: &Rc<ExecutiveContext>, _global: &mut Global, _stack: &mut ReferenceStack, _alt: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        Ok(self.0)
    }
}

#[derive(Debug)]
pub struct Continue(pub Status);

impl RodNode for Continue {
    fn execute(&self, _ctx: &Rc<ExecutiveContext>, _global: &mut Global, _stack: &mut ReferenceStack, _alt: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        Ok(self.0)
    }
}

/// `try`/`catch`. On a thrown exception, binds the caught value to
/// `catch_name` (if any) in a fresh plain context and runs the handler body;
/// the exception itself gains `try`/`catch` frames before the handler sees it
/// so a rethrow still carries the original backtrace.
#[derive(Debug)]
pub struct Try {
    pub body: Rod,
    pub catch_name: Option<Rc<str>>,
    pub catch_body: Rod,
    pub sloc: SourceLocation,
}

impl RodNode for Try {
    fn execute(&self, ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, alt_stack: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let try_ctx = ExecutiveContext::new_plain(ctx.clone());
        match self.body.execute(&try_ctx, global, stack, alt_stack) {
            Ok(status) => Ok(status),
            Err(mut err) => {
                err.push_frame_try(self.sloc.clone());
                err.push_frame_catch(self.sloc.clone(), err.value().clone());

                let catch_ctx = ExecutiveContext::new_plain(ctx.clone());
                if let Some(name) = &self.catch_name {
                    let var = Rc::new(Variable::new(err.value().clone(), false));
                    global.gc().track(var.clone());
                    catch_ctx.declare(name, Reference::variable(var));
                }
                self.catch_body.execute(&catch_ctx, global, stack, alt_stack)
            }
        }
    }

    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        self.body.collect_variables(staged, temp);
        self.catch_body.collect_variables(staged, temp);
    }
}

#[derive(Debug)]
pub struct Throw {
    pub value: Rod,
    pub sloc: SourceLocation,
}

impl RodNode for Throw {
    fn execute(&self, ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, alt_stack: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let status = self.value.execute(ctx, global, stack, alt_stack)?;
        debug_assert_eq!(status, Status::Next);
        let mut r = std::mem::take(stack.mut_top(0));
        stack.pop(1);
        if r.is_ptc() {
            resolve_ptc(&mut r, global)?;
        }
        let value = r.dereference_readonly_owned()?;
        Err(RuntimeError::thrown(value, self.sloc.clone()))
    }

    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        self.value.collect_variables(staged, temp);
    }
}

#[derive(Debug)]
pub struct Assert {
    pub cond: Rod,
    pub message: String,
    pub sloc: SourceLocation,
}

impl RodNode for Assert {
    fn execute(&self, ctx: &Rc<ExecutiveContext>, global: &mut Global, stack: &mut ReferenceStack, alt_stack: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let status = self.cond.execute(ctx, global, stack, alt_stack)?;
        debug_assert_eq!(status, Status::Next);
        let mut r = std::mem::take(stack.mut_top(0));
        stack.pop(1);
        if r.is_ptc() {
            resolve_ptc(&mut r, global)?;
        }
        if r.dereference_readonly_owned()?.is_truthy() {
            Ok(Status::Next)
        } else {
            Err(RuntimeError::assertion_failed(&self.message, self.sloc.clone()))
        }
    }

    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        self.cond.collect_variables(staged, temp);
    }
}

/// Registers `rod` onto the nearest enclosing function context's defer
/// list, not the block scope the `defer` statement textually sits in
/// (§4.4) — a `defer` inside an `if` inside a loop still only fires once,
/// when the whole function returns.
#[derive(Debug)]
pub struct DeferPush {
    pub rod: Rc<Rod>,
    pub sloc: SourceLocation,
}

impl RodNode for DeferPush {
    fn execute(&self, ctx: &Rc<ExecutiveContext>, _global: &mut Global, _stack: &mut ReferenceStack, _alt: &mut ReferenceStack) -> Result<Status, RuntimeError> {
        let func_ctx = ExecutiveContext::function_root(ctx);
        func_ctx.push_defer(self.sloc.clone(), self.rod.clone());
        Ok(Status::Next)
    }

    fn collect_variables(&self, staged: &mut VariableMap, temp: &mut VariableMap) {
        self.rod.collect_variables(staged, temp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(rod: &Rod) -> (Status, ReferenceStack) {
        let ctx = ExecutiveContext::new_defer();
        let mut global = Global::new();
        let mut stack = ReferenceStack::new();
        let mut alt_stack = ReferenceStack::new();
        let status = rod.execute(&ctx, &mut global, &mut stack, &mut alt_stack).unwrap();
        (status, stack)
    }

    #[test]
    fn push_constant_and_binary_add() {
        let mut rod = Rod::new();
        rod.push(Box::new(PushConstant(Value::Int(2))));
        rod.push(Box::new(PushConstant(Value::Int(3))));
        rod.push(Box::new(BinaryOp { op: BinOp::Add, sloc: SourceLocation::unknown() }));
        rod.finalize();

        let (status, mut stack) = run(&rod);
        assert_eq!(status, Status::Next);
        assert_eq!(stack.mut_top(0).dereference_readonly_owned().unwrap(), Value::Int(5));
    }

    #[test]
    fn build_array_collects_evaluated_elements_in_order() {
        let mut one = Rod::new();
        one.push(Box::new(PushConstant(Value::Int(1))));
        one.finalize();
        let mut two = Rod::new();
        two.push(Box::new(PushConstant(Value::Int(2))));
        two.finalize();

        let mut rod = Rod::new();
        rod.push(Box::new(BuildArray { elements: vec![one, two] }));
        rod.finalize();

        let (_, mut stack) = run(&rod);
        let v = stack.mut_top(0).dereference_readonly_owned().unwrap();
        assert_eq!(v.as_array().unwrap(), &[Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn type_of_names_a_values_tag() {
        let mut rod = Rod::new();
        rod.push(Box::new(PushConstant(Value::String("meow".into()))));
        rod.push(Box::new(UnaryOp { op: UnOp::TypeOf, sloc: SourceLocation::unknown() }));
        rod.finalize();

        let (_, mut stack) = run(&rod);
        assert_eq!(stack.mut_top(0).dereference_readonly_owned().unwrap(), Value::String("string".into()));
    }

    #[test]
    fn if_picks_the_taken_branch() {
        let mut then_body = Rod::new();
        then_body.push(Box::new(PushConstant(Value::Int(1))));
        then_body.finalize();
        let mut else_body = Rod::new();
        else_body.push(Box::new(PushConstant(Value::Int(2))));
        else_body.finalize();
        let mut cond = Rod::new();
        cond.push(Box::new(PushConstant(Value::Bool(false))));
        cond.finalize();

        let mut rod = Rod::new();
        rod.push(Box::new(If { cond, then_body, else_body: Some(else_body) }));
        rod.finalize();

        let (_, mut stack) = run(&rod);
        assert_eq!(stack.mut_top(0).dereference_readonly_owned().unwrap(), Value::Int(2));
    }

    #[test]
    fn while_loop_breaks_out() {
        let mut cond = Rod::new();
        cond.push(Box::new(PushConstant(Value::Bool(true))));
        cond.finalize();
        let mut body = Rod::new();
        body.push(Box::new(Break(Status::BreakWhile)));
        body.finalize();

        let mut rod = Rod::new();
        rod.push(Box::new(While { cond, body }));
        rod.finalize();

        let (status, _) = run(&rod);
        assert_eq!(status, Status::Next);
    }

    #[test]
    fn try_catch_binds_the_thrown_value() {
        let mut throw_value = Rod::new();
        throw_value.push(Box::new(PushConstant(Value::String("boom".into()))));
        throw_value.finalize();
        let mut body = Rod::new();
        body.push(Box::new(Throw { value: throw_value, sloc: SourceLocation::unknown() }));
        body.finalize();

        let mut catch_body = Rod::new();
        catch_body.push(Box::new(PushLocalReference { name: Rc::from("e"), sloc: SourceLocation::unknown() }));
        catch_body.finalize();

        let mut rod = Rod::new();
        rod.push(Box::new(Try {
            body,
            catch_name: Some(Rc::from("e")),
            catch_body,
            sloc: SourceLocation::unknown(),
        }));
        rod.finalize();

        let (status, mut stack) = run(&rod);
        assert_eq!(status, Status::Next);
        assert_eq!(stack.mut_top(0).dereference_readonly_owned().unwrap(), Value::String("boom".into()));
    }
}
