//! End-to-end coverage of the evaluator's cross-module behavior: proper
//! tail calls, defer ordering, variadic arguments, copy-on-write aliasing,
//! null propagation through missing subscripts, shared-container mutation,
//! and exception backtraces. Every rod here is hand-assembled node by node,
//! the way this crate's own unit tests build them, since there is no
//! compiler in scope to lower source text into a rod.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use asteria_core::SourceLocation;
use asteria_runtime::context::{ExecutiveContext, Global};
use asteria_runtime::function::InstantiatedFunction;
use asteria_runtime::hooks::HookBus;
use asteria_runtime::ptc::PtcDisposition;
use asteria_runtime::reference::Reference;
use asteria_runtime::reference_stack::ReferenceStack;
use asteria_runtime::rod::{
    self, Assign, BinOp, BinaryOp, BuildArray, DeclareVariable, DeferPush, FunctionCall, If,
    PushConstant, PushLocalReference, PushSubscript, ReturnValue, Rod, Throw, Try, UnOp, UnaryOp,
};
use asteria_runtime::runtime_error::{FrameType, RuntimeError};
use asteria_runtime::subscript::Subscript;
use asteria_runtime::value::{AbstractFunction, CowFunction, Value};

fn sl() -> SourceLocation {
    SourceLocation::unknown()
}

fn name(s: &str) -> Rc<str> {
    Rc::from(s)
}

fn root_ctx() -> Rc<ExecutiveContext> {
    ExecutiveContext::new_defer()
}

fn lit(v: Value) -> Rod {
    let mut r = Rod::new();
    r.push(Box::new(PushConstant(v)));
    r.finalize();
    r
}

fn push_local(n: &str) -> Rod {
    let mut r = Rod::new();
    r.push(Box::new(PushLocalReference { name: name(n), sloc: sl() }));
    r.finalize();
    r
}

/// A native callable whose target is only known after it is built, so a
/// rod can call the function it lives inside without a surrounding
/// compiler wiring a name up through a symbol table (§1's out-of-scope
/// lexical analysis/lowering means there is no such table here).
#[derive(Debug)]
struct SelfCall(Rc<RefCell<Option<CowFunction>>>);

impl AbstractFunction for SelfCall {
    fn describe(&self) -> String {
        "self".to_string()
    }

    fn invoke_ptc_aware(&self, self_ref: &mut Reference, global: &mut Global, stack: ReferenceStack) -> Result<(), RuntimeError> {
        let target = self.0.borrow().clone().expect("fixpoint wired after construction");
        target.invoke_ptc_aware(self_ref, global, stack)
    }
}

/// A capturing substitute for `std.io.putln` so defer ordering can be
/// observed without reading process stdout back.
#[derive(Debug)]
struct LogSink(Rc<RefCell<Vec<String>>>);

impl AbstractFunction for LogSink {
    fn describe(&self) -> String {
        "log".to_string()
    }

    fn invoke_ptc_aware(&self, self_ref: &mut Reference, _global: &mut Global, stack: ReferenceStack) -> Result<(), RuntimeError> {
        let text = stack.top(0).dereference_readonly_owned()?;
        self.0.borrow_mut().push(text.as_string().unwrap_or_default().to_string());
        *self_ref = Reference::void();
        Ok(())
    }
}

fn log_call(sink: &CowFunction, text: &str) -> Rod {
    let mut r = Rod::new();
    r.push(Box::new(PushConstant(Value::Function(sink.clone()))));
    r.push(Box::new(PushConstant(Value::String(text.into()))));
    r.push(Box::new(FunctionCall { nargs: 1, ptc: PtcDisposition::None, sloc: sl() }));
    r.finalize();
    r
}

#[derive(Default)]
struct CountingHooks {
    calls: Cell<u64>,
}

impl HookBus for CountingHooks {
    fn on_call(&self, _sloc: &SourceLocation, _target: &CowFunction) -> Result<(), RuntimeError> {
        self.calls.set(self.calls.get() + 1);
        Ok(())
    }
}

/// §8 scenario 2 and Testable Property 1: a deeply tail-recursive
/// countdown resolves without growing the host stack, and every logical
/// call (the initial invocation plus every resolved link in the chain) is
/// observed exactly once by the hook bus.
#[test]
fn tail_recursive_countdown_resolves_iteratively_and_hooks_every_call() {
    let cell: Rc<RefCell<Option<CowFunction>>> = Rc::new(RefCell::new(None));

    let mut cond = Rod::new();
    cond.push(Box::new(PushLocalReference { name: name("n"), sloc: sl() }));
    cond.push(Box::new(PushConstant(Value::Int(0))));
    cond.push(Box::new(BinaryOp { op: BinOp::LessEqual, sloc: sl() }));
    cond.finalize();

    let mut then_body = Rod::new();
    then_body.push(Box::new(PushConstant(Value::Int(0))));
    then_body.push(Box::new(ReturnValue { by_ref: false }));
    then_body.finalize();

    let mut else_body = Rod::new();
    else_body.push(Box::new(PushConstant(Value::Function(Rc::new(SelfCall(cell.clone()))))));
    else_body.push(Box::new(PushLocalReference { name: name("n"), sloc: sl() }));
    else_body.push(Box::new(PushConstant(Value::Int(1))));
    else_body.push(Box::new(BinaryOp { op: BinOp::Subtract, sloc: sl() }));
    else_body.push(Box::new(FunctionCall { nargs: 1, ptc: PtcDisposition::ByVal, sloc: sl() }));
    else_body.push(Box::new(ReturnValue { by_ref: false }));
    else_body.finalize();

    let mut body = Rod::new();
    body.push(Box::new(If { cond, then_body, else_body: Some(else_body) }));
    body.finalize();

    let func = Rc::new(InstantiatedFunction::new(sl(), "c", vec![name("n")], body));
    let cow: CowFunction = func.clone();
    *cell.borrow_mut() = Some(cow.clone());

    let mut global = Global::new();
    let hooks = Rc::new(CountingHooks::default());
    global.set_hooks(hooks.clone());

    const N: i64 = 100_000;
    let mut stack = ReferenceStack::new();
    stack.push(Reference::temporary(Value::Int(N)));

    let mut self_ref = Reference::void();
    hooks.on_call(&sl(), &cow).unwrap();
    func.invoke_ptc_aware(&mut self_ref, &mut global, stack).unwrap();
    rod::resolve_ptc(&mut self_ref, &mut global).unwrap();

    assert_eq!(self_ref.dereference_readonly_owned().unwrap(), Value::Int(0));
    assert_eq!(hooks.calls.get() as i64, N + 1);
}

/// §8 Testable Property 2 and scenario 3: defers registered in a function
/// fire in reverse order when an exception unwinds through them.
#[test]
fn defers_fire_in_reverse_order_on_exception() {
    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink: CowFunction = Rc::new(LogSink(log.clone()));

    let mut throw_val = Rod::new();
    throw_val.push(Box::new(PushConstant(Value::String("boom".into()))));
    throw_val.finalize();

    let mut body = Rod::new();
    body.push(Box::new(DeferPush { rod: Rc::new(log_call(&sink, "a")), sloc: sl() }));
    body.push(Box::new(DeferPush { rod: Rc::new(log_call(&sink, "b")), sloc: sl() }));
    body.push(Box::new(Throw { value: throw_val, sloc: sl() }));
    body.finalize();

    let func = InstantiatedFunction::new(sl(), "f", vec![], body);
    let mut global = Global::new();
    let mut self_ref = Reference::void();
    let err = func.invoke_ptc_aware(&mut self_ref, &mut global, ReferenceStack::new()).unwrap_err();

    assert_eq!(*log.borrow(), vec!["b".to_string(), "a".to_string()]);
    assert_eq!(err.value(), &Value::String("boom".into()));
}

/// §8 scenario 4: a defer registered in a frame whose own result is a
/// pending tail call does not run when that frame returns — it rides
/// along on the `PtcArguments` and only fires once the tail chain
/// actually resolves to a concrete value.
#[test]
fn defer_before_a_tail_call_fires_only_after_the_chain_resolves() {
    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink: CowFunction = Rc::new(LogSink(log.clone()));

    let mut leaf_body = Rod::new();
    leaf_body.push(Box::new(PushConstant(Value::Int(1))));
    leaf_body.push(Box::new(ReturnValue { by_ref: false }));
    leaf_body.finalize();
    let leaf: CowFunction = Rc::new(InstantiatedFunction::new(sl(), "leaf", vec![], leaf_body));

    let mut mid_body = Rod::new();
    mid_body.push(Box::new(DeferPush { rod: Rc::new(log_call(&sink, "mid-defer")), sloc: sl() }));
    mid_body.push(Box::new(PushConstant(Value::Function(leaf.clone()))));
    mid_body.push(Box::new(FunctionCall { nargs: 0, ptc: PtcDisposition::ByVal, sloc: sl() }));
    mid_body.push(Box::new(ReturnValue { by_ref: false }));
    mid_body.finalize();
    let mid = InstantiatedFunction::new(sl(), "mid", vec![], mid_body);

    let mut global = Global::new();
    let mut self_ref = Reference::void();
    mid.invoke_ptc_aware(&mut self_ref, &mut global, ReferenceStack::new()).unwrap();

    // The tail call to `leaf` has not resolved yet, so the defer has not
    // run: it travels with the pending call.
    assert!(log.borrow().is_empty());
    assert!(self_ref.as_ptc().is_some());

    rod::resolve_ptc(&mut self_ref, &mut global).unwrap();

    assert_eq!(*log.borrow(), vec!["mid-defer".to_string()]);
    assert_eq!(self_ref.dereference_readonly_owned().unwrap(), Value::Int(1));
}

/// §8 scenario 5: `__varg` with no argument reports the captured count;
/// with an integer argument it indexes into the captured arguments.
#[test]
fn variadic_arguer_reports_count_and_indexes_captured_arguments() {
    let count_call = {
        let mut r = Rod::new();
        r.push(Box::new(PushLocalReference { name: name("__varg"), sloc: sl() }));
        r.push(Box::new(FunctionCall { nargs: 0, ptc: PtcDisposition::None, sloc: sl() }));
        r.finalize();
        r
    };
    let index_call = |i: i64| {
        let mut r = Rod::new();
        r.push(Box::new(PushLocalReference { name: name("__varg"), sloc: sl() }));
        r.push(Box::new(PushConstant(Value::Int(i))));
        r.push(Box::new(FunctionCall { nargs: 1, ptc: PtcDisposition::None, sloc: sl() }));
        r.finalize();
        r
    };

    let mut body = Rod::new();
    body.push(Box::new(BuildArray { elements: vec![count_call, index_call(0), index_call(2)] }));
    body.push(Box::new(ReturnValue { by_ref: false }));
    body.finalize();

    let func = InstantiatedFunction::new(sl(), "v", vec![name("...")], body);
    let mut global = Global::new();
    let mut stack = ReferenceStack::new();
    stack.push(Reference::temporary(Value::Int(10)));
    stack.push(Reference::temporary(Value::Int(20)));
    stack.push(Reference::temporary(Value::Int(30)));

    let mut self_ref = Reference::void();
    func.invoke_ptc_aware(&mut self_ref, &mut global, stack).unwrap();

    let result = self_ref.dereference_readonly_owned().unwrap();
    assert_eq!(result.as_array().unwrap(), &[Value::Int(3), Value::Int(10), Value::Int(30)]);
}

/// §8 Testable Property 4: assigning through an alias never mutates the
/// value observed through the original binding.
#[test]
fn assigning_through_an_alias_does_not_mutate_the_original() {
    let ctx = root_ctx();
    let mut global = Global::new();
    let mut stack = ReferenceStack::new();
    let mut alt_stack = ReferenceStack::new();

    let mut rod = Rod::new();
    rod.push(Box::new(DeclareVariable {
        name: name("a"),
        immutable: false,
        init: Some(lit(Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))),
        sloc: sl(),
    }));
    rod.push(Box::new(DeclareVariable { name: name("b"), immutable: false, init: Some(push_local("a")), sloc: sl() }));
    rod.push(Box::new(PushLocalReference { name: name("b"), sloc: sl() }));
    rod.push(Box::new(PushSubscript { subscript: Subscript::ArrayIndex(0), sloc: sl() }));
    rod.push(Box::new(PushConstant(Value::Int(9))));
    rod.push(Box::new(Assign { sloc: sl() }));
    rod.finalize();

    rod.execute(&ctx, &mut global, &mut stack, &mut alt_stack).unwrap();

    let a = ctx.lookup("a").unwrap().dereference_readonly_owned().unwrap();
    let b = ctx.lookup("b").unwrap().dereference_readonly_owned().unwrap();
    assert_eq!(a.as_array().unwrap(), &[Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(b.as_array().unwrap(), &[Value::Int(9), Value::Int(2), Value::Int(3)]);
}

/// §8 Testable Property 5: a miss anywhere in a subscript chain yields the
/// static null rather than an error, and a subscript applied on top of
/// that null is itself just another miss.
#[test]
fn a_missing_intermediate_subscript_propagates_null_instead_of_erroring() {
    let r = Reference::temporary(Value::object(Default::default()));
    let mut r = r;
    r.push_subscript(Subscript::from("missing")).unwrap();
    r.push_subscript(Subscript::ArrayIndex(0)).unwrap();
    assert_eq!(r.dereference_readonly_owned().unwrap(), Value::Null);
}

/// §8 scenario 6: `b = a; b[#b] = 3;` extends the shared array through
/// `b`'s alias while leaving `a` untouched, then both lengths are read
/// back out in one array literal. The append index is baked in as a
/// constant subscript since rods are built ahead of time and `b`'s
/// starting length (2) is already known when this rod is assembled.
#[test]
fn tail_append_through_an_alias_leaves_the_original_length_unchanged() {
    let ctx = root_ctx();
    let mut global = Global::new();
    let mut stack = ReferenceStack::new();
    let mut alt_stack = ReferenceStack::new();

    let mut rod = Rod::new();
    rod.push(Box::new(DeclareVariable {
        name: name("a"),
        immutable: false,
        init: Some(lit(Value::array(vec![Value::Int(1), Value::Int(2)]))),
        sloc: sl(),
    }));
    rod.push(Box::new(DeclareVariable { name: name("b"), immutable: false, init: Some(push_local("a")), sloc: sl() }));
    rod.push(Box::new(PushLocalReference { name: name("b"), sloc: sl() }));
    rod.push(Box::new(PushSubscript { subscript: Subscript::ArrayIndex(2), sloc: sl() }));
    rod.push(Box::new(PushConstant(Value::Int(3))));
    rod.push(Box::new(Assign { sloc: sl() }));

    let len_of = |var: &str| {
        let mut r = Rod::new();
        r.push(Box::new(PushLocalReference { name: name(var), sloc: sl() }));
        r.push(Box::new(UnaryOp { op: UnOp::Length, sloc: sl() }));
        r.finalize();
        r
    };
    rod.push(Box::new(BuildArray { elements: vec![len_of("a"), len_of("b")] }));
    rod.finalize();

    rod.execute(&ctx, &mut global, &mut stack, &mut alt_stack).unwrap();
    let result = stack.mut_top(0).dereference_readonly_owned().unwrap();
    assert_eq!(result.as_array().unwrap(), &[Value::Int(2), Value::Int(3)]);
}

/// §8 scenario 1 (partial): `typeof` on a caught exception value, and that
/// `try`/`catch` recovers control flow instead of propagating.
#[test]
fn try_catch_recovers_and_typeof_names_the_caught_values_tag() {
    let mut throw_val = Rod::new();
    throw_val.push(Box::new(PushConstant(Value::String("bad".into()))));
    throw_val.finalize();
    let mut boom_body = Rod::new();
    boom_body.push(Box::new(Throw { value: throw_val, sloc: sl() }));
    boom_body.finalize();
    let boom: CowFunction = Rc::new(InstantiatedFunction::new(sl(), "boom", vec![], boom_body));

    let mut try_body = Rod::new();
    try_body.push(Box::new(PushConstant(Value::Function(boom))));
    try_body.push(Box::new(FunctionCall { nargs: 0, ptc: PtcDisposition::None, sloc: sl() }));
    try_body.finalize();

    let mut catch_body = Rod::new();
    catch_body.push(Box::new(PushLocalReference { name: name("e"), sloc: sl() }));
    catch_body.push(Box::new(UnaryOp { op: UnOp::TypeOf, sloc: sl() }));
    catch_body.push(Box::new(ReturnValue { by_ref: false }));
    catch_body.finalize();

    let mut main = Rod::new();
    main.push(Box::new(Try { body: try_body, catch_name: Some(name("e")), catch_body, sloc: sl() }));
    main.finalize();

    let ctx = root_ctx();
    let mut global = Global::new();
    let mut stack = ReferenceStack::new();
    let mut alt_stack = ReferenceStack::new();
    let status = main.execute(&ctx, &mut global, &mut stack, &mut alt_stack).unwrap();

    assert_eq!(status, asteria_runtime::rod::Status::ReturnRef);
    assert_eq!(stack.mut_top(0).dereference_readonly_owned().unwrap(), Value::String("string".into()));
}

/// §8 scenario 1 (partial) and Testable Property 2's sibling for
/// exceptions: a `func`/`plain` frame pair accumulates per real call level
/// climbed, in the order the unwind actually visits them, through the
/// live evaluator rather than hand-built `RuntimeError`s.
#[test]
fn backtrace_frames_accumulate_per_call_level_in_unwind_order() {
    let mut throw_val = Rod::new();
    throw_val.push(Box::new(PushConstant(Value::String("deep".into()))));
    throw_val.finalize();
    let mut second_body = Rod::new();
    second_body.push(Box::new(Throw { value: throw_val, sloc: sl() }));
    second_body.finalize();
    let second: CowFunction = Rc::new(InstantiatedFunction::new(sl(), "second", vec![], second_body));

    let mut first_body = Rod::new();
    first_body.push(Box::new(PushConstant(Value::Function(second))));
    first_body.push(Box::new(FunctionCall { nargs: 0, ptc: PtcDisposition::None, sloc: sl() }));
    first_body.finalize();
    let first = InstantiatedFunction::new(sl(), "first", vec![], first_body);

    let mut global = Global::new();
    let mut self_ref = Reference::void();
    let err = first.invoke_ptc_aware(&mut self_ref, &mut global, ReferenceStack::new()).unwrap_err();

    let types: Vec<_> = err.frames().iter().map(|f| f.frame_type).collect();
    assert_eq!(types, vec![FrameType::Throw, FrameType::Func, FrameType::Plain, FrameType::Func]);
    assert_eq!(err.frames()[0].value, Value::String("deep".into()));
}
