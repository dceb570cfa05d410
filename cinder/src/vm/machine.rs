//! Resumable bytecode interpreter
//!
//! `step` runs instructions until the source span changes, a `debugger`
//! statement fires, a foreign call asks for input, the batch limit is reached
//! or the program halts. The host drives execution by calling `step` (or `run`)
//! again; nothing here blocks or spawns threads.

use super::error::VmError;
use super::foreign::{CallContext, ForeignFn, ForeignRegistry};
use super::frame::{Frame, FrameInfo};
use super::observer::{VariableInfo, VmObserver, VmSnapshot};
use super::scope::{child_scope, visible_bindings, Scope, ScopeRef};
use crate::bytecode::{Instruction, Op};
use crate::config::VmConfig;
use crate::syntax::Span;
use crate::value::{Closure, Heap, Value, ValueIter};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Name of the bottom frame
const MAIN_FRAME: &str = "<main>";

/// Coarse execution state
#[derive(Debug, Clone, PartialEq)]
pub enum VmState {
    Running,
    /// A foreign call asked for a value; see `resume_with_input`
    AwaitingInput,
    /// Stepped mode, waiting for the next `step`
    DebugPaused,
    /// Final value, or the Error that reached the bottom of the call stack
    Halted(Value),
}

impl VmState {
    pub fn name(&self) -> &'static str {
        match self {
            VmState::Running => "running",
            VmState::AwaitingInput => "awaiting_input",
            VmState::DebugPaused => "paused",
            VmState::Halted(_) => "halted",
        }
    }
}

/// Why `step` returned
#[derive(Debug, Clone, PartialEq)]
pub enum Suspension {
    /// Yielded at a span change or batch boundary; call `step` again
    Progress,
    SuspendedForDebug,
    AwaitingInput,
    Halted(Value),
}

/// Outcome of one instruction
enum Flow {
    Continue,
    Debugger,
    AwaitInput,
    Halt(Value),
}

pub struct VirtualMachine {
    config: VmConfig,
    heap: Heap,
    code: Rc<[Instruction]>,
    loaded: bool,
    ip: usize,
    /// Index of the instruction being executed, for error locations
    current: usize,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    iterators: Vec<ValueIter>,
    globals: ScopeRef,
    foreign: ForeignRegistry,
    observer: Option<Rc<RefCell<dyn VmObserver>>>,
    state: VmState,
    /// Suspend at every span change instead of only at batch boundaries
    stepping: bool,
    last_span: Option<Span>,
}

impl Default for VirtualMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMachine {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        VirtualMachine {
            config,
            heap: Heap::new(),
            code: Rc::from(Vec::new()),
            loaded: false,
            ip: 0,
            current: 0,
            stack: Vec::new(),
            frames: Vec::new(),
            iterators: Vec::new(),
            globals: Scope::new().into_ref(),
            foreign: ForeignRegistry::new(),
            observer: None,
            state: VmState::Running,
            stepping: false,
            last_span: None,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Register or replace a host function callable by name
    pub fn register_foreign(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&mut CallContext<'_>, &[Value]) -> Value + 'static,
    ) {
        self.foreign.register(name, Rc::new(handler));
    }

    /// Names the compiler should lower to `CallForeign`
    pub fn foreign_names(&self) -> Vec<String> {
        self.foreign.names()
    }

    pub(crate) fn foreign_handler(&self, name: &str) -> Option<ForeignFn> {
        self.foreign.get(name)
    }

    pub fn set_observer(&mut self, observer: Rc<RefCell<dyn VmObserver>>) {
        self.observer = Some(observer);
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Install a program with a fresh global scope
    pub fn load(&mut self, code: Vec<Instruction>) {
        self.globals = Scope::new().into_ref();
        self.install(code);
    }

    /// Append a program that continues in the current global scope.
    ///
    /// Earlier code stays in place so closures created by previous
    /// submissions keep valid entry addresses; the new code is relocated past
    /// it and execution starts at its first instruction.
    pub fn load_repl(&mut self, code: Vec<Instruction>) {
        let base = self.code.len();
        let mut program = self.code.to_vec();
        program.extend(code.into_iter().map(|mut instruction| {
            relocate(&mut instruction.op, base);
            instruction
        }));
        debug!(instructions = program.len() - base, base, "program appended");
        self.start(Rc::from(program), base);
    }

    /// Restart the loaded program from the beginning with fresh globals
    pub fn reset(&mut self) {
        self.globals = Scope::new().into_ref();
        let code = Rc::clone(&self.code);
        self.start(code, 0);
    }

    fn install(&mut self, code: Vec<Instruction>) {
        debug!(instructions = code.len(), "program loaded");
        self.start(Rc::from(code), 0);
    }

    fn start(&mut self, code: Rc<[Instruction]>, entry: usize) {
        self.frames = vec![Frame {
            scope: Rc::clone(&self.globals),
            return_address: code.len(),
            stack_base: 0,
            iter_base: 0,
            name: MAIN_FRAME.to_string(),
            args: Vec::new(),
        }];
        self.code = code;
        self.loaded = true;
        self.ip = entry;
        self.current = entry;
        self.stack.clear();
        self.iterators.clear();
        self.state = VmState::Running;
        self.stepping = false;
        self.last_span = None;
    }

    pub fn state(&self) -> &VmState {
        &self.state
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.state, VmState::Halted(_))
    }

    /// Span of the next instruction, or of the last one once halted
    pub fn current_span(&self) -> Option<Span> {
        if self.is_halted() {
            return self.last_span;
        }
        self.code.get(self.ip).map(|i| i.span).or(self.last_span)
    }

    /// Active frames, outermost first
    pub fn call_stack(&self) -> Vec<FrameInfo> {
        self.frames.iter().map(Frame::info).collect()
    }

    pub fn global_names(&self) -> Vec<String> {
        self.globals.borrow().names().map(str::to_string).collect()
    }

    /// Look up a name from the current scope
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.scope().borrow().lookup(name)
    }

    pub fn snapshot(&self) -> VmSnapshot {
        let variables = visible_bindings(&self.scope())
            .into_iter()
            .map(|(name, value, defined_at)| VariableInfo {
                name,
                value: value.repr(),
                type_name: value.type_name(),
                address: value.address(),
                defined_at,
            })
            .collect();
        VmSnapshot {
            state: self.state.name(),
            span: self.current_span(),
            call_stack: self.call_stack(),
            variables,
            stack_top: self.stack.last().map(Value::repr),
        }
    }

    /// Hand a snapshot to the observer
    pub fn publish_snapshot(&self) {
        let snapshot = self.snapshot();
        self.notify(|o| o.snapshot_requested(&snapshot));
    }

    /// Run until the next suspension point
    pub fn step(&mut self) -> Result<Suspension, VmError> {
        if !self.loaded {
            return Err(VmError::NothingLoaded);
        }
        match &self.state {
            VmState::Halted(value) => return Ok(Suspension::Halted(value.clone())),
            VmState::AwaitingInput => return Ok(Suspension::AwaitingInput),
            VmState::Running | VmState::DebugPaused => self.state = VmState::Running,
        }

        let limit = self.config.batch_limit.max(1);
        let mut executed = 0;
        loop {
            let Some(instruction) = self.code.get(self.ip) else {
                let result = self.stack.last().cloned().unwrap_or(Value::Nil);
                return Ok(self.halt(result));
            };
            let span = instruction.span;
            if executed > 0 && (self.last_span != Some(span) || executed >= limit) {
                return Ok(self.pause());
            }
            if self.last_span != Some(span) {
                self.last_span = Some(span);
                self.notify(|o| o.node_evaluated(span));
            }

            self.current = self.ip;
            self.ip += 1;
            executed += 1;
            let depth = self.stack.len();
            let flow = match self.execute() {
                Ok(flow) => flow,
                Err(err) => {
                    warn!(error = %err, ip = self.current, "vm fault");
                    self.halt(Value::error(err.to_string()));
                    return Err(err);
                }
            };
            if self.stack.len() != depth {
                let top = self.stack.last().cloned();
                self.notify(|o| o.stack_top_changed(top.as_ref()));
            }

            match flow {
                Flow::Continue => {}
                Flow::Debugger => {
                    self.stepping = true;
                    self.state = VmState::DebugPaused;
                    self.notify(|o| o.debugger_entered(span));
                    return Ok(Suspension::SuspendedForDebug);
                }
                Flow::AwaitInput => {
                    self.state = VmState::AwaitingInput;
                    return Ok(Suspension::AwaitingInput);
                }
                Flow::Halt(value) => return Ok(self.halt(value)),
            }
        }
    }

    /// Step until something other than plain progress happens
    pub fn run(&mut self) -> Result<Suspension, VmError> {
        loop {
            match self.step()? {
                Suspension::Progress => continue,
                other => return Ok(other),
            }
        }
    }

    /// Pause at every span change from now on, as if `debugger` had run
    pub fn enable_stepping(&mut self) {
        self.stepping = true;
    }

    pub fn is_stepping(&self) -> bool {
        self.stepping
    }

    /// Leave stepped mode and run on
    pub fn continue_execution(&mut self) -> Result<Suspension, VmError> {
        self.stepping = false;
        self.run()
    }

    /// Answer a pending foreign input request
    pub fn resume_with_input(&mut self, value: Value) -> Result<(), VmError> {
        if self.state != VmState::AwaitingInput {
            return Err(VmError::NotAwaitingInput);
        }
        self.pop()?;
        self.stack.push(value);
        self.state = VmState::Running;
        Ok(())
    }

    fn pause(&mut self) -> Suspension {
        if self.stepping {
            self.state = VmState::DebugPaused;
            Suspension::SuspendedForDebug
        } else {
            Suspension::Progress
        }
    }

    fn halt(&mut self, value: Value) -> Suspension {
        debug!(result = %value, "halted");
        self.frames.clear();
        self.stack.clear();
        self.iterators.clear();
        self.stepping = false;
        self.state = VmState::Halted(value.clone());
        Suspension::Halted(value)
    }

    fn notify(&self, event: impl FnOnce(&mut dyn VmObserver)) {
        if let Some(observer) = &self.observer {
            event(&mut *observer.borrow_mut());
        }
    }

    // ---- frames and scopes ----

    fn scope(&self) -> ScopeRef {
        match self.frames.last() {
            Some(frame) => Rc::clone(&frame.scope),
            None => Rc::clone(&self.globals),
        }
    }

    fn set_scope(&mut self, scope: ScopeRef) {
        if let Some(frame) = self.frames.last_mut() {
            frame.scope = scope;
        }
    }

    fn span(&self) -> Span {
        self.code.get(self.current).map(|i| i.span).unwrap_or_default()
    }

    // ---- operand stack ----

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, VmError> {
        self.stack
            .pop()
            .ok_or(VmError::StackUnderflow { ip: self.current })
    }

    /// Pop `n` values, returned in push order
    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, VmError> {
        if self.stack.len() < n {
            return Err(VmError::StackUnderflow { ip: self.current });
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn check_target(&self, target: usize) -> Result<usize, VmError> {
        if target > self.code.len() {
            return Err(VmError::InvalidJump {
                target,
                ip: self.current,
            });
        }
        Ok(target)
    }

    /// Tag an Error with the current instruction's span; other values pass through
    fn located(&self, value: Value) -> Value {
        if let Some(err) = value.as_error() {
            err.locate(self.span());
        }
        value
    }

    /// Unwind one frame with `error` as the call's result, or halt at the bottom
    fn raise(&mut self, error: Value) -> Flow {
        let span = self.span();
        if let Some(err) = error.as_error() {
            err.locate(span);
        }
        if self.frames.len() > 1
            && let Some(frame) = self.frames.pop()
        {
            debug!(frame = %frame.name, error = %error, "unwinding");
            self.stack.truncate(frame.stack_base);
            self.iterators.truncate(frame.iter_base);
            self.ip = frame.return_address;
            let info = frame.info();
            self.notify(|o| o.frame_popped(&info));
            self.push(error);
            return Flow::Continue;
        }
        let (message, location) = match error.as_error() {
            Some(err) => (err.message.clone(), err.location()),
            None => (error.to_string(), Some(span)),
        };
        warn!(error = %message, "unrecovered error");
        self.notify(|o| o.unrecovered_error(&message, location));
        Flow::Halt(error)
    }

    fn execute(&mut self) -> Result<Flow, VmError> {
        let code = Rc::clone(&self.code);
        let instruction = &code[self.current];
        if self.config.trace_instructions {
            trace!(ip = self.current, instruction = %instruction, "execute");
        }

        match &instruction.op {
            Op::Push { value } => self.push(value.to_value()),
            Op::Pop => {
                let value = self.pop()?;
                if value.is_error() {
                    return Ok(self.raise(value));
                }
            }
            Op::Load { name } => {
                let value = self
                    .lookup(name)
                    .ok_or_else(|| VmError::undefined_variable(name, self.current))?;
                self.push(value);
            }
            Op::Init { name, catch } => {
                let value = self.pop()?;
                if value.is_error() && !catch {
                    return Ok(self.raise(value));
                }
                let value = value.duplicate(&self.heap);
                self.scope()
                    .borrow_mut()
                    .define(name, value.clone(), instruction.span);
                self.notify(|o| o.variable_defined(name, &value, instruction.span));
            }
            Op::Ref { name } => {
                let value = self.pop()?;
                if value.is_error() {
                    return Ok(self.raise(value));
                }
                if !value.is_reference() {
                    let err = Value::error(format!(
                        "ref requires a list or map, got {}",
                        value.type_name()
                    ));
                    return Ok(self.raise(err));
                }
                self.scope()
                    .borrow_mut()
                    .define(name, value.clone(), instruction.span);
                self.notify(|o| o.variable_defined(name, &value, instruction.span));
            }
            Op::Store { name } => {
                let value = self.pop()?;
                if value.is_error() {
                    return Ok(self.raise(value));
                }
                let value = value.duplicate(&self.heap);
                let bound = self
                    .scope()
                    .borrow_mut()
                    .assign(name, value.clone(), instruction.span);
                if !bound {
                    return Err(VmError::undefined_variable(name, self.current));
                }
                self.notify(|o| o.variable_updated(name, &value, instruction.span));
            }
            Op::Binary { op } => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let result = self.located(lhs.binary(*op, &rhs));
                self.push(result);
            }
            Op::Unary { op } => {
                let operand = self.pop()?;
                let result = self.located(operand.unary(*op));
                self.push(result);
            }
            Op::MemberLoad { name } => {
                let object = self.pop()?;
                let result = self.located(object.get_member(name));
                self.push(result);
            }
            Op::MemberStore { name } => {
                let value = self.pop()?;
                let object = self.pop()?;
                if value.is_error() {
                    return Ok(self.raise(value));
                }
                let result = object.set_member(name, &value, &self.heap);
                if result.is_error() {
                    return Ok(self.raise(result));
                }
            }
            Op::IndexLoad => {
                let index = self.pop()?;
                let object = self.pop()?;
                let result = self.located(object.get(&index));
                self.push(result);
            }
            Op::IndexStore => {
                let value = self.pop()?;
                let index = self.pop()?;
                let object = self.pop()?;
                if value.is_error() {
                    return Ok(self.raise(value));
                }
                let result = object.set(&index, &value, &self.heap);
                if result.is_error() {
                    return Ok(self.raise(result));
                }
            }
            Op::Jump { target } => self.ip = self.check_target(*target)?,
            Op::JumpIfFalse { target } | Op::JumpIfTrue { target } => {
                let target = self.check_target(*target)?;
                let cond = self.pop()?;
                if cond.is_error() {
                    return Ok(self.raise(cond));
                }
                let jump_when = matches!(instruction.op, Op::JumpIfTrue { .. });
                if cond.is_truthy() == jump_when {
                    self.ip = target;
                }
            }
            Op::Call { argc } => return self.call(*argc),
            Op::CallForeign { name, argc } => {
                let args = self.pop_n(*argc)?;
                let Some(handler) = self.foreign.get(name) else {
                    let err = Value::error(format!("undefined foreign function '{name}'"));
                    return Ok(self.raise(err));
                };
                let mut ctx = CallContext::new(&self.heap);
                let result = self.located(handler(&mut ctx, &args));
                let input_requested = ctx.input_requested();
                self.push(result);
                if input_requested {
                    return Ok(Flow::AwaitInput);
                }
            }
            Op::Ret => {
                let value = self.pop()?;
                if self.frames.len() <= 1 {
                    if value.is_error() {
                        return Ok(self.raise(value));
                    }
                    return Ok(Flow::Halt(value));
                }
                if let Some(frame) = self.frames.pop() {
                    debug!(frame = %frame.name, "return");
                    self.stack.truncate(frame.stack_base);
                    self.iterators.truncate(frame.iter_base);
                    self.ip = frame.return_address;
                    let info = frame.info();
                    self.notify(|o| o.frame_popped(&info));
                }
                self.push(value);
            }
            Op::MakeClosure { entry, arity, name } => {
                if *entry >= self.code.len() {
                    return Err(VmError::InvalidJump {
                        target: *entry,
                        ip: self.current,
                    });
                }
                let closure = Closure {
                    entry: *entry,
                    arity: *arity,
                    scope: self.scope(),
                    name: name.clone(),
                };
                self.push(Value::Closure(Rc::new(closure)));
            }
            Op::MakeList { len } => {
                let items = self.pop_n(*len)?;
                let items = items.iter().map(|v| v.duplicate(&self.heap)).collect();
                let list = self.heap.new_list(items);
                self.push(list);
            }
            Op::MakeTuple { len } => {
                let items = self.pop_n(*len)?;
                let items = items.iter().map(|v| v.duplicate(&self.heap)).collect();
                self.push(Value::tuple(items));
            }
            Op::MakeMap { len } => {
                let flat = self.pop_n(len * 2)?;
                let entries = flat
                    .chunks(2)
                    .map(|pair| (pair[0].to_string(), pair[1].duplicate(&self.heap)))
                    .collect();
                let map = self.heap.new_map(entries);
                self.push(map);
            }
            Op::GetIter => {
                let iterable = self.pop()?;
                match iterable.iter() {
                    Ok(iter) => self.iterators.push(iter),
                    Err(err) => return Ok(self.raise(err)),
                }
            }
            Op::IterNext => {
                let iter = self
                    .iterators
                    .last_mut()
                    .ok_or(VmError::IteratorUnderflow { ip: self.current })?;
                match iter.next() {
                    Some(value) => {
                        self.push(value);
                        self.push(Value::Bool(true));
                    }
                    None => {
                        self.iterators.pop();
                        self.push(Value::Bool(false));
                    }
                }
            }
            Op::EnterScope => {
                let scope = child_scope(&self.scope());
                self.set_scope(scope);
            }
            Op::ExitScope => {
                let parent = self.scope().borrow().parent().cloned();
                match parent {
                    Some(parent) => self.set_scope(parent),
                    None => return Err(VmError::ScopeUnderflow { ip: self.current }),
                }
            }
            Op::Typeof => {
                let value = self.pop()?;
                self.push(Value::str(value.type_name()));
            }
            Op::Debugger => return Ok(Flow::Debugger),
        }
        Ok(Flow::Continue)
    }

    fn call(&mut self, argc: usize) -> Result<Flow, VmError> {
        let mut args = self.pop_n(argc)?;
        let callee = self.pop()?;
        match callee {
            Value::Error(_) => Ok(self.raise(callee)),
            Value::NativeMethod(method) => {
                let result = self.located(method.call(&self.heap, &args));
                self.push(result);
                Ok(Flow::Continue)
            }
            Value::Closure(closure) => {
                if self.frames.len() > self.config.max_call_depth {
                    return Ok(self.raise(Value::error("stack overflow")));
                }
                let entry = self.check_target(closure.entry)?;
                args.resize(closure.arity, Value::Nil);
                let frame = Frame {
                    scope: child_scope(&closure.scope),
                    return_address: self.ip,
                    stack_base: self.stack.len(),
                    iter_base: self.iterators.len(),
                    name: closure
                        .name
                        .clone()
                        .unwrap_or_else(|| "<anonymous>".to_string()),
                    args: args.iter().map(Value::repr).collect(),
                };
                debug!(frame = %frame.name, depth = self.frames.len(), "call");
                let info = frame.info();
                self.frames.push(frame);
                // Params are bound by `Init` in declared order, popping the first one first
                self.stack.extend(args.into_iter().rev());
                self.ip = entry;
                self.notify(|o| o.frame_pushed(&info));
                Ok(Flow::Continue)
            }
            other => {
                let err = Value::error(format!("{} is not callable", other.type_name()));
                Ok(self.raise(err))
            }
        }
    }
}

/// Shift absolute code addresses by `base`
fn relocate(op: &mut Op, base: usize) {
    if let Some(target) = op.target_mut() {
        *target += base;
    }
    if let Op::MakeClosure { entry, .. } = op {
        *entry += base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Immediate;
    use crate::value::{BinOp, Number};

    fn at(op: Op, start: usize) -> Instruction {
        Instruction::new(op, Span::new(start, start + 1))
    }

    fn push_int(v: i32, start: usize) -> Instruction {
        at(
            Op::Push {
                value: Immediate::Number(Number::I32(v)),
            },
            start,
        )
    }

    fn init(name: &str, start: usize) -> Instruction {
        at(
            Op::Init {
                name: name.to_string(),
                catch: false,
            },
            start,
        )
    }

    #[test]
    fn test_step_without_program() {
        let mut vm = VirtualMachine::new();
        assert_eq!(vm.step(), Err(VmError::NothingLoaded));
    }

    #[test]
    fn test_halts_with_stack_top() {
        let mut vm = VirtualMachine::new();
        vm.load(vec![
            push_int(2, 0),
            push_int(3, 0),
            at(Op::Binary { op: BinOp::Mul }, 0),
        ]);
        assert_eq!(vm.run(), Ok(Suspension::Halted(Value::int(6))));
        // Halted is sticky
        assert_eq!(vm.step(), Ok(Suspension::Halted(Value::int(6))));
        assert!(vm.call_stack().is_empty());
    }

    #[test]
    fn test_empty_program_halts_with_nil() {
        let mut vm = VirtualMachine::new();
        vm.load(Vec::new());
        assert_eq!(vm.step(), Ok(Suspension::Halted(Value::Nil)));
    }

    #[test]
    fn test_step_suspends_on_span_change() {
        let mut vm = VirtualMachine::new();
        vm.load(vec![push_int(1, 0), init("a", 0), push_int(2, 5), init("b", 5)]);
        assert_eq!(vm.step(), Ok(Suspension::Progress));
        assert_eq!(vm.lookup("a"), Some(Value::int(1)));
        assert_eq!(vm.lookup("b"), None);
        assert_eq!(vm.current_span(), Some(Span::new(5, 6)));
        // The last statement runs into the end of the program
        assert_eq!(vm.step(), Ok(Suspension::Halted(Value::Nil)));
        assert_eq!(vm.lookup("b"), Some(Value::int(2)));
    }

    #[test]
    fn test_batch_limit_bounds_one_step() {
        let mut vm = VirtualMachine::with_config(VmConfig {
            batch_limit: 2,
            ..VmConfig::default()
        });
        // Same span throughout
        vm.load(vec![push_int(1, 0), at(Op::Pop, 0), push_int(2, 0), at(Op::Pop, 0)]);
        assert_eq!(vm.step(), Ok(Suspension::Progress));
        assert_eq!(vm.step(), Ok(Suspension::Halted(Value::Nil)));
    }

    #[test]
    fn test_debugger_enters_stepped_mode() {
        let mut vm = VirtualMachine::new();
        vm.load(vec![
            at(Op::Debugger, 0),
            push_int(1, 2),
            init("x", 2),
            push_int(2, 4),
            init("y", 4),
        ]);
        assert_eq!(vm.step(), Ok(Suspension::SuspendedForDebug));
        assert_eq!(vm.state(), &VmState::DebugPaused);
        assert_eq!(vm.lookup("x"), None);
        assert_eq!(vm.step(), Ok(Suspension::SuspendedForDebug));
        assert_eq!(vm.lookup("x"), Some(Value::int(1)));
        assert_eq!(vm.lookup("y"), None);
        assert_eq!(vm.continue_execution(), Ok(Suspension::Halted(Value::Nil)));
        assert_eq!(vm.lookup("y"), Some(Value::int(2)));
        assert_eq!(vm.global_names(), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_unrecovered_error_halts() {
        let mut vm = VirtualMachine::new();
        vm.load(vec![
            push_int(1, 0),
            at(
                Op::Push {
                    value: Immediate::Str("a".to_string()),
                },
                0,
            ),
            at(Op::Binary { op: BinOp::Sub }, 0),
            at(Op::Pop, 0),
        ]);
        let Ok(Suspension::Halted(result)) = vm.run() else {
            panic!("expected halt");
        };
        let err = result.as_error().unwrap();
        assert!(err.message.contains("unsupported operand types"));
        assert_eq!(err.location(), Some(Span::new(0, 1)));
    }

    #[test]
    fn test_stack_underflow_is_fatal() {
        let mut vm = VirtualMachine::new();
        vm.load(vec![at(Op::Pop, 0)]);
        assert_eq!(vm.step(), Err(VmError::StackUnderflow { ip: 0 }));
        assert!(vm.is_halted());
    }

    #[test]
    fn test_invalid_jump_is_fatal() {
        let mut vm = VirtualMachine::new();
        vm.load(vec![at(Op::Jump { target: 9 }, 0)]);
        assert_eq!(vm.step(), Err(VmError::InvalidJump { target: 9, ip: 0 }));
    }

    #[test]
    fn test_exit_outermost_scope_is_fatal() {
        let mut vm = VirtualMachine::new();
        vm.load(vec![at(Op::ExitScope, 0)]);
        assert_eq!(vm.step(), Err(VmError::ScopeUnderflow { ip: 0 }));
    }

    #[test]
    fn test_resume_requires_pending_input() {
        let mut vm = VirtualMachine::new();
        vm.load(Vec::new());
        assert_eq!(vm.resume_with_input(Value::Nil), Err(VmError::NotAwaitingInput));
    }

    #[test]
    fn test_foreign_input_round_trip() {
        let mut vm = VirtualMachine::new();
        vm.register_foreign("ask", |ctx: &mut CallContext<'_>, _: &[Value]| {
            ctx.request_input();
            Value::Nil
        });
        vm.load(vec![
            at(
                Op::CallForeign {
                    name: "ask".to_string(),
                    argc: 0,
                },
                0,
            ),
            init("answer", 0),
        ]);
        assert_eq!(vm.run(), Ok(Suspension::AwaitingInput));
        assert_eq!(vm.step(), Ok(Suspension::AwaitingInput));
        vm.resume_with_input(Value::str("yes")).unwrap();
        assert_eq!(vm.run(), Ok(Suspension::Halted(Value::Nil)));
        assert_eq!(vm.globals.borrow().lookup("answer"), Some(Value::str("yes")));
    }

    #[test]
    fn test_iterator_protocol() {
        let mut vm = VirtualMachine::new();
        // for each item of (1, 2): total = total + item
        vm.load(vec![
            push_int(0, 0),
            init("total", 0),
            push_int(1, 1),
            push_int(2, 1),
            at(Op::MakeTuple { len: 2 }, 1),
            at(Op::GetIter, 1),
            at(Op::IterNext, 1),
            at(Op::JumpIfFalse { target: 14 }, 1),
            init("item", 1),
            at(Op::Load { name: "total".to_string() }, 2),
            at(Op::Load { name: "item".to_string() }, 2),
            at(Op::Binary { op: BinOp::Add }, 2),
            at(Op::Store { name: "total".to_string() }, 2),
            at(Op::Jump { target: 6 }, 1),
            at(Op::Load { name: "total".to_string() }, 3),
        ]);
        assert_eq!(vm.run(), Ok(Suspension::Halted(Value::int(3))));
    }

    #[test]
    fn test_snapshot_lists_variables() {
        let mut vm = VirtualMachine::new();
        vm.load(vec![push_int(7, 0), init("seven", 0), at(Op::Debugger, 3), push_int(1, 4)]);
        assert_eq!(vm.run(), Ok(Suspension::SuspendedForDebug));
        let snapshot = vm.snapshot();
        assert_eq!(snapshot.state, "paused");
        assert_eq!(snapshot.call_stack.len(), 1);
        assert_eq!(snapshot.call_stack[0].name, "<main>");
        assert_eq!(snapshot.variables[0].name, "seven");
        assert_eq!(snapshot.variables[0].value, "7");
        assert_eq!(snapshot.variables[0].defined_at, Some(Span::new(0, 1)));
    }

    #[test]
    fn test_load_repl_relocates_and_keeps_globals() {
        let mut vm = VirtualMachine::new();
        vm.load(vec![push_int(5, 0), init("five", 0)]);
        vm.run().unwrap();
        vm.load_repl(vec![
            at(Op::Jump { target: 2 }, 1),
            at(Op::Pop, 1),
            at(Op::Load { name: "five".to_string() }, 1),
        ]);
        assert_eq!(vm.run(), Ok(Suspension::Halted(Value::int(5))));

        vm.load(Vec::new());
        assert!(vm.global_names().is_empty());
    }
}
