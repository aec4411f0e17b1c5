//! Program interpreter (tree-walking)
//!
//! Runs a [`Program`] directly so instrumented output can be checked by
//! executing it. Supports:
//! - JavaScript-like evaluation (truthiness, `+` concatenation, loose and
//!   strict equality, `typeof`, `delete`, `in`, `instanceof`)
//! - Function closures with hoisted declarations and `var`s
//! - `throw` and `try/catch/finally`; runtime faults such as calling a
//!   non-function are thrown as catchable `TypeError`/`ReferenceError` objects,
//!   and an invalid array `length` as a `RangeError`
//! - Labelled `break`/`continue` and `switch`
//!
//! A [`ShadowStackProbe`] reads the emulated stack variables; the interpreter
//! takes a [`StackSnapshot`] every time a value is thrown.

mod expr;
mod stmt;

use crate::ast::{ExprKind, ForInit, Function, Program, Stmt, StmtKind};
use crate::emulator::ProcessNames;
use crate::span::SourceInfo;
use crate::symbol::SymbolId;
use crate::value::{Env, NativeFn, RuntimeError, Value};
use crate::visit::{walk_stmt, Visitor};

/// Default number of statements and calls a run may execute
pub const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

/// Default maximum nesting of calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Control flow signal for handling break, continue, and return
#[derive(Debug, Clone, PartialEq)]
pub(super) enum ControlFlow {
    None,
    Break(Option<String>),
    Continue(Option<String>),
    Return(Value),
}

/// Abrupt completion that unwinds evaluation
#[derive(Debug, Clone)]
pub(super) enum Abrupt {
    /// JavaScript exception, catchable by `try`
    Throw(Value, SourceInfo),
    /// Interpreter fault, never catchable
    Fault(RuntimeError),
}

impl From<RuntimeError> for Abrupt {
    fn from(error: RuntimeError) -> Self {
        Abrupt::Fault(error)
    }
}

pub(super) type Completion<T> = Result<T, Abrupt>;

/// Reads the emulated stack maintained by an instrumented program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowStackProbe {
    pub stack: SymbolId,
    pub stack_depth: SymbolId,
    pub location: Option<SymbolId>,
}

impl ShadowStackProbe {
    pub fn new(names: &ProcessNames) -> Self {
        Self {
            stack: names.stack(),
            stack_depth: names.stack_depth(),
            location: names.location(),
        }
    }
}

/// Emulated stack contents at one point of execution
#[derive(Debug, Clone, PartialEq)]
pub struct StackSnapshot {
    /// Value of the depth variable
    pub depth: i64,
    /// Function names of frames `0..=depth`, outermost first
    pub frames: Vec<String>,
    /// Recorded location of each frame, when locations are recorded
    pub locations: Vec<Option<String>>,
}

/// Interpreter state
pub struct Interpreter<'p> {
    pub(super) program: &'p Program,
    /// Program-scope bindings
    pub(super) globals: Env,
    pub(super) probe: Option<ShadowStackProbe>,
    pub(super) snapshots: Vec<StackSnapshot>,
    pub(super) steps: u64,
    pub(super) step_limit: u64,
    pub(super) call_depth: usize,
    pub(super) max_call_depth: usize,
}

impl<'p> Interpreter<'p> {
    /// Create an interpreter with the native constructors bound
    pub fn new(program: &'p Program) -> Self {
        let globals = Env::root();
        for native in [
            NativeFn::Error,
            NativeFn::TypeError,
            NativeFn::ReferenceError,
            NativeFn::RangeError,
        ] {
            if let Some(symbol) = program.scopes.root_name(native.name()) {
                globals.define(symbol, Value::Native(native));
            }
        }

        Self {
            program,
            globals,
            probe: None,
            snapshots: Vec::new(),
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
            call_depth: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    /// Snapshot the emulated stack on every throw
    pub fn with_probe(mut self, probe: ShadowStackProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Execute the global block
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        let program = self.program;
        let env = self.globals.clone();
        self.hoist(&program.global_block.statements, &env);

        match self.exec_statements(&program.global_block.statements, &env) {
            Ok(ControlFlow::None) => Ok(()),
            Ok(ControlFlow::Return(_)) => Err(RuntimeError::IllegalJump {
                statement: "return".to_string(),
                info: program.global_block.info.clone(),
            }),
            Ok(ControlFlow::Break(_)) | Ok(ControlFlow::Continue(_)) => {
                Err(RuntimeError::IllegalJump {
                    statement: "break or continue".to_string(),
                    info: program.global_block.info.clone(),
                })
            }
            Err(abrupt) => Err(self.uncaught(abrupt)),
        }
    }

    /// Call a program-scope function by name
    pub fn call_global(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let callee = self.global(name).ok_or_else(|| RuntimeError::NotAFunction {
            name: name.to_string(),
        })?;
        if !matches!(callee, Value::Function(_) | Value::Native(_)) {
            return Err(RuntimeError::NotAFunction {
                name: name.to_string(),
            });
        }
        let info = self.program.global_block.info.clone();
        self.call_value(callee, args, &info)
            .map_err(|abrupt| self.uncaught(abrupt))
    }

    /// Value of a program-scope variable
    pub fn global(&self, name: &str) -> Option<Value> {
        let symbol = self.program.scopes.find_in(self.program.scopes.program(), name)?;
        self.globals.get(symbol)
    }

    pub fn global_symbol(&self, symbol: SymbolId) -> Option<Value> {
        self.globals.get(symbol)
    }

    /// Snapshots taken at each throw, in order
    pub fn snapshots(&self) -> &[StackSnapshot] {
        &self.snapshots
    }

    /// Read the emulated stack now
    pub fn probe_now(&self) -> Option<StackSnapshot> {
        let probe = self.probe.as_ref()?;
        let depth = match self.globals.get(probe.stack_depth) {
            Some(Value::Number(n)) => n as i64,
            _ => return None,
        };

        let stack = match self.globals.get(probe.stack) {
            Some(Value::Array(elements)) => elements.borrow().clone(),
            _ => Vec::new(),
        };
        let locations = match probe.location.and_then(|l| self.globals.get(l)) {
            Some(Value::Array(elements)) => Some(elements.borrow().clone()),
            _ => None,
        };

        let live = usize::try_from(depth + 1).unwrap_or(0);
        let frames = (0..live)
            .map(|i| self.frame_name(stack.get(i)))
            .collect();
        let locations = (0..live)
            .map(|i| {
                locations
                    .as_ref()
                    .and_then(|l| l.get(i))
                    .filter(|v| !v.is_nullish())
                    .map(Value::to_string)
            })
            .collect();

        Some(StackSnapshot {
            depth,
            frames,
            locations,
        })
    }

    fn frame_name(&self, value: Option<&Value>) -> String {
        match value {
            Some(Value::Function(closure)) => closure
                .function
                .name
                .map(|n| self.program.scopes.ident(n).to_string())
                .unwrap_or_else(|| "<anonymous>".to_string()),
            Some(Value::Native(native)) => native.name().to_string(),
            _ => "<anonymous>".to_string(),
        }
    }

    pub(super) fn record_throw(&mut self) {
        if let Some(snapshot) = self.probe_now() {
            self.snapshots.push(snapshot);
        }
    }

    pub(super) fn tick(&mut self) -> Completion<()> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(Abrupt::Fault(RuntimeError::StepLimit {
                limit: self.step_limit,
            }));
        }
        Ok(())
    }

    /// Spend `steps` of the budget at once
    pub(super) fn charge(&mut self, steps: u64) -> Completion<()> {
        self.steps = self.steps.saturating_add(steps);
        if self.steps > self.step_limit {
            return Err(Abrupt::Fault(RuntimeError::StepLimit {
                limit: self.step_limit,
            }));
        }
        Ok(())
    }

    fn uncaught(&self, abrupt: Abrupt) -> RuntimeError {
        match abrupt {
            Abrupt::Throw(value, info) => RuntimeError::UncaughtException {
                message: value.to_string(),
                info,
            },
            Abrupt::Fault(error) => error,
        }
    }

    /// Declare `var`s and bind function declarations before a body runs
    pub(super) fn hoist(&mut self, statements: &[Stmt], env: &Env) {
        let mut collector = HoistCollector::default();
        for stmt in statements {
            collector.visit_stmt(stmt);
        }
        for symbol in collector.vars {
            env.declare(symbol);
        }

        for stmt in statements {
            if let StmtKind::Expr(expr) = &stmt.kind {
                if let ExprKind::Function(function) = &expr.kind {
                    if let Some(name) = function.name {
                        let closure = self.make_closure(function, env);
                        env.define(name, closure);
                    }
                }
            }
        }
    }

    pub(super) fn make_closure(&self, function: &Function, env: &Env) -> Value {
        Value::Function(std::rc::Rc::new(crate::value::Closure {
            function: std::rc::Rc::new(function.clone()),
            env: env.clone(),
        }))
    }
}

/// `var` names declared in a body, nested functions excluded
#[derive(Default)]
struct HoistCollector {
    vars: Vec<SymbolId>,
}

impl Visitor for HoistCollector {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Vars(decls)
            | StmtKind::For {
                init: Some(ForInit::Vars(decls)),
                ..
            } => self.vars.extend(decls.iter().map(|d| d.name)),
            StmtKind::ForIn {
                key,
                declared: true,
                ..
            } => self.vars.push(*key),
            _ => {}
        }
        walk_stmt(self, stmt);
    }

    fn visit_function(&mut self, _function: &Function) {}
}
