//! Expression evaluation

use super::{Abrupt, Completion, ControlFlow, Interpreter};
use crate::ast::{BinaryOp, Expr, ExprKind, Literal, PostfixOp, PrefixOp, RefName};
use crate::span::SourceInfo;
use crate::symbol::SymbolId;
use crate::value::{Env, NativeFn, RuntimeError, Value};
use std::collections::BTreeMap;

/// Assignable location
pub(super) enum Reference {
    Binding(SymbolId),
    Property(Value, String),
}

impl Interpreter<'_> {
    /// Evaluate an expression
    pub(super) fn eval_expr(&mut self, expr: &Expr, env: &Env) -> Completion<Value> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(match lit {
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::string(s),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
                Literal::Undefined => Value::Undefined,
            }),
            ExprKind::NameRef { .. } | ExprKind::ArrayAccess { .. } => {
                let reference = self.eval_reference(expr, env)?;
                self.read_reference(&reference, env, &expr.info)
            }
            ExprKind::Invocation { callee, args } => {
                let callee_value = self.eval_expr(callee, env)?;
                let args = self.eval_args(args, env)?;
                if !is_callable(&callee_value) {
                    let message = format!("{} is not a function", self.describe(callee));
                    return Err(self.throw_error(NativeFn::TypeError, &message, &expr.info));
                }
                self.call_value(callee_value, args, &expr.info)
            }
            ExprKind::New { ctor, args } => {
                let ctor_value = self.eval_expr(ctor, env)?;
                let args = self.eval_args(args, env)?;
                self.construct(ctor_value, args, ctor, &expr.info)
            }
            ExprKind::Prefix { op, operand } => self.eval_prefix(*op, operand, env, &expr.info),
            ExprKind::Postfix { op, operand } => {
                let reference = self.eval_reference(operand, env)?;
                let old = self.read_reference(&reference, env, &operand.info)?.to_number();
                let new = match op {
                    PostfixOp::Inc => old + 1.0,
                    PostfixOp::Dec => old - 1.0,
                };
                self.write_reference(reference, Value::Number(new), env, &expr.info)?;
                Ok(Value::Number(old))
            }
            ExprKind::Binary { op, left, right } => {
                self.eval_binary(*op, left, right, env, &expr.info)
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                if self.eval_expr(cond, env)?.is_truthy() {
                    self.eval_expr(then_expr, env)
                } else {
                    self.eval_expr(else_expr, env)
                }
            }
            ExprKind::ArrayLiteral(elements) => {
                let values = self.eval_args(elements, env)?;
                Ok(Value::array(values))
            }
            ExprKind::ObjectLiteral(properties) => {
                let mut map = BTreeMap::new();
                for property in properties {
                    let value = self.eval_expr(&property.value, env)?;
                    map.insert(property.key.clone(), value);
                }
                Ok(Value::object(map, None))
            }
            ExprKind::Function(function) => {
                let closure = self.make_closure(function, env);
                if let Some(name) = function.name {
                    env.define(name, closure.clone());
                }
                Ok(closure)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> Completion<Vec<Value>> {
        args.iter().map(|arg| self.eval_expr(arg, env)).collect()
    }

    // ------------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------------

    pub(super) fn eval_reference(&mut self, expr: &Expr, env: &Env) -> Completion<Reference> {
        match &expr.kind {
            ExprKind::NameRef {
                qualifier: None,
                name: RefName::Symbol(symbol),
            } => Ok(Reference::Binding(*symbol)),
            ExprKind::NameRef {
                qualifier: Some(qualifier),
                name,
            } => {
                let object = self.eval_expr(qualifier, env)?;
                let key = match name {
                    RefName::Symbol(symbol) => self.program.scopes.ident(*symbol).to_string(),
                    RefName::Property(property) => property.clone(),
                };
                Ok(Reference::Property(object, key))
            }
            ExprKind::ArrayAccess { array, index } => {
                let object = self.eval_expr(array, env)?;
                let key = self.eval_expr(index, env)?.to_key();
                Ok(Reference::Property(object, key))
            }
            ExprKind::NameRef {
                qualifier: None,
                name: RefName::Property(property),
            } => {
                let message = format!("{} is not defined", property);
                Err(self.throw_error(NativeFn::ReferenceError, &message, &expr.info))
            }
            _ => Err(self.throw_error(
                NativeFn::ReferenceError,
                "Invalid assignment target",
                &expr.info,
            )),
        }
    }

    pub(super) fn read_reference(
        &mut self,
        reference: &Reference,
        env: &Env,
        info: &SourceInfo,
    ) -> Completion<Value> {
        match reference {
            Reference::Binding(symbol) => match env.get(*symbol) {
                Some(value) => Ok(value),
                None => {
                    let message =
                        format!("{} is not defined", self.program.scopes.ident(*symbol));
                    Err(self.throw_error(NativeFn::ReferenceError, &message, info))
                }
            },
            Reference::Property(object, key) => self.get_property(object, key, info),
        }
    }

    pub(super) fn write_reference(
        &mut self,
        reference: Reference,
        value: Value,
        env: &Env,
        info: &SourceInfo,
    ) -> Completion<()> {
        match reference {
            Reference::Binding(symbol) => {
                // undeclared assignment creates a global
                if !env.set(symbol, value.clone()) {
                    self.globals.define(symbol, value);
                }
                Ok(())
            }
            Reference::Property(object, key) => self.set_property(&object, key, value, info),
        }
    }

    fn get_property(&mut self, object: &Value, key: &str, info: &SourceInfo) -> Completion<Value> {
        match object {
            Value::Undefined | Value::Null => {
                let message = format!("Cannot read property '{}' of {}", key, object);
                Err(self.throw_error(NativeFn::TypeError, &message, info))
            }
            Value::Array(elements) => {
                let elements = elements.borrow();
                if key == "length" {
                    return Ok(Value::Number(elements.len() as f64));
                }
                Ok(array_index(key)
                    .and_then(|i| elements.get(i).cloned())
                    .unwrap_or(Value::Undefined))
            }
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                Ok(array_index(key)
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::string(&c.to_string()))
                    .unwrap_or(Value::Undefined))
            }
            Value::Object(obj) => Ok(obj
                .borrow()
                .properties
                .get(key)
                .cloned()
                .unwrap_or(Value::Undefined)),
            Value::Native(native) if key == "name" => Ok(Value::string(native.name())),
            _ => Ok(Value::Undefined),
        }
    }

    fn set_property(
        &mut self,
        object: &Value,
        key: String,
        value: Value,
        info: &SourceInfo,
    ) -> Completion<()> {
        match object {
            Value::Undefined | Value::Null => {
                let message = format!("Cannot set property '{}' of {}", key, object);
                Err(self.throw_error(NativeFn::TypeError, &message, info))
            }
            Value::Array(elements) => {
                let new_len = if key == "length" {
                    match array_length(&value) {
                        Some(len) => len,
                        None => {
                            let message = format!("Invalid array length: {}", value);
                            return Err(self.throw_error(NativeFn::RangeError, &message, info));
                        }
                    }
                } else if let Some(i) = array_index(&key) {
                    i + 1
                } else {
                    // other keys are not stored on arrays
                    return Ok(());
                };

                // each slot a write adds costs one step
                let len = elements.borrow().len();
                if new_len > len {
                    self.charge((new_len - len) as u64)?;
                }

                let mut elements = elements.borrow_mut();
                if key == "length" {
                    elements.resize(new_len, Value::Undefined);
                } else {
                    if new_len > elements.len() {
                        elements.resize(new_len, Value::Undefined);
                    }
                    elements[new_len - 1] = value;
                }
                Ok(())
            }
            Value::Object(obj) => {
                obj.borrow_mut().properties.insert(key, value);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------------

    pub(super) fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        info: &SourceInfo,
    ) -> Completion<Value> {
        self.tick()?;
        match callee {
            Value::Native(native) => Ok(native_error(native, &args)),
            Value::Function(closure) => {
                if self.call_depth >= self.max_call_depth {
                    return Err(Abrupt::Fault(RuntimeError::CallDepthExceeded {
                        limit: self.max_call_depth,
                    }));
                }

                let env = closure.env.child();
                let mut args = args.into_iter();
                for param in &closure.function.params {
                    env.define(*param, args.next().unwrap_or(Value::Undefined));
                }
                self.hoist(&closure.function.body.statements, &env);

                self.call_depth += 1;
                let result = self.exec_statements(&closure.function.body.statements, &env);
                self.call_depth -= 1;

                match result? {
                    ControlFlow::None => Ok(Value::Undefined),
                    ControlFlow::Return(value) => Ok(value),
                    ControlFlow::Break(_) | ControlFlow::Continue(_) => {
                        Err(Abrupt::Fault(RuntimeError::IllegalJump {
                            statement: "break or continue".to_string(),
                            info: info.clone(),
                        }))
                    }
                }
            }
            other => {
                let message = format!("{} is not a function", other);
                Err(self.throw_error(NativeFn::TypeError, &message, info))
            }
        }
    }

    fn construct(
        &mut self,
        ctor: Value,
        args: Vec<Value>,
        ctor_expr: &Expr,
        info: &SourceInfo,
    ) -> Completion<Value> {
        match ctor {
            Value::Native(native) => {
                self.tick()?;
                Ok(native_error(native, &args))
            }
            Value::Function(_) => {
                let result = self.call_value(ctor.clone(), args, info)?;
                match result {
                    Value::Object(_) | Value::Array(_) => Ok(result),
                    _ => Ok(Value::object(BTreeMap::new(), Some(ctor))),
                }
            }
            _ => {
                let message = format!("{} is not a constructor", self.describe(ctor_expr));
                Err(self.throw_error(NativeFn::TypeError, &message, info))
            }
        }
    }

    /// Build a native error, snapshot the stack, and start unwinding
    pub(super) fn throw_error(&mut self, kind: NativeFn, message: &str, info: &SourceInfo) -> Abrupt {
        self.record_throw();
        Abrupt::Throw(Value::error(kind, message), info.clone())
    }

    /// Short source-like description of an expression for error messages
    fn describe(&self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::NameRef {
                qualifier: None,
                name: RefName::Symbol(symbol),
            } => self.program.scopes.ident(*symbol).to_string(),
            ExprKind::NameRef {
                qualifier: Some(qualifier),
                name,
            } => {
                let name = match name {
                    RefName::Symbol(symbol) => self.program.scopes.ident(*symbol),
                    RefName::Property(property) => property.as_str(),
                };
                format!("{}.{}", self.describe(qualifier), name)
            }
            ExprKind::Binary {
                op: BinaryOp::Comma,
                right,
                ..
            } => self.describe(right),
            _ => "expression".to_string(),
        }
    }

    // ------------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------------

    fn eval_prefix(
        &mut self,
        op: PrefixOp,
        operand: &Expr,
        env: &Env,
        info: &SourceInfo,
    ) -> Completion<Value> {
        match op {
            PrefixOp::Inc | PrefixOp::Dec => {
                let reference = self.eval_reference(operand, env)?;
                let old = self.read_reference(&reference, env, &operand.info)?.to_number();
                let new = if op == PrefixOp::Inc { old + 1.0 } else { old - 1.0 };
                self.write_reference(reference, Value::Number(new), env, info)?;
                Ok(Value::Number(new))
            }
            PrefixOp::Typeof => {
                // typeof tolerates unresolvable names
                if let Some(symbol) = operand.as_symbol() {
                    return Ok(Value::string(
                        env.get(symbol).map_or("undefined", |v| v.type_of()),
                    ));
                }
                let value = self.eval_expr(operand, env)?;
                Ok(Value::string(value.type_of()))
            }
            PrefixOp::Delete => match &operand.kind {
                ExprKind::NameRef {
                    qualifier: Some(_), ..
                }
                | ExprKind::ArrayAccess { .. } => {
                    if let Reference::Property(object, key) = self.eval_reference(operand, env)? {
                        delete_property(&object, &key);
                    }
                    Ok(Value::Bool(true))
                }
                ExprKind::NameRef { .. } => Ok(Value::Bool(false)),
                _ => {
                    self.eval_expr(operand, env)?;
                    Ok(Value::Bool(true))
                }
            },
            PrefixOp::Neg => Ok(Value::Number(-self.eval_expr(operand, env)?.to_number())),
            PrefixOp::Plus => Ok(Value::Number(self.eval_expr(operand, env)?.to_number())),
            PrefixOp::Not => Ok(Value::Bool(!self.eval_expr(operand, env)?.is_truthy())),
            PrefixOp::Void => {
                self.eval_expr(operand, env)?;
                Ok(Value::Undefined)
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        env: &Env,
        info: &SourceInfo,
    ) -> Completion<Value> {
        if op.is_assignment() {
            let reference = self.eval_reference(left, env)?;
            let value = match op.compound_operator() {
                Some(arith) => {
                    let current = self.read_reference(&reference, env, &left.info)?;
                    let rhs = self.eval_expr(right, env)?;
                    self.arithmetic(arith, &current, &rhs, info)?
                }
                None => self.eval_expr(right, env)?,
            };
            self.write_reference(reference, value.clone(), env, info)?;
            return Ok(value);
        }

        match op {
            BinaryOp::Comma => {
                self.eval_expr(left, env)?;
                self.eval_expr(right, env)
            }
            BinaryOp::And => {
                let l = self.eval_expr(left, env)?;
                if l.is_truthy() {
                    self.eval_expr(right, env)
                } else {
                    Ok(l)
                }
            }
            BinaryOp::Or => {
                let l = self.eval_expr(left, env)?;
                if l.is_truthy() {
                    Ok(l)
                } else {
                    self.eval_expr(right, env)
                }
            }
            _ => {
                let l = self.eval_expr(left, env)?;
                let r = self.eval_expr(right, env)?;
                self.arithmetic(op, &l, &r, info)
            }
        }
    }

    /// Strict binary operators on evaluated operands
    fn arithmetic(
        &mut self,
        op: BinaryOp,
        l: &Value,
        r: &Value,
        info: &SourceInfo,
    ) -> Completion<Value> {
        let value = match op {
            BinaryOp::Add => {
                let concat = |v: &Value| {
                    matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_))
                };
                if concat(l) || concat(r) {
                    Value::string(&format!("{}{}", l, r))
                } else {
                    Value::Number(l.to_number() + r.to_number())
                }
            }
            BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
            BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
            BinaryOp::Div => Value::Number(l.to_number() / r.to_number()),
            BinaryOp::Mod => Value::Number(l.to_number() % r.to_number()),
            BinaryOp::Eq => Value::Bool(l.loose_equals(r)),
            BinaryOp::NotEq => Value::Bool(!l.loose_equals(r)),
            BinaryOp::StrictEq => Value::Bool(l.strict_equals(r)),
            BinaryOp::StrictNotEq => Value::Bool(!l.strict_equals(r)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                Value::Bool(compare(op, l, r))
            }
            BinaryOp::InstanceOf => {
                if !is_callable(r) {
                    return Err(self.throw_error(
                        NativeFn::TypeError,
                        "Right-hand side of 'instanceof' is not callable",
                        info,
                    ));
                }
                Value::Bool(instance_of(l, r))
            }
            BinaryOp::In => {
                let key = l.to_key();
                match r {
                    Value::Object(obj) => Value::Bool(obj.borrow().properties.contains_key(&key)),
                    Value::Array(elements) => Value::Bool(
                        key == "length"
                            || array_index(&key).is_some_and(|i| i < elements.borrow().len()),
                    ),
                    _ => {
                        let message = format!("Cannot use 'in' operator to search for '{}'", key);
                        return Err(self.throw_error(NativeFn::TypeError, &message, info));
                    }
                }
            }
            _ => unreachable!("non-arithmetic operator {:?}", op),
        };
        Ok(value)
    }
}

fn is_callable(value: &Value) -> bool {
    matches!(value, Value::Function(_) | Value::Native(_))
}

fn native_error(kind: NativeFn, args: &[Value]) -> Value {
    let message = match args.first() {
        Some(Value::Undefined) | None => String::new(),
        Some(value) => value.to_string(),
    };
    Value::error(kind, &message)
}

/// Canonical array index: `0..=2^32 - 2`; any other key is a plain property
fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    let index: u32 = key.parse().ok()?;
    if index == u32::MAX {
        return None;
    }
    usize::try_from(index).ok()
}

/// Value assignable to `length`: an integer in `0..=2^32 - 1`
fn array_length(value: &Value) -> Option<usize> {
    let len = value.to_number();
    if len >= 0.0 && len.fract() == 0.0 && len <= f64::from(u32::MAX) {
        usize::try_from(len as u32).ok()
    } else {
        None
    }
}

fn delete_property(object: &Value, key: &str) {
    match object {
        Value::Object(obj) => {
            obj.borrow_mut().properties.remove(key);
        }
        Value::Array(elements) => {
            let mut elements = elements.borrow_mut();
            if let Some(slot) = array_index(key).and_then(|i| elements.get_mut(i)) {
                *slot = Value::Undefined;
            }
        }
        _ => {}
    }
}

fn compare(op: BinaryOp, l: &Value, r: &Value) -> bool {
    if let (Value::String(a), Value::String(b)) = (l, r) {
        return match op {
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            _ => a >= b,
        };
    }
    let (a, b) = (l.to_number(), r.to_number());
    match op {
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        _ => a >= b,
    }
}

fn instance_of(value: &Value, ctor: &Value) -> bool {
    let Value::Object(obj) = value else {
        return false;
    };
    match (&obj.borrow().constructor, ctor) {
        // every native error kind derives from Error
        (Some(Value::Native(_)), Value::Native(NativeFn::Error)) => true,
        (Some(own), ctor) => own.strict_equals(ctor),
        (None, _) => false,
    }
}
