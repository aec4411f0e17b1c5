//! Runtime values for the simulation interpreter
//!
//! Value types:
//! - Primitives (undefined, null, bool, number, string) are immutable
//! - Arrays and objects are reference types (`Rc<RefCell<_>>`), shared on copy
//! - Functions are closures over their defining environment

use crate::ast::Function;
use crate::span::SourceInfo;
use crate::symbol::SymbolId;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    /// Array (reference type, grows on out-of-range writes)
    Array(Rc<RefCell<Vec<Value>>>),
    /// Plain object (reference type)
    Object(Rc<RefCell<Object>>),
    /// User function closing over its environment
    Function(Rc<Closure>),
    /// Built-in constructor
    Native(NativeFn),
}

/// Object with string-keyed properties
#[derive(Debug, Clone, Default)]
pub struct Object {
    pub properties: BTreeMap<String, Value>,
    /// Constructor that created the object, for `instanceof`
    pub constructor: Option<Value>,
}

/// Function value
#[derive(Debug)]
pub struct Closure {
    pub function: Rc<Function>,
    pub env: Env,
}

/// Built-in error constructors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeFn {
    Error,
    TypeError,
    ReferenceError,
    RangeError,
}

impl NativeFn {
    pub fn name(self) -> &'static str {
        match self {
            NativeFn::Error => "Error",
            NativeFn::TypeError => "TypeError",
            NativeFn::ReferenceError => "ReferenceError",
            NativeFn::RangeError => "RangeError",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Error" => Some(NativeFn::Error),
            "TypeError" => Some(NativeFn::TypeError),
            "ReferenceError" => Some(NativeFn::ReferenceError),
            "RangeError" => Some(NativeFn::RangeError),
            _ => None,
        }
    }
}

/// Lexical environment: one frame of bindings plus its parent
#[derive(Debug, Clone)]
pub struct Env(Rc<RefCell<EnvFrame>>);

#[derive(Debug)]
struct EnvFrame {
    vars: HashMap<SymbolId, Value>,
    parent: Option<Env>,
}

impl Env {
    pub fn root() -> Self {
        Env(Rc::new(RefCell::new(EnvFrame {
            vars: HashMap::new(),
            parent: None,
        })))
    }

    pub fn child(&self) -> Self {
        Env(Rc::new(RefCell::new(EnvFrame {
            vars: HashMap::new(),
            parent: Some(self.clone()),
        })))
    }

    /// Bind `symbol` in this frame
    pub fn define(&self, symbol: SymbolId, value: Value) {
        self.0.borrow_mut().vars.insert(symbol, value);
    }

    /// Bind `symbol` to undefined unless this frame already has it
    pub fn declare(&self, symbol: SymbolId) {
        self.0
            .borrow_mut()
            .vars
            .entry(symbol)
            .or_insert(Value::Undefined);
    }

    pub fn get(&self, symbol: SymbolId) -> Option<Value> {
        let frame = self.0.borrow();
        match frame.vars.get(&symbol) {
            Some(value) => Some(value.clone()),
            None => frame.parent.as_ref().and_then(|p| p.get(symbol)),
        }
    }

    /// Update the nearest binding; returns false when there is none
    pub fn set(&self, symbol: SymbolId, value: Value) -> bool {
        let mut frame = self.0.borrow_mut();
        if let Some(slot) = frame.vars.get_mut(&symbol) {
            *slot = value;
            return true;
        }
        match &frame.parent {
            Some(parent) => parent.set(symbol, value),
            None => false,
        }
    }
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn object(properties: BTreeMap<String, Value>, constructor: Option<Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(Object {
            properties,
            constructor,
        })))
    }

    /// Error object as created by `new Error(message)`
    pub fn error(kind: NativeFn, message: &str) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("name".to_string(), Value::string(kind.name()));
        properties.insert("message".to_string(), Value::string(message));
        Value::object(properties, Some(Value::Native(kind)))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// Property key form of the value
    pub fn to_key(&self) -> String {
        self.to_string()
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a == b,
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => self.to_number() == other.to_number(),
            _ => self.strict_equals(other),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(elements) => {
                let parts: Vec<String> = elements
                    .borrow()
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
                    .collect();
                write!(f, "{}", parts.join(","))
            }
            Value::Object(object) => {
                let object = object.borrow();
                match (object.properties.get("name"), object.properties.get("message")) {
                    (Some(name), Some(message)) => write!(f, "{}: {}", name, message),
                    _ => write!(f, "[object Object]"),
                }
            }
            Value::Function(_) => write!(f, "function"),
            Value::Native(native) => write!(f, "function {}", native.name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

/// Interpreter faults and uncaught exceptions
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    /// A thrown value reached the top level
    #[error("Uncaught {message}")]
    UncaughtException { message: String, info: SourceInfo },

    /// The step budget ran out
    #[error("Step limit of {limit} exceeded")]
    StepLimit { limit: u64 },

    /// Calls nested deeper than the interpreter allows
    #[error("Maximum call depth of {limit} exceeded")]
    CallDepthExceeded { limit: usize },

    /// `break`, `continue` or `return` with no enclosing target
    #[error("Illegal {statement} at {info}")]
    IllegalJump { statement: String, info: SourceInfo },

    /// Named global is not a function
    #[error("{name} is not a global function")]
    NotAFunction { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::string("0").is_truthy());
        assert!(Value::array(vec![]).is_truthy());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(-1.0).to_string(), "-1");
        assert_eq!(Value::Number(0.5).to_string(), "0.5");
        assert_eq!(Value::Number(f64::NAN).to_string(), "NaN");
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(Value::Number(1.0).loose_equals(&Value::string("1")));
        assert!(Value::Bool(true).loose_equals(&Value::Number(1.0)));
        assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
    }

    #[test]
    fn test_env_chain() {
        let mut scopes = crate::symbol::ScopeTable::new();
        let x = scopes.declare(scopes.program(), "x");
        let root = Env::root();
        root.define(x, Value::Number(1.0));
        let child = root.child();

        assert_eq!(child.get(x), Some(Value::Number(1.0)));
        assert!(child.set(x, Value::Number(2.0)));
        assert_eq!(root.get(x), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_error_display() {
        let err = Value::error(NativeFn::TypeError, "x is not a function");
        assert_eq!(err.to_string(), "TypeError: x is not a function");
    }
}
