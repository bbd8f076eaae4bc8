//! Evaluator
//!
//! Tree-walking evaluation of parsed ASTs against a variable
//! [`Activation`]. The evaluator implements the operator set shared
//! with the parser and unparser: arithmetic with overflow detection,
//! heterogeneous numeric comparison through the numeric comparator,
//! CEL's commutative short-circuit logic (where an error on one side
//! is absorbed if the other side decides the outcome), comprehension
//! loops with an iteration budget, and struct construction through a
//! [`MessageFactory`].

pub mod value;

pub use value::{MapKey, MapValue, Value};

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::ast::{Ast, ComprehensionExpr, Expr, ExprKind};
use crate::error::CelError;
use crate::numeric;
use crate::operators;
use crate::registry::MessageFactory;

use value::value_equals;

/// Evaluation failure.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// A structural error from the core (overflow, invariant breach).
    Cel(CelError),
    /// No implementation of the function for the given operand types.
    NoSuchOverload { function: String, detail: String },
    /// Map lookup with a key that is not present.
    NoSuchKey(String),
    /// Field selection on a message without that field.
    NoSuchField(String),
    /// An identifier with no binding in the activation.
    UndeclaredReference(String),
    DivisionByZero,
    /// Recognized syntax whose evaluation this interpreter does not
    /// support (optional-entry syntax, error constants).
    Unsupported(String),
}

impl From<CelError> for EvalError {
    fn from(error: CelError) -> Self {
        EvalError::Cel(error)
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::Cel(error) => write!(f, "{}", error),
            EvalError::NoSuchOverload { function, detail } => {
                write!(f, "no such overload: {} ({})", function, detail)
            }
            EvalError::NoSuchKey(key) => write!(f, "no such key: {}", key),
            EvalError::NoSuchField(field) => write!(f, "no such field: {}", field),
            EvalError::UndeclaredReference(name) => {
                write!(f, "undeclared reference to '{}'", name)
            }
            EvalError::DivisionByZero => write!(f, "division by zero"),
            EvalError::Unsupported(what) => write!(f, "unsupported: {}", what),
        }
    }
}

impl std::error::Error for EvalError {}

/// Variable bindings for one evaluation.
#[derive(Debug, Clone, Default)]
pub struct Activation {
    vars: HashMap<String, Value>,
}

impl Activation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable, replacing any previous binding.
    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.vars.insert(name.into(), value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

/// Evaluator configuration.
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Maximum total comprehension iterations per evaluation.
    pub iteration_limit: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            iteration_limit: 10_000,
        }
    }
}

/// Tree-walking evaluator.
#[derive(Clone)]
pub struct Evaluator {
    factory: Option<Arc<dyn MessageFactory>>,
    options: EvalOptions,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            factory: None,
            options: EvalOptions::default(),
        }
    }

    pub fn with_factory(factory: Arc<dyn MessageFactory>) -> Self {
        Self {
            factory: Some(factory),
            options: EvalOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }

    /// Evaluate an AST against an activation.
    pub fn eval(&self, ast: &Ast, activation: &Activation) -> Result<Value, EvalError> {
        let mut frame = Frame {
            evaluator: self,
            activation,
            locals: Vec::new(),
            iterations_left: self.options.iteration_limit,
        };
        frame.eval(ast.root())
    }
}

struct Frame<'a> {
    evaluator: &'a Evaluator,
    activation: &'a Activation,
    /// Comprehension-scoped bindings, innermost last.
    locals: Vec<(String, Value)>,
    iterations_left: usize,
}

impl<'a> Frame<'a> {
    fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match &expr.kind {
            ExprKind::NotSet => Err(EvalError::Cel(CelError::invalid_state(
                "placeholder node in evaluated tree",
            ))),
            ExprKind::Constant(constant) => Value::from_constant(constant).ok_or_else(|| {
                EvalError::Unsupported("error constant in evaluated tree".to_string())
            }),
            ExprKind::Ident { name } => self.lookup(name),
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => {
                let operand = self.eval(operand)?;
                if *test_only {
                    self.test_field(&operand, field)
                } else {
                    self.select_field(&operand, field)
                }
            }
            ExprKind::Call {
                target,
                function,
                args,
            } => self.eval_call(target.as_deref(), function, args),
            ExprKind::List {
                elements,
                optional_indices,
            } => {
                if !optional_indices.is_empty() {
                    return Err(EvalError::Unsupported(
                        "optional list elements require the optional-values library".to_string(),
                    ));
                }
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval(element)?);
                }
                Ok(Value::List(values))
            }
            ExprKind::Map { entries } => {
                let mut map = MapValue::new();
                for entry in entries {
                    if entry.optional {
                        return Err(EvalError::Unsupported(
                            "optional map entries require the optional-values library".to_string(),
                        ));
                    }
                    let key = self.eval(&entry.key)?;
                    let key = MapKey::from_value(&key).ok_or_else(|| EvalError::NoSuchOverload {
                        function: "map key".to_string(),
                        detail: key.type_name().to_string(),
                    })?;
                    let value = self.eval(&entry.value)?;
                    map.insert(key, value)
                        .map_err(EvalError::Unsupported)?;
                }
                Ok(Value::Map(map))
            }
            ExprKind::Struct {
                message_type,
                entries,
            } => self.eval_struct(message_type, entries),
            ExprKind::Comprehension(comp) => self.eval_comprehension(comp),
        }
    }

    fn lookup(&mut self, name: &str) -> Result<Value, EvalError> {
        if let Some((_, value)) = self.locals.iter().rev().find(|(n, _)| n == name) {
            return Ok(value.clone());
        }
        self.activation
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UndeclaredReference(name.to_string()))
    }

    fn eval_struct(
        &mut self,
        message_type: &str,
        entries: &[crate::ast::StructEntry],
    ) -> Result<Value, EvalError> {
        let factory = self
            .evaluator
            .factory
            .as_ref()
            .ok_or_else(|| EvalError::Cel(CelError::unresolved(message_type)))?;
        let mut builder = factory
            .new_builder(message_type)
            .ok_or_else(|| EvalError::Cel(CelError::unresolved(message_type)))?;
        for entry in entries {
            if entry.optional {
                return Err(EvalError::Unsupported(
                    "optional fields require the optional-values library".to_string(),
                ));
            }
            let value = self.eval(&entry.value)?;
            builder.set_field(&entry.field, value)?;
        }
        Ok(builder.build()?)
    }

    fn eval_comprehension(&mut self, comp: &ComprehensionExpr) -> Result<Value, EvalError> {
        let range = self.eval(&comp.iter_range)?;
        let mut accu = self.eval(&comp.accu_init)?;

        // Iterate (value) for lists, (key) for maps; two-variable
        // comprehensions see (index, value) and (key, value).
        let pairs: Vec<(Value, Value)> = match &range {
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (Value::Int(i as i64), item.clone()))
                .collect(),
            Value::Map(map) => map
                .entries()
                .map(|(key, value)| (key_to_value(key), value.clone()))
                .collect(),
            other => {
                return Err(EvalError::NoSuchOverload {
                    function: "comprehension range".to_string(),
                    detail: other.type_name().to_string(),
                })
            }
        };

        for (first, second) in pairs {
            if self.iterations_left == 0 {
                return Err(EvalError::Cel(CelError::IterationLimit {
                    limit: self.evaluator.options.iteration_limit,
                }));
            }
            self.iterations_left -= 1;

            let depth = self.locals.len();
            self.locals.push((comp.accu_var.clone(), accu.clone()));
            match &comp.iter_var2 {
                Some(iter_var2) => {
                    self.locals.push((comp.iter_var.clone(), first));
                    self.locals.push((iter_var2.clone(), second));
                }
                None => {
                    // Single-variable iteration sees the element for
                    // lists and the key for maps.
                    let bound = match &range {
                        Value::Map(_) => first,
                        _ => second,
                    };
                    self.locals.push((comp.iter_var.clone(), bound));
                }
            }

            let continue_loop = match self.eval(&comp.loop_condition) {
                Ok(Value::Bool(b)) => b,
                Ok(other) => {
                    self.locals.truncate(depth);
                    return Err(EvalError::NoSuchOverload {
                        function: "loop condition".to_string(),
                        detail: other.type_name().to_string(),
                    });
                }
                Err(error) => {
                    self.locals.truncate(depth);
                    return Err(error);
                }
            };
            if !continue_loop {
                self.locals.truncate(depth);
                break;
            }
            let stepped = self.eval(&comp.loop_step);
            self.locals.truncate(depth);
            accu = stepped?;
        }

        self.locals.push((comp.accu_var.clone(), accu));
        let result = self.eval(&comp.result);
        self.locals.pop();
        result
    }

    fn eval_call(
        &mut self,
        target: Option<&Expr>,
        function: &str,
        args: &[Expr],
    ) -> Result<Value, EvalError> {
        // Logic operators evaluate lazily with error absorption.
        match function {
            f if f == operators::LOGICAL_AND && args.len() == 2 => {
                return self.eval_logic(&args[0], &args[1], false)
            }
            f if f == operators::LOGICAL_OR && args.len() == 2 => {
                return self.eval_logic(&args[0], &args[1], true)
            }
            f if f == operators::CONDITIONAL && args.len() == 3 => {
                return match self.eval(&args[0])? {
                    Value::Bool(true) => self.eval(&args[1]),
                    Value::Bool(false) => self.eval(&args[2]),
                    other => Err(EvalError::NoSuchOverload {
                        function: operators::CONDITIONAL.to_string(),
                        detail: other.type_name().to_string(),
                    }),
                }
            }
            f if f == operators::NOT_STRICTLY_FALSE && args.len() == 1 => {
                return Ok(Value::Bool(!matches!(
                    self.eval(&args[0]),
                    Ok(Value::Bool(false))
                )))
            }
            _ => {}
        }

        // Everything else is strict.
        let mut values = Vec::with_capacity(args.len() + 1);
        if let Some(target) = target {
            values.push(self.eval(target)?);
        }
        for arg in args {
            values.push(self.eval(arg)?);
        }
        self.dispatch(function, &values)
    }

    /// `&&` and `||` with commutative short-circuit: an error on one
    /// side is absorbed when the other side decides the outcome.
    fn eval_logic(&mut self, lhs: &Expr, rhs: &Expr, is_or: bool) -> Result<Value, EvalError> {
        let decisive = Value::Bool(is_or);
        let left = self.eval_bool_operand(lhs);
        if let Ok(value) = &left {
            if value_equals(value, &decisive) {
                return Ok(decisive);
            }
        }
        let right = self.eval_bool_operand(rhs);
        match (left, right) {
            (Ok(Value::Bool(a)), Ok(Value::Bool(b))) => {
                Ok(Value::Bool(if is_or { a || b } else { a && b }))
            }
            (Err(_), Ok(Value::Bool(b))) if b == is_or => Ok(decisive),
            (Ok(_), Err(error)) | (Err(error), _) => Err(error),
            _ => unreachable!("eval_bool_operand only returns bools"),
        }
    }

    fn eval_bool_operand(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(Value::Bool(b)),
            other => Err(EvalError::NoSuchOverload {
                function: "logical operator".to_string(),
                detail: other.type_name().to_string(),
            }),
        }
    }

    fn dispatch(&mut self, function: &str, values: &[Value]) -> Result<Value, EvalError> {
        match (function, values) {
            (f, [a]) if f == operators::LOGICAL_NOT => match a {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(no_such_overload(function, &[other])),
            },
            (f, [a]) if f == operators::NEGATE => match a {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| overflow("-", a)),
                Value::Double(d) => Ok(Value::Double(-d)),
                other => Err(no_such_overload(function, &[other])),
            },
            (f, [a, b]) if f == operators::ADD => self.add(a, b),
            (f, [a, b]) if f == operators::SUBTRACT => arith_int_like(
                f,
                a,
                b,
                i64::checked_sub,
                u64::checked_sub,
                |x, y| x - y,
            ),
            (f, [a, b]) if f == operators::MULTIPLY => arith_int_like(
                f,
                a,
                b,
                i64::checked_mul,
                u64::checked_mul,
                |x, y| x * y,
            ),
            (f, [a, b]) if f == operators::DIVIDE => match (a, b) {
                (Value::Int(_), Value::Int(0)) | (Value::Uint(_), Value::Uint(0)) => {
                    Err(EvalError::DivisionByZero)
                }
                _ => arith_int_like(f, a, b, i64::checked_div, u64::checked_div, |x, y| x / y),
            },
            (f, [a, b]) if f == operators::MODULO => match (a, b) {
                (Value::Int(_), Value::Int(0)) | (Value::Uint(_), Value::Uint(0)) => {
                    Err(EvalError::DivisionByZero)
                }
                (Value::Int(x), Value::Int(y)) => x
                    .checked_rem(*y)
                    .map(Value::Int)
                    .ok_or_else(|| overflow("%", a)),
                (Value::Uint(x), Value::Uint(y)) => Ok(Value::Uint(x % y)),
                _ => Err(no_such_overload(f, &values.iter().collect::<Vec<_>>())),
            },
            (f, [a, b]) if f == operators::EQUALS => Ok(Value::Bool(value_equals(a, b))),
            (f, [a, b]) if f == operators::NOT_EQUALS => Ok(Value::Bool(!value_equals(a, b))),
            (f, [a, b])
                if f == operators::LESS
                    || f == operators::LESS_EQUALS
                    || f == operators::GREATER
                    || f == operators::GREATER_EQUALS =>
            {
                // Same-type doubles use the IEEE operators, so NaN
                // comparisons are false. Cross-type pairs go through
                // the saturating comparator's total order.
                if let (Value::Double(x), Value::Double(y)) = (a, b) {
                    return Ok(Value::Bool(match f {
                        _ if f == operators::LESS => x < y,
                        _ if f == operators::LESS_EQUALS => x <= y,
                        _ if f == operators::GREATER => x > y,
                        _ => x >= y,
                    }));
                }
                let ordering = compare_values(a, b)
                    .ok_or_else(|| no_such_overload(f, &[a, b]))?;
                Ok(Value::Bool(match f {
                    _ if f == operators::LESS => ordering == Ordering::Less,
                    _ if f == operators::LESS_EQUALS => ordering != Ordering::Greater,
                    _ if f == operators::GREATER => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }))
            }
            (f, [element, collection]) if f == operators::IN => self.contains(collection, element),
            (f, [operand, index]) if f == operators::INDEX => self.index(operand, index),
            (f, [_, _]) if f == operators::OPTIONAL_INDEX => Err(EvalError::Unsupported(
                "optional indexing requires the optional-values library".to_string(),
            )),
            (f, [map, key, value]) if f == operators::MAP_INSERT => match map {
                Value::Map(map) => {
                    let key = MapKey::from_value(key)
                        .ok_or_else(|| no_such_overload(f, &[key]))?;
                    let mut updated = map.clone();
                    updated.insert_or_replace(key, value.clone());
                    Ok(Value::Map(updated))
                }
                other => Err(no_such_overload(f, &[other])),
            },
            ("size", [value]) => self.size(value),
            ("matches", [Value::String(text), Value::String(pattern)]) => {
                let compiled = Regex::new(pattern).map_err(|error| EvalError::Unsupported(
                    format!("invalid match pattern: {}", error),
                ))?;
                Ok(Value::Bool(compiled.is_match(text)))
            }
            ("contains", [Value::String(text), Value::String(part)]) => {
                Ok(Value::Bool(text.contains(part)))
            }
            ("startsWith", [Value::String(text), Value::String(prefix)]) => {
                Ok(Value::Bool(text.starts_with(prefix)))
            }
            ("endsWith", [Value::String(text), Value::String(suffix)]) => {
                Ok(Value::Bool(text.ends_with(suffix)))
            }
            _ => Err(EvalError::NoSuchOverload {
                function: function.to_string(),
                detail: values
                    .iter()
                    .map(Value::type_name)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    fn add(&self, a: &Value, b: &Value) -> Result<Value, EvalError> {
        match (a, b) {
            (Value::String(x), Value::String(y)) => Ok(Value::String(format!("{}{}", x, y))),
            (Value::Bytes(x), Value::Bytes(y)) => {
                let mut out = x.clone();
                out.extend_from_slice(y);
                Ok(Value::Bytes(out))
            }
            (Value::List(x), Value::List(y)) => {
                let mut out = x.clone();
                out.extend(y.iter().cloned());
                Ok(Value::List(out))
            }
            _ => arith_int_like(
                operators::ADD,
                a,
                b,
                i64::checked_add,
                u64::checked_add,
                |x, y| x + y,
            ),
        }
    }

    fn contains(&self, collection: &Value, element: &Value) -> Result<Value, EvalError> {
        match collection {
            Value::List(items) => Ok(Value::Bool(
                items.iter().any(|item| value_equals(item, element)),
            )),
            Value::Map(map) => {
                let key = match MapKey::from_value(element) {
                    Some(key) => key,
                    None => return Ok(Value::Bool(false)),
                };
                Ok(Value::Bool(map.contains(&key)))
            }
            other => Err(no_such_overload(operators::IN, &[other])),
        }
    }

    fn index(&self, operand: &Value, index: &Value) -> Result<Value, EvalError> {
        match operand {
            Value::List(items) => {
                let i = match index {
                    Value::Int(i) => *i,
                    Value::Uint(u) => i64::try_from(*u)
                        .map_err(|_| EvalError::NoSuchKey(u.to_string()))?,
                    other => return Err(no_such_overload(operators::INDEX, &[other])),
                };
                if i < 0 || i as usize >= items.len() {
                    return Err(EvalError::NoSuchKey(i.to_string()));
                }
                Ok(items[i as usize].clone())
            }
            Value::Map(map) => {
                let key = MapKey::from_value(index)
                    .ok_or_else(|| no_such_overload(operators::INDEX, &[index]))?;
                map.get(&key)
                    .cloned()
                    .ok_or_else(|| EvalError::NoSuchKey(format!("{:?}", index)))
            }
            other => Err(no_such_overload(operators::INDEX, &[other])),
        }
    }

    fn size(&self, value: &Value) -> Result<Value, EvalError> {
        match value {
            // String size counts code points, not bytes.
            Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::Bytes(b) => Ok(Value::Int(b.len() as i64)),
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            Value::Map(map) => Ok(Value::Int(map.len() as i64)),
            other => Err(no_such_overload("size", &[other])),
        }
    }

    fn select_field(&self, operand: &Value, field: &str) -> Result<Value, EvalError> {
        match operand {
            Value::Map(map) => map
                .get(&MapKey::String(field.to_string()))
                .cloned()
                .ok_or_else(|| EvalError::NoSuchKey(field.to_string())),
            Value::Message(message) => message
                .fields
                .get(field)
                .cloned()
                .ok_or_else(|| EvalError::NoSuchField(field.to_string())),
            other => Err(EvalError::NoSuchOverload {
                function: "field selection".to_string(),
                detail: other.type_name().to_string(),
            }),
        }
    }

    fn test_field(&self, operand: &Value, field: &str) -> Result<Value, EvalError> {
        match operand {
            Value::Map(map) => Ok(Value::Bool(
                map.contains(&MapKey::String(field.to_string())),
            )),
            Value::Message(message) => Ok(Value::Bool(message.fields.contains_key(field))),
            other => Err(EvalError::NoSuchOverload {
                function: "has".to_string(),
                detail: other.type_name().to_string(),
            }),
        }
    }
}

fn key_to_value(key: &MapKey) -> Value {
    match key {
        MapKey::Bool(b) => Value::Bool(*b),
        MapKey::Int(i) => Value::Int(*i),
        MapKey::Uint(u) => Value::Uint(*u),
        MapKey::String(s) => Value::String(s.clone()),
    }
}

fn no_such_overload(function: &str, values: &[&Value]) -> EvalError {
    EvalError::NoSuchOverload {
        function: function.to_string(),
        detail: values
            .iter()
            .map(|v| v.type_name())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn overflow(op: &str, value: &Value) -> EvalError {
    EvalError::Cel(CelError::overflow(format!(
        "{} on {}",
        op,
        value.type_name()
    )))
}

/// Same-kind arithmetic with overflow checks; mixing int, uint, and
/// double operands is not an overload.
fn arith_int_like(
    function: &str,
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    uint_op: fn(u64, u64) -> Option<u64>,
    double_op: fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => int_op(*x, *y).map(Value::Int).ok_or_else(|| {
            EvalError::Cel(CelError::overflow(format!("{} over int", function)))
        }),
        (Value::Uint(x), Value::Uint(y)) => uint_op(*x, *y).map(Value::Uint).ok_or_else(|| {
            EvalError::Cel(CelError::overflow(format!("{} over uint", function)))
        }),
        (Value::Double(x), Value::Double(y)) => Ok(Value::Double(double_op(*x, *y))),
        _ => Err(no_such_overload(function, &[a, b])),
    }
}

/// Cross-type numeric ordering; `None` for incomparable values.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    Some(match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Uint(x), Value::Uint(y)) => x.cmp(y),
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y)?,
        (Value::Int(x), Value::Uint(y)) => numeric::compare_int_uint(*x, *y),
        (Value::Uint(x), Value::Int(y)) => numeric::compare_uint_int(*x, *y),
        (Value::Int(x), Value::Double(y)) => numeric::compare_int_double(*x, *y),
        (Value::Double(x), Value::Int(y)) => numeric::compare_double_int(*x, *y),
        (Value::Uint(x), Value::Double(y)) => numeric::compare_uint_double(*x, *y),
        (Value::Double(x), Value::Uint(y)) => numeric::compare_double_uint(*x, *y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Timestamp(x), Value::Timestamp(y)) => x.cmp(y),
        (Value::Duration(x), Value::Duration(y)) => x.cmp(y),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn eval(text: &str) -> Result<Value, EvalError> {
        let ast = parse(text).unwrap_or_else(|e| panic!("parse of {:?} failed:\n{}", text, e));
        Evaluator::new().eval(&ast, &Activation::new())
    }

    fn eval_with(text: &str, activation: &Activation) -> Result<Value, EvalError> {
        let ast = parse(text).unwrap_or_else(|e| panic!("parse of {:?} failed:\n{}", text, e));
        Evaluator::new().eval(&ast, activation)
    }

    fn assert_value(text: &str, expected: Value) {
        let got = eval(text).unwrap_or_else(|e| panic!("eval of {:?} failed: {}", text, e));
        assert!(
            value_equals(&got, &expected),
            "eval of {:?}: expected {:?}, got {:?}",
            text,
            expected,
            got
        );
    }

    #[test]
    fn test_arithmetic() {
        assert_value("1 + 2 * 3", Value::Int(7));
        assert_value("7 % 3", Value::Int(1));
        assert_value("7 / 2", Value::Int(3));
        assert_value("2u + 3u", Value::Uint(5));
        assert_value("0.5 + 0.25", Value::Double(0.75));
        assert_value("-5 - 3", Value::Int(-8));
        assert_value("'a' + 'b'", Value::String("ab".into()));
        assert_value("b'a' + b'b'", Value::Bytes(b"ab".to_vec()));
        assert_value("[1] + [2]", Value::List(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn test_arithmetic_errors() {
        assert!(matches!(eval("1 / 0"), Err(EvalError::DivisionByZero)));
        assert!(matches!(
            eval("9223372036854775807 + 1"),
            Err(EvalError::Cel(CelError::NumericOverflow { .. }))
        ));
        assert!(matches!(
            eval("1 + 2u"),
            Err(EvalError::NoSuchOverload { .. })
        ));
        assert!(matches!(
            eval("-(-9223372036854775807 - 1)"),
            Err(EvalError::Cel(CelError::NumericOverflow { .. }))
        ));
    }

    #[test]
    fn test_heterogeneous_comparison() {
        assert_value("1 == 1u", Value::Bool(true));
        assert_value("1 < 1.5", Value::Bool(true));
        assert_value("2u >= 2.0", Value::Bool(true));
        assert_value("1 == 1.5", Value::Bool(false));
        assert_value("-1 < 18446744073709551615u", Value::Bool(true));
    }

    #[test]
    fn test_nan_comparisons_are_false() {
        assert_value("0.0 / 0.0 < 1.0", Value::Bool(false));
        assert_value("0.0 / 0.0 > 1.0", Value::Bool(false));
        assert_value("0.0 / 0.0 == 0.0 / 0.0", Value::Bool(false));
        assert_value("0.0 / 0.0 != 0.0 / 0.0", Value::Bool(true));
    }

    #[test]
    fn test_logic_short_circuit_absorbs_errors() {
        assert_value("false && (1 / 0 == 0)", Value::Bool(false));
        assert_value("(1 / 0 == 0) && false", Value::Bool(false));
        assert_value("true || (1 / 0 == 0)", Value::Bool(true));
        assert_value("(1 / 0 == 0) || true", Value::Bool(true));
        assert!(eval("(1 / 0 == 0) || false").is_err());
        assert!(eval("true && (1 / 0 == 0)").is_err());
        assert_value("!false", Value::Bool(true));
    }

    #[test]
    fn test_conditional_and_in() {
        assert_value("true ? 1 : 2", Value::Int(1));
        assert_value("2 in [1, 2, 3]", Value::Bool(true));
        assert_value("4 in [1, 2, 3]", Value::Bool(false));
        assert_value("'a' in {'a': 1}", Value::Bool(true));
    }

    #[test]
    fn test_index_and_select() {
        assert_value("[10, 20][1]", Value::Int(20));
        assert_value("{'a': 1}['a']", Value::Int(1));
        assert_value("{'a': {'b': 2}}.a.b", Value::Int(2));
        assert_value("{1: 'one'}[1u]", Value::String("one".into()));
        assert!(matches!(eval("[1][5]"), Err(EvalError::NoSuchKey(_))));
        assert!(matches!(
            eval("{'a': 1}.b"),
            Err(EvalError::NoSuchKey(_))
        ));
    }

    #[test]
    fn test_has_on_maps() {
        assert_value("has({'a': 1}.a)", Value::Bool(true));
        assert_value("has({'a': 1}.b)", Value::Bool(false));
    }

    #[test]
    fn test_size_counts_code_points() {
        assert_value("size('héllo')", Value::Int(5));
        assert_value("size(b'ab')", Value::Int(2));
        assert_value("size([1, 2, 3])", Value::Int(3));
        assert_value("size({'a': 1})", Value::Int(1));
    }

    #[test]
    fn test_string_functions() {
        assert_value("'hello'.contains('ell')", Value::Bool(true));
        assert_value("'hello'.startsWith('he')", Value::Bool(true));
        assert_value("'hello'.endsWith('lo')", Value::Bool(true));
        assert_value("'h3llo'.matches('[0-9]')", Value::Bool(true));
        assert_value("'hello'.matches('^x')", Value::Bool(false));
    }

    #[test]
    fn test_macro_evaluation() {
        assert_value("[1, 2, 3].all(x, x > 0)", Value::Bool(true));
        assert_value("[1, -2, 3].all(x, x > 0)", Value::Bool(false));
        assert_value("[false].exists(i, i)", Value::Bool(false));
        assert_value("[1, 2, 3].exists(x, x == 2)", Value::Bool(true));
        assert_value("[1, 2, 3].exists_one(x, x > 2)", Value::Bool(true));
        assert_value("[1, 2, 3].exists_one(x, x > 1)", Value::Bool(false));
        assert_value(
            "[1, 2, 3].map(x, x * 2)",
            Value::List(vec![Value::Int(2), Value::Int(4), Value::Int(6)]),
        );
        assert_value(
            "[1, 2, 3, 4].filter(x, x % 2 == 0)",
            Value::List(vec![Value::Int(2), Value::Int(4)]),
        );
        assert_value(
            "[1, 2, 3].map(x, x > 1, x * 10)",
            Value::List(vec![Value::Int(20), Value::Int(30)]),
        );
    }

    #[test]
    fn test_exists_absorbs_errors_after_success() {
        // Once one element matches, later errors are short-circuited
        // away by the loop condition.
        assert_value("[2, 0].exists(x, 4 / x == 2)", Value::Bool(true));
    }

    #[test]
    fn test_map_macro_over_map_iterates_keys() {
        assert_value(
            "{'a': 1, 'b': 2}.map(k, k)",
            Value::List(vec![
                Value::String("a".into()),
                Value::String("b".into()),
            ]),
        );
    }

    #[test]
    fn test_bind_macro_evaluation() {
        assert_value("cel.bind(v, 3, v + v)", Value::Int(6));
        assert_value(
            "cel.bind(v, [1, 2], v.map(x, x + size(v)))",
            Value::List(vec![Value::Int(3), Value::Int(4)]),
        );
    }

    #[test]
    fn test_transform_macros_evaluation() {
        assert_value(
            "[10, 20].transformList(i, v, v + i)",
            Value::List(vec![Value::Int(10), Value::Int(21)]),
        );
        assert_value(
            "[1, 2, 3].transformList(i, v, v % 2 == 1, v)",
            Value::List(vec![Value::Int(1), Value::Int(3)]),
        );
        let expected = {
            let mut map = MapValue::new();
            map.insert(MapKey::String("a".into()), Value::Int(2)).unwrap();
            map.insert(MapKey::String("b".into()), Value::Int(3)).unwrap();
            Value::Map(map)
        };
        assert_value("{'a': 1, 'b': 2}.transformMap(k, v, v + 1)", expected);
    }

    #[test]
    fn test_activation_variables() {
        let activation = Activation::new()
            .bind("x", Value::Int(41))
            .bind("name", Value::String("cel".into()));
        assert!(value_equals(
            &eval_with("x + 1", &activation).unwrap(),
            &Value::Int(42)
        ));
        assert!(value_equals(
            &eval_with("name + '!'", &activation).unwrap(),
            &Value::String("cel!".into())
        ));
        assert!(matches!(
            eval("unknown_var"),
            Err(EvalError::UndeclaredReference(_))
        ));
    }

    #[test]
    fn test_comprehension_iteration_limit() {
        let ast = parse("[1, 2, 3, 4].all(x, x > 0)").unwrap();
        let evaluator = Evaluator::new().with_options(EvalOptions { iteration_limit: 2 });
        assert!(matches!(
            evaluator.eval(&ast, &Activation::new()),
            Err(EvalError::Cel(CelError::IterationLimit { .. }))
        ));
    }

    #[test]
    fn test_struct_requires_factory() {
        assert!(matches!(
            eval("google.protobuf.Duration{seconds: 60}"),
            Err(EvalError::Cel(CelError::Unresolved { .. }))
        ));
    }

    #[test]
    fn test_struct_with_factory() {
        use crate::registry::DynamicMessageFactory;
        let ast = parse("google.protobuf.Duration{seconds: 60, nanos: 0}").unwrap();
        let evaluator =
            Evaluator::with_factory(Arc::new(DynamicMessageFactory::with_well_known_types()));
        let value = evaluator.eval(&ast, &Activation::new()).unwrap();
        assert!(matches!(
            value,
            Value::Duration(d) if d == chrono::Duration::seconds(60)
        ));
    }

    #[test]
    fn test_timestamp_comparison_through_factory() {
        use crate::registry::DynamicMessageFactory;
        let text = "google.protobuf.Timestamp{seconds: 1} < google.protobuf.Timestamp{seconds: 2}";
        let ast = parse(text).unwrap();
        let evaluator =
            Evaluator::with_factory(Arc::new(DynamicMessageFactory::with_well_known_types()));
        let value = evaluator.eval(&ast, &Activation::new()).unwrap();
        assert!(value_equals(&value, &Value::Bool(true)));
    }

    #[test]
    fn test_optional_syntax_unsupported() {
        assert!(matches!(
            eval("[?[1][0]]"),
            Err(EvalError::Unsupported(_))
        ));
    }
}
