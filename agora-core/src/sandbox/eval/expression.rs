use core::fmt;
use std::cmp::Ordering;
use std::time::Instant;

use super::builtins;
use super::context::ExecutionContext;
use super::{EvalError, EvalResult};
use crate::sandbox::ast::{
    BinaryOperator, Expr, IndexExpr, Literal, Program, UnaryOperator,
};

/// Maximum element count a repetition (`'ab' * n`, `[0] * n`) may produce.
pub(crate) const MAX_REPEAT: usize = 100_000;

/// Runtime value type of the sandbox.
///
/// Maps are ordered pairs rather than a hash map so stringified results are
/// deterministic and follow insertion order. Keys are restricted to strings.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Map(Vec<(String, Value)>),
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.repr()),
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "str",
            Value::Boolean(_) => "bool",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "dict",
            Value::Null => "NoneType",
        }
    }

    /// Source-style rendering: strings quoted, containers recursive.
    pub fn repr(&self) -> String {
        match self {
            Value::Integer(i) => i.to_string(),
            Value::Float(v) => format_float(*v),
            Value::String(s) => repr_string(s),
            Value::Boolean(true) => "True".to_string(),
            Value::Boolean(false) => "False".to_string(),
            Value::Null => "None".to_string(),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                if inner.len() == 1 {
                    format!("({},)", inner[0])
                } else {
                    format!("({})", inner.join(", "))
                }
            }
            Value::Map(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", repr_string(k), v.repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }

    /// Source-language truthiness, used only by the `bool` builtin; boolean
    /// operators themselves require real booleans.
    pub(crate) fn truthy(&self) -> bool {
        match self {
            Value::Integer(i) => *i != 0,
            Value::Float(v) => *v != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Boolean(b) => *b,
            Value::List(items) | Value::Tuple(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Null => false,
        }
    }
}

fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

fn repr_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Deep equality with numeric cross-type coercion (`1 == 1.0`).
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(l), Value::Float(r)) | (Value::Float(r), Value::Integer(l)) => {
            *l as f64 == *r
        }
        (Value::List(l), Value::List(r)) | (Value::Tuple(l), Value::Tuple(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(a, b)| values_equal(a, b))
        }
        (Value::Map(l), Value::Map(r)) => {
            l.len() == r.len()
                && l.iter().all(|(k, v)| {
                    r.iter()
                        .find(|(rk, _)| rk == k)
                        .is_some_and(|(_, rv)| values_equal(v, rv))
                })
        }
        _ => left == right,
    }
}

/// Ordering for numbers and strings; anything else is a type fault.
pub(crate) fn compare_values(left: &Value, right: &Value) -> EvalResult<Ordering> {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => Ok(l.cmp(r)),
        (Value::Float(l), Value::Float(r)) => l
            .partial_cmp(r)
            .ok_or_else(|| EvalError::Type("cannot compare NaN".to_string())),
        (Value::Integer(l), Value::Float(r)) => (*l as f64)
            .partial_cmp(r)
            .ok_or_else(|| EvalError::Type("cannot compare NaN".to_string())),
        (Value::Float(l), Value::Integer(r)) => l
            .partial_cmp(&(*r as f64))
            .ok_or_else(|| EvalError::Type("cannot compare NaN".to_string())),
        (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
        _ => Err(EvalError::Type(format!(
            "cannot compare '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// Materializes an iterable value: strings yield one-character strings, maps
/// yield their keys.
pub(crate) fn iter_values(value: &Value) -> EvalResult<Vec<Value>> {
    match value {
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::List(items) | Value::Tuple(items) => Ok(items.clone()),
        Value::Map(entries) => Ok(entries
            .iter()
            .map(|(k, _)| Value::String(k.clone()))
            .collect()),
        other => Err(EvalError::Type(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

pub(crate) fn as_bool(value: Value) -> EvalResult<bool> {
    match value {
        Value::Boolean(b) => Ok(b),
        other => Err(EvalError::Type(format!(
            "expected a boolean condition, got '{}'",
            other.type_name()
        ))),
    }
}

/// Resource limits for a single evaluation call.
#[derive(Debug, Clone, Copy)]
pub struct EvalLimits {
    pub max_steps: u64,
    pub deadline: Instant,
}

/// Outcome of evaluating one submission, before stringification and the
/// output ceiling are applied by the facade.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    pub value: Value,
    /// Present for the policy-gated `name = expr` form.
    pub binding: Option<(String, Value)>,
}

pub struct ExpressionEvaluator<'a> {
    context: &'a ExecutionContext,
    limits: EvalLimits,
    steps_used: u64,
    // Comprehension bindings, innermost last.
    scopes: Vec<(String, Value)>,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(context: &'a ExecutionContext, limits: EvalLimits) -> Self {
        Self {
            context,
            limits,
            steps_used: 0,
            scopes: Vec::new(),
        }
    }

    pub fn eval_program(&mut self, program: &Program) -> EvalResult<Evaluated> {
        match program {
            Program::Expr(expr) => Ok(Evaluated {
                value: self.eval_expr(expr)?,
                binding: None,
            }),
            Program::Binding { name, value } => {
                let value = self.eval_expr(value)?;
                Ok(Evaluated {
                    value: value.clone(),
                    binding: Some((name.clone(), value)),
                })
            }
            Program::Assert(expr) => match self.eval_expr(expr)? {
                Value::Boolean(true) => Ok(Evaluated {
                    value: Value::Boolean(true),
                    binding: None,
                }),
                Value::Boolean(false) => Err(EvalError::AssertionFailed),
                other => Err(EvalError::Type(format!(
                    "assertion requires a boolean, got '{}'",
                    other.type_name()
                ))),
            },
        }
    }

    pub fn eval_expr(&mut self, expr: &Expr) -> EvalResult<Value> {
        self.tick()?;
        match expr {
            Expr::Literal(lit) => Ok(Self::eval_literal(lit)),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => {
                let values = self.eval_all(items)?;
                Ok(Value::List(values))
            }
            Expr::Tuple(items) => {
                let values = self.eval_all(items)?;
                Ok(Value::Tuple(values))
            }
            Expr::Map(entries) => self.eval_map(entries),
            Expr::UnaryOp { op, operand } => self.eval_unary_op(*op, operand),
            Expr::BinaryOp { op, left, right } => self.eval_binary_op(*op, left, right),
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                if as_bool(self.eval_expr(condition)?)? {
                    self.eval_expr(then_branch)
                } else {
                    self.eval_expr(else_branch)
                }
            }
            Expr::Index { value, index } => self.eval_index(value, index),
            Expr::Call {
                function,
                arguments,
            } => {
                let args = self.eval_all(arguments)?;
                builtins::call_function(function, &args)
            }
            Expr::MethodCall {
                receiver,
                method,
                arguments,
            } => {
                let receiver = self.eval_expr(receiver)?;
                let args = self.eval_all(arguments)?;
                builtins::call_method(&receiver, method, &args)
            }
            // The validator rejects these; kept as a hard stop in depth.
            Expr::Attribute { .. } => Err(EvalError::Internal(
                "attribute access is not permitted".to_string(),
            )),
            Expr::ListComp {
                element,
                binding,
                iterable,
                condition,
            } => self.eval_list_comp(element, binding, iterable, condition.as_deref()),
        }
    }

    fn tick(&mut self) -> EvalResult<()> {
        self.steps_used += 1;
        if self.steps_used > self.limits.max_steps || Instant::now() >= self.limits.deadline {
            return Err(EvalError::Timeout);
        }
        Ok(())
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> EvalResult<Vec<Value>> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(self.eval_expr(expr)?);
        }
        Ok(values)
    }

    fn eval_literal(lit: &Literal) -> Value {
        match lit {
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(v) => Value::Float(*v),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Null => Value::Null,
        }
    }

    fn lookup(&self, name: &str) -> EvalResult<Value> {
        if let Some((_, value)) = self.scopes.iter().rev().find(|(n, _)| n == name) {
            return Ok(value.clone());
        }
        self.context
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::Name(name.to_string()))
    }

    fn eval_map(&mut self, entries: &[(Expr, Expr)]) -> EvalResult<Value> {
        let mut map: Vec<(String, Value)> = Vec::with_capacity(entries.len());
        for (key_expr, value_expr) in entries {
            let key = match self.eval_expr(key_expr)? {
                Value::String(s) => s,
                other => {
                    return Err(EvalError::Type(format!(
                        "map keys must be strings, got '{}'",
                        other.type_name()
                    )));
                }
            };
            let value = self.eval_expr(value_expr)?;
            if let Some(entry) = map.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
            } else {
                map.push((key, value));
            }
        }
        Ok(Value::Map(map))
    }

    fn eval_unary_op(&mut self, op: UnaryOperator, operand: &Expr) -> EvalResult<Value> {
        let value = self.eval_expr(operand)?;
        match (op, value) {
            (UnaryOperator::Negate, Value::Integer(i)) => Ok(Value::Integer(-i)),
            (UnaryOperator::Negate, Value::Float(v)) => Ok(Value::Float(-v)),
            (UnaryOperator::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
            (op, value) => Err(EvalError::Type(format!(
                "bad operand type for {:?}: '{}'",
                op,
                value.type_name()
            ))),
        }
    }

    fn eval_binary_op(
        &mut self,
        op: BinaryOperator,
        left: &Expr,
        right: &Expr,
    ) -> EvalResult<Value> {
        let left = self.eval_expr(left)?;
        let right = self.eval_expr(right)?;

        match op {
            BinaryOperator::Add => self.eval_add(&left, &right),
            BinaryOperator::Subtract => self.eval_subtract(&left, &right),
            BinaryOperator::Multiply => self.eval_multiply(&left, &right),
            BinaryOperator::Divide => self.eval_divide(&left, &right),
            BinaryOperator::FloorDivide => self.eval_floor_divide(&left, &right),
            BinaryOperator::Modulo => self.eval_modulo(&left, &right),
            BinaryOperator::Power => self.eval_power(&left, &right),
            BinaryOperator::Equal => Ok(Value::Boolean(values_equal(&left, &right))),
            BinaryOperator::NotEqual => Ok(Value::Boolean(!values_equal(&left, &right))),
            BinaryOperator::LessThan => {
                compare_values(&left, &right).map(|o| Value::Boolean(o.is_lt()))
            }
            BinaryOperator::LessThanEqual => {
                compare_values(&left, &right).map(|o| Value::Boolean(o.is_le()))
            }
            BinaryOperator::GreaterThan => {
                compare_values(&left, &right).map(|o| Value::Boolean(o.is_gt()))
            }
            BinaryOperator::GreaterThanEqual => {
                compare_values(&left, &right).map(|o| Value::Boolean(o.is_ge()))
            }
            BinaryOperator::And => match (left, right) {
                (Value::Boolean(l), Value::Boolean(r)) => Ok(Value::Boolean(l && r)),
                (l, r) => Err(EvalError::Type(format!(
                    "'and' requires booleans, got '{}' and '{}'",
                    l.type_name(),
                    r.type_name()
                ))),
            },
            BinaryOperator::Or => match (left, right) {
                (Value::Boolean(l), Value::Boolean(r)) => Ok(Value::Boolean(l || r)),
                (l, r) => Err(EvalError::Type(format!(
                    "'or' requires booleans, got '{}' and '{}'",
                    l.type_name(),
                    r.type_name()
                ))),
            },
            BinaryOperator::In => self.eval_membership(&left, &right),
            BinaryOperator::NotIn => self.eval_membership(&left, &right).map(|v| match v {
                Value::Boolean(b) => Value::Boolean(!b),
                other => other,
            }),
        }
    }

    fn eval_add(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l + r)),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l + r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 + r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l + *r as f64)),
            (Value::String(l), Value::String(r)) => Ok(Value::String(l.clone() + r)),
            (Value::List(l), Value::List(r)) => {
                let mut items = l.clone();
                items.extend(r.clone());
                Ok(Value::List(items))
            }
            (Value::Tuple(l), Value::Tuple(r)) => {
                let mut items = l.clone();
                items.extend(r.clone());
                Ok(Value::Tuple(items))
            }
            _ => Err(self.binary_type_error("+", left, right)),
        }
    }

    fn eval_subtract(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l - r)),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l - r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 - r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l - *r as f64)),
            _ => Err(self.binary_type_error("-", left, right)),
        }
    }

    fn eval_multiply(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l * r)),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l * r)),
            (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 * r)),
            (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(l * *r as f64)),
            (Value::String(s), Value::Integer(n)) | (Value::Integer(n), Value::String(s)) => {
                repeat_guard(s.chars().count(), *n)?;
                Ok(Value::String(s.repeat(*n.max(&0) as usize)))
            }
            (Value::List(items), Value::Integer(n)) | (Value::Integer(n), Value::List(items)) => {
                repeat_guard(items.len(), *n)?;
                let mut result = Vec::new();
                for _ in 0..*n.max(&0) {
                    result.extend(items.clone());
                }
                Ok(Value::List(result))
            }
            _ => Err(self.binary_type_error("*", left, right)),
        }
    }

    fn eval_divide(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        let (l, r) = self.numeric_operands("/", left, right)?;
        if r == 0.0 {
            return Err(EvalError::Type("division by zero".to_string()));
        }
        Ok(Value::Float(l / r))
    }

    fn eval_floor_divide(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => {
                if *r == 0 {
                    return Err(EvalError::Type("division by zero".to_string()));
                }
                Ok(Value::Integer(floor_div(*l, *r)))
            }
            _ => {
                let (l, r) = self.numeric_operands("//", left, right)?;
                if r == 0.0 {
                    return Err(EvalError::Type("division by zero".to_string()));
                }
                Ok(Value::Float((l / r).floor()))
            }
        }
    }

    fn eval_modulo(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => {
                if *r == 0 {
                    return Err(EvalError::Type("division by zero".to_string()));
                }
                Ok(Value::Integer(floor_mod(*l, *r)))
            }
            _ => {
                let (l, r) = self.numeric_operands("%", left, right)?;
                if r == 0.0 {
                    return Err(EvalError::Type("division by zero".to_string()));
                }
                Ok(Value::Float(l - r * (l / r).floor()))
            }
        }
    }

    fn eval_power(&self, left: &Value, right: &Value) -> EvalResult<Value> {
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => {
                if *r < 0 {
                    return Ok(Value::Float((*l as f64).powi(*r as i32)));
                }
                let exponent = u32::try_from(*r)
                    .map_err(|_| EvalError::Type("exponent too large".to_string()))?;
                l.checked_pow(exponent)
                    .map(Value::Integer)
                    .ok_or_else(|| EvalError::Type("integer overflow in power".to_string()))
            }
            _ => {
                let (l, r) = self.numeric_operands("**", left, right)?;
                Ok(Value::Float(l.powf(r)))
            }
        }
    }

    fn eval_membership(&self, needle: &Value, haystack: &Value) -> EvalResult<Value> {
        match (needle, haystack) {
            (Value::String(n), Value::String(h)) => Ok(Value::Boolean(h.contains(n))),
            (n, Value::List(items)) | (n, Value::Tuple(items)) => {
                Ok(Value::Boolean(items.iter().any(|v| values_equal(v, n))))
            }
            (Value::String(n), Value::Map(entries)) => {
                Ok(Value::Boolean(entries.iter().any(|(k, _)| k == n)))
            }
            (n, h) => Err(EvalError::Type(format!(
                "'in' requires a string, list, tuple or dict container, got '{}' in '{}'",
                n.type_name(),
                h.type_name()
            ))),
        }
    }

    fn eval_index(&mut self, value: &Expr, index: &IndexExpr) -> EvalResult<Value> {
        let value = self.eval_expr(value)?;
        match index {
            IndexExpr::Single(index_expr) => {
                let index = self.eval_expr(index_expr)?;
                match (&value, &index) {
                    (Value::Map(entries), Value::String(key)) => entries
                        .iter()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| EvalError::Type(format!("key '{}' not found", key))),
                    (_, Value::Integer(i)) => self.index_sequence(&value, *i),
                    _ => Err(EvalError::Type(format!(
                        "'{}' indices must be integers, got '{}'",
                        value.type_name(),
                        index.type_name()
                    ))),
                }
            }
            IndexExpr::Slice { start, stop, step } => {
                let start = self.eval_slice_bound(start.as_ref())?;
                let stop = self.eval_slice_bound(stop.as_ref())?;
                let step = self.eval_slice_bound(step.as_ref())?.unwrap_or(1);
                if step == 0 {
                    return Err(EvalError::Type("slice step cannot be zero".to_string()));
                }
                self.slice_sequence(&value, start, stop, step)
            }
        }
    }

    fn eval_slice_bound(&mut self, bound: Option<&Expr>) -> EvalResult<Option<i64>> {
        match bound {
            None => Ok(None),
            Some(expr) => match self.eval_expr(expr)? {
                Value::Integer(i) => Ok(Some(i)),
                other => Err(EvalError::Type(format!(
                    "slice indices must be integers, got '{}'",
                    other.type_name()
                ))),
            },
        }
    }

    fn index_sequence(&self, value: &Value, index: i64) -> EvalResult<Value> {
        let items: Vec<Value> = match value {
            Value::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                let idx = normalize_index(index, chars.len())?;
                return Ok(Value::String(chars[idx].to_string()));
            }
            Value::List(items) | Value::Tuple(items) => items.clone(),
            other => {
                return Err(EvalError::Type(format!(
                    "'{}' object is not subscriptable",
                    other.type_name()
                )));
            }
        };
        let idx = normalize_index(index, items.len())?;
        Ok(items[idx].clone())
    }

    fn slice_sequence(
        &self,
        value: &Value,
        start: Option<i64>,
        stop: Option<i64>,
        step: i64,
    ) -> EvalResult<Value> {
        match value {
            Value::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                let indices = slice_indices(chars.len(), start, stop, step);
                Ok(Value::String(indices.into_iter().map(|i| chars[i]).collect()))
            }
            Value::List(items) => {
                let indices = slice_indices(items.len(), start, stop, step);
                Ok(Value::List(
                    indices.into_iter().map(|i| items[i].clone()).collect(),
                ))
            }
            Value::Tuple(items) => {
                let indices = slice_indices(items.len(), start, stop, step);
                Ok(Value::Tuple(
                    indices.into_iter().map(|i| items[i].clone()).collect(),
                ))
            }
            other => Err(EvalError::Type(format!(
                "'{}' object cannot be sliced",
                other.type_name()
            ))),
        }
    }

    fn eval_list_comp(
        &mut self,
        element: &Expr,
        binding: &str,
        iterable: &Expr,
        condition: Option<&Expr>,
    ) -> EvalResult<Value> {
        let source = self.eval_expr(iterable)?;
        let items = iter_values(&source)?;

        let mut results = Vec::new();
        for item in items {
            self.tick()?;
            self.scopes.push((binding.to_string(), item));
            let keep = match condition {
                None => Ok(true),
                Some(cond) => self.eval_expr(cond).and_then(as_bool),
            };
            let value = match keep {
                Ok(true) => self.eval_expr(element).map(Some),
                Ok(false) => Ok(None),
                Err(e) => Err(e),
            };
            self.scopes.pop();
            if let Some(value) = value? {
                results.push(value);
            }
        }
        Ok(Value::List(results))
    }

    fn numeric_operands(
        &self,
        op: &str,
        left: &Value,
        right: &Value,
    ) -> EvalResult<(f64, f64)> {
        let l = match left {
            Value::Integer(i) => *i as f64,
            Value::Float(v) => *v,
            _ => return Err(self.binary_type_error(op, left, right)),
        };
        let r = match right {
            Value::Integer(i) => *i as f64,
            Value::Float(v) => *v,
            _ => return Err(self.binary_type_error(op, left, right)),
        };
        Ok((l, r))
    }

    fn binary_type_error(&self, op: &str, left: &Value, right: &Value) -> EvalError {
        EvalError::Type(format!(
            "unsupported operand types for {}: '{}' and '{}'",
            op,
            left.type_name(),
            right.type_name()
        ))
    }
}

fn repeat_guard(unit_len: usize, count: i64) -> EvalResult<()> {
    let count = count.max(0) as usize;
    if unit_len.saturating_mul(count) > MAX_REPEAT {
        return Err(EvalError::Type("repetition result too large".to_string()));
    }
    Ok(())
}

fn normalize_index(index: i64, len: usize) -> EvalResult<usize> {
    let len = len as i64;
    let adjusted = if index < 0 { index + len } else { index };
    if adjusted < 0 || adjusted >= len {
        return Err(EvalError::Type("index out of range".to_string()));
    }
    Ok(adjusted as usize)
}

/// Source-language slice semantics including negative bounds and steps.
fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let mut indices = Vec::new();

    if step > 0 {
        let start = clamp_bound(start.unwrap_or(0), len, 0, len);
        let stop = clamp_bound(stop.unwrap_or(len), len, 0, len);
        let mut i = start;
        while i < stop {
            indices.push(i as usize);
            i += step;
        }
    } else {
        let start = clamp_bound(start.unwrap_or(len - 1), len, -1, len - 1);
        let stop = clamp_bound(stop.unwrap_or(-len - 1), len, -1, len - 1);
        let mut i = start;
        while i > stop {
            indices.push(i as usize);
            i += step;
        }
    }
    indices
}

fn clamp_bound(bound: i64, len: i64, min: i64, max: i64) -> i64 {
    let adjusted = if bound < 0 { bound + len } else { bound };
    adjusted.clamp(min, max)
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q }
}

fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) { r + b } else { r }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sandbox::parser;
    use crate::sandbox::tokenizer::{Token, Tokenizer};

    fn eval_with_context(source: &str, context: &ExecutionContext) -> EvalResult<Value> {
        let tokens: Vec<Token> = Tokenizer::new()
            .tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|ts| ts.token)
            .filter(Token::is_significant)
            .collect();
        let program = parser::parse(&tokens).expect("parse");
        let limits = EvalLimits {
            max_steps: 100_000,
            deadline: Instant::now() + Duration::from_millis(200),
        };
        ExpressionEvaluator::new(context, limits)
            .eval_program(&program)
            .map(|e| e.value)
    }

    fn eval(source: &str) -> EvalResult<Value> {
        eval_with_context(source, &ExecutionContext::new())
    }

    #[test]
    fn test_string_reversal() {
        assert_eq!(
            eval("'NcS9euQa'[::-1]").unwrap(),
            Value::String("aQue9ScN".to_string())
        );
    }

    #[test]
    fn test_split_and_index() {
        assert_eq!(
            eval("'apple,banana,cherry'.split(',')[1]").unwrap(),
            Value::String("banana".to_string())
        );
    }

    #[test]
    fn test_slices() {
        assert_eq!(eval("'abcdef'[1:4]").unwrap(), Value::String("bcd".to_string()));
        assert_eq!(eval("'abcdef'[:2]").unwrap(), Value::String("ab".to_string()));
        assert_eq!(eval("'abcdef'[-2:]").unwrap(), Value::String("ef".to_string()));
        assert_eq!(eval("'abcdef'[::2]").unwrap(), Value::String("ace".to_string()));
        assert_eq!(
            eval("[1, 2, 3, 4][1:3]").unwrap(),
            Value::List(vec![Value::Integer(2), Value::Integer(3)])
        );
        assert_eq!(eval("'abc'[10:]").unwrap(), Value::String(String::new()));
    }

    #[test]
    fn test_negative_index() {
        assert_eq!(eval("'abc'[-1]").unwrap(), Value::String("c".to_string()));
        assert!(matches!(eval("'abc'[5]"), Err(EvalError::Type(_))));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Integer(7));
        assert_eq!(eval("7 // 2").unwrap(), Value::Integer(3));
        assert_eq!(eval("-7 // 2").unwrap(), Value::Integer(-4));
        assert_eq!(eval("-7 % 2").unwrap(), Value::Integer(1));
        assert_eq!(eval("2 ** 10").unwrap(), Value::Integer(1024));
        assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(eval("1 / 0"), Err(EvalError::Type(_))));
        assert!(matches!(eval("1 // 0"), Err(EvalError::Type(_))));
        assert!(matches!(eval("1 % 0"), Err(EvalError::Type(_))));
    }

    #[test]
    fn test_string_operations() {
        assert_eq!(
            eval("'ab' + 'cd'").unwrap(),
            Value::String("abcd".to_string())
        );
        assert_eq!(eval("'ab' * 3").unwrap(), Value::String("ababab".to_string()));
        assert!(matches!(eval("'ab' - 'a'"), Err(EvalError::Type(_))));
    }

    #[test]
    fn test_comparisons_and_booleans() {
        assert_eq!(eval("1 < 2").unwrap(), Value::Boolean(true));
        assert_eq!(eval("1 == 1.0").unwrap(), Value::Boolean(true));
        assert_eq!(eval("'a' < 'b'").unwrap(), Value::Boolean(true));
        assert_eq!(eval("1 < 2 and 2 < 3").unwrap(), Value::Boolean(true));
        assert_eq!(eval("not 1 == 2").unwrap(), Value::Boolean(true));
        assert!(matches!(eval("1 and 2"), Err(EvalError::Type(_))));
    }

    #[test]
    fn test_membership() {
        assert_eq!(eval("'an' in 'banana'").unwrap(), Value::Boolean(true));
        assert_eq!(eval("3 in [1, 2, 3]").unwrap(), Value::Boolean(true));
        assert_eq!(eval("'x' not in 'abc'").unwrap(), Value::Boolean(true));
        assert_eq!(eval("'k' in {'k': 1}").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_conditional_expression() {
        assert_eq!(eval("'yes' if 2 > 1 else 'no'").unwrap(), Value::String("yes".to_string()));
        assert_eq!(eval("'yes' if 1 > 2 else 'no'").unwrap(), Value::String("no".to_string()));
    }

    #[test]
    fn test_list_comprehension() {
        assert_eq!(
            eval("[x * 2 for x in [1, 2, 3]]").unwrap(),
            Value::List(vec![Value::Integer(2), Value::Integer(4), Value::Integer(6)])
        );
        assert_eq!(
            eval("[x for x in [1, 2, 3, 4] if x % 2 == 0]").unwrap(),
            Value::List(vec![Value::Integer(2), Value::Integer(4)])
        );
        // The binding is scoped to the comprehension
        assert!(matches!(
            eval("[x for x in [1]] + [x]"),
            Err(EvalError::Name(_))
        ));
    }

    #[test]
    fn test_name_resolution() {
        let mut context = ExecutionContext::new();
        context.set("last_result", Value::String("aQue9ScN".to_string()));
        assert_eq!(
            eval_with_context("last_result.upper()", &context).unwrap(),
            Value::String("AQUE9SCN".to_string())
        );

        assert!(matches!(
            eval("last_result + '!'"),
            Err(EvalError::Name(name)) if name == "last_result"
        ));
    }

    #[test]
    fn test_binding_form() {
        let context = ExecutionContext::new();
        let tokens: Vec<Token> = Tokenizer::new()
            .tokenize("total = 2 + 3")
            .unwrap()
            .into_iter()
            .map(|ts| ts.token)
            .filter(Token::is_significant)
            .collect();
        let program = parser::parse(&tokens).unwrap();
        let limits = EvalLimits {
            max_steps: 1_000,
            deadline: Instant::now() + Duration::from_millis(200),
        };
        let evaluated = ExpressionEvaluator::new(&context, limits)
            .eval_program(&program)
            .unwrap();
        assert_eq!(evaluated.value, Value::Integer(5));
        assert_eq!(
            evaluated.binding,
            Some(("total".to_string(), Value::Integer(5)))
        );
    }

    #[test]
    fn test_assert_form() {
        assert_eq!(eval("assert 1 + 1 == 2").unwrap(), Value::Boolean(true));
        assert_eq!(eval("assert 1 == 2"), Err(EvalError::AssertionFailed));
        assert!(matches!(eval("assert 'x'"), Err(EvalError::Type(_))));
    }

    #[test]
    fn test_step_budget_exhaustion() {
        let context = ExecutionContext::new();
        let tokens: Vec<Token> = Tokenizer::new()
            .tokenize("[x * 2 for x in range(1000)]")
            .unwrap()
            .into_iter()
            .map(|ts| ts.token)
            .filter(Token::is_significant)
            .collect();
        let program = parser::parse(&tokens).unwrap();
        let limits = EvalLimits {
            max_steps: 50,
            deadline: Instant::now() + Duration::from_secs(10),
        };
        let result = ExpressionEvaluator::new(&context, limits).eval_program(&program);
        assert_eq!(result, Err(EvalError::Timeout));
    }

    #[test]
    fn test_repetition_guard() {
        assert!(matches!(eval("'ab' * 999999"), Err(EvalError::Type(_))));
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(eval("str([1, 'a', True, None])").unwrap().to_string(), "[1, 'a', True, None]");
        assert_eq!(eval("4 / 2").unwrap().to_string(), "2.0");
        assert_eq!(eval("(1,)").unwrap().to_string(), "(1,)");
        assert_eq!(
            eval("{'a': 1, 'b': 'x'}").unwrap().to_string(),
            "{'a': 1, 'b': 'x'}"
        );
    }

    #[test]
    fn test_map_literal_semantics() {
        // Later duplicate keys win, insertion order is preserved
        assert_eq!(
            eval("{'a': 1, 'b': 2, 'a': 3}").unwrap().to_string(),
            "{'a': 3, 'b': 2}"
        );
        assert!(matches!(eval("{1: 'a'}"), Err(EvalError::Type(_))));
    }

    #[test]
    fn test_attribute_never_evaluates() {
        assert!(matches!(eval("'a'.shape"), Err(EvalError::Internal(_))));
    }
}
