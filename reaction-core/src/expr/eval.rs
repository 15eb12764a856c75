//! Formula evaluation.
//!
//! An [`Evaluator`] turns a parsed [`Formula`] plus a set of named input
//! values into a result. The default [`Interpreter`] walks the syntax tree
//! directly. It only sees the bindings it is handed and the locals introduced
//! by function literals, so a formula cannot reach anything else.

use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::ast::{BinaryOp, Expr, FunctionLiteral, Literal, LogicalOp, UnaryOp};
use super::Formula;
use crate::builtins::{self, Builtin};
use crate::config::ReactionConfig;
use crate::error::EvalError;
use crate::value::{format_number, Function, Object, Value};

/// Free-variable name to value, in dependency order.
pub type Bindings = IndexMap<String, Value>;

type Args = SmallVec<[Value; 4]>;

/// Evaluates a formula against its bindings.
pub trait Evaluator {
    fn evaluate(&self, formula: &Formula, bindings: &Bindings) -> Result<Value, EvalError>;
}

/// Tree-walking interpreter for the formula language.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    config: ReactionConfig,
}

impl Interpreter {
    pub fn new(config: ReactionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReactionConfig {
        &self.config
    }
}

impl Evaluator for Interpreter {
    fn evaluate(&self, formula: &Formula, bindings: &Bindings) -> Result<Value, EvalError> {
        let root = Rc::new(Frame {
            vars: bindings.clone(),
            parent: None,
        });
        let mut state = State {
            max_call_depth: self.config.max_call_depth,
            call_depth: 0,
            max_depth: self.config.max_eval_depth,
            depth: 0,
        };
        state.eval(formula.expr(), &root)
    }
}

/// A lexical scope. The root frame holds the bindings.
#[derive(Debug)]
pub struct Frame {
    vars: IndexMap<String, Value>,
    parent: Option<Rc<Frame>>,
}

impl Frame {
    fn lookup(&self, name: &str) -> Option<&Value> {
        let mut frame = self;
        loop {
            if let Some(value) = frame.vars.get(name) {
                return Some(value);
            }
            frame = frame.parent.as_deref()?;
        }
    }
}

/// A function literal together with the scope it was created in.
#[derive(Debug)]
pub struct Closure {
    function: Rc<FunctionLiteral>,
    scope: Rc<Frame>,
}

impl Closure {
    pub fn name(&self) -> Option<&str> {
        self.function.name.as_deref()
    }
}

struct State {
    max_call_depth: usize,
    call_depth: usize,
    /// Nested `eval` calls, across function invocations.
    max_depth: usize,
    depth: usize,
}

impl State {
    fn eval(&mut self, expr: &Expr, frame: &Rc<Frame>) -> Result<Value, EvalError> {
        if self.depth >= self.max_depth {
            return Err(EvalError::DepthExceeded { limit: self.max_depth });
        }
        self.depth += 1;
        let result = self.eval_node(expr, frame);
        self.depth -= 1;
        result
    }

    fn eval_node(&mut self, expr: &Expr, frame: &Rc<Frame>) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.clone()),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
                Literal::Undefined => Value::Undefined,
            }),
            Expr::Ident(name) => frame
                .lookup(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundVariable { name: name.clone() }),
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval(item, frame))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Object(entries) => {
                let mut object = Object::new();
                for (key, value) in entries {
                    let value = self.eval(value, frame)?;
                    object.insert(key.clone(), value);
                }
                Ok(Value::Object(object))
            }
            Expr::Function(function) => Ok(Value::Function(Function::Closure(Rc::new(Closure {
                function: Rc::clone(function),
                scope: Rc::clone(frame),
            })))),
            Expr::Member { object, property } => {
                let target = self.eval(object, frame)?;
                get_member(&target, property)
            }
            Expr::Index { object, index } => {
                let target = self.eval(object, frame)?;
                let key = match self.eval(index, frame)? {
                    Value::Number(n) => format_number(n),
                    other => other.to_display(),
                };
                get_member(&target, &key)
            }
            Expr::Call { callee, args } => self.eval_call(callee, args, frame),
            Expr::New { callee, args } => {
                let constructor = self.eval(callee, frame)?;
                let args = self.eval_args(args, frame)?;
                match constructor {
                    Value::Builtin(builtin) => builtins::construct(builtin, &args),
                    _ => Err(EvalError::type_error(format!(
                        "{} is not a constructor",
                        callee.describe()
                    ))),
                }
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, frame)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::TypeOf => Value::from(value.type_of()),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, frame)?;
                let right = self.eval(right, frame)?;
                Ok(binary(*op, &left, &right))
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, frame)?;
                match (op, left.truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(right, frame),
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, frame)?.truthy() {
                    self.eval(consequent, frame)
                } else {
                    self.eval(alternate, frame)
                }
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr], frame: &Rc<Frame>) -> Result<Args, EvalError> {
        args.iter().map(|arg| self.eval(arg, frame)).collect()
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], frame: &Rc<Frame>) -> Result<Value, EvalError> {
        if let Expr::Member { object, property } = callee {
            let receiver = self.eval(object, frame)?;
            let args = self.eval_args(args, frame)?;
            return self.call_method(receiver, property, args, callee);
        }
        let function = self.eval(callee, frame)?;
        let args = self.eval_args(args, frame)?;
        self.call_value(&function, args, callee)
    }

    fn call_method(&mut self, receiver: Value, name: &str, args: Args, callee: &Expr) -> Result<Value, EvalError> {
        match receiver {
            Value::Array(items) => self.array_method(items, name, args),
            Value::String(text) => string_method(&text, name, &args),
            Value::Date(t) => builtins::date_method(t, name),
            other => {
                let function = get_member(&other, name)?;
                self.call_value(&function, args, callee)
            }
        }
    }

    fn call_value(&mut self, function: &Value, args: Args, callee: &Expr) -> Result<Value, EvalError> {
        match function {
            Value::Function(Function::Native(native)) => builtins::call_native(*native, &args),
            Value::Function(Function::Closure(closure)) => self.call_closure(closure, args),
            Value::Builtin(Builtin::Date) => Ok(builtins::call_date_function()),
            _ => Err(EvalError::type_error(format!("{} is not a function", callee.describe()))),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, args: Args) -> Result<Value, EvalError> {
        if self.call_depth >= self.max_call_depth {
            return Err(EvalError::DepthExceeded {
                limit: self.max_call_depth,
            });
        }
        let function = &closure.function;
        let mut vars = IndexMap::new();
        // A named function expression can refer to itself.
        if let Some(name) = &function.name {
            vars.insert(name.clone(), Value::Function(Function::Closure(Rc::clone(closure))));
        }
        let mut args = args.into_iter();
        for param in &function.params {
            vars.insert(param.clone(), args.next().unwrap_or_default());
        }
        let frame = Rc::new(Frame {
            vars,
            parent: Some(Rc::clone(&closure.scope)),
        });
        self.call_depth += 1;
        let result = self.eval(&function.body, &frame);
        self.call_depth -= 1;
        result
    }

    fn call_callback(&mut self, callback: &Value, args: Args) -> Result<Value, EvalError> {
        match callback {
            Value::Function(Function::Native(native)) => builtins::call_native(*native, &args),
            Value::Function(Function::Closure(closure)) => self.call_closure(closure, args),
            other => Err(EvalError::type_error(format!("{} is not a function", other.to_display()))),
        }
    }

    fn array_method(&mut self, items: Vec<Value>, name: &str, args: Args) -> Result<Value, EvalError> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
        match name {
            "map" => {
                let callback = arg(0);
                let mut mapped = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    mapped.push(self.call_callback(&callback, smallvec::smallvec![item, Value::from(i)])?);
                }
                Ok(Value::Array(mapped))
            }
            "filter" => {
                let callback = arg(0);
                let mut kept = Vec::new();
                for (i, item) in items.into_iter().enumerate() {
                    let keep = self.call_callback(&callback, smallvec::smallvec![item.clone(), Value::from(i)])?;
                    if keep.truthy() {
                        kept.push(item);
                    }
                }
                Ok(Value::Array(kept))
            }
            "reduce" => {
                let callback = arg(0);
                let mut iter = items.into_iter().enumerate();
                let mut acc = match args.get(1) {
                    Some(initial) => initial.clone(),
                    None => match iter.next() {
                        Some((_, first)) => first,
                        None => return Err(EvalError::type_error("Reduce of empty array with no initial value")),
                    },
                };
                for (i, item) in iter {
                    acc = self.call_callback(&callback, smallvec::smallvec![acc, item, Value::from(i)])?;
                }
                Ok(acc)
            }
            "join" => {
                let separator = match args.first() {
                    None | Some(Value::Undefined) => ",".to_string(),
                    Some(sep) => sep.to_display(),
                };
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| if item.is_nullish() { String::new() } else { item.to_display() })
                    .collect();
                Ok(Value::String(parts.join(&separator)))
            }
            "indexOf" => {
                let needle = arg(0);
                let index = items.iter().position(|item| item.strict_equals(&needle));
                Ok(Value::Number(index.map_or(-1.0, |i| i as f64)))
            }
            "includes" => {
                let needle = arg(0);
                Ok(Value::Bool(items.iter().any(|item| item.strict_equals(&needle))))
            }
            _ => Err(EvalError::type_error(format!("array.{} is not a function", name))),
        }
    }
}

fn string_method(text: &str, name: &str, args: &[Value]) -> Result<Value, EvalError> {
    match name {
        "toUpperCase" => Ok(Value::String(text.to_uppercase())),
        "toLowerCase" => Ok(Value::String(text.to_lowercase())),
        "trim" => Ok(Value::String(text.trim().to_string())),
        "includes" => {
            let needle = args.first().map(Value::to_display).unwrap_or_else(|| "undefined".to_string());
            Ok(Value::Bool(text.contains(&needle)))
        }
        _ => Err(EvalError::type_error(format!("string.{} is not a function", name))),
    }
}

/// Property read with the usual rules for each kind of value.
pub fn get_member(target: &Value, name: &str) -> Result<Value, EvalError> {
    match target {
        Value::Undefined | Value::Null => Err(EvalError::type_error(format!(
            "Cannot read properties of {} (reading '{}')",
            target.to_display(),
            name
        ))),
        Value::Object(object) => Ok(object.get(name).cloned().unwrap_or_default()),
        Value::Array(items) => Ok(match name {
            "length" => Value::from(items.len()),
            _ => name
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default(),
        }),
        Value::String(text) => Ok(match name {
            "length" => Value::from(text.chars().count()),
            _ => name
                .parse::<usize>()
                .ok()
                .and_then(|i| text.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_default(),
        }),
        Value::Builtin(builtin) => Ok(builtins::member(*builtin, name)),
        _ => Ok(Value::Undefined),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    let num = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
    match op {
        BinaryOp::Add => {
            if left.prefers_text() || right.prefers_text() {
                Value::String(format!("{}{}", left.to_display(), right.to_display()))
            } else {
                num(|a, b| a + b)
            }
        }
        BinaryOp::Sub => num(|a, b| a - b),
        BinaryOp::Mul => num(|a, b| a * b),
        BinaryOp::Div => num(|a, b| a / b),
        BinaryOp::Rem => num(|a, b| a % b),
        BinaryOp::Lt => Value::Bool(compare(left, right, |o| o.is_lt())),
        BinaryOp::Le => Value::Bool(compare(left, right, |o| o.is_le())),
        BinaryOp::Gt => Value::Bool(compare(left, right, |o| o.is_gt())),
        BinaryOp::Ge => Value::Bool(compare(left, right, |o| o.is_ge())),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNe => Value::Bool(!left.strict_equals(right)),
        BinaryOp::LooseEq => Value::Bool(left.loose_equals(right)),
        BinaryOp::LooseNe => Value::Bool(!left.loose_equals(right)),
    }
}

fn compare(left: &Value, right: &Value, accept: fn(std::cmp::Ordering) -> bool) -> bool {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return accept(a.cmp(b));
    }
    left.to_number()
        .partial_cmp(&right.to_number())
        .is_some_and(accept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_with(source: &str, bindings: &[(&str, Value)]) -> Result<Value, EvalError> {
        let formula = Formula::parse(source, &ReactionConfig::default())?;
        let mut env = Bindings::new();
        for name in formula.free_variables() {
            if let Some(builtin) = builtins::lookup(name) {
                env.insert(name.to_string(), builtin);
            }
        }
        for (name, value) in bindings {
            env.insert(name.to_string(), value.clone());
        }
        Interpreter::default().evaluate(&formula, &env)
    }

    fn eval(source: &str) -> Value {
        eval_with(source, &[]).unwrap()
    }

    #[test]
    fn arithmetic_follows_precedence() {
        assert_eq!(eval("1 + 2 * 3"), Value::from(7));
        assert_eq!(eval("(1 + 2) * 3"), Value::from(9));
        assert_eq!(eval("7 % 4 - -1"), Value::from(4));
        assert_eq!(eval("-7 % 4"), Value::from(-3));
    }

    #[test]
    fn plus_concatenates_text() {
        assert_eq!(eval("'hp: ' + 11"), Value::from("hp: 11"));
        assert_eq!(eval("1 + 2 + '3'"), Value::from("33"));
        assert_eq!(eval("'3' * '4'"), Value::from(12));
    }

    #[test]
    fn undefined_arithmetic_is_nan() {
        let value = eval_with("a + b", &[("a", Value::Undefined), ("b", Value::Undefined)]).unwrap();
        assert!(value.to_number().is_nan());
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval("1 < 2 && 'a' < 'b'"), Value::Bool(true));
        assert_eq!(eval("0 || 'fallback'"), Value::from("fallback"));
        assert_eq!(eval("null == undefined"), Value::Bool(true));
        assert_eq!(eval("null === undefined"), Value::Bool(false));
        assert_eq!(eval("[1] === [1]"), Value::Bool(true));
        assert_eq!(eval("({ a: 1 }) === ({ a: 2 })"), Value::Bool(false));
        assert_eq!(eval("NaN < 1"), Value::Bool(false));
        assert_eq!(eval("typeof 1"), Value::from("number"));
        assert_eq!(eval("true ? 'yes' : 'no'"), Value::from("yes"));
    }

    #[test]
    fn member_access_on_bound_objects() {
        let a = Value::object([("c", 3)]);
        let b = Value::object([("d", 4)]);
        assert_eq!(eval_with("a.c + b. d", &[("a", a), ("b", b)]).unwrap(), Value::from(7));
        assert_eq!(eval("[10, 20][1]"), Value::from(20));
        assert_eq!(eval("({x: 1})['x']"), Value::from(1));
        assert_eq!(eval("'abc'.length"), Value::from(3));
    }

    #[test]
    fn reading_through_undefined_is_a_type_error() {
        let err = eval_with("a.c", &[("a", Value::Undefined)]).unwrap_err();
        assert!(matches!(err, EvalError::TypeError { .. }));
    }

    #[test]
    fn math_namespace() {
        assert_eq!(eval_with("Math.max(con, siz)", &[("con", 10.into()), ("siz", 12.into())]).unwrap(), Value::from(12));
        assert_eq!(eval("Math.floor(Math.PI)"), Value::from(3));
        let err = eval_with("Math.nope(1)", &[]).unwrap_err();
        assert_eq!(err, EvalError::type_error("Math.nope is not a function"));
    }

    #[test]
    fn date_construction() {
        let value = eval("new Date(2000, 0, 1).getTime()");
        assert_eq!(value, Value::from(946_684_800_000_i64));
        assert_eq!(eval("new Date(2000, 0, 1).getFullYear()"), Value::from(2000));
        assert_eq!(eval("+new Date(0)"), Value::from(0));
        assert_eq!(eval("Date.UTC(2000, 0, 1)"), Value::from(946_684_800_000_i64));
        assert!(eval_with("new Math()", &[]).is_err());
    }

    #[test]
    fn function_literals_and_array_methods() {
        assert_eq!(eval("(function (x) { return x * 2; })(21)"), Value::from(42));
        assert_eq!(
            eval_with("xs.map(function (x) { return x * k; })", &[("xs", Value::array([1, 2])), ("k", 3.into())]).unwrap(),
            Value::array([3, 6])
        );
        assert_eq!(eval("[1, 2, 3, 4].filter(function (x) { return x % 2 === 0; })"), Value::array([2, 4]));
        assert_eq!(eval("[1, 2, 3].reduce(function (a, b) { return a + b; }, 0)"), Value::from(6));
        assert_eq!(eval("[1, 2, 3].join('-')"), Value::from("1-2-3"));
        assert_eq!(eval("[1, 2, 3].indexOf(2)"), Value::from(1));
    }

    #[test]
    fn reduce_of_empty_array_without_initial_value_fails() {
        let err = eval_with("[].reduce(function (a, b) { return a + b; })", &[]).unwrap_err();
        assert!(matches!(err, EvalError::TypeError { .. }));
    }

    #[test]
    fn recursion_is_bounded() {
        let source = "(function fact(n) { return n <= 1 ? 1 : n * fact(n - 1); })(5)";
        assert_eq!(eval(source), Value::from(120));

        let formula = Formula::parse("(function f(n) { return f(n + 1); })(0)", &ReactionConfig::default()).unwrap();
        let interpreter = Interpreter::new(ReactionConfig {
            max_call_depth: 8,
            ..ReactionConfig::default()
        });
        let err = interpreter.evaluate(&formula, &Bindings::new()).unwrap_err();
        assert_eq!(err, EvalError::DepthExceeded { limit: 8 });
    }

    #[test]
    fn evaluation_depth_is_bounded_across_calls() {
        let interpreter = Interpreter::new(ReactionConfig {
            max_eval_depth: 32,
            ..ReactionConfig::default()
        });
        let countdown = |n: u32| {
            let source = format!("(function f(n) {{ return n <= 0 ? 0 : 1 + f(n - 1); }})({})", n);
            let formula = Formula::parse(&source, &ReactionConfig::default()).unwrap();
            interpreter.evaluate(&formula, &Bindings::new())
        };

        // Each call nests three evaluations: the conditional, the sum, the call.
        assert_eq!(countdown(5), Ok(Value::from(5)));
        assert_eq!(countdown(20), Err(EvalError::DepthExceeded { limit: 32 }));
    }

    #[test]
    fn unbound_names_are_reported() {
        let formula = Formula::parse("missing + 1", &ReactionConfig::default()).unwrap();
        let err = Interpreter::default().evaluate(&formula, &Bindings::new()).unwrap_err();
        assert_eq!(err, EvalError::UnboundVariable { name: "missing".into() });
    }
}
