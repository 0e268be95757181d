use std::sync::LazyLock;

use itertools::Itertools;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;

use super::error::EvalError;
use crate::{number::Number, range::Range, trace::TraceLevel, value::Value};

type FunctionName = String;

/// Ceiling on the length of lists built by `RANGE`.
const MAX_RANGE_LEN: usize = 10_000_000;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("Invalid types for \"{0}\"")]
    InvalidTypes(FunctionName, Vec<&'static str>),
    #[error("Invalid number of arguments in \"{0}\", expected {1}, got {2}")]
    InvalidNumberOfArguments(FunctionName, u8, u8),
    #[error("Invalid argument for \"{0}\": {1}")]
    InvalidArgument(FunctionName, String),
}

impl Error {
    pub fn to_eval_error(self, range: Range) -> EvalError {
        match self {
            Error::InvalidTypes(name, args) => EvalError::InvalidTypes {
                range,
                name,
                args: args.into_iter().map(SmolStr::new_static).collect(),
            },
            Error::InvalidNumberOfArguments(name, expected, got) => {
                EvalError::InvalidNumberOfArguments(range, name, expected as usize, got as usize)
            }
            Error::InvalidArgument(name, message) => EvalError::InvalidArgument(range, name, message),
        }
    }
}

#[derive(Clone, Debug)]
pub enum ParamNum {
    Fixed(u8),
    Range(u8, u8),
}

impl ParamNum {
    pub fn to_num(&self) -> u8 {
        match self {
            ParamNum::Fixed(n) => *n,
            ParamNum::Range(min, _) => *min,
        }
    }

    #[inline(always)]
    pub fn is_valid(&self, num_args: usize) -> bool {
        match self {
            ParamNum::Fixed(n) => num_args == *n as usize,
            ParamNum::Range(min, max) => num_args >= *min as usize && num_args <= *max as usize,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BuiltinFunction {
    pub num_params: ParamNum,
    pub func: fn(&str, &[Value]) -> Result<Value, Error>,
}

impl BuiltinFunction {
    pub fn new(num_params: ParamNum, func: fn(&str, &[Value]) -> Result<Value, Error>) -> Self {
        BuiltinFunction { num_params, func }
    }
}

#[inline(always)]
fn invalid_types(name: &str, args: &[Value]) -> Error {
    Error::InvalidTypes(
        name.to_string(),
        args.iter().map(Value::type_name).collect(),
    )
}

fn number_fn(name: &str, args: &[Value], f: fn(Number) -> Number) -> Result<Value, Error> {
    match args {
        [Value::Number(n)] => Ok(Value::Number(f(*n))),
        _ => Err(invalid_types(name, args)),
    }
}

fn string_fn(name: &str, args: &[Value], f: fn(&str) -> String) -> Result<Value, Error> {
    match args {
        [Value::String(s)] => Ok(Value::String(f(s))),
        _ => Err(invalid_types(name, args)),
    }
}

fn fold_numbers(
    name: &str,
    args: &[Value],
    pick: fn(Number, Number) -> Number,
) -> Result<Value, Error> {
    let values = match args {
        [Value::List(list)] => list.as_slice(),
        _ => args,
    };

    values
        .iter()
        .map(|value| match value {
            Value::Number(n) => Ok(*n),
            _ => Err(invalid_types(name, values)),
        })
        .reduce(|acc, n| Ok(pick(acc?, n?)))
        .unwrap_or_else(|| {
            Err(Error::InvalidArgument(
                name.to_string(),
                "expected at least one number".to_string(),
            ))
        })
        .map(Value::Number)
}

fn range(name: &str, args: &[Value]) -> Result<Value, Error> {
    let (start, end, step) = match args {
        [Value::Number(end)] => (0.0, end.value(), 1.0),
        [Value::Number(start), Value::Number(end)] => (start.value(), end.value(), 1.0),
        [Value::Number(start), Value::Number(end), Value::Number(step)] => {
            (start.value(), end.value(), step.value())
        }
        _ => return Err(invalid_types(name, args)),
    };

    if step == 0.0 || !step.is_finite() || !start.is_finite() || !end.is_finite() {
        return Err(Error::InvalidArgument(
            name.to_string(),
            "bounds must be finite and step must be non-zero".to_string(),
        ));
    }

    let len = ((end - start) / step).ceil().max(0.0);
    if len > MAX_RANGE_LEN as f64 {
        return Err(Error::InvalidArgument(
            name.to_string(),
            format!("range is longer than {} elements", MAX_RANGE_LEN),
        ));
    }

    Ok(Value::List(
        (0..len as usize)
            .map(|i| Value::from(start + step * i as f64))
            .collect(),
    ))
}

fn to_number(name: &str, args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::Number(n)] => Ok(Value::Number(*n)),
        [Value::Bool(b)] => Ok(Value::from(if *b { 1 } else { 0 })),
        [Value::String(s)] => s.trim().parse::<f64>().map(Value::from).map_err(|_| {
            Error::InvalidArgument(name.to_string(), format!("cannot convert {:?} to a number", s))
        }),
        _ => Err(invalid_types(name, args)),
    }
}

fn length(name: &str, args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::String(s)] => Ok(Value::from(s.chars().count())),
        [Value::List(list)] => Ok(Value::from(list.len())),
        [Value::Map(map)] => Ok(Value::from(map.len())),
        _ => Err(invalid_types(name, args)),
    }
}

pub static BUILTIN_FUNCTIONS: LazyLock<FxHashMap<&'static str, BuiltinFunction>> =
    LazyLock::new(|| {
        let mut map = FxHashMap::default();

        map.insert("LEN", BuiltinFunction::new(ParamNum::Fixed(1), length));
        map.insert("LENGTH", BuiltinFunction::new(ParamNum::Fixed(1), length));
        map.insert(
            "PUSH",
            BuiltinFunction::new(ParamNum::Fixed(2), |name, args| match args {
                [Value::List(list), value] => {
                    let mut list = list.clone();
                    list.push(value.clone());
                    Ok(Value::List(list))
                }
                _ => Err(invalid_types(name, args)),
            }),
        );
        map.insert(
            "KEYS",
            BuiltinFunction::new(ParamNum::Fixed(1), |name, args| match args {
                [Value::Map(map)] => Ok(Value::List(
                    map.keys().map(|key| Value::String(key.clone())).collect(),
                )),
                _ => Err(invalid_types(name, args)),
            }),
        );
        map.insert(
            "VALUES",
            BuiltinFunction::new(ParamNum::Fixed(1), |name, args| match args {
                [Value::Map(map)] => Ok(Value::List(map.values().cloned().collect())),
                _ => Err(invalid_types(name, args)),
            }),
        );
        map.insert(
            "HAS_KEY",
            BuiltinFunction::new(ParamNum::Fixed(2), |name, args| match args {
                [Value::Map(map), Value::String(key)] => Ok(Value::Bool(map.contains_key(key))),
                _ => Err(invalid_types(name, args)),
            }),
        );
        map.insert(
            "CONTAINS",
            BuiltinFunction::new(ParamNum::Fixed(2), |name, args| match args {
                [Value::List(list), value] => Ok(Value::Bool(list.contains(value))),
                [Value::String(s), Value::String(sub)] => Ok(Value::Bool(s.contains(sub.as_str()))),
                [Value::Map(map), Value::String(key)] => Ok(Value::Bool(map.contains_key(key))),
                _ => Err(invalid_types(name, args)),
            }),
        );
        map.insert(
            "TYPE_OF",
            BuiltinFunction::new(ParamNum::Fixed(1), |_, args| {
                Ok(args
                    .first()
                    .map(|value| Value::from(value.type_name()))
                    .unwrap_or_default())
            }),
        );
        map.insert(
            "TO_STRING",
            BuiltinFunction::new(ParamNum::Fixed(1), |_, args| {
                Ok(args
                    .first()
                    .map(|value| Value::String(value.to_string()))
                    .unwrap_or_default())
            }),
        );
        map.insert("TO_NUMBER", BuiltinFunction::new(ParamNum::Fixed(1), to_number));
        map.insert(
            "ABS",
            BuiltinFunction::new(ParamNum::Fixed(1), |name, args| {
                number_fn(name, args, |n| n.abs())
            }),
        );
        map.insert(
            "FLOOR",
            BuiltinFunction::new(ParamNum::Fixed(1), |name, args| {
                number_fn(name, args, |n| n.floor())
            }),
        );
        map.insert(
            "CEIL",
            BuiltinFunction::new(ParamNum::Fixed(1), |name, args| {
                number_fn(name, args, |n| n.ceil())
            }),
        );
        map.insert(
            "SQRT",
            BuiltinFunction::new(ParamNum::Fixed(1), |name, args| {
                number_fn(name, args, |n| n.sqrt())
            }),
        );
        map.insert(
            "MIN",
            BuiltinFunction::new(ParamNum::Range(1, u8::MAX), |name, args| {
                fold_numbers(name, args, |a, b| if b < a { b } else { a })
            }),
        );
        map.insert(
            "MAX",
            BuiltinFunction::new(ParamNum::Range(1, u8::MAX), |name, args| {
                fold_numbers(name, args, |a, b| if b > a { b } else { a })
            }),
        );
        map.insert("RANGE", BuiltinFunction::new(ParamNum::Range(1, 3), range));
        map.insert(
            "JOIN",
            BuiltinFunction::new(ParamNum::Fixed(2), |name, args| match args {
                [Value::List(list), Value::String(sep)] => {
                    Ok(Value::String(list.iter().join(sep)))
                }
                _ => Err(invalid_types(name, args)),
            }),
        );
        map.insert(
            "SPLIT",
            BuiltinFunction::new(ParamNum::Fixed(2), |name, args| match args {
                [Value::String(s), Value::String(sep)] if sep.is_empty() => Ok(Value::List(
                    s.chars().map(|c| Value::String(c.to_string())).collect(),
                )),
                [Value::String(s), Value::String(sep)] => Ok(Value::List(
                    s.split(sep.as_str()).map(Value::from).collect(),
                )),
                _ => Err(invalid_types(name, args)),
            }),
        );
        map.insert(
            "UPPER",
            BuiltinFunction::new(ParamNum::Fixed(1), |name, args| {
                string_fn(name, args, str::to_uppercase)
            }),
        );
        map.insert(
            "LOWER",
            BuiltinFunction::new(ParamNum::Fixed(1), |name, args| {
                string_fn(name, args, str::to_lowercase)
            }),
        );
        map.insert(
            "TRIM",
            BuiltinFunction::new(ParamNum::Fixed(1), |name, args| {
                string_fn(name, args, |s| s.trim().to_string())
            }),
        );

        map
    });

/// Calls the pure built-in `name`, or returns `None` when there is none.
pub fn eval_builtin(name: &str, args: &[Value]) -> Option<Result<Value, Error>> {
    BUILTIN_FUNCTIONS.get(name).map(|f| {
        if f.num_params.is_valid(args.len()) {
            (f.func)(name, args)
        } else {
            Err(Error::InvalidNumberOfArguments(
                name.to_string(),
                f.num_params.to_num(),
                args.len().min(u8::MAX as usize) as u8,
            ))
        }
    })
}

/// Level of a trace built-in, `None` when `name` is not one.
pub fn trace_level(name: &str) -> Option<TraceLevel> {
    match name {
        "TRACE" | "TRACE_INFO" => Some(TraceLevel::Info),
        "TRACE_DEBUG" => Some(TraceLevel::Debug),
        "TRACE_WARN" => Some(TraceLevel::Warn),
        "TRACE_ERROR" => Some(TraceLevel::Error),
        _ => None,
    }
}

/// Splits trace built-in arguments into category and message.
///
/// `TRACE("Hello")` lands in the `default` category; with two or more
/// arguments the first one names the category and the rest form the message.
pub fn trace_message(args: &[Value]) -> (String, String) {
    match args {
        [] => ("default".to_string(), String::new()),
        [message] => ("default".to_string(), message.to_string()),
        [category, rest @ ..] => (category.to_string(), rest.iter().join("")),
    }
}

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_FUNCTIONS.contains_key(name) || trace_level(name).is_some()
}
