//! Function libraries callable from expressions

use crate::eval::{to_text, type_name, values_equal, EvalError, EvalResult};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

pub type BuiltinFn = fn(&[Value]) -> EvalResult<Value>;

pub struct Builtin {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub call: BuiltinFn,
}

impl Builtin {
    pub fn accepts(&self, count: usize) -> bool {
        (self.min_args..=self.max_args).contains(&count)
    }

    /// Human readable arity, e.g. `1` or `1 to 2`
    pub fn arity(&self) -> String {
        if self.min_args == self.max_args {
            self.min_args.to_string()
        } else {
            format!("{} to {}", self.min_args, self.max_args)
        }
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity())
    }
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// A named set of functions that a compile request can reference
#[derive(Debug)]
pub struct Library {
    pub name: &'static str,
    pub functions: &'static [Builtin],
}

pub static CORE: Library = Library {
    name: "core",
    functions: &[
        Builtin {
            name: "len",
            min_args: 1,
            max_args: 1,
            call: len,
        },
        Builtin {
            name: "upper",
            min_args: 1,
            max_args: 1,
            call: upper,
        },
        Builtin {
            name: "lower",
            min_args: 1,
            max_args: 1,
            call: lower,
        },
        Builtin {
            name: "trim",
            min_args: 1,
            max_args: 1,
            call: trim,
        },
        Builtin {
            name: "join",
            min_args: 1,
            max_args: 2,
            call: join,
        },
        Builtin {
            name: "contains",
            min_args: 2,
            max_args: 2,
            call: contains,
        },
        Builtin {
            name: "default",
            min_args: 2,
            max_args: 2,
            call: default,
        },
        Builtin {
            name: "string",
            min_args: 1,
            max_args: 1,
            call: string,
        },
    ],
};

/// Look up a library by reference name
pub fn library(name: &str) -> Option<&'static Library> {
    match name {
        "core" => Some(&CORE),
        _ => None,
    }
}

/// Functions visible to one program
#[derive(Debug, Default)]
pub struct FunctionTable {
    functions: HashMap<&'static str, &'static Builtin>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import(&mut self, library: &'static Library) {
        for function in library.functions {
            self.functions.insert(function.name, function);
        }
    }

    pub fn get(&self, name: &str) -> Option<&'static Builtin> {
        self.functions.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

fn len(args: &[Value]) -> EvalResult<Value> {
    let count = match &args[0] {
        Value::Null => 0,
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => {
            return Err(EvalError::TypeMismatch {
                expected: "string, array or object",
                found: type_name(other),
            })
        }
    };
    Ok(Value::from(count))
}

fn upper(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::String(to_text(&args[0]).to_uppercase()))
}

fn lower(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::String(to_text(&args[0]).to_lowercase()))
}

fn trim(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::String(to_text(&args[0]).trim().to_string()))
}

fn join(args: &[Value]) -> EvalResult<Value> {
    let separator = args.get(1).map(to_text).unwrap_or_default();
    match &args[0] {
        Value::Null => Ok(Value::String(String::new())),
        Value::Array(items) => Ok(Value::String(
            items.iter().map(to_text).collect::<Vec<_>>().join(&separator),
        )),
        other => Err(EvalError::TypeMismatch {
            expected: "array",
            found: type_name(other),
        }),
    }
}

fn contains(args: &[Value]) -> EvalResult<Value> {
    let needle = &args[1];
    let found = match &args[0] {
        Value::Null => false,
        Value::String(haystack) => haystack.contains(&to_text(needle)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        Value::Object(map) => map.contains_key(&to_text(needle)),
        other => {
            return Err(EvalError::TypeMismatch {
                expected: "string, array or object",
                found: type_name(other),
            })
        }
    };
    Ok(Value::Bool(found))
}

/// Second argument when the first is null or an empty string
fn default(args: &[Value]) -> EvalResult<Value> {
    match &args[0] {
        Value::Null => Ok(args[1].clone()),
        Value::String(s) if s.is_empty() => Ok(args[1].clone()),
        value => Ok(value.clone()),
    }
}

fn string(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::String(to_text(&args[0])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: &[Value]) -> EvalResult<Value> {
        let mut table = FunctionTable::new();
        table.import(&CORE);
        let function = table.get(name).unwrap();
        assert!(function.accepts(args.len()));
        (function.call)(args)
    }

    #[test]
    fn test_core_library_is_complete() {
        let mut table = FunctionTable::new();
        table.import(library("core").unwrap());
        assert_eq!(table.len(), 8);
        assert!(library("net").is_none());
    }

    #[test]
    fn test_len() {
        assert_eq!(call("len", &[json!("héllo")]).unwrap(), json!(5));
        assert_eq!(call("len", &[json!([1, 2])]).unwrap(), json!(2));
        assert_eq!(call("len", &[Value::Null]).unwrap(), json!(0));
        assert!(matches!(
            call("len", &[json!(3)]),
            Err(EvalError::TypeMismatch { found: "number", .. })
        ));
    }

    #[test]
    fn test_text_functions() {
        assert_eq!(call("upper", &[json!("abc")]).unwrap(), json!("ABC"));
        assert_eq!(call("lower", &[json!("ABC")]).unwrap(), json!("abc"));
        assert_eq!(call("trim", &[json!("  x ")]).unwrap(), json!("x"));
        assert_eq!(call("string", &[json!(4.5)]).unwrap(), json!("4.5"));
    }

    #[test]
    fn test_join() {
        assert_eq!(
            call("join", &[json!(["a", 1, true]), json!(", ")]).unwrap(),
            json!("a, 1, true")
        );
        assert_eq!(call("join", &[json!(["a", "b"])]).unwrap(), json!("ab"));
    }

    #[test]
    fn test_contains_and_default() {
        assert_eq!(call("contains", &[json!("hello"), json!("ell")]).unwrap(), json!(true));
        assert_eq!(call("contains", &[json!([1, 2.0]), json!(2)]).unwrap(), json!(true));
        assert_eq!(call("contains", &[json!({"k": 1}), json!("k")]).unwrap(), json!(true));
        assert_eq!(call("default", &[Value::Null, json!("x")]).unwrap(), json!("x"));
        assert_eq!(call("default", &[json!(""), json!("x")]).unwrap(), json!("x"));
        assert_eq!(call("default", &[json!("y"), json!("x")]).unwrap(), json!("y"));
    }

    #[test]
    fn test_arity() {
        let mut table = FunctionTable::new();
        table.import(&CORE);
        let join = table.get("join").unwrap();
        assert!(join.accepts(1) && join.accepts(2) && !join.accepts(3));
        assert_eq!(join.arity(), "1 to 2");
        assert_eq!(table.get("len").unwrap().arity(), "1");
    }
}
