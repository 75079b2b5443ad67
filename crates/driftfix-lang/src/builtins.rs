//! Core builtin functions.
//!
//! The getattr family goes through the same accessor protocol as
//! attribute syntax, so descriptors installed on an object fire no
//! matter how the attribute is reached.

use crate::error::VmError;
use crate::vm::{
    attr_delete, attr_get, attr_set, truthy, type_name, Interpreter, ObjectData, Value,
};
use std::cell::RefCell;
use std::rc::Rc;

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), VmError> {
    if args.len() < min || args.len() > max {
        return Err(VmError::TypeError(format!(
            "{name}() takes {min} to {max} arguments but {} were given",
            args.len()
        )));
    }
    Ok(())
}

fn no_kwargs(name: &str, kwargs: &[(String, Value)]) -> Result<(), VmError> {
    match kwargs.first() {
        Some((kw, _)) => Err(VmError::TypeError(format!(
            "{name}() got an unexpected keyword argument '{kw}'"
        ))),
        None => Ok(()),
    }
}

fn str_arg(name: &str, value: &Value) -> Result<String, VmError> {
    match value {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(VmError::TypeError(format!(
            "{name}() attribute name must be a string, not '{}'",
            type_name(other)
        ))),
    }
}

pub fn install(interp: &mut Interpreter) {
    interp.register_builtin("print", |_cx, args, kwargs| {
        no_kwargs("print", kwargs)?;
        let line = args
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        println!("{line}");
        Ok(Value::Nil)
    });

    interp.register_builtin("len", |_cx, args, kwargs| {
        no_kwargs("len", kwargs)?;
        arity("len", args, 1, 1)?;
        match &args[0] {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::Int(items.borrow().len() as i64)),
            other => Err(VmError::TypeError(format!(
                "len() does not support '{}'",
                type_name(other)
            ))),
        }
    });

    interp.register_builtin("push", |_cx, args, kwargs| {
        no_kwargs("push", kwargs)?;
        arity("push", args, 2, 2)?;
        match &args[0] {
            Value::List(items) => {
                items.borrow_mut().push(args[1].clone());
                Ok(Value::Nil)
            }
            other => Err(VmError::TypeError(format!(
                "push() expects a list, not '{}'",
                type_name(other)
            ))),
        }
    });

    interp.register_builtin("range", |_cx, args, kwargs| {
        no_kwargs("range", kwargs)?;
        arity("range", args, 1, 2)?;
        let int_arg = |v: &Value| match v {
            Value::Int(i) => Ok(*i),
            other => Err(VmError::TypeError(format!(
                "range() expects integers, not '{}'",
                type_name(other)
            ))),
        };
        let (start, stop) = if args.len() == 1 {
            (0, int_arg(&args[0])?)
        } else {
            (int_arg(&args[0])?, int_arg(&args[1])?)
        };
        let items: Vec<Value> = (start..stop).map(Value::Int).collect();
        Ok(Value::List(Rc::new(RefCell::new(items))))
    });

    interp.register_builtin("object", |_cx, args, kwargs| {
        no_kwargs("object", kwargs)?;
        arity("object", args, 0, 0)?;
        Ok(Value::Object(Rc::new(RefCell::new(ObjectData::default()))))
    });

    interp.register_builtin("getattr", |cx, args, kwargs| {
        no_kwargs("getattr", kwargs)?;
        arity("getattr", args, 2, 3)?;
        let name = str_arg("getattr", &args[1])?;
        match attr_get(cx, &args[0], &name) {
            Ok(value) => Ok(value),
            Err(VmError::UnknownAttribute(_)) if args.len() == 3 => Ok(args[2].clone()),
            Err(err) => Err(err),
        }
    });

    interp.register_builtin("setattr", |cx, args, kwargs| {
        no_kwargs("setattr", kwargs)?;
        arity("setattr", args, 3, 3)?;
        let name = str_arg("setattr", &args[1])?;
        attr_set(cx, &args[0], &name, args[2].clone())?;
        Ok(Value::Nil)
    });

    // hasattr attempts the get, so accessors fire exactly as for a
    // real attribute access
    interp.register_builtin("hasattr", |cx, args, kwargs| {
        no_kwargs("hasattr", kwargs)?;
        arity("hasattr", args, 2, 2)?;
        let name = str_arg("hasattr", &args[1])?;
        match attr_get(cx, &args[0], &name) {
            Ok(_) => Ok(Value::Bool(true)),
            Err(VmError::UnknownAttribute(_)) => Ok(Value::Bool(false)),
            Err(err) => Err(err),
        }
    });

    interp.register_builtin("delattr", |cx, args, kwargs| {
        no_kwargs("delattr", kwargs)?;
        arity("delattr", args, 2, 2)?;
        let name = str_arg("delattr", &args[1])?;
        attr_delete(cx, &args[0], &name)?;
        Ok(Value::Nil)
    });

    interp.register_builtin("__assert__", |_cx, args, kwargs| {
        no_kwargs("__assert__", kwargs)?;
        arity("__assert__", args, 2, 2)?;
        if truthy(&args[0]) {
            Ok(Value::Nil)
        } else {
            Err(VmError::AssertionFailed(args[1].to_string()))
        }
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_module;
    use crate::parser::parse;
    use std::path::Path;

    fn run(source: &str) -> Interpreter {
        let mut interp = Interpreter::new();
        let file = Path::new("t.dft");
        let module = parse(source, file).expect("parse");
        let code = compile_module(&module, file).expect("compile");
        interp.run_module(code).expect("run");
        interp
    }

    #[test]
    fn range_and_len() {
        let interp = run("let a = len(range(5))\nlet b = len(range(2, 5))\n");
        assert!(matches!(interp.globals.get("a"), Some(Value::Int(5))));
        assert!(matches!(interp.globals.get("b"), Some(Value::Int(3))));
    }

    #[test]
    fn getattr_default() {
        let interp = run("let o = object()\nlet v = getattr(o, \"missing\", 9)\n");
        assert!(matches!(interp.globals.get("v"), Some(Value::Int(9))));
    }

    #[test]
    fn setattr_then_hasattr() {
        let interp =
            run("let o = object()\nsetattr(o, \"x\", 1)\nlet h = hasattr(o, \"x\")\ndelattr(o, \"x\")\nlet g = hasattr(o, \"x\")\n");
        assert!(matches!(interp.globals.get("h"), Some(Value::Bool(true))));
        assert!(matches!(interp.globals.get("g"), Some(Value::Bool(false))));
    }

    #[test]
    fn assert_builtin_reports_source_text() {
        let mut interp = Interpreter::new();
        let file = Path::new("t.dft");
        let module = parse("__assert__(1 == 2, \"1 == 2\")\n", file).expect("parse");
        let code = compile_module(&module, file).expect("compile");
        let err = interp.run_module(code).unwrap_err();
        assert!(matches!(err, VmError::AssertionFailed(msg) if msg == "1 == 2"));
    }
}
