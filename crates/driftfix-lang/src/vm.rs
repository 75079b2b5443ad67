//! Stack-machine interpreter.
//!
//! Frames are plain structs owned by the interpreter, and a frame's
//! `pc` keeps pointing at the instruction being executed for as long
//! as a native callout triggered by that instruction is in progress.
//! That property is what lets attribute accessors resolve their own
//! call site: they receive a [`CallContext`] borrowing the interpreter
//! and can inspect the live frame stack.
//!
//! Attribute access routes through the [`Accessor`] protocol in every
//! path: the `LoadAttr`/`StoreAttr`/`DeleteAttr` opcodes and the
//! `getattr`/`setattr`/`hasattr`/`delattr` builtins all go through
//! [`attr_get`] and friends.

use crate::code::{CodeObject, Const, Op};
use crate::error::VmError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

// ============================================================================
// Values
// ============================================================================

pub type ObjRef = Rc<RefCell<ObjectData>>;

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Object(ObjRef),
    Function(Rc<FunctionValue>),
    Native(Rc<NativeFunction>),
    /// Snapshot iterator produced by `GetIter`, consumed by `ForIter`.
    Iter(Rc<RefCell<ListIter>>),
    /// Raw code object between `LoadConst` and `MakeFunction`; never
    /// observable from scripts.
    Code(Rc<CodeObject>),
}

#[derive(Default)]
pub struct ObjectData {
    pub fields: HashMap<String, Value>,
    pub accessors: HashMap<String, Rc<dyn Accessor>>,
}

pub struct FunctionValue {
    pub code: Rc<CodeObject>,
    pub captured: Rc<HashMap<String, Value>>,
}

pub struct NativeFunction {
    pub name: String,
    #[allow(clippy::type_complexity)]
    pub func: Box<
        dyn Fn(&mut CallContext<'_>, &[Value], &[(String, Value)]) -> Result<Value, VmError>,
    >,
}

#[derive(Debug)]
pub struct ListIter {
    items: Vec<Value>,
    pos: usize,
}

/// Attribute descriptor hook. An accessor registered on an object
/// intercepts get/set/delete for its attribute name before the plain
/// field map is consulted.
pub trait Accessor {
    fn get(&self, cx: &mut CallContext<'_>, obj: &ObjRef) -> Result<Value, VmError>;
    fn set(&self, cx: &mut CallContext<'_>, obj: &ObjRef, value: Value) -> Result<(), VmError>;
    fn delete(&self, cx: &mut CallContext<'_>, obj: &ObjRef) -> Result<(), VmError>;
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object(_) => write!(f, "<object>"),
            Value::Function(func) => write!(f, "<fn {}>", func.code.name),
            Value::Native(native) => write!(f, "<builtin {}>", native.name),
            Value::Iter(_) => write!(f, "<iterator>"),
            Value::Code(code) => write!(f, "<code {}>", code.name),
        }
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Str(_) => "string",
        Value::List(_) => "list",
        Value::Object(_) => "object",
        Value::Function(_) => "function",
        Value::Native(_) => "builtin",
        Value::Iter(_) => "iterator",
        Value::Code(_) => "code",
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Nil => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Str(s) => !s.is_empty(),
        Value::List(items) => !items.borrow().is_empty(),
        _ => true,
    }
}

/// Structural equality for scalars and lists, identity for the rest.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            let x = x.borrow();
            let y = y.borrow();
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| value_eq(a, b))
        }
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Native(x), Value::Native(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

// ============================================================================
// Frames
// ============================================================================

#[derive(Debug)]
pub struct Frame {
    pub code: Rc<CodeObject>,
    /// Index of the instruction currently executing (or about to).
    pub pc: usize,
    pub locals: HashMap<String, Value>,
    pub stack: Vec<Value>,
    pub captured: Option<Rc<HashMap<String, Value>>>,
    /// Module frames read and write the interpreter globals directly.
    pub module_scope: bool,
}

impl Frame {
    fn pop(&mut self) -> Result<Value, VmError> {
        self.stack.pop().ok_or(VmError::Internal("value stack underflow"))
    }

    fn popn(&mut self, n: usize) -> Result<Vec<Value>, VmError> {
        if self.stack.len() < n {
            return Err(VmError::Internal("value stack underflow"));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }
}

// ============================================================================
// Source Store
// ============================================================================

/// Text of every file the interpreter has loaded, so the resolver can
/// correlate without re-reading disk for sources it already ran.
#[derive(Debug, Default)]
pub struct SourceStore {
    files: RefCell<HashMap<PathBuf, Arc<str>>>,
}

impl SourceStore {
    pub fn insert(&self, file: &Path, source: &str) {
        self.files
            .borrow_mut()
            .insert(file.to_path_buf(), Arc::from(source));
    }

    pub fn get(&self, file: &Path) -> Option<Arc<str>> {
        self.files.borrow().get(file).cloned()
    }

    /// Stored text, falling back to disk (and caching the result).
    pub fn load(&self, file: &Path) -> Result<Arc<str>, std::io::Error> {
        if let Some(source) = self.get(file) {
            return Ok(source);
        }
        let text = std::fs::read_to_string(file)?;
        let source: Arc<str> = Arc::from(text.as_str());
        self.files
            .borrow_mut()
            .insert(file.to_path_buf(), Arc::clone(&source));
        Ok(source)
    }
}

// ============================================================================
// Interpreter
// ============================================================================

pub struct Interpreter {
    pub globals: HashMap<String, Value>,
    builtins: HashMap<String, Value>,
    pub frames: Vec<Frame>,
    pub sources: SourceStore,
}

/// Borrow of the interpreter handed to native functions and accessors.
/// Exposes the live frame stack and reentrant calls.
pub struct CallContext<'a> {
    pub interp: &'a mut Interpreter,
}

impl CallContext<'_> {
    pub fn frames(&self) -> &[Frame] {
        &self.interp.frames
    }

    pub fn sources(&self) -> &SourceStore {
        &self.interp.sources
    }

    pub fn call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, VmError> {
        self.interp.call_value(callee, args, kwargs)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let mut interp = Interpreter {
            globals: HashMap::new(),
            builtins: HashMap::new(),
            frames: Vec::new(),
            sources: SourceStore::default(),
        };
        crate::builtins::install(&mut interp);
        interp
    }

    pub fn register_builtin<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut CallContext<'_>, &[Value], &[(String, Value)]) -> Result<Value, VmError>
            + 'static,
    {
        self.builtins.insert(
            name.to_string(),
            Value::Native(Rc::new(NativeFunction {
                name: name.to_string(),
                func: Box::new(func),
            })),
        );
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    /// Execute a module body to completion.
    pub fn run_module(&mut self, code: Rc<CodeObject>) -> Result<Value, VmError> {
        let base = self.frames.len();
        self.frames.push(Frame {
            code,
            pc: 0,
            locals: HashMap::new(),
            stack: Vec::new(),
            captured: None,
            module_scope: true,
        });
        let result = self.run_until(base);
        if result.is_err() {
            self.frames.truncate(base);
        }
        result
    }

    /// Call any callable value, reentrantly if the interpreter is
    /// already running.
    pub fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, VmError> {
        match callee {
            Value::Native(native) => (native.func)(&mut CallContext { interp: self }, &args, &kwargs),
            Value::Function(func) => {
                let locals = bind_params(&func.code, args, kwargs)?;
                let base = self.frames.len();
                self.frames.push(Frame {
                    code: Rc::clone(&func.code),
                    pc: 0,
                    locals,
                    stack: Vec::new(),
                    captured: Some(Rc::clone(&func.captured)),
                    module_scope: false,
                });
                let result = self.run_until(base);
                if result.is_err() {
                    self.frames.truncate(base);
                }
                result
            }
            other => Err(VmError::TypeError(format!(
                "'{}' is not callable",
                type_name(&other)
            ))),
        }
    }

    // ------------------------------------------------------------------
    // dispatch loop
    // ------------------------------------------------------------------

    fn run_until(&mut self, base_depth: usize) -> Result<Value, VmError> {
        loop {
            let frame = self
                .frames
                .last()
                .ok_or(VmError::Internal("no active frame"))?;
            // falling off the end of a module body returns nil
            if frame.pc >= frame.code.instrs.len() {
                let value = Value::Nil;
                self.frames.pop();
                if self.frames.len() == base_depth {
                    return Ok(value);
                }
                self.return_to_caller(value)?;
                continue;
            }
            let instr = frame.code.instrs[frame.pc];
            let arg = instr.arg;
            match instr.op {
                Op::Nop => self.advance(),
                Op::Pop => {
                    let frame = self.top()?;
                    frame.pop()?;
                    self.advance();
                }
                Op::LoadConst => {
                    let frame = self.top()?;
                    let constant = frame
                        .code
                        .consts
                        .get(arg as usize)
                        .ok_or(VmError::Internal("constant index out of range"))?
                        .clone();
                    let value = const_to_value(constant);
                    self.top()?.stack.push(value);
                    self.advance();
                }
                Op::LoadName => {
                    let name = self.name_at(arg)?;
                    let value = self.lookup_name(&name)?;
                    self.top()?.stack.push(value);
                    self.advance();
                }
                Op::StoreName => {
                    let name = self.name_at(arg)?;
                    let value = self.top()?.pop()?;
                    let module_scope = self.top()?.module_scope;
                    if module_scope {
                        self.globals.insert(name, value);
                    } else {
                        self.top()?.locals.insert(name, value);
                    }
                    self.advance();
                }
                Op::LoadAttr => {
                    let name = self.name_at(arg)?;
                    let obj = self.top()?.pop()?;
                    let value = attr_get(&mut CallContext { interp: self }, &obj, &name)?;
                    self.top()?.stack.push(value);
                    self.advance();
                }
                Op::StoreAttr => {
                    let name = self.name_at(arg)?;
                    let frame = self.top()?;
                    let obj = frame.pop()?;
                    let value = frame.pop()?;
                    attr_set(&mut CallContext { interp: self }, &obj, &name, value)?;
                    self.advance();
                }
                Op::DeleteAttr => {
                    let name = self.name_at(arg)?;
                    let obj = self.top()?.pop()?;
                    attr_delete(&mut CallContext { interp: self }, &obj, &name)?;
                    self.advance();
                }
                Op::LoadIndex => {
                    let frame = self.top()?;
                    let index = frame.pop()?;
                    let obj = frame.pop()?;
                    let value = index_get(&obj, &index)?;
                    self.top()?.stack.push(value);
                    self.advance();
                }
                Op::StoreIndex => {
                    let frame = self.top()?;
                    let index = frame.pop()?;
                    let obj = frame.pop()?;
                    let value = frame.pop()?;
                    index_set(&obj, &index, value)?;
                    self.advance();
                }
                Op::BuildList => {
                    let frame = self.top()?;
                    let items = frame.popn(arg as usize)?;
                    frame.stack.push(Value::List(Rc::new(RefCell::new(items))));
                    self.advance();
                }
                Op::ListAppend => {
                    let frame = self.top()?;
                    let value = frame.pop()?;
                    let depth = arg as usize;
                    if frame.stack.len() < depth {
                        return Err(VmError::Internal("value stack underflow"));
                    }
                    let slot = frame.stack.len() - depth;
                    match &frame.stack[slot] {
                        Value::List(items) => items.borrow_mut().push(value),
                        _ => return Err(VmError::Internal("ListAppend target is not a list")),
                    }
                    self.advance();
                }
                Op::MakeFunction => {
                    let frame = self.top()?;
                    let code = match frame.pop()? {
                        Value::Code(code) => code,
                        _ => return Err(VmError::Internal("MakeFunction expects a code object")),
                    };
                    let mut captured: HashMap<String, Value> = frame
                        .captured
                        .as_ref()
                        .map(|c| (**c).clone())
                        .unwrap_or_default();
                    captured.extend(frame.locals.clone());
                    frame.stack.push(Value::Function(Rc::new(FunctionValue {
                        code,
                        captured: Rc::new(captured),
                    })));
                    self.advance();
                }
                Op::Call => {
                    let frame = self.top()?;
                    let args = frame.popn(arg as usize)?;
                    let callee = frame.pop()?;
                    self.begin_call(callee, args, Vec::new())?;
                }
                Op::CallKw => {
                    let frame = self.top()?;
                    let names = match frame.pop()? {
                        Value::List(items) => items
                            .borrow()
                            .iter()
                            .map(|v| match v {
                                Value::Str(s) => Ok(s.to_string()),
                                _ => Err(VmError::Internal("keyword name is not a string")),
                            })
                            .collect::<Result<Vec<_>, _>>()?,
                        _ => return Err(VmError::Internal("CallKw expects a name list")),
                    };
                    let kwvalues = frame.popn(names.len())?;
                    let args = frame.popn(arg as usize)?;
                    let callee = frame.pop()?;
                    let kwargs = names.into_iter().zip(kwvalues).collect();
                    self.begin_call(callee, args, kwargs)?;
                }
                Op::Jump => {
                    self.top()?.pc = arg as usize;
                }
                Op::JumpIfFalse => {
                    let frame = self.top()?;
                    let cond = frame.pop()?;
                    if truthy(&cond) {
                        frame.pc += 1;
                    } else {
                        frame.pc = arg as usize;
                    }
                }
                Op::JumpIfTrue => {
                    let frame = self.top()?;
                    let cond = frame.pop()?;
                    if truthy(&cond) {
                        frame.pc = arg as usize;
                    } else {
                        frame.pc += 1;
                    }
                }
                Op::JumpIfFalseOrPop => {
                    let frame = self.top()?;
                    let cond = frame
                        .stack
                        .last()
                        .ok_or(VmError::Internal("value stack underflow"))?;
                    if truthy(cond) {
                        frame.pop()?;
                        frame.pc += 1;
                    } else {
                        frame.pc = arg as usize;
                    }
                }
                Op::JumpIfTrueOrPop => {
                    let frame = self.top()?;
                    let cond = frame
                        .stack
                        .last()
                        .ok_or(VmError::Internal("value stack underflow"))?;
                    if truthy(cond) {
                        frame.pc = arg as usize;
                    } else {
                        frame.pop()?;
                        frame.pc += 1;
                    }
                }
                Op::GetIter => {
                    let frame = self.top()?;
                    let value = frame.pop()?;
                    let items = match &value {
                        Value::List(items) => items.borrow().clone(),
                        other => {
                            return Err(VmError::TypeError(format!(
                                "'{}' is not iterable",
                                type_name(other)
                            )))
                        }
                    };
                    frame
                        .stack
                        .push(Value::Iter(Rc::new(RefCell::new(ListIter { items, pos: 0 }))));
                    self.advance();
                }
                Op::ForIter => {
                    let frame = self.top()?;
                    let next = match frame.stack.last() {
                        Some(Value::Iter(iter)) => {
                            let mut iter = iter.borrow_mut();
                            let item = iter.items.get(iter.pos).cloned();
                            iter.pos += 1;
                            item
                        }
                        _ => return Err(VmError::Internal("ForIter expects an iterator")),
                    };
                    match next {
                        Some(value) => {
                            frame.stack.push(value);
                            frame.pc += 1;
                        }
                        None => {
                            frame.pop()?;
                            frame.pc = arg as usize;
                        }
                    }
                }
                Op::BinaryOp => {
                    let frame = self.top()?;
                    let right = frame.pop()?;
                    let left = frame.pop()?;
                    let op = crate::ast::BinOp::from_code(arg)
                        .ok_or(VmError::Internal("unknown binary op code"))?;
                    let value = binary_op(op, left, right)?;
                    self.top()?.stack.push(value);
                    self.advance();
                }
                Op::UnaryOp => {
                    let frame = self.top()?;
                    let operand = frame.pop()?;
                    let op = crate::ast::UnOp::from_code(arg)
                        .ok_or(VmError::Internal("unknown unary op code"))?;
                    let value = match op {
                        crate::ast::UnOp::Neg => match operand {
                            Value::Int(i) => Value::Int(
                                i.checked_neg().ok_or(VmError::IntegerOverflow("-"))?,
                            ),
                            other => {
                                return Err(VmError::TypeError(format!(
                                    "cannot negate '{}'",
                                    type_name(&other)
                                )))
                            }
                        },
                        crate::ast::UnOp::Not => Value::Bool(!truthy(&operand)),
                    };
                    self.top()?.stack.push(value);
                    self.advance();
                }
                Op::Return => {
                    let value = self.top()?.pop()?;
                    self.frames.pop();
                    if self.frames.len() == base_depth {
                        return Ok(value);
                    }
                    self.return_to_caller(value)?;
                }
                Op::AssertFail => {
                    let frame = self.top()?;
                    let line = frame.code.line_at(frame.pc).unwrap_or(0);
                    let location = format!("{}:{}", frame.code.file.display(), line);
                    return Err(VmError::AssertionFailed(location));
                }
            }
        }
    }

    fn top(&mut self) -> Result<&mut Frame, VmError> {
        self.frames
            .last_mut()
            .ok_or(VmError::Internal("no active frame"))
    }

    fn advance(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.pc += 1;
        }
    }

    fn name_at(&mut self, arg: u32) -> Result<String, VmError> {
        let frame = self.top()?;
        frame
            .code
            .names
            .get(arg as usize)
            .cloned()
            .ok_or(VmError::Internal("name index out of range"))
    }

    fn lookup_name(&mut self, name: &str) -> Result<Value, VmError> {
        let frame = self.top()?;
        if let Some(value) = frame.locals.get(name) {
            return Ok(value.clone());
        }
        if let Some(captured) = &frame.captured {
            if let Some(value) = captured.get(name) {
                return Ok(value.clone());
            }
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.builtins.get(name) {
            return Ok(value.clone());
        }
        Err(VmError::UndefinedName(name.to_string()))
    }

    /// Deliver `value` to the frame now on top and step past its call
    /// instruction.
    fn return_to_caller(&mut self, value: Value) -> Result<(), VmError> {
        let frame = self.top()?;
        frame.stack.push(value);
        frame.pc += 1;
        Ok(())
    }

    /// Start a call from the dispatch loop. Script functions push a
    /// frame and leave the caller's `pc` on the call instruction;
    /// natives run to completion immediately.
    fn begin_call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<(), VmError> {
        match callee {
            Value::Function(func) => {
                let locals = bind_params(&func.code, args, kwargs)?;
                self.frames.push(Frame {
                    code: Rc::clone(&func.code),
                    pc: 0,
                    locals,
                    stack: Vec::new(),
                    captured: Some(Rc::clone(&func.captured)),
                    module_scope: false,
                });
                Ok(())
            }
            Value::Native(native) => {
                let value = (native.func)(&mut CallContext { interp: self }, &args, &kwargs)?;
                self.return_to_caller(value)
            }
            other => Err(VmError::TypeError(format!(
                "'{}' is not callable",
                type_name(&other)
            ))),
        }
    }
}

fn const_to_value(constant: Const) -> Value {
    match constant {
        Const::Nil => Value::Nil,
        Const::Bool(b) => Value::Bool(b),
        Const::Int(i) => Value::Int(i),
        Const::Str(s) => Value::Str(Rc::from(s.as_str())),
        Const::Names(names) => Value::List(Rc::new(RefCell::new(
            names
                .into_iter()
                .map(|n| Value::Str(Rc::from(n.as_str())))
                .collect(),
        ))),
        Const::Code(code) => Value::Code(code),
    }
}

fn bind_params(
    code: &CodeObject,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<HashMap<String, Value>, VmError> {
    if args.len() > code.params.len() {
        return Err(VmError::TypeError(format!(
            "{}() takes {} arguments but {} were given",
            code.name,
            code.params.len(),
            args.len()
        )));
    }
    let mut locals = HashMap::new();
    for (param, value) in code.params.iter().zip(args) {
        locals.insert(param.clone(), value);
    }
    for (name, value) in kwargs {
        if !code.params.iter().any(|p| p == &name) {
            return Err(VmError::TypeError(format!(
                "{}() got an unexpected keyword argument '{}'",
                code.name, name
            )));
        }
        if locals.contains_key(&name) {
            return Err(VmError::TypeError(format!(
                "{}() got multiple values for argument '{}'",
                code.name, name
            )));
        }
        locals.insert(name, value);
    }
    for param in &code.params {
        if !locals.contains_key(param) {
            return Err(VmError::TypeError(format!(
                "{}() missing required argument '{}'",
                code.name, param
            )));
        }
    }
    Ok(locals)
}

// ============================================================================
// Attribute Protocol
// ============================================================================

pub fn attr_get(cx: &mut CallContext<'_>, obj: &Value, name: &str) -> Result<Value, VmError> {
    let Value::Object(obj) = obj else {
        return Err(VmError::TypeError(format!(
            "'{}' has no attributes",
            type_name(obj)
        )));
    };
    let accessor = obj.borrow().accessors.get(name).cloned();
    if let Some(accessor) = accessor {
        return accessor.get(cx, obj);
    }
    obj.borrow()
        .fields
        .get(name)
        .cloned()
        .ok_or_else(|| VmError::UnknownAttribute(name.to_string()))
}

pub fn attr_set(
    cx: &mut CallContext<'_>,
    obj: &Value,
    name: &str,
    value: Value,
) -> Result<(), VmError> {
    let Value::Object(obj) = obj else {
        return Err(VmError::TypeError(format!(
            "'{}' has no attributes",
            type_name(obj)
        )));
    };
    let accessor = obj.borrow().accessors.get(name).cloned();
    if let Some(accessor) = accessor {
        return accessor.set(cx, obj, value);
    }
    obj.borrow_mut().fields.insert(name.to_string(), value);
    Ok(())
}

pub fn attr_delete(cx: &mut CallContext<'_>, obj: &Value, name: &str) -> Result<(), VmError> {
    let Value::Object(obj) = obj else {
        return Err(VmError::TypeError(format!(
            "'{}' has no attributes",
            type_name(obj)
        )));
    };
    let accessor = obj.borrow().accessors.get(name).cloned();
    if let Some(accessor) = accessor {
        return accessor.delete(cx, obj);
    }
    if obj.borrow_mut().fields.remove(name).is_none() {
        return Err(VmError::UnknownAttribute(name.to_string()));
    }
    Ok(())
}

fn index_get(obj: &Value, index: &Value) -> Result<Value, VmError> {
    match (obj, index) {
        (Value::List(items), Value::Int(i)) => {
            let items = items.borrow();
            if *i < 0 || *i as usize >= items.len() {
                return Err(VmError::IndexOutOfRange {
                    index: *i,
                    len: items.len(),
                });
            }
            Ok(items[*i as usize].clone())
        }
        _ => Err(VmError::TypeError(format!(
            "cannot index '{}' with '{}'",
            type_name(obj),
            type_name(index)
        ))),
    }
}

fn index_set(obj: &Value, index: &Value, value: Value) -> Result<(), VmError> {
    match (obj, index) {
        (Value::List(items), Value::Int(i)) => {
            let mut items = items.borrow_mut();
            let len = items.len();
            if *i < 0 || *i as usize >= len {
                return Err(VmError::IndexOutOfRange { index: *i, len });
            }
            items[*i as usize] = value;
            Ok(())
        }
        _ => Err(VmError::TypeError(format!(
            "cannot index '{}' with '{}'",
            type_name(obj),
            type_name(index)
        ))),
    }
}

fn binary_op(op: crate::ast::BinOp, left: Value, right: Value) -> Result<Value, VmError> {
    use crate::ast::BinOp;
    let type_error = |op: &str, l: &Value, r: &Value| {
        Err(VmError::TypeError(format!(
            "unsupported operands for '{}': '{}' and '{}'",
            op,
            type_name(l),
            type_name(r)
        )))
    };
    Ok(match op {
        BinOp::Add => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => {
                Value::Int(a.checked_add(*b).ok_or(VmError::IntegerOverflow("+"))?)
            }
            (Value::Str(a), Value::Str(b)) => Value::Str(Rc::from(format!("{a}{b}").as_str())),
            (Value::List(a), Value::List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                Value::List(Rc::new(RefCell::new(items)))
            }
            _ => return type_error("+", &left, &right),
        },
        BinOp::Sub => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => {
                Value::Int(a.checked_sub(*b).ok_or(VmError::IntegerOverflow("-"))?)
            }
            _ => return type_error("-", &left, &right),
        },
        BinOp::Mul => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => {
                Value::Int(a.checked_mul(*b).ok_or(VmError::IntegerOverflow("*"))?)
            }
            _ => return type_error("*", &left, &right),
        },
        BinOp::Div => match (&left, &right) {
            (Value::Int(_), Value::Int(0)) => return Err(VmError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => {
                Value::Int(a.checked_div(*b).ok_or(VmError::IntegerOverflow("/"))?)
            }
            _ => return type_error("/", &left, &right),
        },
        BinOp::Mod => match (&left, &right) {
            (Value::Int(_), Value::Int(0)) => return Err(VmError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => {
                Value::Int(a.checked_rem(*b).ok_or(VmError::IntegerOverflow("%"))?)
            }
            _ => return type_error("%", &left, &right),
        },
        BinOp::Eq => Value::Bool(value_eq(&left, &right)),
        BinOp::Ne => Value::Bool(!value_eq(&left, &right)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => Value::Bool(match op {
                BinOp::Lt => a < b,
                BinOp::Le => a <= b,
                BinOp::Gt => a > b,
                _ => a >= b,
            }),
            (Value::Str(a), Value::Str(b)) => Value::Bool(match op {
                BinOp::Lt => a < b,
                BinOp::Le => a <= b,
                BinOp::Gt => a > b,
                _ => a >= b,
            }),
            _ => return type_error("comparison", &left, &right),
        },
        BinOp::And | BinOp::Or => {
            return Err(VmError::Internal("short-circuit op reached BinaryOp"))
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_module;
    use crate::parser::parse;

    fn run(source: &str) -> Interpreter {
        let mut interp = Interpreter::new();
        run_in(&mut interp, source).expect("run");
        interp
    }

    fn run_in(interp: &mut Interpreter, source: &str) -> Result<Value, VmError> {
        let file = Path::new("t.dft");
        let module = parse(source, file).expect("parse");
        let code = compile_module(&module, file).expect("compile");
        interp.sources.insert(file, source);
        interp.run_module(code)
    }

    fn global_int(interp: &Interpreter, name: &str) -> i64 {
        match interp.globals.get(name) {
            Some(Value::Int(i)) => *i,
            other => panic!("expected int global '{name}', got {other:?}"),
        }
    }

    mod basics {
        use super::*;

        #[test]
        fn arithmetic_precedence() {
            let interp = run("let x = 2 + 3 * 4\n");
            assert_eq!(global_int(&interp, "x"), 14);
        }

        #[test]
        fn function_call_and_return() {
            let interp = run("fn add(a, b) {\n  return a + b\n}\nlet r = add(2, 3)\n");
            assert_eq!(global_int(&interp, "r"), 5);
        }

        #[test]
        fn keyword_arguments_bind_by_name() {
            let interp = run("fn sub(a, b) {\n  return a - b\n}\nlet r = sub(b=2, a=10)\n");
            assert_eq!(global_int(&interp, "r"), 8);
        }

        #[test]
        fn unexpected_keyword_is_a_type_error() {
            let mut interp = Interpreter::new();
            let err = run_in(&mut interp, "fn f(a) {\n  return a\n}\nf(old=1)\n").unwrap_err();
            assert!(matches!(err, VmError::TypeError(msg)
                if msg.contains("unexpected keyword argument 'old'")));
        }

        #[test]
        fn while_and_if() {
            let interp = run("let n = 0\nlet i = 0\nwhile i < 5 {\n  if i % 2 == 0 {\n    n = n + i\n  }\n  i = i + 1\n}\n");
            assert_eq!(global_int(&interp, "n"), 6);
        }

        #[test]
        fn for_over_range() {
            let interp = run("let total = 0\nfor x in range(4) {\n  total = total + x\n}\n");
            assert_eq!(global_int(&interp, "total"), 6);
        }

        #[test]
        fn comprehension_builds_list() {
            let interp = run("let ys = [x * 2 for x in range(3)]\nlet s = ys[0] + ys[1] + ys[2]\n");
            assert_eq!(global_int(&interp, "s"), 6);
        }

        #[test]
        fn short_circuit_or_keeps_left_value() {
            let interp = run("let x = 7 or boom()\n");
            assert_eq!(global_int(&interp, "x"), 7);
        }

        #[test]
        fn closures_capture_definition_snapshot() {
            let interp = run(
                "fn make(n) {\n  return fn(x) => x + n\n}\nlet add3 = make(3)\nlet r = add3(4)\n",
            );
            assert_eq!(global_int(&interp, "r"), 7);
        }

        #[test]
        fn assert_failure_carries_location() {
            let mut interp = Interpreter::new();
            let err = run_in(&mut interp, "assert 1 == 2\n").unwrap_err();
            assert!(matches!(err, VmError::AssertionFailed(msg) if msg.contains("t.dft:1")));
        }

        #[test]
        fn addition_overflow_is_a_runtime_error() {
            let mut interp = Interpreter::new();
            let err = run_in(&mut interp, "let x = 9223372036854775806 + 2\n").unwrap_err();
            assert!(matches!(err, VmError::IntegerOverflow("+")));
        }

        #[test]
        fn min_divided_by_minus_one_is_a_runtime_error() {
            let mut interp = Interpreter::new();
            let err = run_in(
                &mut interp,
                "let x = (0 - 9223372036854775807 - 1) / (0 - 1)\n",
            )
            .unwrap_err();
            assert!(matches!(err, VmError::IntegerOverflow("/")));
        }

        #[test]
        fn min_modulo_minus_one_is_a_runtime_error() {
            let mut interp = Interpreter::new();
            let err = run_in(
                &mut interp,
                "let x = (0 - 9223372036854775807 - 1) % (0 - 1)\n",
            )
            .unwrap_err();
            assert!(matches!(err, VmError::IntegerOverflow("%")));
        }

        #[test]
        fn negating_the_minimum_int_is_a_runtime_error() {
            let mut interp = Interpreter::new();
            let err = run_in(&mut interp, "let m = 0 - 9223372036854775807 - 1\nlet x = -m\n")
                .unwrap_err();
            assert!(matches!(err, VmError::IntegerOverflow("-")));
        }
    }

    mod attributes {
        use super::*;

        #[test]
        fn object_fields_roundtrip() {
            let interp = run("let o = object()\no.value = 41\no.value = o.value + 1\nlet r = o.value\n");
            assert_eq!(global_int(&interp, "r"), 42);
        }

        #[test]
        fn delete_removes_field() {
            let mut interp = Interpreter::new();
            let err = run_in(
                &mut interp,
                "let o = object()\no.value = 1\ndel o.value\nlet r = o.value\n",
            )
            .unwrap_err();
            assert!(matches!(err, VmError::UnknownAttribute(name) if name == "value"));
        }

        struct FortyTwo;

        impl Accessor for FortyTwo {
            fn get(&self, _cx: &mut CallContext<'_>, _obj: &ObjRef) -> Result<Value, VmError> {
                Ok(Value::Int(42))
            }
            fn set(
                &self,
                _cx: &mut CallContext<'_>,
                obj: &ObjRef,
                value: Value,
            ) -> Result<(), VmError> {
                obj.borrow_mut().fields.insert("answer".into(), value);
                Ok(())
            }
            fn delete(&self, _cx: &mut CallContext<'_>, _obj: &ObjRef) -> Result<(), VmError> {
                Ok(())
            }
        }

        #[test]
        fn accessor_intercepts_attribute_syntax() {
            let mut interp = Interpreter::new();
            run_in(&mut interp, "let o = object()\n").expect("run");
            if let Some(Value::Object(obj)) = interp.globals.get("o") {
                obj.borrow_mut()
                    .accessors
                    .insert("answer".into(), Rc::new(FortyTwo));
            } else {
                panic!("missing object global");
            }
            run_in(&mut interp, "let r = o.answer\n").expect("run");
            assert_eq!(global_int(&interp, "r"), 42);
        }

        #[test]
        fn getattr_builtin_routes_through_accessors() {
            let mut interp = Interpreter::new();
            run_in(&mut interp, "let o = object()\n").expect("run");
            if let Some(Value::Object(obj)) = interp.globals.get("o") {
                obj.borrow_mut()
                    .accessors
                    .insert("answer".into(), Rc::new(FortyTwo));
            } else {
                panic!("missing object global");
            }
            run_in(&mut interp, "let r = getattr(o, \"answer\")\n").expect("run");
            assert_eq!(global_int(&interp, "r"), 42);
        }
    }

    mod frames {
        use super::*;

        #[test]
        fn native_sees_caller_pc_on_call_instruction() {
            let mut interp = Interpreter::new();
            let seen: Rc<RefCell<Option<Op>>> = Rc::new(RefCell::new(None));
            let seen_clone = Rc::clone(&seen);
            interp.register_builtin("probe", move |cx, _args, _kwargs| {
                let frame = cx.frames().last().expect("caller frame");
                *seen_clone.borrow_mut() = Some(frame.code.instrs[frame.pc].op);
                Ok(Value::Nil)
            });
            run_in(&mut interp, "probe()\n").expect("run");
            assert_eq!(*seen.borrow(), Some(Op::Call));
        }

        #[test]
        fn reentrant_call_from_native() {
            let mut interp = Interpreter::new();
            interp.register_builtin("twice", move |cx, args, _kwargs| {
                let f = args[0].clone();
                let once = cx.call(f.clone(), vec![args[1].clone()], vec![])?;
                cx.call(f, vec![once], vec![])
            });
            let result = run_in(
                &mut interp,
                "fn inc(x) {\n  return x + 1\n}\nlet r = twice(inc, 5)\n",
            );
            result.expect("run");
            assert_eq!(global_int(&interp, "r"), 7);
        }
    }
}
