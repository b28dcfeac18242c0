//! An in-memory module that renders LLVM-flavoured textual IR.

use std::collections::{HashMap, HashSet};

use super::{ArithOp, Backend, BackendError, BackendResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(usize);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Const(f64),
    Param { function: FunctionId, index: usize },
    Inst { function: FunctionId, index: usize },
}

#[derive(Debug, Clone, PartialEq)]
enum InstKind {
    Arith(ArithOp, Value, Value),
    CmpUlt(Value, Value),
    UiToFp(Value),
    Call {
        callee: FunctionId,
        callee_name: String,
        args: Vec<Value>,
    },
    Ret(Value),
}

#[derive(Debug, Clone)]
struct Inst {
    name: Option<String>,
    kind: InstKind,
}

#[derive(Debug, Clone)]
struct Block {
    name: String,
    insts: Vec<usize>,
}

#[derive(Debug, Clone)]
struct FunctionData {
    name: String,
    params: Vec<String>,
    blocks: Vec<Block>,
    insts: Vec<Inst>,
    taken: HashSet<String>,
    suffixes: HashMap<String, usize>,
}

impl FunctionData {
    fn new(name: &str, params: &[String]) -> Self {
        let mut data = Self {
            name: name.to_string(),
            params: Vec::new(),
            blocks: Vec::new(),
            insts: Vec::new(),
            taken: HashSet::new(),
            suffixes: HashMap::new(),
        };
        data.rename_params(params);
        data
    }

    /// `base`, or `base` with the next free numeric suffix
    fn unique_name(&mut self, base: &str) -> String {
        if self.taken.insert(base.to_string()) {
            return base.to_string();
        }
        let suffix = self.suffixes.entry(base.to_string()).or_insert(0);
        loop {
            *suffix += 1;
            let candidate = format!("{}{}", base, suffix);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    fn rename_params(&mut self, names: &[String]) {
        self.taken.clear();
        self.suffixes.clear();
        for block in &self.blocks {
            self.taken.insert(block.name.clone());
        }
        for inst in &self.insts {
            if let Some(name) = &inst.name {
                self.taken.insert(name.clone());
            }
        }
        let params: Vec<String> = names.iter().map(|name| self.unique_name(name)).collect();
        self.params = params;
    }

    fn clear_body(&mut self) {
        self.blocks.clear();
        self.insts.clear();
        let params = std::mem::take(&mut self.params);
        self.rename_params(&params);
    }

    fn is_bool(&self, value: Value) -> bool {
        match value {
            Value::Inst { index, .. } => matches!(
                self.insts.get(index).map(|inst| &inst.kind),
                Some(InstKind::CmpUlt(..))
            ),
            _ => false,
        }
    }
}

/// Renders a double the way LLVM does: six-digit exponent form when that
/// reads back to the same value, raw bits otherwise.
fn format_double(value: f64) -> String {
    if value.is_finite() {
        let text = format!("{:.6e}", value);
        if let Some((mantissa, exponent)) = text.split_once('e') {
            if let Ok(exponent) = exponent.parse::<i32>() {
                let rendered = format!(
                    "{}e{}{:02}",
                    mantissa,
                    if exponent < 0 { '-' } else { '+' },
                    exponent.abs()
                );
                if rendered.parse::<f64>().ok() == Some(value) {
                    return rendered;
                }
            }
        }
    }
    format!("0x{:016X}", value.to_bits())
}

#[derive(Clone)]
pub struct IrModule {
    name: String,
    functions: Vec<Option<FunctionData>>,
    by_name: HashMap<String, FunctionId>,
    cursor: Option<(FunctionId, usize)>,
}

impl Default for IrModule {
    fn default() -> Self {
        Self::new("jlang")
    }
}

impl IrModule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            functions: Vec::new(),
            by_name: HashMap::new(),
            cursor: None,
        }
    }

    /// names of the live functions, in creation order
    pub fn function_names(&self) -> Vec<&str> {
        self.functions
            .iter()
            .flatten()
            .map(|data| data.name.as_str())
            .collect()
    }

    fn function(&self, function: FunctionId) -> Option<&FunctionData> {
        self.functions.get(function.0).and_then(Option::as_ref)
    }

    fn function_mut(&mut self, function: FunctionId) -> Option<&mut FunctionData> {
        self.functions.get_mut(function.0).and_then(Option::as_mut)
    }

    fn operand(&self, value: Value) -> String {
        match value {
            Value::Const(value) => format_double(value),
            Value::Param { function, index } => match self.function(function) {
                Some(data) if index < data.params.len() => format!("%{}", data.params[index]),
                _ => "<badref>".to_string(),
            },
            Value::Inst { function, index } => {
                match self
                    .function(function)
                    .and_then(|data| data.insts.get(index))
                    .and_then(|inst| inst.name.as_ref())
                {
                    Some(name) => format!("%{}", name),
                    None => "<badref>".to_string(),
                }
            }
        }
    }

    fn insert(&mut self, base: Option<&str>, kind: InstKind) -> BackendResult<Value> {
        let (function, block) = self
            .cursor
            .ok_or_else(|| BackendError::new("no insertion point"))?;
        let data = self
            .function_mut(function)
            .ok_or_else(|| BackendError::new("insertion point in a deleted function"))?;

        let name = base.map(|base| data.unique_name(base));
        let index = data.insts.len();
        data.insts.push(Inst { name, kind });
        data.blocks[block].insts.push(index);
        Ok(Value::Inst { function, index })
    }

    fn render_inst(&self, inst: &Inst) -> String {
        let body = match &inst.kind {
            InstKind::Arith(op, lhs, rhs) => {
                let opcode = match op {
                    ArithOp::Add => "fadd",
                    ArithOp::Sub => "fsub",
                    ArithOp::Mul => "fmul",
                };
                format!("{} double {}, {}", opcode, self.operand(*lhs), self.operand(*rhs))
            }
            InstKind::CmpUlt(lhs, rhs) => {
                format!("fcmp ult double {}, {}", self.operand(*lhs), self.operand(*rhs))
            }
            InstKind::UiToFp(value) => format!("uitofp i1 {} to double", self.operand(*value)),
            InstKind::Call {
                callee_name, args, ..
            } => {
                let args: Vec<String> = args
                    .iter()
                    .map(|&arg| format!("double {}", self.operand(arg)))
                    .collect();
                format!("call double @{}({})", callee_name, args.join(", "))
            }
            InstKind::Ret(value) => format!("ret double {}", self.operand(*value)),
        };
        match &inst.name {
            Some(name) => format!("%{} = {}", name, body),
            None => body,
        }
    }

    fn render_function(&self, data: &FunctionData) -> String {
        let params: Vec<String> = data
            .params
            .iter()
            .map(|param| format!("double %{}", param))
            .collect();
        let signature = format!("double @{}({})", data.name, params.join(", "));

        if data.blocks.is_empty() {
            return format!("declare {}\n", signature);
        }

        let mut out = format!("define {} {{\n", signature);
        for (i, block) in data.blocks.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("{}:\n", block.name));
            for &index in &block.insts {
                out.push_str(&format!("  {}\n", self.render_inst(&data.insts[index])));
            }
        }
        out.push_str("}\n");
        out
    }

    fn check_operand(&self, data: &FunctionData, function: FunctionId, seen: &HashSet<usize>, value: Value) -> bool {
        match value {
            Value::Const(_) => true,
            Value::Param { function: owner, index } => owner == function && index < data.params.len(),
            Value::Inst { function: owner, index } => owner == function && seen.contains(&index),
        }
    }

    fn verify_inst(&self, data: &FunctionData, function: FunctionId, seen: &HashSet<usize>, inst: &Inst) -> bool {
        let double = |value: Value| self.check_operand(data, function, seen, value) && !data.is_bool(value);
        match &inst.kind {
            InstKind::Arith(_, lhs, rhs) | InstKind::CmpUlt(lhs, rhs) => double(*lhs) && double(*rhs),
            InstKind::UiToFp(value) => {
                self.check_operand(data, function, seen, *value) && data.is_bool(*value)
            }
            InstKind::Call { callee, args, .. } => {
                let arity_matches = match self.function(*callee) {
                    Some(target) => target.params.len() == args.len(),
                    None => false,
                };
                arity_matches && args.iter().all(|&arg| double(arg))
            }
            InstKind::Ret(value) => double(*value),
        }
    }
}

impl Backend for IrModule {
    type Value = Value;
    type Function = FunctionId;
    type Snapshot = IrModule;

    fn get_function(&self, name: &str) -> Option<FunctionId> {
        self.by_name.get(name).copied()
    }

    fn declare_function(&mut self, name: &str, params: &[String]) -> BackendResult<FunctionId> {
        if self.by_name.contains_key(name) {
            return Err(BackendError::new(format!("function {} already exists", name)));
        }
        let id = FunctionId(self.functions.len());
        self.functions.push(Some(FunctionData::new(name, params)));
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    fn param_count(&self, function: FunctionId) -> usize {
        self.function(function).map_or(0, |data| data.params.len())
    }

    fn params(&self, function: FunctionId) -> Vec<Value> {
        (0..self.param_count(function))
            .map(|index| Value::Param { function, index })
            .collect()
    }

    fn set_param_names(&mut self, function: FunctionId, names: &[String]) {
        if let Some(data) = self.function_mut(function) {
            data.rename_params(names);
        }
    }

    fn has_body(&self, function: FunctionId) -> bool {
        self.function(function)
            .map_or(false, |data| !data.blocks.is_empty())
    }

    fn clear_body(&mut self, function: FunctionId) -> BackendResult<()> {
        if matches!(self.cursor, Some((f, _)) if f == function) {
            self.cursor = None;
        }
        self.function_mut(function)
            .ok_or_else(|| BackendError::new("cannot clear a deleted function"))?
            .clear_body();
        Ok(())
    }

    fn position_at_entry(&mut self, function: FunctionId, block: &str) {
        if let Some(data) = self.function_mut(function) {
            let name = data.unique_name(block);
            data.blocks.push(Block {
                name,
                insts: Vec::new(),
            });
            let index = data.blocks.len() - 1;
            self.cursor = Some((function, index));
        }
    }

    fn const_number(&mut self, value: f64) -> Value {
        Value::Const(value)
    }

    fn build_arith(&mut self, op: ArithOp, lhs: Value, rhs: Value) -> BackendResult<Value> {
        self.insert(Some(op.value_name()), InstKind::Arith(op, lhs, rhs))
    }

    fn build_unsigned_less_than(&mut self, lhs: Value, rhs: Value) -> BackendResult<Value> {
        let cmp = self.insert(Some("cmptmp"), InstKind::CmpUlt(lhs, rhs))?;
        self.insert(Some("booltmp"), InstKind::UiToFp(cmp))
    }

    fn build_call(&mut self, function: FunctionId, args: &[Value]) -> BackendResult<Value> {
        let callee_name = self
            .function(function)
            .map(|data| data.name.clone())
            .ok_or_else(|| BackendError::new("call to a deleted function"))?;
        self.insert(
            Some("calltmp"),
            InstKind::Call {
                callee: function,
                callee_name,
                args: args.to_vec(),
            },
        )
    }

    fn build_return(&mut self, value: Value) -> BackendResult<()> {
        self.insert(None, InstKind::Ret(value)).map(|_| ())
    }

    fn verify(&self, function: FunctionId) -> bool {
        let data = match self.function(function) {
            Some(data) => data,
            None => return false,
        };
        if data.blocks.is_empty() {
            return false;
        }

        let mut seen = HashSet::new();
        for block in &data.blocks {
            let last = match block.insts.last() {
                Some(&last) => last,
                None => return false,
            };
            for &index in &block.insts {
                let inst = &data.insts[index];
                let is_terminator = matches!(inst.kind, InstKind::Ret(_));
                if is_terminator != (index == last) {
                    return false;
                }
                if !self.verify_inst(data, function, &seen, inst) {
                    return false;
                }
                seen.insert(index);
            }
        }
        true
    }

    fn delete_function(&mut self, function: FunctionId) {
        if let Some(data) = self.functions.get_mut(function.0).and_then(Option::take) {
            if self.by_name.get(&data.name) == Some(&function) {
                self.by_name.remove(&data.name);
            }
        }
        if matches!(self.cursor, Some((f, _)) if f == function) {
            self.cursor = None;
        }
    }

    fn snapshot(&self) -> IrModule {
        IrModule {
            cursor: None,
            ..self.clone()
        }
    }

    fn restore(&mut self, snapshot: IrModule) {
        *self = snapshot;
    }

    fn print_function(&self, function: FunctionId) -> String {
        self.function(function)
            .map(|data| self.render_function(data))
            .unwrap_or_default()
    }

    fn print_module(&self) -> String {
        let mut out = format!("; ModuleID = '{}'\n", self.name);
        for data in self.functions.iter().flatten() {
            out.push('\n');
            out.push_str(&self.render_function(data));
        }
        out
    }
}
