use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ast::{ASTNode, Expression, Function, Prototype};
use crate::backend::{ArithOp, Backend, BackendError};

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CodegenError {
    #[error("unknown variable referenced {0}")]
    UnknownVariable(String),
    #[error("invalid binary operator {0}")]
    UnknownOperator(char),
    #[error("unknown function referenced {0}")]
    UnknownFunction(String),
    #[error("invalid number of args in call {callee} expected {expected} found {found}")]
    InvalidCall {
        callee: String,
        expected: usize,
        found: usize,
    },
    #[error("duplicate parameter {param} in prototype {name}")]
    DuplicateParameter { name: String, param: String },
    #[error("function {name} already declared with {expected} parameters, found {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("failed to verify function {0}")]
    InvalidFunction(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type CodegenResult<T> = Result<T, CodegenError>;

/// The generation context: the backend module being filled in and the
/// symbol table of the function currently being generated.
pub struct Codegen<B: Backend> {
    pub backend: B,
    pub named_values: HashMap<String, B::Value>,
}

impl<B: Backend> Codegen<B> {
    pub fn new(backend: B) -> Self {
        Codegen {
            backend,
            named_values: HashMap::new(),
        }
    }

    pub fn codegen_expr(&mut self, expr: &Expression) -> CodegenResult<B::Value> {
        match expr {
            Expression::Number(value) => Ok(self.backend.const_number(*value)),
            Expression::Variable(name) => match self.named_values.get(name) {
                Some(&var) => Ok(var),
                None => Err(CodegenError::UnknownVariable(name.clone())),
            },
            Expression::Binary { op, lhs, rhs } => {
                let lhs = self.codegen_expr(lhs)?;
                let rhs = self.codegen_expr(rhs)?;

                let value = match op {
                    '+' => self.backend.build_arith(ArithOp::Add, lhs, rhs)?,
                    '-' => self.backend.build_arith(ArithOp::Sub, lhs, rhs)?,
                    '*' => self.backend.build_arith(ArithOp::Mul, lhs, rhs)?,
                    '<' => self.backend.build_unsigned_less_than(lhs, rhs)?,
                    _ => return Err(CodegenError::UnknownOperator(*op)),
                };
                Ok(value)
            }
            Expression::Call { callee, args } => match self.backend.get_function(callee) {
                Some(func) => {
                    let expected = self.backend.param_count(func);
                    if expected != args.len() {
                        return Err(CodegenError::InvalidCall {
                            callee: callee.clone(),
                            expected,
                            found: args.len(),
                        });
                    }

                    let mut gened_args = Vec::with_capacity(args.len());
                    for arg in args {
                        gened_args.push(self.codegen_expr(arg)?);
                    }

                    Ok(self.backend.build_call(func, &gened_args)?)
                }
                None => Err(CodegenError::UnknownFunction(callee.clone())),
            },
        }
    }

    /// Looks up the function registered under `proto`'s name, checking the
    /// parameter count, or declares a new one.
    fn resolve_proto(&mut self, proto: &Prototype) -> CodegenResult<B::Function> {
        let mut seen = HashSet::with_capacity(proto.args.len());
        if let Some(param) = proto.args.iter().find(|arg| !seen.insert(arg.as_str())) {
            return Err(CodegenError::DuplicateParameter {
                name: proto.name.clone(),
                param: param.clone(),
            });
        }

        if let Some(existing) = self.backend.get_function(&proto.name) {
            let expected = self.backend.param_count(existing);
            if expected != proto.args.len() {
                return Err(CodegenError::ArityMismatch {
                    name: proto.name.clone(),
                    expected,
                    found: proto.args.len(),
                });
            }
            return Ok(existing);
        }

        Ok(self.backend.declare_function(&proto.name, &proto.args)?)
    }

    /// Declares `proto`, or reuses the function already registered under its
    /// name when the parameter counts agree.
    pub fn compile_proto(&mut self, proto: &Prototype) -> CodegenResult<B::Function> {
        let func = self.resolve_proto(proto)?;
        self.backend.set_param_names(func, &proto.args);
        Ok(func)
    }

    fn compile_body(&mut self, func: B::Function, function: &Function) -> CodegenResult<()> {
        let body = self.codegen_expr(&function.body)?;
        self.backend.build_return(body)?;

        if self.backend.verify(func) {
            Ok(())
        } else {
            Err(CodegenError::InvalidFunction(function.prototype.name.clone()))
        }
    }

    /// Generates `function`. On failure the module is left as it was before:
    /// a new function is removed, a declaration stays a declaration and a
    /// previous definition gets its old body back.
    pub fn compile_fn(&mut self, function: &Function) -> CodegenResult<B::Function> {
        let proto = &function.prototype;
        let existed = self.backend.get_function(&proto.name).is_some();
        let func = self.resolve_proto(proto)?;

        let previous = if self.backend.has_body(func) {
            debug!(function = %proto.name, "redefining function");
            let snapshot = self.backend.snapshot();
            self.backend.clear_body(func)?;
            Some(snapshot)
        } else {
            None
        };

        self.backend.position_at_entry(func, "entry");

        self.named_values.clear();
        for (name, value) in proto.args.iter().zip(self.backend.params(func)) {
            self.named_values.insert(name.clone(), value);
        }

        match self.compile_body(func, function) {
            Ok(()) => {
                self.backend.set_param_names(func, &proto.args);
                Ok(func)
            }
            Err(err) => {
                match previous {
                    Some(snapshot) => {
                        debug!(function = %proto.name, "restoring previous definition");
                        self.backend.restore(snapshot);
                    }
                    None if existed => {
                        debug!(function = %proto.name, "resetting function to a declaration");
                        self.backend.clear_body(func)?;
                    }
                    None => {
                        debug!(function = %proto.name, "removing partially generated function");
                        self.backend.delete_function(func);
                    }
                }
                Err(err)
            }
        }
    }

    pub fn codegen(&mut self, node: &ASTNode) -> CodegenResult<B::Function> {
        match node {
            ASTNode::Function(func) => self.compile_fn(func),
            ASTNode::Extern(proto) => self.compile_proto(proto),
        }
    }

    pub fn codegen_all(&mut self, ast_nodes: &[ASTNode]) -> CodegenResult<()> {
        for node in ast_nodes {
            self.codegen(node)?;
        }

        Ok(())
    }
}
