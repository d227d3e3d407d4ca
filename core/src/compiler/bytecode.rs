//! Bytecode compiler implementation.

use ecow::EcoString;
use hashbrown::HashMap;
use tracing::debug;

use crate::compiler::CompileError;
use crate::parser::{
    BinaryOp, BoolOp, ComparisonOp, Expr, Literal, Param, ParsedScript, Span, Stmt,
    TypeAnnotation, UnaryOp,
};
use crate::values::{DeclaredType, Value};
use crate::vm::{Builtin, Code, Function, Instruction};

/// Constant pool deduplication key.
///
/// Numbers are keyed by bit pattern so that `0` and `-0` stay distinct.
#[derive(Debug, PartialEq, Eq, Hash)]
enum ConstKey {
    Nil,
    Bool(bool),
    Number(u64),
    Str(EcoString),
}

impl From<&Value> for ConstKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Nil => ConstKey::Nil,
            Value::Bool(b) => ConstKey::Bool(*b),
            Value::Number(n) => ConstKey::Number(n.to_bits()),
            Value::Str(s) => ConstKey::Str(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LocalSlot {
    index: u32,
    ty: Option<DeclaredType>,
}

/// Compilation state of one frame: the top-level script or a function body.
#[derive(Debug)]
struct Frame<'a> {
    /// Number of local variable slots allocated so far
    num_locals: usize,

    /// Scope stack for lexical scoping
    ///
    /// Each scope maps variable names to their local slot. Blocks push a new
    /// scope, so a `let` in a block may shadow an outer variable.
    scopes: Vec<HashMap<&'a str, LocalSlot>>,

    /// Current stack depth during compilation
    current_stack_depth: usize,

    /// Maximum stack depth observed
    max_stack_size: usize,

    /// `return` is only valid inside a function.
    in_function: bool,
}

impl Frame<'_> {
    fn new(in_function: bool) -> Self {
        Self {
            num_locals: 0,
            scopes: vec![HashMap::new()],
            current_stack_depth: 0,
            max_stack_size: 0,
            in_function,
        }
    }
}

/// Operators whose left operand is evaluated first and left on the stack.
#[derive(Clone, Copy)]
enum ChainOp {
    Binary(BinaryOp),
    Comparison(ComparisonOp),
    Boolean(BoolOp),
}

fn split_operator<'a>(expr: &'a Expr<'a>) -> Option<(ChainOp, &'a Expr<'a>, &'a Expr<'a>)> {
    match *expr {
        Expr::Binary { op, left, right } => Some((ChainOp::Binary(op), left, right)),
        Expr::Comparison { op, left, right } => Some((ChainOp::Comparison(op), left, right)),
        Expr::Boolean { op, left, right } => Some((ChainOp::Boolean(op), left, right)),
        _ => None,
    }
}

/// Bytecode compiler that transforms a parsed script into VM bytecode.
///
/// Walks the statements once and emits stack-machine instructions, tracking
/// the operand stack precisely to set an exact `max_stack_size` per frame.
/// Function bodies are emitted after the top-level `Halt`.
pub struct BytecodeCompiler<'s, 'a> {
    script: &'s ParsedScript<'a>,

    /// Constant pool for literal values
    constants: Vec<Value>,

    /// Constant deduplication map: value -> index
    constant_map: HashMap<ConstKey, u32>,

    /// Bytecode instructions
    instructions: Vec<Instruction>,

    /// Source span of each instruction
    spans: Vec<Span>,

    /// Declared functions, in declaration order
    functions: Vec<Function>,

    /// Function name -> index into `functions`
    function_map: HashMap<&'a str, u32>,

    /// The frame being compiled
    frame: Frame<'a>,
}

impl<'s, 'a> BytecodeCompiler<'s, 'a> {
    pub fn new(script: &'s ParsedScript<'a>) -> Self {
        Self {
            script,
            constants: Vec::new(),
            constant_map: HashMap::new(),
            instructions: Vec::new(),
            spans: Vec::new(),
            functions: Vec::new(),
            function_map: HashMap::new(),
            frame: Frame::new(false),
        }
    }

    /// Convenience method to compile a whole script in one call.
    pub fn compile(script: &'s ParsedScript<'a>) -> Result<Code, CompileError> {
        let mut compiler = Self::new(script);
        compiler.declare_functions()?;

        for stmt in script.statements {
            compiler.statement(stmt)?;
        }
        let end = script.source().len();
        compiler.emit(Instruction::Halt, &Span::new(end, end));

        for (index, stmt) in script
            .statements
            .iter()
            .filter(|stmt| matches!(stmt, Stmt::Fn { .. }))
            .enumerate()
        {
            compiler.function(index, stmt)?;
        }

        debug!(
            constants = compiler.constants.len(),
            instructions = compiler.instructions.len(),
            functions = compiler.functions.len(),
            locals = compiler.frame.num_locals,
            max_stack_size = compiler.frame.max_stack_size,
            "Compiled script"
        );
        Ok(compiler.finalize())
    }

    /// Finalize compilation and return the bytecode.
    pub fn finalize(self) -> Code {
        debug_assert_eq!(
            self.frame.current_stack_depth, 0,
            "Unbalanced stack at end of script"
        );
        Code {
            constants: self.constants,
            instructions: self.instructions,
            spans: self.spans,
            num_locals: self.frame.num_locals,
            max_stack_size: self.frame.max_stack_size,
            functions: self.functions,
        }
    }

    // === Functions ===

    /// Registers every top-level function so that calls may precede the
    /// declaration and functions may call each other.
    fn declare_functions(&mut self) -> Result<(), CompileError> {
        let script = self.script;
        for stmt in script.statements {
            let Stmt::Fn { name, params, .. } = stmt else {
                continue;
            };
            let span = script.stmt_span(stmt);
            if Builtin::lookup(name).is_some() || self.function_map.contains_key(name) {
                return Err(CompileError::DuplicateFunction {
                    name: name.to_string(),
                    span,
                });
            }
            for (i, param) in params.iter().enumerate() {
                if params[..i].iter().any(|earlier| earlier.name == param.name) {
                    return Err(CompileError::DuplicateParameter {
                        name: param.name.to_string(),
                        span: param.span.clone(),
                    });
                }
            }

            let index: u32 = self
                .functions
                .len()
                .try_into()
                .map_err(|_| CompileError::TooManyFunctions { span: span.clone() })?;
            self.functions.push(Function {
                name: EcoString::from(*name),
                arity: params.len(),
                entry: 0,
                num_locals: 0,
                max_stack_size: 0,
            });
            self.function_map.insert(*name, index);
        }
        Ok(())
    }

    /// Emits the body of the `index`-th declared function in a fresh frame.
    fn function(&mut self, index: usize, stmt: &'a Stmt<'a>) -> Result<(), CompileError> {
        let Stmt::Fn { params, body, .. } = stmt else {
            return Ok(());
        };
        let span = self.script.stmt_span(stmt);
        let entry = self.label();
        let outer = std::mem::replace(&mut self.frame, Frame::new(true));

        // Arguments arrive in the first slots, in order.
        for param in params.iter() {
            self.parameter(param)?;
        }
        self.block(body)?;

        // Falling off the end returns nil. The span is the closing brace.
        let end = Span::new(span.0.end.saturating_sub(1), span.0.end);
        self.load_constant(Value::Nil, &end)?;
        self.emit(Instruction::Return, &end);
        self.pop_stack();

        let frame = std::mem::replace(&mut self.frame, outer);
        debug_assert_eq!(frame.current_stack_depth, 0, "Unbalanced stack in function");
        if let Some(function) = self.functions.get_mut(index) {
            function.entry = entry;
            function.num_locals = frame.num_locals;
            function.max_stack_size = frame.max_stack_size;
            debug!(name = %function.name, entry, "Compiled function");
        }
        Ok(())
    }

    fn parameter(&mut self, param: &'a Param<'a>) -> Result<(), CompileError> {
        let declared = self.declared_type(param.ty.as_ref())?;
        let slot = self.allocate_local(param.name, declared, &param.span)?;
        if let Some(ty) = declared {
            self.emit(Instruction::LoadLocal(slot), &param.span);
            self.push_stack();
            self.emit(Instruction::CheckType(ty), &param.span);
            self.emit(Instruction::Pop, &param.span);
            self.pop_stack();
        }
        Ok(())
    }

    // === Stack Management ===

    /// Push a value onto the stack (increases depth by 1).
    fn push_stack(&mut self) {
        self.frame.current_stack_depth += 1;
        if self.frame.current_stack_depth > self.frame.max_stack_size {
            self.frame.max_stack_size = self.frame.current_stack_depth;
        }
    }

    /// Pop a value from the stack (decreases depth by 1).
    fn pop_stack(&mut self) {
        debug_assert!(self.frame.current_stack_depth > 0, "Stack underflow");
        self.frame.current_stack_depth -= 1;
    }

    fn pop_stack_n(&mut self, n: usize) {
        debug_assert!(
            self.frame.current_stack_depth >= n,
            "Stack underflow: trying to pop {} but depth is {}",
            n,
            self.frame.current_stack_depth
        );
        self.frame.current_stack_depth -= n;
    }

    // === Instruction Emission ===

    fn emit(&mut self, instruction: Instruction, span: &Span) {
        self.instructions.push(instruction);
        self.spans.push(span.clone());
    }

    // === Local Variable Management ===

    /// Look up a variable in the current scope chain, innermost scope first.
    fn lookup_local(&self, name: &str) -> Option<LocalSlot> {
        self.frame
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    /// Allocate a new local variable slot in the current scope.
    ///
    /// Always creates a new slot, even if the same name exists in an outer
    /// scope or was already declared in this one.
    fn allocate_local(
        &mut self,
        name: &'a str,
        ty: Option<DeclaredType>,
        span: &Span,
    ) -> Result<u32, CompileError> {
        let index: u32 = self
            .frame
            .num_locals
            .try_into()
            .map_err(|_| CompileError::TooManyLocals { span: span.clone() })?;

        if let Some(scope) = self.frame.scopes.last_mut() {
            scope.insert(name, LocalSlot { index, ty });
        }
        self.frame.num_locals += 1;

        Ok(index)
    }

    fn push_scope(&mut self) {
        self.frame.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.frame.scopes.pop();
        debug_assert!(!self.frame.scopes.is_empty(), "Cannot pop frame scope");
    }

    fn declared_type(
        &self,
        annotation: Option<&TypeAnnotation<'a>>,
    ) -> Result<Option<DeclaredType>, CompileError> {
        annotation
            .map(|annotation| {
                DeclaredType::from_name(annotation.name).ok_or_else(|| {
                    CompileError::UnknownType {
                        name: annotation.name.to_string(),
                        span: annotation.span.clone(),
                    }
                })
            })
            .transpose()
    }

    // === Constant Pool Management ===

    /// Add a constant to the pool (or reuse an existing one) and return its index.
    fn add_constant(&mut self, value: Value, span: &Span) -> Result<u32, CompileError> {
        let key = ConstKey::from(&value);
        if let Some(&existing_index) = self.constant_map.get(&key) {
            return Ok(existing_index);
        }

        let index: u32 = self
            .constants
            .len()
            .try_into()
            .map_err(|_| CompileError::TooManyConstants { span: span.clone() })?;
        self.constants.push(value);
        self.constant_map.insert(key, index);
        Ok(index)
    }

    fn load_constant(&mut self, value: Value, span: &Span) -> Result<(), CompileError> {
        let index = self.add_constant(value, span)?;
        self.emit(Instruction::ConstLoad(index), span);
        self.push_stack();
        Ok(())
    }

    // === Jump Patching Infrastructure ===

    /// Reserve space for a forward jump and return its index.
    ///
    /// The placeholder is overwritten by `patch_jump` once the target is known.
    fn jump_placeholder(&mut self, span: &Span) -> usize {
        let placeholder_index = self.instructions.len();
        self.emit(Instruction::Halt, span);
        placeholder_index
    }

    /// Get the current instruction index (for use as a jump label).
    fn label(&self) -> usize {
        self.instructions.len()
    }

    /// Patch a jump placeholder with the actual forward jump instruction.
    fn patch_jump<F>(
        &mut self,
        placeholder_index: usize,
        target_label: usize,
        make_jump: F,
    ) -> Result<(), CompileError>
    where
        F: FnOnce(u32) -> Instruction,
    {
        // The VM advances the instruction pointer before executing, so the
        // offset is relative to the next instruction.
        let offset: u32 = (target_label - placeholder_index - 1)
            .try_into()
            .map_err(|_| CompileError::JumpTooFar {
                span: self.spans[placeholder_index].clone(),
            })?;
        self.instructions[placeholder_index] = make_jump(offset);
        Ok(())
    }

    /// Emit a backward jump to an already known label.
    fn emit_jump_backward(&mut self, target_label: usize, span: &Span) -> Result<(), CompileError> {
        let offset: u32 = (self.label() + 1 - target_label)
            .try_into()
            .map_err(|_| CompileError::JumpTooFar { span: span.clone() })?;
        self.emit(Instruction::JumpBackward(offset), span);
        Ok(())
    }

    // === Statements ===

    fn statement(&mut self, stmt: &'a Stmt<'a>) -> Result<(), CompileError> {
        let span = self.script.stmt_span(stmt);
        match stmt {
            Stmt::Let { name, ty, init } => {
                let declared = self.declared_type(ty.as_ref())?;

                // The new variable is not in scope in its own initializer.
                match (init, declared) {
                    (Some(init), _) => {
                        self.expr(init)?;
                        if let Some(ty) = declared {
                            let init_span = self.script.expr_span(init);
                            self.emit(Instruction::CheckType(ty), &init_span);
                        }
                    }
                    (None, Some(ty)) => self.load_constant(ty.default_value(), &span)?,
                    (None, None) => self.load_constant(Value::Nil, &span)?,
                }

                let index = self.allocate_local(name, declared, &span)?;
                self.emit(Instruction::StoreLocal(index), &span);
                self.pop_stack();
            }
            Stmt::Assign { name, value } => {
                let slot = self.lookup_local(name).ok_or_else(|| CompileError::UnknownVariable {
                    name: name.to_string(),
                    span: span.clone(),
                })?;
                self.expr(value)?;
                if let Some(ty) = slot.ty {
                    let value_span = self.script.expr_span(value);
                    self.emit(Instruction::CheckType(ty), &value_span);
                }
                self.emit(Instruction::StoreLocal(slot.index), &span);
                self.pop_stack();
            }
            Stmt::Print { args } => {
                let [arg] = args else {
                    return Err(CompileError::ArityMismatch {
                        name: "print".to_string(),
                        expected: "1".to_string(),
                        found: args.len(),
                        span,
                    });
                };
                self.expr(arg)?;
                self.emit(Instruction::Print, &span);
                self.pop_stack();
            }
            Stmt::Step { name, op } => {
                let slot = self.lookup_local(name).ok_or_else(|| CompileError::UnknownVariable {
                    name: name.to_string(),
                    span: span.clone(),
                })?;
                self.emit(Instruction::LoadLocal(slot.index), &span);
                self.push_stack();
                self.emit(Instruction::Step(*op), &span);
                self.emit(Instruction::StoreLocal(slot.index), &span);
                self.pop_stack();
            }
            Stmt::If { .. } => self.if_chain(stmt)?,
            Stmt::While { cond, body } => {
                let loop_start = self.label();
                self.expr(cond)?;
                let cond_span = self.script.expr_span(cond);
                let jump_to_end = self.jump_placeholder(&cond_span);
                self.pop_stack();

                self.block(body)?;
                self.emit_jump_backward(loop_start, &span)?;

                let end_label = self.label();
                self.patch_jump(jump_to_end, end_label, Instruction::PopJumpIfFalse)?;
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                // A `let` in the header is scoped to the loop.
                self.push_scope();
                let result = self.for_loop(*init, *cond, *update, body, &span);
                self.pop_scope();
                result?;
            }
            // Bodies are emitted after the top-level code.
            Stmt::Fn { .. } => {}
            Stmt::Return(value) => {
                if !self.frame.in_function {
                    return Err(CompileError::ReturnOutsideFunction { span });
                }
                match value {
                    Some(value) => self.expr(value)?,
                    None => self.load_constant(Value::Nil, &span)?,
                }
                self.emit(Instruction::Return, &span);
                self.pop_stack();
            }
            Stmt::Block(statements) => self.block(statements)?,
            Stmt::Expr(expr) => {
                self.expr(expr)?;
                self.emit(Instruction::Pop, &span);
                self.pop_stack();
            }
            Stmt::Empty => {}
        }
        Ok(())
    }

    /// Compiles an `if` with its `else if` arms in one loop; every arm that
    /// runs jumps to the common end.
    fn if_chain(&mut self, stmt: &'a Stmt<'a>) -> Result<(), CompileError> {
        let mut jumps_to_end = Vec::new();
        let mut current = stmt;
        loop {
            let Stmt::If {
                cond,
                then_block,
                else_branch,
            } = current
            else {
                // The final `else` block.
                self.statement(current)?;
                break;
            };

            self.expr(cond)?;
            let cond_span = self.script.expr_span(cond);
            let jump_to_else = self.jump_placeholder(&cond_span);
            self.pop_stack();

            self.block(then_block)?;

            match else_branch {
                Some(else_branch) => {
                    let span = self.script.stmt_span(current);
                    jumps_to_end.push(self.jump_placeholder(&span));
                    let else_label = self.label();
                    self.patch_jump(jump_to_else, else_label, Instruction::PopJumpIfFalse)?;
                    current = *else_branch;
                }
                None => {
                    let end_label = self.label();
                    self.patch_jump(jump_to_else, end_label, Instruction::PopJumpIfFalse)?;
                    break;
                }
            }
        }

        let end_label = self.label();
        for jump in jumps_to_end {
            self.patch_jump(jump, end_label, Instruction::JumpForward)?;
        }
        Ok(())
    }

    fn for_loop(
        &mut self,
        init: Option<&'a Stmt<'a>>,
        cond: Option<&'a Expr<'a>>,
        update: Option<&'a Stmt<'a>>,
        body: &'a [&'a Stmt<'a>],
        span: &Span,
    ) -> Result<(), CompileError> {
        if let Some(init) = init {
            self.statement(init)?;
        }

        let loop_start = self.label();
        let jump_to_end = match cond {
            Some(cond) => {
                self.expr(cond)?;
                let cond_span = self.script.expr_span(cond);
                let placeholder = self.jump_placeholder(&cond_span);
                self.pop_stack();
                Some(placeholder)
            }
            None => None,
        };

        self.block(body)?;
        if let Some(update) = update {
            self.statement(update)?;
        }
        self.emit_jump_backward(loop_start, span)?;

        if let Some(placeholder) = jump_to_end {
            let end_label = self.label();
            self.patch_jump(placeholder, end_label, Instruction::PopJumpIfFalse)?;
        }
        Ok(())
    }

    fn block(&mut self, statements: &'a [&'a Stmt<'a>]) -> Result<(), CompileError> {
        self.push_scope();
        let result = statements.iter().try_for_each(|stmt| self.statement(stmt));
        self.pop_scope();
        result
    }

    // === Expressions ===

    fn expr(&mut self, expr: &'a Expr<'a>) -> Result<(), CompileError> {
        let span = self.script.expr_span(expr);
        match expr {
            Expr::Literal(literal) => {
                let value = match *literal {
                    Literal::Nil => Value::Nil,
                    Literal::Bool(b) => Value::Bool(b),
                    Literal::Number(n) => Value::Number(n),
                    Literal::Str(s) => Value::str(s),
                };
                self.load_constant(value, &span)?;
            }
            Expr::Ident(name) => {
                let slot = self.lookup_local(name).ok_or_else(|| CompileError::UnknownVariable {
                    name: name.to_string(),
                    span: span.clone(),
                })?;
                self.emit(Instruction::LoadLocal(slot.index), &span);
                self.push_stack();
            }
            Expr::Binary { .. } | Expr::Comparison { .. } | Expr::Boolean { .. } => {
                self.operator_chain(expr)?
            }
            Expr::Unary { op, expr } => {
                self.expr(expr)?;
                let instruction = match op {
                    UnaryOp::Neg => Instruction::Neg,
                    UnaryOp::Not => Instruction::Not,
                };
                self.emit(instruction, &span);
            }
            Expr::Call { name, args } => {
                if let Some(&index) = self.function_map.get(name) {
                    let arity = self
                        .functions
                        .get(index as usize)
                        .map_or(0, |function| function.arity);
                    if args.len() != arity {
                        return Err(CompileError::ArityMismatch {
                            name: name.to_string(),
                            expected: arity.to_string(),
                            found: args.len(),
                            span,
                        });
                    }
                    for arg in args.iter() {
                        self.expr(arg)?;
                    }
                    self.emit(Instruction::Call(index), &span);
                    self.pop_stack_n(args.len());
                    self.push_stack();
                    return Ok(());
                }

                let builtin = Builtin::lookup(name).ok_or_else(|| CompileError::UnknownFunction {
                    name: name.to_string(),
                    span: span.clone(),
                })?;
                if args.len() != builtin.arity() {
                    return Err(CompileError::ArityMismatch {
                        name: name.to_string(),
                        expected: builtin.arity().to_string(),
                        found: args.len(),
                        span,
                    });
                }
                for arg in args.iter() {
                    self.expr(arg)?;
                }
                self.emit(Instruction::CallBuiltin(builtin), &span);
                self.pop_stack_n(args.len());
                self.push_stack();
            }
            Expr::HostCommand { args } => {
                let Some((first, rest)) = args.split_first() else {
                    return Err(CompileError::ArityMismatch {
                        name: "dkv".to_string(),
                        expected: "at least 1".to_string(),
                        found: 0,
                        span,
                    });
                };
                // dkv(a, b, c) sends a + " " + b + " " + c
                self.expr(first)?;
                for arg in rest {
                    self.load_constant(Value::str(" "), &span)?;
                    self.emit(Instruction::BinOp(BinaryOp::Add), &span);
                    self.pop_stack();
                    self.expr(arg)?;
                    self.emit(Instruction::BinOp(BinaryOp::Add), &span);
                    self.pop_stack();
                }
                self.emit(Instruction::HostCommand, &span);
            }
        }
        Ok(())
    }

    /// Compiles a left-deep run of binary operators, such as
    /// `a + b - c < d && e`, walking the left spine in a loop so that long
    /// chains do not recurse.
    fn operator_chain(&mut self, expr: &'a Expr<'a>) -> Result<(), CompileError> {
        let mut spine = Vec::new();
        let mut leftmost = expr;
        while let Some((op, left, right)) = split_operator(leftmost) {
            spine.push((op, right, self.script.expr_span(leftmost)));
            leftmost = left;
        }

        self.expr(leftmost)?;
        for (op, right, span) in spine.into_iter().rev() {
            match op {
                ChainOp::Binary(op) => {
                    self.expr(right)?;
                    self.emit(Instruction::BinOp(op), &span);
                    self.pop_stack();
                }
                ChainOp::Comparison(op) => {
                    self.expr(right)?;
                    self.emit(Instruction::CmpOp(op), &span);
                    self.pop_stack();
                }
                ChainOp::Boolean(op) => {
                    // Short-circuit: the left operand stays on the stack as
                    // the result when it decides the outcome.
                    let jump_to_end = self.jump_placeholder(&span);
                    self.pop_stack();

                    self.expr(right)?;
                    let right_span = self.script.expr_span(right);
                    self.emit(Instruction::CheckType(DeclaredType::Bool), &right_span);

                    let end_label = self.label();
                    let make_jump = match op {
                        BoolOp::And => Instruction::JumpIfFalseOrPop,
                        BoolOp::Or => Instruction::JumpIfTrueOrPop,
                    };
                    self.patch_jump(jump_to_end, end_label, make_jump)?;
                }
            }
        }
        Ok(())
    }
}
