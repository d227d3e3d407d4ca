use core::fmt;

use ecow::EcoString;
use hashbrown::{HashMap, HashSet};

use crate::parser::Span;
use crate::values::Value;
use crate::vm::Instruction;

/// A compiled program: constant pool plus instruction stream.
///
/// Immutable once produced by the compiler. `spans[i]` is the source span of
/// `instructions[i]`. The top-level script starts at instruction 0 and ends
/// with `Halt`; function bodies follow it. `num_locals` and `max_stack_size`
/// describe the top-level frame.
#[derive(Clone, PartialEq)]
pub struct Code {
    pub constants: Vec<Value>,
    pub instructions: Vec<Instruction>,
    pub spans: Vec<Span>,
    pub num_locals: usize,
    pub max_stack_size: usize,
    pub functions: Vec<Function>,
}

/// A declared function, indexed by `Instruction::Call`.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: EcoString,
    pub arity: usize,
    /// Address of the first instruction of the body.
    pub entry: usize,
    /// Parameters included.
    pub num_locals: usize,
    pub max_stack_size: usize,
}

impl Code {
    pub fn span_at(&self, ip: usize) -> Span {
        self.spans.get(ip).cloned().unwrap_or_default()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }

    /// Human-readable listing of constants and instructions with jump labels.
    pub fn disassemble(&self) -> String {
        format!("{:?}", self)
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Code {{")?;
        writeln!(f, "  num_locals: {}", self.num_locals)?;
        writeln!(f, "  max_stack_size: {}", self.max_stack_size)?;

        if !self.constants.is_empty() {
            writeln!(f, "  constants: [")?;
            for (i, constant) in self.constants.iter().enumerate() {
                writeln!(f, "    [{}] = {:?}", i, constant)?;
            }
            writeln!(f, "  ]")?;
        } else {
            writeln!(f, "  constants: []")?;
        }

        // First pass: collect all jump targets to determine which addresses need labels
        let jump_targets: HashSet<usize> = self
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(addr, instr)| instr.jump_target(addr))
            .collect();

        // Assign label numbers to targets (sorted for deterministic output)
        let mut sorted_targets: Vec<_> = jump_targets.into_iter().collect();
        sorted_targets.sort();
        let label_map: HashMap<usize, usize> = sorted_targets
            .into_iter()
            .enumerate()
            .map(|(i, addr)| (addr, i))
            .collect();

        let entries: HashMap<usize, &Function> = self
            .functions
            .iter()
            .map(|function| (function.entry, function))
            .collect();

        // Second pass: print instructions with labels
        writeln!(f, "  instructions:")?;
        for (addr, instr) in self.instructions.iter().enumerate() {
            if let Some(function) = entries.get(&addr) {
                writeln!(
                    f,
                    "  fn {}/{} (locals: {}, max_stack_size: {}):",
                    function.name, function.arity, function.num_locals, function.max_stack_size
                )?;
            }

            let label_prefix = match label_map.get(&addr) {
                Some(label_num) => format!("L{}:", label_num),
                None => String::new(),
            };

            match instr.jump_target(addr) {
                Some(target) => {
                    let target_label = label_map
                        .get(&target)
                        .map(|l| format!("L{}", l))
                        .unwrap_or_else(|| format!("@{}", target));
                    writeln!(
                        f,
                        "    {:4} {:>4}  {:?} (to {})",
                        addr, label_prefix, instr, target_label
                    )?;
                }
                None => match instr {
                    Instruction::Call(index) => {
                        let name = self
                            .functions
                            .get(*index as usize)
                            .map_or("?", |function| function.name.as_str());
                        writeln!(f, "    {:4} {:>4}  {:?} ({})", addr, label_prefix, instr, name)?
                    }
                    _ => writeln!(f, "    {:4} {:>4}  {:?}", addr, label_prefix, instr)?,
                },
            }
        }

        write!(f, "}}")
    }
}
