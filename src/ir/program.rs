//! # IL Module, Function, Basic Block (§3.5)
//!
//! Modules own functions and globals; functions own basic blocks and a
//! register-id factory; blocks own an ordered instruction list plus
//! successor references derived from their terminator.

use std::collections::HashSet;

use crate::types::{StorageClass, Type};

use super::instruction::{Instruction, Opcode};
use super::value::{ConstValue, RegisterFactory};

/// A basic block. Block id 0 is always the function's entry block and its
/// label is always `"entry"` (§3.5).
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Unique id within the owning function; 0 is the entry block.
    pub id: u32,
    /// Unique label within the owning function.
    pub label: String,
    /// Instructions in execution order.
    pub instructions: Vec<Instruction>,
    /// Successor block ids, derived from this block's terminator.
    pub successors: Vec<u32>,
    /// `true` once a terminator instruction has been appended.
    pub has_terminator: bool,
}

impl BasicBlock {
    /// A new, empty block.
    pub fn new(id: u32, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            instructions: Vec::new(),
            successors: Vec::new(),
            has_terminator: false,
        }
    }

    /// Append an instruction. Panics if a terminator has already been
    /// appended — callers (the builder) must not emit dead code after a
    /// terminator; §3.5 forbids it as an invariant.
    pub fn push(&mut self, instr: Instruction) {
        assert!(
            !self.has_terminator,
            "attempted to append an instruction after block '{}' already has a terminator",
            self.label
        );
        if instr.is_terminator() {
            self.has_terminator = true;
        }
        self.instructions.push(instr);
    }

    /// The block's terminator instruction, if it has one.
    pub fn terminator(&self) -> Option<&Instruction> {
        if self.has_terminator {
            self.instructions.last()
        } else {
            None
        }
    }
}

/// A parameter declaration in a function signature.
#[derive(Debug, Clone)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    pub ty: Type,
}

/// An IL function.
#[derive(Debug, Clone)]
pub struct IlFunction {
    /// Function name.
    pub name: String,
    /// Parameters, in declaration order.
    pub params: Vec<Param>,
    /// Return type (`Type::Void` for a void function).
    pub return_ty: Type,
    /// Basic blocks; index 0 is always the entry block.
    pub blocks: Vec<BasicBlock>,
    /// This function's register-id factory.
    pub registers: RegisterFactory,
    /// Whether this function is exported from its module.
    pub exported: bool,
}

impl IlFunction {
    /// A new function with a single empty entry block (id 0, label
    /// `"entry"`).
    pub fn new(name: impl Into<String>, params: Vec<Param>, return_ty: Type, exported: bool) -> Self {
        Self {
            name: name.into(),
            params,
            return_ty,
            blocks: vec![BasicBlock::new(0, "entry")],
            registers: RegisterFactory::new(),
            exported,
        }
    }

    /// Append a new block with a fresh id and the given label. The label
    /// must not collide with an existing block's label (checked via
    /// `debug_assert!`, since the builder is the only caller and always
    /// generates unique labels).
    pub fn new_block(&mut self, label: impl Into<String>) -> u32 {
        let id = self.blocks.len() as u32;
        let label = label.into();
        debug_assert!(
            self.blocks.iter().all(|b| b.label != label),
            "duplicate block label '{label}' in function '{}'",
            self.name
        );
        self.blocks.push(BasicBlock::new(id, label));
        id
    }

    /// Mutable access to a block by id.
    pub fn block_mut(&mut self, id: u32) -> &mut BasicBlock {
        &mut self.blocks[id as usize]
    }

    /// Immutable access to a block by id.
    pub fn block(&self, id: u32) -> &BasicBlock {
        &self.blocks[id as usize]
    }

    /// Find a block by label.
    pub fn block_by_label(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.label == label)
    }

    /// Recompute every block's `successors` from its terminator's target
    /// labels. Must be called once lowering for the function is complete,
    /// before verification or codegen.
    pub fn recompute_successors(&mut self) {
        let label_to_id: std::collections::HashMap<String, u32> = self
            .blocks
            .iter()
            .map(|b| (b.label.clone(), b.id))
            .collect();

        for block in &mut self.blocks {
            block.successors.clear();
            if let Some(term) = block.terminator() {
                for label in term.successor_labels() {
                    if let Some(&id) = label_to_id.get(label) {
                        block.successors.push(id);
                    }
                }
            }
        }
    }

    /// Reverse-postorder traversal order over reachable blocks, entry
    /// first, each reachable block visited exactly once (§4.3, §8
    /// invariant 6). The standard iteration order for codegen.
    pub fn reverse_postorder(&self) -> Vec<u32> {
        let mut visited: HashSet<u32> = HashSet::new();
        let mut postorder: Vec<u32> = Vec::new();

        fn visit(
            func: &IlFunction,
            id: u32,
            visited: &mut HashSet<u32>,
            postorder: &mut Vec<u32>,
        ) {
            if !visited.insert(id) {
                return;
            }
            let successors = func.block(id).successors.clone();
            for succ in successors {
                visit(func, succ, visited, postorder);
            }
            postorder.push(id);
        }

        visit(self, 0, &mut visited, &mut postorder);
        postorder.reverse();
        postorder
    }

    /// Drop blocks unreachable from the entry block. Returns the labels of
    /// the blocks that were dropped, for the caller to attach as a
    /// diagnostic (§4.3: "unreachable blocks after lowering are dropped
    /// with a diagnostic").
    pub fn drop_unreachable_blocks(&mut self) -> Vec<String> {
        self.recompute_successors();
        let reachable: HashSet<u32> = self.reverse_postorder().into_iter().collect();
        let mut dropped = Vec::new();
        self.blocks.retain(|b| {
            if reachable.contains(&b.id) {
                true
            } else {
                dropped.push(b.label.clone());
                false
            }
        });
        dropped
    }
}

/// An array or scalar initializer for a global declaration.
#[derive(Debug, Clone)]
pub enum Initializer {
    /// A single scalar value.
    Scalar(ConstValue),
    /// An element-by-element array initializer.
    Array(Vec<ConstValue>),
}

/// A module-scoped global declaration (§3.5).
#[derive(Debug, Clone)]
pub struct GlobalDecl {
    /// Global name.
    pub name: String,
    /// Declared type.
    pub ty: Type,
    /// Storage class.
    pub storage: StorageClass,
    /// Fixed address, present only for `StorageClass::Map` globals.
    pub address: Option<u16>,
    /// Initial value, if one was given.
    pub initializer: Option<Initializer>,
    /// Whether this global is exported from its module.
    pub exported: bool,
}

/// An IL module: the unit of output from one source module's lowering.
#[derive(Debug, Clone)]
pub struct IlModule {
    /// The module's name.
    pub name: String,
    /// Functions, in declaration order.
    pub functions: Vec<IlFunction>,
    /// Globals, in declaration order.
    pub globals: Vec<GlobalDecl>,
    /// Source file this module was lowered from.
    pub source_file: String,
}

impl IlModule {
    /// A new, empty module.
    pub fn new(name: impl Into<String>, source_file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            globals: Vec::new(),
            source_file: source_file.into(),
        }
    }

    /// Find a function by name.
    pub fn function(&self, name: &str) -> Option<&IlFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Build a `CONST` instruction selecting the right opcode for a known
/// constant value — a small convenience used by both the builder and
/// tests.
pub fn const_instruction(
    value: ConstValue,
    result: super::value::VirtualRegister,
    location: crate::types::SourceLocation,
) -> Instruction {
    Instruction::new(Opcode::Const(value, result), location)
}
